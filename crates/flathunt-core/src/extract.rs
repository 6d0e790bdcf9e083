//! Field extraction from the free-text body of a classified-ad message.
//!
//! Each field has its own pattern and parser; a field that does not match
//! or does not parse is left `None` without affecting the others.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::models::ExtractedFields;

const POSTED_AT_FORMAT: &str = "%d/%m/%Y | %H:%M";

static RE_DISTRICT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Район: #(\w+)").unwrap());
static RE_PRICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Цена: (\d+)").unwrap());
static RE_MEDIA_FEE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\+(\d+)").unwrap());
static RE_DEPOSIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Кауция: (\d+)").unwrap());
static RE_ROOMS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Комнаты: #(\d+)").unwrap());
static RE_AREA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Площадь: ([\d.]+)").unwrap());
static RE_POSTED_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"📆 (\d{1,2}/\d{1,2}/\d{4} \| \d{1,2}:\d{2})").unwrap()
});

/// Parse all known fields out of an advert text.
pub fn extract_fields(text: &str) -> ExtractedFields {
    ExtractedFields {
        district: capture(&RE_DISTRICT, text).map(str::to_string),
        price: parse_capture(&RE_PRICE, text),
        media_fee: parse_capture(&RE_MEDIA_FEE, text),
        deposit: parse_capture(&RE_DEPOSIT, text),
        rooms: parse_capture(&RE_ROOMS, text),
        area: parse_capture(&RE_AREA, text),
        posted_at: capture(&RE_POSTED_AT, text)
            .and_then(|raw| NaiveDateTime::parse_from_str(raw, POSTED_AT_FORMAT).ok()),
    }
}

fn capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn parse_capture<T: FromStr>(re: &Regex, text: &str) -> Option<T> {
    capture(re, text).and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const ADVERT_TEXT: &str = "
ELEGANCKIE 2POK 52M + SŁONECZNY TARAS 35M + GARAŻ

📍 Район: #Wilanów

💰 Цена: 3600 zł [+450 zł]
🔢 Комнаты: #2_комнаты
〽 Площадь: 52.0 м²
🔐 Кауция: 7200 zł
📜 Частное лицо

📆 31/08/2024 | 23:46
";

    #[test]
    fn test_extracts_all_fields() {
        let fields = extract_fields(ADVERT_TEXT);

        assert_eq!(fields.district.as_deref(), Some("Wilanów"));
        assert_eq!(fields.price, Some(3600.0));
        assert_eq!(fields.media_fee, Some(450.0));
        assert_eq!(fields.deposit, Some(7200.0));
        assert_eq!(fields.rooms, Some(2));
        assert_eq!(fields.area, Some(52.0));
        assert_eq!(
            fields.posted_at,
            NaiveDate::from_ymd_opt(2024, 8, 31).and_then(|d| d.and_hms_opt(23, 46, 0))
        );
    }

    #[test]
    fn test_rooms_label() {
        assert_eq!(extract_fields("🔢 Комнаты: #3").rooms, Some(3));
        assert_eq!(extract_fields("🔢 Комнаты: #3_комнаты").rooms, Some(3));
        assert_eq!(extract_fields("🔢 Rooms: 3").rooms, None);
    }

    #[test]
    fn test_missing_field_does_not_affect_others() {
        let full = extract_fields(ADVERT_TEXT);
        let cases: [(&str, fn(&mut ExtractedFields)); 6] = [
            ("📍 Район: #Wilanów\n", |f| f.district = None),
            ("💰 Цена: 3600 zł [+450 zł]\n", |f| {
                f.price = None;
                f.media_fee = None;
            }),
            ("🔐 Кауция: 7200 zł\n", |f| f.deposit = None),
            ("🔢 Комнаты: #2_комнаты\n", |f| f.rooms = None),
            ("〽 Площадь: 52.0 м²\n", |f| f.area = None),
            ("📆 31/08/2024 | 23:46\n", |f| f.posted_at = None),
        ];

        for (line, clear) in cases {
            assert!(ADVERT_TEXT.contains(line), "fixture lacks {line:?}");
            let mut expected = full.clone();
            clear(&mut expected);

            assert_eq!(
                extract_fields(&ADVERT_TEXT.replace(line, "")),
                expected,
                "removing {line:?}"
            );
        }
    }

    #[test]
    fn test_unparsable_area_is_absent() {
        let fields = extract_fields("Площадь: 52.0.1 м²\nКомнаты: #4");
        assert_eq!(fields.area, None);
        assert_eq!(fields.rooms, Some(4));
    }

    #[test]
    fn test_posted_at_requires_four_digit_year() {
        assert_eq!(extract_fields("📆 31/08/24 | 23:46").posted_at, None);
        assert_eq!(extract_fields("📆 31/13/2024 | 23:46").posted_at, None);
        assert!(extract_fields("📆 01/09/2024 | 08:05").posted_at.is_some());
    }

    #[test]
    fn test_empty_text_yields_all_absent() {
        assert_eq!(extract_fields(""), ExtractedFields::default());
    }
}
