use std::fmt::Display;

use crate::models::Advert;

const NOT_AVAILABLE: &str = "N/A";
const UNKNOWN: &str = "?";

/// Render an accepted advert as a Telegram HTML announcement.
pub fn format_advert(advert: &Advert) -> String {
    let animals_info = if advert.no_animals {
        "\n🚫 <b>Без тварин</b>".to_string()
    } else if let Some(excerpt) = &advert.animals_mentioned {
        format!("\n🐾 <b>тварини:</b> {}", escape_html(excerpt))
    } else {
        String::new()
    };

    let posted_at = advert
        .posted_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    format!(
        "{animals_info}\n\
         💰 <b>Ціна:</b> {price} zł (+{media_fee} zł media)\n\
         〽️ <b>Площа:</b> {area} m²\n\
         🔢 <b>Кімнат:</b> {rooms}\n\
         🏠 <b>Район {district}</b>\n\
         🏗 <b>Рік будинку:</b> {year_built}\n\
         \n\
         📅 <b>Posted at:</b> {posted_at}\n\
         🔗 <a href='{url}'>Посилання</a>",
        price = or_unknown(advert.price),
        media_fee = or_unknown(advert.media_fee),
        area = or_unknown(advert.area),
        rooms = or_unknown(advert.rooms),
        district = advert
            .district
            .as_deref()
            .map(escape_html)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        year_built = advert
            .year_built
            .map(|y| y.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        url = escape_html(&advert.url),
    )
}

fn or_unknown<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::ExtractedFields;

    fn advert() -> Advert {
        Advert::from_fields(
            "https://www.olx.pl/d/oferta/x",
            1,
            ExtractedFields {
                district: Some("Wilanów".into()),
                price: Some(3600.0),
                media_fee: Some(450.0),
                rooms: Some(3),
                area: Some(52.5),
                posted_at: NaiveDate::from_ymd_opt(2024, 8, 31)
                    .and_then(|d| d.and_hms_opt(23, 46, 0)),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_full_layout() {
        let text = format_advert(&advert());
        assert_eq!(
            text,
            "\n\
             💰 <b>Ціна:</b> 3600 zł (+450 zł media)\n\
             〽️ <b>Площа:</b> 52.5 m²\n\
             🔢 <b>Кімнат:</b> 3\n\
             🏠 <b>Район Wilanów</b>\n\
             🏗 <b>Рік будинку:</b> N/A\n\
             \n\
             📅 <b>Posted at:</b> 2024-08-31 23:46\n\
             🔗 <a href='https://www.olx.pl/d/oferta/x'>Посилання</a>"
        );
    }

    #[test]
    fn test_no_animals_banner_wins_over_excerpt() {
        let mut ad = advert();
        ad.no_animals = true;
        ad.animals_mentioned = Some("bez zwierząt".into());
        let text = format_advert(&ad);
        assert!(text.starts_with("\n🚫 <b>Без тварин</b>\n💰"));
        assert!(!text.contains("🐾"));
    }

    #[test]
    fn test_animals_excerpt_is_escaped() {
        let mut ad = advert();
        ad.animals_mentioned = Some("<p>zwierzęta & dzieci".into());
        let text = format_advert(&ad);
        assert!(text.starts_with("\n🐾 <b>тварини:</b> &lt;p&gt;zwierzęta &amp; dzieci\n"));
    }

    #[test]
    fn test_year_built_rendered_when_known() {
        let mut ad = advert();
        ad.year_built = Some(2019);
        assert!(format_advert(&ad).contains("🏗 <b>Рік будинку:</b> 2019\n"));
    }

    #[test]
    fn test_url_quotes_are_escaped() {
        let mut ad = advert();
        ad.url = "https://www.olx.pl/x?a='b'&c=d".into();
        assert!(format_advert(&ad).contains("href='https://www.olx.pl/x?a=&#39;b&#39;&amp;c=d'"));
    }
}
