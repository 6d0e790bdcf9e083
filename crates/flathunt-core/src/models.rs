use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rich-text entity attached to a chat message.
///
/// Only hyperlinks matter to the pipeline; every other entity kind is kept
/// as [`TextEntity::Other`] so that "no entities at all" stays observable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextEntity {
    /// Text with an embedded hyperlink (`text_link` in Telegram terms).
    TextLink { url: String },
    Other { kind: String },
}

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
    Document,
}

/// Reference to media already hosted by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
}

/// A message as delivered by the inbound feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub text: String,
    pub entities: Vec<TextEntity>,
    pub media: Option<MediaRef>,
    /// Transport send timestamp, compared against the processing cutoff.
    pub sent_at: DateTime<Utc>,
}

impl RawMessage {
    /// The first embedded hyperlink, if any.
    pub fn link_url(&self) -> Option<&str> {
        self.entities.iter().find_map(|e| match e {
            TextEntity::TextLink { url } => Some(url.as_str()),
            TextEntity::Other { .. } => None,
        })
    }
}

/// Fields parsed from the advert text. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub district: Option<String>,
    pub price: Option<f64>,
    pub media_fee: Option<f64>,
    pub deposit: Option<f64>,
    pub rooms: Option<i32>,
    pub area: Option<f64>,
    /// Wall-clock time written in the advert, local to the source timezone.
    pub posted_at: Option<NaiveDateTime>,
}

/// Supplemental fields scraped from the listing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub year_built: Option<i32>,
    pub no_animals: bool,
    pub animals_mentioned: Option<String>,
}

/// The persisted listing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advert {
    /// Dedup key.
    pub url: String,
    pub source_message_id: i64,
    pub district: Option<String>,
    pub price: Option<f64>,
    pub media_fee: Option<f64>,
    pub deposit: Option<f64>,
    pub rooms: Option<i32>,
    pub area: Option<f64>,
    pub posted_at: Option<NaiveDateTime>,
    pub year_built: Option<i32>,
    pub no_animals: bool,
    pub animals_mentioned: Option<String>,
}

impl Advert {
    /// Build an advert from extracted text fields, before enrichment.
    pub fn from_fields(url: impl Into<String>, source_message_id: i64, fields: ExtractedFields) -> Self {
        Self {
            url: url.into(),
            source_message_id,
            district: fields.district,
            price: fields.price,
            media_fee: fields.media_fee,
            deposit: fields.deposit,
            rooms: fields.rooms,
            area: fields.area,
            posted_at: fields.posted_at,
            year_built: None,
            no_animals: false,
            animals_mentioned: None,
        }
    }

    /// Merge page enrichment into the record.
    pub fn enrich(mut self, enrichment: Enrichment) -> Self {
        self.year_built = enrichment.year_built;
        self.no_animals = enrichment.no_animals;
        self.animals_mentioned = enrichment.animals_mentioned;
        self
    }

    /// Price per square metre, when both values are known and area is positive.
    pub fn price_per_sqm(&self) -> Option<f64> {
        match (self.price, self.area) {
            (Some(price), Some(area)) if area > 0.0 => Some(price / area),
            _ => None,
        }
    }
}
