//! Backlog source over a Telegram Desktop channel export (`result.json`).

use std::collections::VecDeque;
use std::path::Path;

use chrono::{DateTime, Utc};
use flathunt_core::error::AppError;
use flathunt_core::models::{RawMessage, TextEntity};
use flathunt_core::traits::MessageFeed;
use serde::Deserialize;

#[derive(Deserialize)]
struct Export {
    #[serde(default)]
    messages: Vec<ExportedMessage>,
}

#[derive(Deserialize)]
struct ExportedMessage {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    date_unixtime: Option<String>,
    #[serde(default)]
    text_entities: Vec<ExportedEntity>,
}

#[derive(Deserialize)]
struct ExportedEntity {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    href: Option<String>,
}

/// Finite feed over an exported channel history, newest message first.
///
/// Exported media are local files that cannot be re-sent by file id, so
/// backlog messages carry no media.
#[derive(Debug)]
pub struct ExportBacklog {
    messages: VecDeque<RawMessage>,
}

impl ExportBacklog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::ConfigError(format!("Cannot read export {}: {e}", path.display()))
        })?;
        let backlog = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            messages = backlog.len(),
            "Loaded Telegram export"
        );
        Ok(backlog)
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let export: Export = serde_json::from_str(json)?;

        let mut messages = export
            .messages
            .into_iter()
            .filter(|m| m.kind == "message")
            .map(ExportedMessage::into_raw)
            .collect::<Result<Vec<_>, _>>()?;
        messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));

        Ok(Self {
            messages: messages.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl ExportedMessage {
    fn into_raw(self) -> Result<RawMessage, AppError> {
        let id = self.id;
        let sent_at = self
            .date_unixtime
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .ok_or_else(|| AppError::ParseError(format!("Message {id} has no valid date_unixtime")))?;

        let mut text = String::new();
        let mut entities = Vec::with_capacity(self.text_entities.len());
        for entity in self.text_entities {
            text.push_str(&entity.text);
            entities.push(match entity.href {
                Some(url) if entity.kind == "text_link" => TextEntity::TextLink { url },
                _ => TextEntity::Other { kind: entity.kind },
            });
        }

        Ok(RawMessage {
            id,
            text,
            entities,
            media: None,
            sent_at,
        })
    }
}

impl MessageFeed for ExportBacklog {
    async fn next_message(&mut self) -> Result<Option<RawMessage>, AppError> {
        Ok(self.messages.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const EXPORT: &str = r##"{
        "name": "Mieszkania Warszawa",
        "type": "public_channel",
        "id": 1234567890,
        "messages": [
            {
                "id": 100,
                "type": "message",
                "date": "2024-08-31T23:46:10",
                "date_unixtime": "1725140770",
                "text": "",
                "text_entities": [
                    {"type": "plain", "text": "Район: "},
                    {"type": "hashtag", "text": "#Wilanów"},
                    {"type": "plain", "text": "\nЦена: 3500 "},
                    {"type": "text_link", "text": "Ссылка", "href": "https://www.otodom.pl/pl/oferta/a"}
                ],
                "photo": "photos/photo_1@31-08-2024_23-46-10.jpg"
            },
            {
                "id": 101,
                "type": "service",
                "date_unixtime": "1725140800",
                "action": "pin_message"
            },
            {
                "id": 102,
                "type": "message",
                "date_unixtime": "1725227170",
                "text": "plain",
                "text_entities": [{"type": "plain", "text": "plain"}]
            }
        ]
    }"##;

    #[tokio::test]
    async fn yields_messages_newest_first() {
        let mut backlog = ExportBacklog::from_json(EXPORT).unwrap();
        assert_eq!(backlog.len(), 2);

        let first = backlog.next_message().await.unwrap().unwrap();
        let second = backlog.next_message().await.unwrap().unwrap();
        assert_eq!(first.id, 102);
        assert_eq!(second.id, 100);
        assert!(backlog.next_message().await.unwrap().is_none());
    }

    #[test]
    fn rebuilds_text_and_links_from_entities() {
        let backlog = ExportBacklog::from_json(EXPORT).unwrap();
        let message = backlog.messages.iter().find(|m| m.id == 100).unwrap();

        assert_eq!(message.text, "Район: #Wilanów\nЦена: 3500 Ссылка");
        assert_eq!(message.link_url(), Some("https://www.otodom.pl/pl/oferta/a"));
        assert_eq!(message.sent_at.timestamp(), 1725140770);
        assert!(message.media.is_none());
    }

    #[test]
    fn missing_timestamp_is_a_parse_error() {
        let json = r#"{"messages": [{"id": 1, "type": "message", "text_entities": []}]}"#;
        let err = ExportBacklog::from_json(json).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[tokio::test]
    async fn open_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXPORT.as_bytes()).unwrap();

        let backlog = ExportBacklog::open(file.path()).await.unwrap();
        assert_eq!(backlog.len(), 2);
    }

    #[tokio::test]
    async fn open_missing_file_is_config_error() {
        let err = ExportBacklog::open("/nonexistent/result.json").await.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
