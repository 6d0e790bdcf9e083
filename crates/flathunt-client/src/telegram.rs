use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flathunt_core::error::AppError;
use flathunt_core::models::{MediaKind, MediaRef, RawMessage, TextEntity};
use flathunt_core::traits::{MessageFeed, Publisher};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
/// Seconds the server holds a `getUpdates` call open.
const LONG_POLL_SECS: u64 = 30;
/// Must outlive the long poll.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_SECS + 30);

/// Telegram Bot API client.
///
/// Sends announcements as HTML and reads channel posts through long polling.
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
    timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self, AppError> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, AppError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid Bot API URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "Bot API URL must be http(s), got '{base_url}'"
            )));
        }

        let client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT.as_secs(),
        })
    }

    /// Live feed of posts arriving in `chat_id`.
    pub fn updates(&self, chat_id: i64) -> TelegramUpdates {
        TelegramUpdates {
            client: self.clone(),
            chat_id,
            offset: None,
            buffer: VecDeque::new(),
        }
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    // Never echo the request URL, it carries the bot token.
                    AppError::HttpError(e.without_url().to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(e.without_url().to_string()))?;

        parse_response(status, &body)
    }
}

// ---- Bot API types ----

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    channel_post: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    date: i64,
    chat: Chat,
    text: Option<String>,
    #[serde(default)]
    entities: Vec<Entity>,
    caption: Option<String>,
    #[serde(default)]
    caption_entities: Vec<Entity>,
    #[serde(default)]
    photo: Vec<FileRef>,
    video: Option<FileRef>,
    animation: Option<FileRef>,
    document: Option<FileRef>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Entity {
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
}

fn parse_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, AppError> {
    let parsed: ApiResponse<T> = serde_json::from_str(body).map_err(|e| {
        AppError::HttpError(format!("Unexpected Telegram response (HTTP {status}): {e}"))
    })?;

    if !parsed.ok {
        return Err(AppError::TelegramError {
            code: parsed.error_code.unwrap_or(i64::from(status)),
            description: parsed.description.unwrap_or_default(),
        });
    }

    parsed.result.ok_or_else(|| AppError::TelegramError {
        code: i64::from(status),
        description: "Response without result".into(),
    })
}

fn media_method(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Photo => ("sendPhoto", "photo"),
        MediaKind::Video => ("sendVideo", "video"),
        MediaKind::Animation => ("sendAnimation", "animation"),
        MediaKind::Document => ("sendDocument", "document"),
    }
}

impl Publisher for TelegramClient {
    async fn send(
        &self,
        destination: i64,
        text: &str,
        media: Option<&MediaRef>,
    ) -> Result<(), AppError> {
        match media {
            None => {
                let request = SendMessage {
                    chat_id: destination,
                    text,
                    parse_mode: "HTML",
                    disable_web_page_preview: true,
                };
                self.call::<_, serde_json::Value>("sendMessage", &request)
                    .await?;
            }
            Some(media) => {
                let (method, field) = media_method(media.kind);
                let request = serde_json::json!({
                    "chat_id": destination,
                    field: media.file_id,
                    "caption": text,
                    "parse_mode": "HTML",
                });
                self.call::<_, serde_json::Value>(method, &request).await?;
            }
        }
        Ok(())
    }
}

impl Message {
    fn into_raw(self) -> Option<RawMessage> {
        let sent_at = DateTime::<Utc>::from_timestamp(self.date, 0)?;
        let (text, entities) = match self.text {
            Some(text) => (text, self.entities),
            None => (self.caption.unwrap_or_default(), self.caption_entities),
        };

        let entities = entities
            .into_iter()
            .map(|e| match e.url {
                Some(url) if e.kind == "text_link" => TextEntity::TextLink { url },
                _ => TextEntity::Other { kind: e.kind },
            })
            .collect();

        // Photo sizes are listed smallest first.
        let media = if let Some(largest) = self.photo.into_iter().last() {
            Some(MediaRef {
                kind: MediaKind::Photo,
                file_id: largest.file_id,
            })
        } else if let Some(v) = self.video {
            Some(MediaRef {
                kind: MediaKind::Video,
                file_id: v.file_id,
            })
        } else if let Some(a) = self.animation {
            Some(MediaRef {
                kind: MediaKind::Animation,
                file_id: a.file_id,
            })
        } else {
            self.document.map(|d| MediaRef {
                kind: MediaKind::Document,
                file_id: d.file_id,
            })
        };

        Some(RawMessage {
            id: self.message_id,
            text,
            entities,
            media,
            sent_at,
        })
    }
}

/// Live feed over `getUpdates`, restricted to one chat.
///
/// Never ends on its own; the caller stops it through cancellation.
pub struct TelegramUpdates {
    client: TelegramClient,
    chat_id: i64,
    offset: Option<i64>,
    buffer: VecDeque<RawMessage>,
}

impl TelegramUpdates {
    /// Queue the posts of `updates` that belong to the watched chat and
    /// advance the offset past all of them.
    fn accept(&mut self, updates: Vec<Update>) {
        for update in updates {
            self.offset = Some(update.update_id + 1);
            let Some(message) = update.channel_post.or(update.message) else {
                continue;
            };
            if message.chat.id != self.chat_id {
                continue;
            }
            if let Some(raw) = message.into_raw() {
                self.buffer.push_back(raw);
            }
        }
    }
}

impl MessageFeed for TelegramUpdates {
    async fn next_message(&mut self) -> Result<Option<RawMessage>, AppError> {
        loop {
            if let Some(message) = self.buffer.pop_front() {
                return Ok(Some(message));
            }

            let request = GetUpdates {
                offset: self.offset,
                timeout: LONG_POLL_SECS,
                allowed_updates: &["channel_post", "message"],
            };
            let updates: Vec<Update> = self.client.call("getUpdates", &request).await?;
            tracing::debug!(count = updates.len(), "Polled Telegram updates");
            self.accept(updates);
        }
    }
}
