use std::future::Future;

use crate::error::AppError;
use crate::models::{Advert, MediaRef, RawMessage};

/// Dedup gate and persistence for adverts, keyed by URL.
pub trait AdvertStore: Send + Sync + Clone {
    /// Whether an advert with this URL was already stored.
    fn exists(&self, url: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Store a new advert.
    ///
    /// Fails with [`AppError::UniquenessViolation`] when the URL is already present.
    fn insert(&self, advert: &Advert) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// What to do once a listing page has loaded.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub url: &'a str,
    /// JavaScript function evaluated in the page; must return a string or null.
    pub script: &'a str,
}

/// Output of a single page render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedPage {
    /// Value returned by the request script.
    pub script_result: Option<String>,
    /// Fully rendered page content.
    pub content: String,
}

/// Opens a listing page in an isolated browser session.
///
/// Implementations must report an HTTP 403 for the requested URL as
/// [`AppError::PermissionDenied`] and an exceeded page wait as
/// [`AppError::Timeout`].
pub trait PageRenderer: Send + Sync + Clone {
    fn render(
        &self,
        request: RenderRequest<'_>,
    ) -> impl Future<Output = Result<RenderedPage, AppError>> + Send;
}

/// Delivers formatted announcements to a chat.
pub trait Publisher: Send + Sync + Clone {
    /// Send rich text (HTML) to `destination`, optionally with attached media.
    fn send(
        &self,
        destination: i64,
        text: &str,
        media: Option<&MediaRef>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A source of inbound messages.
pub trait MessageFeed: Send {
    /// Next message, or `None` once a finite feed is exhausted.
    fn next_message(&mut self) -> impl Future<Output = Result<Option<RawMessage>, AppError>> + Send;
}

/// A publisher that only logs, for dry runs.
#[derive(Debug, Clone)]
pub struct DryRunPublisher;

impl Publisher for DryRunPublisher {
    async fn send(
        &self,
        destination: i64,
        text: &str,
        media: Option<&MediaRef>,
    ) -> Result<(), AppError> {
        tracing::info!(%destination, has_media = media.is_some(), "Dry run, not sending:\n{text}");
        Ok(())
    }
}
