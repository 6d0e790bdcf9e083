//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::models::{Advert, MediaRef, RawMessage};
use crate::pipeline::{PipelineEvent, PipelineReporter};
use crate::traits::{AdvertStore, MessageFeed, PageRenderer, Publisher, RenderRequest, RenderedPage};

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory advert store that records inserts and dedup checks.
#[derive(Clone)]
pub struct MockStore {
    pub saved: Arc<Mutex<Vec<Advert>>>,
    /// URLs passed to `exists`, in call order.
    pub checked: Arc<Mutex<Vec<String>>>,
    existing: Arc<Mutex<HashSet<String>>>,
    insert_error: Arc<Mutex<Option<AppError>>>,
}

impl MockStore {
    /// Store with nothing seen yet.
    pub fn empty() -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            checked: Arc::new(Mutex::new(Vec::new())),
            existing: Arc::new(Mutex::new(HashSet::new())),
            insert_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Store that already knows the given URLs.
    pub fn with_existing(urls: &[&str]) -> Self {
        let store = Self::empty();
        store
            .existing
            .lock()
            .unwrap()
            .extend(urls.iter().map(|u| u.to_string()));
        store
    }

    /// Store whose next insert fails.
    pub fn with_insert_error(error: AppError) -> Self {
        let store = Self::empty();
        *store.insert_error.lock().unwrap() = Some(error);
        store
    }
}

impl AdvertStore for MockStore {
    async fn exists(&self, url: &str) -> Result<bool, AppError> {
        self.checked.lock().unwrap().push(url.to_string());
        Ok(self.existing.lock().unwrap().contains(url))
    }

    async fn insert(&self, advert: &Advert) -> Result<(), AppError> {
        if let Some(e) = self.insert_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut existing = self.existing.lock().unwrap();
        if !existing.insert(advert.url.clone()) {
            return Err(AppError::UniquenessViolation(advert.url.clone()));
        }
        self.saved.lock().unwrap().push(advert.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Recorded render call: (url, script).
pub type RenderCall = (String, String);

/// Mock renderer with a queue of responses and a fallback page.
#[derive(Clone)]
pub struct MockRenderer {
    /// Queue of responses. Each call pops the first element.
    responses: Arc<Mutex<VecDeque<Result<RenderedPage, AppError>>>>,
    /// Returned once the queue is empty.
    fallback: RenderedPage,
    pub requests: Arc<Mutex<Vec<RenderCall>>>,
}

impl MockRenderer {
    /// Renderer that returns `page` for every call.
    pub fn new(page: RenderedPage) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            fallback: page,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<RenderedPage, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            fallback: RenderedPage::default(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl PageRenderer for MockRenderer {
    async fn render(&self, request: RenderRequest<'_>) -> Result<RenderedPage, AppError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.url.to_string(), request.script.to_string()));
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockPublisher
// ---------------------------------------------------------------------------

/// Recorded delivery: (destination, text, media).
pub type SentMessage = (i64, String, Option<MediaRef>);

/// Mock publisher that records deliveries.
#[derive(Clone)]
pub struct MockPublisher {
    pub sent: Arc<Mutex<Vec<SentMessage>>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// Publisher whose next send fails.
    pub fn with_error(error: AppError) -> Self {
        let publisher = Self::new();
        *publisher.error.lock().unwrap() = Some(error);
        publisher
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for MockPublisher {
    async fn send(
        &self,
        destination: i64,
        text: &str,
        media: Option<&MediaRef>,
    ) -> Result<(), AppError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination, text.to_string(), media.cloned()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockFeed
// ---------------------------------------------------------------------------

/// Finite feed over a fixed list of results.
pub struct MockFeed {
    results: VecDeque<Result<RawMessage, AppError>>,
    /// Never yields; used to test cancellation.
    pending: bool,
}

impl MockFeed {
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self::with_results(messages.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<RawMessage, AppError>>) -> Self {
        Self {
            results: results.into(),
            pending: false,
        }
    }

    /// Feed that never produces a message.
    pub fn pending() -> Self {
        Self {
            results: VecDeque::new(),
            pending: true,
        }
    }

    pub fn remaining(&self) -> usize {
        self.results.len()
    }
}

impl MessageFeed for MockFeed {
    async fn next_message(&mut self) -> Result<Option<RawMessage>, AppError> {
        if self.pending {
            std::future::pending::<()>().await;
        }
        self.results.pop_front().transpose()
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock pipeline reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl PipelineReporter for MockReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        let label = match &event {
            PipelineEvent::Received { .. } => "Received",
            PipelineEvent::Skipped { .. } => "Skipped",
            PipelineEvent::Extracted { .. } => "Extracted",
            PipelineEvent::BackingOff { .. } => "BackingOff",
            PipelineEvent::EnrichmentFailed { .. } => "EnrichmentFailed",
            PipelineEvent::Persisted { .. } => "Persisted",
            PipelineEvent::Filtered { .. } => "Filtered",
            PipelineEvent::Delivered { .. } => "Delivered",
            PipelineEvent::Suppressed { .. } => "Suppressed",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
