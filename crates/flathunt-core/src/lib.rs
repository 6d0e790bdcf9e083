pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod filter;
pub mod format;
pub mod models;
pub mod pipeline;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{FilterConfig, PipelineConfig};
pub use enrich::EnrichmentResolver;
pub use error::AppError;
pub use extract::extract_fields;
pub use format::format_advert;
pub use models::{Advert, Enrichment, ExtractedFields, MediaRef, RawMessage, TextEntity};
pub use pipeline::{IngestService, Outcome, TracingReporter};
pub use traits::{AdvertStore, MessageFeed, PageRenderer, Publisher};
