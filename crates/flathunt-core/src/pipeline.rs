//! Per-message ingestion state machine.
//!
//! ```text
//! RECEIVED -> EXTRACTED -> DEDUPE_CHECKED -> DATE_CHECKED -> ENRICHED -> PERSISTED -> FILTERED -> DELIVERED | SUPPRESSED
//!                 |              |                |              |
//!          SKIPPED_NO_URL    SKIPPED_DUP     SKIPPED_STALE    BACKOFF
//! ```
//!
//! Messages are handled strictly one at a time. The backlog replay and the
//! live feed both go through [`IngestService::process`].

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::enrich::EnrichmentResolver;
use crate::error::AppError;
use crate::extract::extract_fields;
use crate::filter::{FilterChain, FilterReport};
use crate::format::format_advert;
use crate::models::{Advert, ExtractedFields, RawMessage};
use crate::traits::{AdvertStore, MessageFeed, PageRenderer, Publisher};

/// Delay before polling the live feed again after a transient error.
const FEED_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Terminal state reached by a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No embedded hyperlink, or no rich-text entities at all.
    SkippedNoUrl,
    /// URL already stored, before enrichment or at insert time.
    SkippedDuplicate,
    /// Sent before the processing cutoff.
    SkippedStale,
    /// The listing site refused access; the message was dropped after the pause.
    BackedOff,
    /// Enrichment failed for another reason; the message was dropped unpersisted.
    EnrichmentFailed,
    /// Persisted but rejected by at least one filter.
    Suppressed(FilterReport),
    /// Persisted and announced.
    Delivered(FilterReport),
}

/// Why a message left the pipeline early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoUrl,
    Duplicate,
    Stale,
}

/// Events emitted while a message moves through the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    Received {
        message_id: i64,
    },
    Skipped {
        message_id: i64,
        url: Option<&'a str>,
        reason: SkipReason,
    },
    Extracted {
        message_id: i64,
        fields: &'a ExtractedFields,
    },
    BackingOff {
        url: &'a str,
        delay: Duration,
    },
    EnrichmentFailed {
        url: &'a str,
        error: &'a str,
    },
    Persisted {
        advert: &'a Advert,
    },
    Filtered {
        url: &'a str,
        report: &'a FilterReport,
    },
    Delivered {
        url: &'a str,
    },
    Suppressed {
        url: &'a str,
    },
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl PipelineReporter for TracingReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::Received { message_id } => {
                tracing::debug!(%message_id, "Message received");
            }
            PipelineEvent::Skipped {
                message_id,
                url,
                reason,
            } => {
                tracing::info!(%message_id, url = url.unwrap_or("-"), ?reason, "Message skipped");
            }
            PipelineEvent::Extracted { message_id, fields } => {
                let fields = serde_json::to_string(fields).unwrap_or_default();
                tracing::info!(%message_id, %fields, "Fields extracted");
            }
            PipelineEvent::BackingOff { url, delay } => {
                tracing::warn!(%url, delay_secs = delay.as_secs(), "Access forbidden, backing off");
            }
            PipelineEvent::EnrichmentFailed { url, error } => {
                tracing::warn!(%url, %error, "Enrichment failed, dropping message");
            }
            PipelineEvent::Persisted { advert } => {
                let record = serde_json::to_string_pretty(advert).unwrap_or_default();
                tracing::info!(url = %advert.url, "Processed and saved advert\n{record}");
            }
            PipelineEvent::Filtered { url, report } => {
                let verdicts = serde_json::to_string(&report.verdicts).unwrap_or_default();
                tracing::info!(%url, accepted = report.accepted(), %verdicts, "Filter results");
            }
            PipelineEvent::Delivered { url } => {
                tracing::info!(%url, "Advert delivered");
            }
            PipelineEvent::Suppressed { url } => {
                tracing::info!(%url, "Advert suppressed");
            }
        }
    }
}

/// Counters over a run of messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub seen: u64,
    pub skipped: u64,
    pub backed_off: u64,
    pub failed: u64,
    pub suppressed: u64,
    pub delivered: u64,
}

impl RunStats {
    pub fn record(&mut self, outcome: &Outcome) {
        self.seen += 1;
        match outcome {
            Outcome::SkippedNoUrl | Outcome::SkippedDuplicate | Outcome::SkippedStale => {
                self.skipped += 1
            }
            Outcome::BackedOff => self.backed_off += 1,
            Outcome::EnrichmentFailed => self.failed += 1,
            Outcome::Suppressed(_) => self.suppressed += 1,
            Outcome::Delivered(_) => self.delivered += 1,
        }
    }
}

/// Sequences extraction, dedup, enrichment, persistence, filtering and delivery.
///
/// Generic over every external collaborator so the state machine can be
/// exercised without a browser, a database or a chat client.
pub struct IngestService<S, R, P>
where
    S: AdvertStore,
    R: PageRenderer,
    P: Publisher,
{
    store: S,
    resolver: EnrichmentResolver<R>,
    filters: FilterChain,
    publisher: P,
    config: PipelineConfig,
}

impl<S, R, P> IngestService<S, R, P>
where
    S: AdvertStore,
    R: PageRenderer,
    P: Publisher,
{
    pub fn new(
        store: S,
        resolver: EnrichmentResolver<R>,
        filters: FilterChain,
        publisher: P,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            filters,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Carry one message through the state machine.
    ///
    /// Store and delivery failures are returned as errors; every other
    /// failure ends in an [`Outcome`].
    pub async fn process<PR: PipelineReporter>(
        &self,
        message: &RawMessage,
        reporter: &PR,
    ) -> Result<Outcome, AppError> {
        let message_id = message.id;
        reporter.report(PipelineEvent::Received { message_id });

        let fields = extract_fields(&message.text);
        reporter.report(PipelineEvent::Extracted {
            message_id,
            fields: &fields,
        });

        let Some(url) = message.link_url() else {
            reporter.report(PipelineEvent::Skipped {
                message_id,
                url: None,
                reason: SkipReason::NoUrl,
            });
            return Ok(Outcome::SkippedNoUrl);
        };

        if self.store.exists(url).await? {
            reporter.report(PipelineEvent::Skipped {
                message_id,
                url: Some(url),
                reason: SkipReason::Duplicate,
            });
            return Ok(Outcome::SkippedDuplicate);
        }

        if message.sent_at < self.config.cutoff {
            reporter.report(PipelineEvent::Skipped {
                message_id,
                url: Some(url),
                reason: SkipReason::Stale,
            });
            return Ok(Outcome::SkippedStale);
        }

        let enrichment = match self.resolver.resolve(url).await {
            Ok(enrichment) => enrichment,
            Err(AppError::PermissionDenied { .. }) => {
                reporter.report(PipelineEvent::BackingOff {
                    url,
                    delay: self.config.backoff,
                });
                tokio::time::sleep(self.config.backoff).await;
                return Ok(Outcome::BackedOff);
            }
            Err(e) => {
                let error = e.to_string();
                reporter.report(PipelineEvent::EnrichmentFailed { url, error: &error });
                return Ok(Outcome::EnrichmentFailed);
            }
        };

        let advert = Advert::from_fields(url, message_id, fields).enrich(enrichment);
        match self.store.insert(&advert).await {
            Ok(()) => reporter.report(PipelineEvent::Persisted { advert: &advert }),
            Err(e) if e.is_duplicate() => {
                reporter.report(PipelineEvent::Skipped {
                    message_id,
                    url: Some(url),
                    reason: SkipReason::Duplicate,
                });
                return Ok(Outcome::SkippedDuplicate);
            }
            Err(e) => return Err(e),
        }

        let report = self.filters.evaluate(&advert);
        reporter.report(PipelineEvent::Filtered {
            url,
            report: &report,
        });

        if !report.accepted() {
            reporter.report(PipelineEvent::Suppressed { url });
            return Ok(Outcome::Suppressed(report));
        }

        let text = format_advert(&advert);
        self.publisher
            .send(self.config.destination, &text, message.media.as_ref())
            .await?;
        reporter.report(PipelineEvent::Delivered { url });

        Ok(Outcome::Delivered(report))
    }

    /// Replay a finite history, newest message first, until it is exhausted
    /// or the first stale message is reached.
    pub async fn run_backlog<F: MessageFeed, PR: PipelineReporter>(
        &self,
        feed: &mut F,
        reporter: &PR,
    ) -> Result<RunStats, AppError> {
        let mut stats = RunStats::default();

        while let Some(message) = feed.next_message().await? {
            let outcome = self.process(&message, reporter).await?;
            stats.record(&outcome);
            if outcome == Outcome::SkippedStale {
                tracing::info!(message_id = message.id, "Reached processing cutoff, backlog done");
                break;
            }
        }

        Ok(stats)
    }

    /// Process live messages as they arrive until cancellation or until the
    /// feed ends.
    pub async fn run_live<F: MessageFeed, PR: PipelineReporter>(
        &self,
        feed: &mut F,
        cancel_token: CancellationToken,
        reporter: &PR,
    ) -> Result<RunStats, AppError> {
        let mut stats = RunStats::default();

        loop {
            let next = tokio::select! {
                () = cancel_token.cancelled() => break,
                next = feed.next_message() => next,
            };

            match next {
                Ok(Some(message)) => {
                    let outcome = self.process(&message, reporter).await?;
                    stats.record(&outcome);
                }
                Ok(None) => break,
                Err(e) if e.is_retryable() => {
                    tracing::warn!(error = %e, "Failed to poll live feed");
                    tokio::select! {
                        () = tokio::time::sleep(FEED_RETRY_DELAY) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(?stats, "Live feed stopped");
        Ok(stats)
    }
}
