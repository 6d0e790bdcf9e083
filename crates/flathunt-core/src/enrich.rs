//! Listing-page enrichment.
//!
//! The [`EnrichmentResolver`] picks the first [`SourceStrategy`] whose domain
//! occurs in the listing URL, renders the page through a [`PageRenderer`] and
//! lets the strategy interpret the result. URLs from unknown sources get an
//! empty [`Enrichment`] without touching the browser.

use crate::error::AppError;
use crate::models::Enrichment;
use crate::traits::{PageRenderer, RenderRequest, RenderedPage};

/// Stem shared by every Polish word form for "animal(s)".
pub const ANIMAL_STEM: &str = "zwierz";

/// Words kept on each side of the matched word in an excerpt.
const CONTEXT_WORDS: usize = 3;

/// Site-specific knowledge needed to enrich a listing.
pub trait SourceStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Domain matched as a substring of the listing URL.
    fn domain(&self) -> &'static str;

    /// DOM query evaluated once the page has rendered.
    fn script(&self) -> &'static str;

    /// Turn the rendered page into supplemental fields.
    fn interpret(&self, page: RenderedPage) -> Enrichment;

    /// Result substituted when the page wait times out, if this source allows it.
    fn timeout_fallback(&self) -> Option<Enrichment> {
        None
    }
}

/// otodom.pl: year built from the details table, pet policy from the whole page.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtodomStrategy;

const OTODOM_YEAR_BUILT_SCRIPT: &str = r#"() => {
    const paragraphs = document.querySelectorAll('p');
    for (let i = 0; i < paragraphs.length; i++) {
        if (paragraphs[i].textContent.includes('Rok budowy')) {
            const next = paragraphs[i].nextElementSibling;
            if (next && next.tagName === 'P') {
                return next.textContent.trim();
            }
        }
    }
    return null;
}"#;

const OTODOM_NO_PETS: &[&str] = &["bez zwierząt", "zwierzęta nie akceptowane"];

impl SourceStrategy for OtodomStrategy {
    fn name(&self) -> &'static str {
        "otodom"
    }

    fn domain(&self) -> &'static str {
        "otodom.pl"
    }

    fn script(&self) -> &'static str {
        OTODOM_YEAR_BUILT_SCRIPT
    }

    fn interpret(&self, page: RenderedPage) -> Enrichment {
        let year_built = page
            .script_result
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| match raw.parse::<i32>() {
                Ok(year) => Some(year),
                Err(_) => {
                    tracing::warn!(value = %raw, "Failed to parse year built");
                    None
                }
            });

        let content = page.content.to_lowercase();
        Enrichment {
            year_built,
            no_animals: mentions_any(&content, OTODOM_NO_PETS),
            animals_mentioned: extract_context(&content, ANIMAL_STEM),
        }
    }
}

/// olx.pl: pet policy from the advert description only.
#[derive(Debug, Clone, Copy, Default)]
pub struct OlxStrategy;

const OLX_DESCRIPTION_SCRIPT: &str = r#"() => {
    const description = document.querySelector('[data-cy="ad_description"]');
    return description ? description.innerText : '';
}"#;

const OLX_NO_PETS: &[&str] = &[
    "bez zwierząt",
    "zwierzęta nie akceptowane",
    "zwierzęta nie są akceptowane",
    "nieposiadających zwierząt",
];

impl SourceStrategy for OlxStrategy {
    fn name(&self) -> &'static str {
        "olx"
    }

    fn domain(&self) -> &'static str {
        "olx.pl"
    }

    fn script(&self) -> &'static str {
        OLX_DESCRIPTION_SCRIPT
    }

    fn interpret(&self, page: RenderedPage) -> Enrichment {
        let description = page.script_result.unwrap_or_default().to_lowercase();
        Enrichment {
            year_built: None,
            no_animals: mentions_any(&description, OLX_NO_PETS),
            animals_mentioned: extract_context(&description, ANIMAL_STEM),
        }
    }

    fn timeout_fallback(&self) -> Option<Enrichment> {
        Some(Enrichment::default())
    }
}

/// Dispatches listing URLs to source strategies.
pub struct EnrichmentResolver<R: PageRenderer> {
    renderer: R,
    strategies: Vec<Box<dyn SourceStrategy>>,
}

impl<R: PageRenderer> EnrichmentResolver<R> {
    /// Resolver for the known sources, in priority order: otodom, olx.
    pub fn new(renderer: R) -> Self {
        Self::with_strategies(renderer, vec![Box::new(OtodomStrategy), Box::new(OlxStrategy)])
    }

    pub fn with_strategies(renderer: R, strategies: Vec<Box<dyn SourceStrategy>>) -> Self {
        Self {
            renderer,
            strategies,
        }
    }

    /// The first strategy whose domain occurs in `url`.
    pub fn strategy_for(&self, url: &str) -> Option<&dyn SourceStrategy> {
        self.strategies
            .iter()
            .find(|s| url.contains(s.domain()))
            .map(|s| s.as_ref())
    }

    /// Enrich a listing.
    ///
    /// [`AppError::PermissionDenied`] is always propagated. A timeout is
    /// replaced by the strategy's fallback when it has one.
    pub async fn resolve(&self, url: &str) -> Result<Enrichment, AppError> {
        let Some(strategy) = self.strategy_for(url) else {
            tracing::debug!(%url, "No enrichment source matches");
            return Ok(Enrichment::default());
        };

        tracing::info!(source = strategy.name(), %url, "Rendering listing page");
        let request = RenderRequest {
            url,
            script: strategy.script(),
        };

        match self.renderer.render(request).await {
            Ok(page) => Ok(strategy.interpret(page)),
            Err(AppError::Timeout(secs)) => match strategy.timeout_fallback() {
                Some(fallback) => {
                    tracing::warn!(source = strategy.name(), %url, secs, "Page timed out, using default enrichment");
                    Ok(fallback)
                }
                None => Err(AppError::Timeout(secs)),
            },
            Err(e) => Err(e),
        }
    }
}

fn mentions_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

/// Excerpt of the words around the first word containing `stem`.
///
/// Keeps up to three words on each side, joined by single spaces.
pub fn extract_context(text: &str, stem: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let hit = words.iter().position(|w| w.contains(stem))?;
    let start = hit.saturating_sub(CONTEXT_WORDS);
    let end = (hit + CONTEXT_WORDS + 1).min(words.len());
    Some(words[start..end].join(" "))
}
