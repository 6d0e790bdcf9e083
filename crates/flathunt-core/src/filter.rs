//! Acceptance filters applied to merged adverts.
//!
//! Every filter sees the full record and every filter runs, so the report
//! always carries one verdict per filter. Unknown values pass: a filter only
//! rejects when the data is present and positively outside its bounds.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::Advert;

/// A named predicate over an advert.
pub trait AdvertFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn accepts(&self, advert: &Advert) -> bool;
}

/// Inclusive bounds where a missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Bounds<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Room count within `[min, max]`; unknown room count passes.
#[derive(Debug, Clone)]
pub struct RoomCountFilter {
    pub min: i32,
    pub max: i32,
}

impl AdvertFilter for RoomCountFilter {
    fn name(&self) -> &'static str {
        "room_count"
    }

    fn accepts(&self, advert: &Advert) -> bool {
        advert
            .rooms
            .is_none_or(|rooms| (self.min..=self.max).contains(&rooms))
    }
}

/// District allow/deny lists; an empty list is not applied.
#[derive(Debug, Clone, Default)]
pub struct DistrictFilter {
    pub include: BTreeSet<String>,
    pub exclude: BTreeSet<String>,
}

impl AdvertFilter for DistrictFilter {
    fn name(&self) -> &'static str {
        "districts"
    }

    fn accepts(&self, advert: &Advert) -> bool {
        let district = advert.district.as_deref();
        let included =
            self.include.is_empty() || district.is_some_and(|d| self.include.contains(d));
        let not_excluded =
            self.exclude.is_empty() || district.is_none_or(|d| !self.exclude.contains(d));
        included && not_excluded
    }
}

/// Living area in square metres; unknown area passes.
#[derive(Debug, Clone)]
pub struct AreaFilter {
    pub bounds: Bounds<f64>,
}

impl AdvertFilter for AreaFilter {
    fn name(&self) -> &'static str {
        "area"
    }

    fn accepts(&self, advert: &Advert) -> bool {
        advert.area.is_none_or(|area| self.bounds.contains(area))
    }
}

/// Price per square metre; passes when price or area is unknown or area is zero.
#[derive(Debug, Clone)]
pub struct PriceToAreaRatioFilter {
    pub bounds: Bounds<f64>,
}

impl AdvertFilter for PriceToAreaRatioFilter {
    fn name(&self) -> &'static str {
        "price_to_area_ratio"
    }

    fn accepts(&self, advert: &Advert) -> bool {
        advert
            .price_per_sqm()
            .is_none_or(|ratio| self.bounds.contains(ratio))
    }
}

/// Construction year; unknown year passes.
#[derive(Debug, Clone)]
pub struct YearBuiltFilter {
    pub bounds: Bounds<i32>,
}

impl AdvertFilter for YearBuiltFilter {
    fn name(&self) -> &'static str {
        "year_built"
    }

    fn accepts(&self, advert: &Advert) -> bool {
        advert
            .year_built
            .is_none_or(|year| self.bounds.contains(year))
    }
}

/// Verdict of a single filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterVerdict {
    pub name: &'static str,
    pub passed: bool,
}

/// Verdicts of every filter in chain order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub verdicts: Vec<FilterVerdict>,
}

impl FilterReport {
    /// Logical AND of all verdicts.
    pub fn accepted(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }

    /// Names of the filters that rejected the advert.
    pub fn rejected_by(&self) -> Vec<&'static str> {
        self.verdicts
            .iter()
            .filter(|v| !v.passed)
            .map(|v| v.name)
            .collect()
    }

    pub fn verdict(&self, name: &str) -> Option<bool> {
        self.verdicts
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.passed)
    }
}

/// Ordered list of filters.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn AdvertFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl AdvertFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter; no short-circuiting.
    pub fn evaluate(&self, advert: &Advert) -> FilterReport {
        FilterReport {
            verdicts: self
                .filters
                .iter()
                .map(|f| FilterVerdict {
                    name: f.name(),
                    passed: f.accepts(advert),
                })
                .collect(),
        }
    }
}
