// ==============================================================================
// aggregate/mod.rs - First-Day Signal Aggregators
// ==============================================================================
// Description: Shared windowing and summary helpers for the per-stay
//              aggregation stages
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod blood_gas;
pub mod echo;
pub mod gcs;
pub mod labs;
pub mod urine;
pub mod ventilation;
pub mod vitals;

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

use crate::models::IcuStay;

/// Time window anchored at an ICU admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Whether `end` itself belongs to the window
    pub closed: bool,
}

impl Window {
    /// [start, end)
    pub fn half_open(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end, closed: false }
    }

    /// [start, end]
    pub fn closed(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end, closed: true }
    }

    /// [intime, intime + 24h)
    pub fn first_day(intime: NaiveDateTime) -> Self {
        Self::half_open(intime, intime + Duration::hours(24))
    }

    /// [intime - lookback, intime + 1 day]
    pub fn first_day_with_lookback(intime: NaiveDateTime, lookback: Duration) -> Self {
        Self::closed(intime - lookback, intime + Duration::days(1))
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        let before_end = if self.closed { t <= self.end } else { t < self.end };
        t >= self.start && before_end
    }
}

/// Running min/max/mean
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    min: Option<f64>,
    max: Option<f64>,
    sum: f64,
    count: usize,
}

impl Accumulator {
    pub fn push(&mut self, value: f64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.sum += value;
        self.count += 1;
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn min_max(&self) -> MinMax {
        MinMax { min: self.min, max: self.max }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MinMax {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Max of two optional values, ignoring nulls
pub fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Min of two optional values, ignoring nulls
pub fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Cohort lookups by stay and by admission
pub struct StayIndex<'a> {
    by_icustay: HashMap<i32, &'a IcuStay>,
    by_hadm: HashMap<i32, &'a IcuStay>,
}

impl<'a> StayIndex<'a> {
    pub fn new(cohort: &'a [IcuStay]) -> Self {
        Self {
            by_icustay: cohort.iter().map(|s| (s.icustay_id, s)).collect(),
            by_hadm: cohort.iter().map(|s| (s.hadm_id, s)).collect(),
        }
    }

    pub fn by_icustay(&self, icustay_id: i32) -> Option<&'a IcuStay> {
        self.by_icustay.get(&icustay_id).copied()
    }

    pub fn by_hadm(&self, hadm_id: i32) -> Option<&'a IcuStay> {
        self.by_hadm.get(&hadm_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ts;

    #[test]
    fn test_first_day_window_excludes_end() {
        let window = Window::first_day(ts("2150-01-01 08:00"));
        assert!(window.contains(ts("2150-01-01 08:00")));
        assert!(window.contains(ts("2150-01-02 07:59")));
        assert!(!window.contains(ts("2150-01-02 08:00")));
        assert!(!window.contains(ts("2150-01-01 07:59")));
    }

    #[test]
    fn test_lookback_window_includes_end() {
        let window = Window::first_day_with_lookback(ts("2150-01-01 08:00"), Duration::hours(6));
        assert!(window.contains(ts("2150-01-01 02:00")));
        assert!(window.contains(ts("2150-01-02 08:00")));
        assert!(!window.contains(ts("2150-01-01 01:59")));
    }

    #[test]
    fn test_accumulator() {
        let mut acc = Accumulator::default();
        assert_eq!(acc.mean(), None);
        for v in [80.0, 120.0, 100.0] {
            acc.push(v);
        }
        assert_eq!(acc.min(), Some(80.0));
        assert_eq!(acc.max(), Some(120.0));
        assert_eq!(acc.mean(), Some(100.0));
        assert_eq!(acc.count(), 3);
    }

    #[test]
    fn test_optional_extrema() {
        assert_eq!(max_opt(Some(1.0), None), Some(1.0));
        assert_eq!(min_opt(Some(1.0), Some(0.5)), Some(0.5));
        assert_eq!(max_opt(None, None), None);
    }
}
