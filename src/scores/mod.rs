// ==============================================================================
// scores/mod.rs - Composite Severity Scores
// ==============================================================================
// Description: Ordered bucket cascades and the first-day lookups shared by
//              the SOFA, OASIS and SAPS-II calculators
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod oasis;
pub mod sapsii;
pub mod sofa;

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::HashMap;

use crate::aggregate::blood_gas::ArterialBloodGas;
use crate::aggregate::gcs::GcsFirstDay;
use crate::aggregate::labs::{LabTest, LabsFirstDay};
use crate::aggregate::urine::UrineOutputFirstDay;
use crate::aggregate::ventilation::{VentilationEpisode, VentilationFirstDay};
use crate::aggregate::vitals::{SignalStats, VitalSign, VitalsFirstDay};
use crate::aggregate::MinMax;

/// A sub-score; `None` when its inputs are absent
pub type SubScore = Option<u32>;

/// One rule of a cascade. A matching rule may itself yield null.
pub struct Bucket<T> {
    pub when: fn(&T) -> bool,
    pub score: SubScore,
}

/// Evaluate rules in order; the first match wins, no match is null
pub fn cascade<T>(input: &T, buckets: &[Bucket<T>]) -> SubScore {
    buckets
        .iter()
        .find(|bucket| (bucket.when)(input))
        .and_then(|bucket| bucket.score)
}

/// Sum of sub-scores with nulls counted as 0
pub fn total(parts: &[SubScore]) -> u32 {
    parts.iter().flatten().sum()
}

pub fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// Null-aware comparisons: a missing value never satisfies a predicate

pub fn lt(value: Option<f64>, bound: f64) -> bool {
    value.is_some_and(|v| v < bound)
}

pub fn le(value: Option<f64>, bound: f64) -> bool {
    value.is_some_and(|v| v <= bound)
}

pub fn gt(value: Option<f64>, bound: f64) -> bool {
    value.is_some_and(|v| v > bound)
}

pub fn ge(value: Option<f64>, bound: f64) -> bool {
    value.is_some_and(|v| v >= bound)
}

/// Inclusive on both ends
pub fn between(value: Option<f64>, low: f64, high: f64) -> bool {
    value.is_some_and(|v| v >= low && v <= high)
}

/// Whole years elapsed between `dob` and `at`
pub fn completed_years(dob: NaiveDateTime, at: NaiveDateTime) -> i32 {
    let mut years = at.year() - dob.year();
    let not_yet = (at.month(), at.day(), at.num_seconds_from_midnight())
        < (dob.month(), dob.day(), dob.num_seconds_from_midnight());
    if not_yet {
        years -= 1;
    }
    years
}

/// Borrowed first-day tables the calculators read
#[derive(Debug, Clone, Copy)]
pub struct FirstDayTables<'a> {
    pub vitals: &'a [VitalsFirstDay],
    pub labs: &'a [LabsFirstDay],
    pub gcs: &'a [GcsFirstDay],
    pub urine: &'a [UrineOutputFirstDay],
    pub ventilation: &'a [VentilationFirstDay],
    pub arterial: &'a [ArterialBloodGas],
    pub episodes: &'a [VentilationEpisode],
}

/// First-day tables keyed by icustay_id
pub struct FirstDayIndex<'a> {
    vitals: HashMap<i32, &'a VitalsFirstDay>,
    labs: HashMap<i32, &'a LabsFirstDay>,
    gcs: HashMap<i32, &'a GcsFirstDay>,
    urine: HashMap<i32, &'a UrineOutputFirstDay>,
    ventilation: HashMap<i32, &'a VentilationFirstDay>,
    arterial: HashMap<i32, Vec<&'a ArterialBloodGas>>,
    pub episodes: &'a [VentilationEpisode],
}

impl<'a> FirstDayIndex<'a> {
    pub fn new(tables: FirstDayTables<'a>) -> Self {
        let mut arterial: HashMap<i32, Vec<&'a ArterialBloodGas>> = HashMap::new();
        for gas in tables.arterial {
            arterial.entry(gas.icustay_id()).or_default().push(gas);
        }

        Self {
            vitals: tables.vitals.iter().map(|r| (r.icustay_id, r)).collect(),
            labs: tables.labs.iter().map(|r| (r.icustay_id, r)).collect(),
            gcs: tables.gcs.iter().map(|r| (r.icustay_id, r)).collect(),
            urine: tables.urine.iter().map(|r| (r.icustay_id, r)).collect(),
            ventilation: tables.ventilation.iter().map(|r| (r.icustay_id, r)).collect(),
            arterial,
            episodes: tables.episodes,
        }
    }

    pub fn vital(&self, icustay_id: i32, sign: VitalSign) -> SignalStats {
        self.vitals
            .get(&icustay_id)
            .map(|row| row.get(sign))
            .unwrap_or_default()
    }

    pub fn lab(&self, icustay_id: i32, test: LabTest) -> MinMax {
        self.labs
            .get(&icustay_id)
            .map(|row| row.get(test))
            .unwrap_or_default()
    }

    pub fn mingcs(&self, icustay_id: i32) -> Option<f64> {
        self.gcs.get(&icustay_id).and_then(|row| row.mingcs)
    }

    pub fn urine_output(&self, icustay_id: i32) -> Option<f64> {
        self.urine.get(&icustay_id).and_then(|row| row.urineoutput)
    }

    pub fn ventilated_first_day(&self, icustay_id: i32) -> Option<bool> {
        self.ventilation.get(&icustay_id).map(|row| row.vent)
    }

    pub fn arterial(&self, icustay_id: i32) -> &[&'a ArterialBloodGas] {
        self.arterial
            .get(&icustay_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Min/max pair of a vital sign
pub fn range_of(stats: SignalStats) -> MinMax {
    MinMax { min: stats.min, max: stats.max }
}
