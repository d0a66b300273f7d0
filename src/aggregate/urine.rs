// ==============================================================================
// urine.rs - First-Day Urine Output
// ==============================================================================
// Description: Total urine output in the first 24 hours of the ICU stay
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::collections::HashMap;
use tracing::info;

use super::{StayIndex, Window};
use crate::models::{IcuStay, OutputEvent};
use crate::table::{Column, SqlValue, TableRow};

/// GU irrigant volume in; subtracted from the total when positive
const IRRIGANT_IN: i32 = 227488;

pub const ITEM_IDS: &[i32] = &[
    // CareVue
    40055, 43175, 40069, 40094, 40715, 40473, 40085, 40057, 40056, 40405, 40428, 40086, 40096,
    40651,
    // MetaVision
    226559, 226560, 226561, 226584, 226563, 226564, 226565, 226567, 226557, 226558, 227488, 227489,
];

#[derive(Debug, Clone, PartialEq)]
pub struct UrineOutputFirstDay {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    /// mL; null when nothing was recorded
    pub urineoutput: Option<f64>,
}

pub fn aggregate_urine_output(
    cohort: &[IcuStay],
    events: &[OutputEvent],
) -> Vec<UrineOutputFirstDay> {
    let index = StayIndex::new(cohort);
    let mut totals: HashMap<i32, f64> = HashMap::new();

    for event in events {
        if !ITEM_IDS.contains(&event.itemid) {
            continue;
        }
        let Some(stay) = index.by_icustay(event.icustay_id) else {
            continue;
        };
        if !Window::first_day(stay.icu_intime).contains(event.charttime) {
            continue;
        }
        let Some(value) = event.value else {
            continue;
        };
        let signed = if event.itemid == IRRIGANT_IN && value > 0.0 { -value } else { value };
        *totals.entry(stay.icustay_id).or_insert(0.0) += signed;
    }

    let rows: Vec<UrineOutputFirstDay> = cohort
        .iter()
        .map(|stay| UrineOutputFirstDay {
            subject_id: stay.subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            urineoutput: totals.get(&stay.icustay_id).copied(),
        })
        .collect();

    info!(
        "Aggregated first-day urine output: {} of {} stays with measurements",
        totals.len(),
        rows.len()
    );
    rows
}

impl TableRow for UrineOutputFirstDay {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::float("urineoutput"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            self.urineoutput.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stay, ts};

    fn output(itemid: i32, charttime: &str, value: f64) -> OutputEvent {
        OutputEvent { icustay_id: 100, itemid, charttime: ts(charttime), value: Some(value) }
    }

    #[test]
    fn test_irrigant_is_subtracted() {
        let cohort = vec![stay(1, 10, 100)];
        let events = vec![
            output(40055, "2150-01-01 09:00", 400.0),
            output(226559, "2150-01-01 15:00", 300.0),
            output(227488, "2150-01-01 16:00", 100.0),
            output(40055, "2150-01-02 08:00", 1000.0), // window is half-open
        ];

        let rows = aggregate_urine_output(&cohort, &events);
        assert_eq!(rows[0].urineoutput, Some(600.0));
    }

    #[test]
    fn test_no_measurements_is_null() {
        let cohort = vec![stay(1, 10, 100)];
        let rows = aggregate_urine_output(&cohort, &[]);
        assert_eq!(rows[0].urineoutput, None);
    }
}
