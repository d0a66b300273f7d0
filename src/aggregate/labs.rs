// ==============================================================================
// labs.rs - First-Day Laboratory Values
// ==============================================================================
// Description: Min/max of selected lab results from 6 hours before ICU
//              admission through the first day
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::Duration;
use std::collections::HashMap;
use tracing::info;

use super::{Accumulator, MinMax, StayIndex, Window};
use crate::models::{IcuStay, LabEvent};
use crate::table::{Column, SqlValue, TableRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabTest {
    AnionGap,
    Albumin,
    Bands,
    Bicarbonate,
    Bilirubin,
    Creatinine,
    Chloride,
    Glucose,
    Hematocrit,
    Hemoglobin,
    Lactate,
    Platelet,
    Potassium,
    Ptt,
    Inr,
    Pt,
    Sodium,
    Bun,
    Wbc,
}

impl LabTest {
    pub const ALL: [LabTest; 19] = [
        LabTest::AnionGap,
        LabTest::Albumin,
        LabTest::Bands,
        LabTest::Bicarbonate,
        LabTest::Bilirubin,
        LabTest::Creatinine,
        LabTest::Chloride,
        LabTest::Glucose,
        LabTest::Hematocrit,
        LabTest::Hemoglobin,
        LabTest::Lactate,
        LabTest::Platelet,
        LabTest::Potassium,
        LabTest::Ptt,
        LabTest::Inr,
        LabTest::Pt,
        LabTest::Sodium,
        LabTest::Bun,
        LabTest::Wbc,
    ];

    pub fn from_itemid(itemid: i32) -> Option<Self> {
        Some(match itemid {
            50868 => LabTest::AnionGap,
            50862 => LabTest::Albumin,
            51144 => LabTest::Bands,
            50882 => LabTest::Bicarbonate,
            50885 => LabTest::Bilirubin,
            50912 => LabTest::Creatinine,
            50806 | 50902 => LabTest::Chloride,
            50809 | 50931 => LabTest::Glucose,
            50810 | 51221 => LabTest::Hematocrit,
            50811 | 51222 => LabTest::Hemoglobin,
            50813 => LabTest::Lactate,
            51265 => LabTest::Platelet,
            50822 | 50971 => LabTest::Potassium,
            51275 => LabTest::Ptt,
            51237 => LabTest::Inr,
            51274 => LabTest::Pt,
            50824 | 50983 => LabTest::Sodium,
            51006 => LabTest::Bun,
            51300 | 51301 => LabTest::Wbc,
            _ => return None,
        })
    }

    /// Values above the ceiling are implausible and discarded
    fn ceiling(&self) -> f64 {
        match self {
            LabTest::Albumin => 10.0,
            LabTest::Bands => 100.0,
            LabTest::Bilirubin | LabTest::Creatinine | LabTest::Ptt | LabTest::Pt => 150.0,
            LabTest::Hematocrit => 100.0,
            LabTest::Hemoglobin | LabTest::Lactate | LabTest::Inr => 50.0,
            LabTest::Potassium => 30.0,
            LabTest::Sodium => 200.0,
            LabTest::Bun => 300.0,
            LabTest::Wbc => 1000.0,
            LabTest::AnionGap
            | LabTest::Bicarbonate
            | LabTest::Chloride
            | LabTest::Glucose
            | LabTest::Platelet => 10000.0,
        }
    }

    pub fn accepts(&self, value: f64) -> bool {
        value > 0.0 && value <= self.ceiling()
    }

    pub fn column_prefix(&self) -> &'static str {
        match self {
            LabTest::AnionGap => "aniongap",
            LabTest::Albumin => "albumin",
            LabTest::Bands => "bands",
            LabTest::Bicarbonate => "bicarbonate",
            LabTest::Bilirubin => "bilirubin",
            LabTest::Creatinine => "creatinine",
            LabTest::Chloride => "chloride",
            LabTest::Glucose => "glucose",
            LabTest::Hematocrit => "hematocrit",
            LabTest::Hemoglobin => "hemoglobin",
            LabTest::Lactate => "lactate",
            LabTest::Platelet => "platelet",
            LabTest::Potassium => "potassium",
            LabTest::Ptt => "ptt",
            LabTest::Inr => "inr",
            LabTest::Pt => "pt",
            LabTest::Sodium => "sodium",
            LabTest::Bun => "bun",
            LabTest::Wbc => "wbc",
        }
    }
}

pub const ITEM_IDS: &[i32] = &[
    50868, 50862, 51144, 50882, 50885, 50912, 50806, 50902, 50809, 50931, 50810, 51221, 50811,
    51222, 50813, 51265, 50822, 50971, 51275, 51237, 51274, 50824, 50983, 51006, 51300, 51301,
];

#[derive(Debug, Clone, PartialEq)]
pub struct LabsFirstDay {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    results: HashMap<LabTest, MinMax>,
}

impl LabsFirstDay {
    pub fn new(stay: &IcuStay) -> Self {
        Self {
            subject_id: stay.subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            results: HashMap::new(),
        }
    }

    pub fn get(&self, test: LabTest) -> MinMax {
        self.results.get(&test).copied().unwrap_or_default()
    }

    pub fn set(&mut self, test: LabTest, range: MinMax) {
        self.results.insert(test, range);
    }
}

/// Aggregate first-day labs for every cohort stay
pub fn aggregate_labs(cohort: &[IcuStay], events: &[LabEvent]) -> Vec<LabsFirstDay> {
    let index = StayIndex::new(cohort);
    let mut accumulators: HashMap<(i32, LabTest), Accumulator> = HashMap::new();

    for event in events {
        let Some(stay) = index.by_hadm(event.hadm_id) else {
            continue;
        };
        if !Window::first_day_with_lookback(stay.icu_intime, Duration::hours(6))
            .contains(event.charttime)
        {
            continue;
        }
        let (Some(test), Some(value)) = (LabTest::from_itemid(event.itemid), event.valuenum) else {
            continue;
        };
        if test.accepts(value) {
            accumulators.entry((stay.icustay_id, test)).or_default().push(value);
        }
    }

    let rows: Vec<LabsFirstDay> = cohort
        .iter()
        .map(|stay| {
            let mut row = LabsFirstDay::new(stay);
            for test in LabTest::ALL {
                if let Some(acc) = accumulators.get(&(stay.icustay_id, test)) {
                    row.set(test, acc.min_max());
                }
            }
            row
        })
        .collect();

    info!("Aggregated first-day labs for {} stays", rows.len());
    rows
}

impl TableRow for LabsFirstDay {
    fn columns() -> Vec<Column> {
        let mut columns = vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
        ];
        for test in LabTest::ALL {
            columns.push(Column::float(format!("{}_min", test.column_prefix())));
            columns.push(Column::float(format!("{}_max", test.column_prefix())));
        }
        columns
    }

    fn values(&self) -> Vec<SqlValue> {
        let mut values: Vec<SqlValue> =
            vec![self.subject_id.into(), self.hadm_id.into(), self.icustay_id.into()];
        for test in LabTest::ALL {
            let range = self.get(test);
            values.push(range.min.into());
            values.push(range.max.into());
        }
        values
    }
}
