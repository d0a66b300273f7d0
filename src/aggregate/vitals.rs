// ==============================================================================
// vitals.rs - First-Day Vital Signs
// ==============================================================================
// Description: Min/max/mean of charted vital signs in the first 24 hours
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::collections::HashMap;
use tracing::info;

use super::{Accumulator, StayIndex, Window};
use crate::models::{ChartEvent, IcuStay};
use crate::table::{Column, SqlValue, TableRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VitalSign {
    HeartRate,
    SysBp,
    DiasBp,
    MeanBp,
    RespRate,
    TempC,
    SpO2,
    Glucose,
}

impl VitalSign {
    pub const ALL: [VitalSign; 8] = [
        VitalSign::HeartRate,
        VitalSign::SysBp,
        VitalSign::DiasBp,
        VitalSign::MeanBp,
        VitalSign::RespRate,
        VitalSign::TempC,
        VitalSign::SpO2,
        VitalSign::Glucose,
    ];

    pub fn column_prefix(&self) -> &'static str {
        match self {
            VitalSign::HeartRate => "heartrate",
            VitalSign::SysBp => "sysbp",
            VitalSign::DiasBp => "diasbp",
            VitalSign::MeanBp => "meanbp",
            VitalSign::RespRate => "resprate",
            VitalSign::TempC => "tempc",
            VitalSign::SpO2 => "spo2",
            VitalSign::Glucose => "glucose",
        }
    }
}

/// Item codes read by this stage
pub const ITEM_IDS: &[i32] = &[
    211, 220045, // heart rate
    51, 442, 455, 6701, 220179, 220050, // systolic
    8368, 8440, 8441, 8555, 220180, 220051, // diastolic
    456, 52, 6702, 443, 220052, 220181, 225312, // mean
    615, 618, 220210, 224690, // respiratory rate
    223761, 678, // temperature F
    223762, 676, // temperature C
    646, 220277, // SpO2
    807, 811, 1529, 3745, 3744, 225664, 220621, 226537, // glucose
];

/// Map a chart value to its vital sign, applying the physiologic range
/// filter and the Fahrenheit conversion. Out-of-range values are dropped.
pub fn classify(itemid: i32, value: f64) -> Option<(VitalSign, f64)> {
    let (sign, accepted, converted) = match itemid {
        211 | 220045 => (VitalSign::HeartRate, value > 0.0 && value < 300.0, value),
        51 | 442 | 455 | 6701 | 220179 | 220050 => {
            (VitalSign::SysBp, value > 0.0 && value < 400.0, value)
        }
        8368 | 8440 | 8441 | 8555 | 220180 | 220051 => {
            (VitalSign::DiasBp, value > 0.0 && value < 300.0, value)
        }
        456 | 52 | 6702 | 443 | 220052 | 220181 | 225312 => {
            (VitalSign::MeanBp, value > 0.0 && value < 300.0, value)
        }
        615 | 618 | 220210 | 224690 => (VitalSign::RespRate, value > 0.0 && value < 70.0, value),
        223761 | 678 => (VitalSign::TempC, value > 70.0 && value < 120.0, (value - 32.0) / 1.8),
        223762 | 676 => (VitalSign::TempC, value > 10.0 && value < 50.0, value),
        646 | 220277 => (VitalSign::SpO2, value > 0.0 && value <= 100.0, value),
        807 | 811 | 1529 | 3745 | 3744 | 225664 | 220621 | 226537 => {
            (VitalSign::Glucose, value > 0.0, value)
        }
        _ => return None,
    };
    accepted.then_some((sign, converted))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VitalsFirstDay {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    signals: HashMap<VitalSign, SignalStats>,
}

impl VitalsFirstDay {
    pub fn new(stay: &IcuStay) -> Self {
        Self {
            subject_id: stay.subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            signals: HashMap::new(),
        }
    }

    /// Summary for one signal; all-null when nothing was charted
    pub fn get(&self, sign: VitalSign) -> SignalStats {
        self.signals.get(&sign).copied().unwrap_or_default()
    }

    pub fn set(&mut self, sign: VitalSign, stats: SignalStats) {
        self.signals.insert(sign, stats);
    }
}

/// Aggregate first-day vital signs for every cohort stay
pub fn aggregate_vitals(cohort: &[IcuStay], events: &[ChartEvent]) -> Vec<VitalsFirstDay> {
    let index = StayIndex::new(cohort);
    let mut accumulators: HashMap<(i32, VitalSign), Accumulator> = HashMap::new();

    for event in events.iter().filter(|e| !e.error) {
        let Some(stay) = index.by_icustay(event.icustay_id) else {
            continue;
        };
        if !Window::first_day(stay.icu_intime).contains(event.charttime) {
            continue;
        }
        let Some((sign, value)) = event.valuenum.and_then(|v| classify(event.itemid, v)) else {
            continue;
        };
        accumulators.entry((stay.icustay_id, sign)).or_default().push(value);
    }

    let rows: Vec<VitalsFirstDay> = cohort
        .iter()
        .map(|stay| {
            let mut row = VitalsFirstDay::new(stay);
            for sign in VitalSign::ALL {
                if let Some(acc) = accumulators.get(&(stay.icustay_id, sign)) {
                    row.set(
                        sign,
                        SignalStats { min: acc.min(), max: acc.max(), mean: acc.mean() },
                    );
                }
            }
            row
        })
        .collect();

    info!("Aggregated first-day vitals for {} stays", rows.len());
    rows
}

impl TableRow for VitalsFirstDay {
    fn columns() -> Vec<Column> {
        let mut columns = vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
        ];
        for sign in VitalSign::ALL {
            let prefix = sign.column_prefix();
            columns.push(Column::float(format!("{prefix}_min")));
            columns.push(Column::float(format!("{prefix}_max")));
            columns.push(Column::float(format!("{prefix}_mean")));
        }
        columns
    }

    fn values(&self) -> Vec<SqlValue> {
        let mut values: Vec<SqlValue> =
            vec![self.subject_id.into(), self.hadm_id.into(), self.icustay_id.into()];
        for sign in VitalSign::ALL {
            let stats = self.get(sign);
            values.push(stats.min.into());
            values.push(stats.max.into());
            values.push(stats.mean.into());
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chart, stay};

    #[test]
    fn test_classify_ranges() {
        assert_eq!(classify(211, 80.0), Some((VitalSign::HeartRate, 80.0)));
        assert_eq!(classify(211, 300.0), None);
        assert_eq!(classify(646, 100.0), Some((VitalSign::SpO2, 100.0)));
        assert_eq!(classify(646, 0.0), None);
        assert_eq!(classify(99999, 1.0), None);
    }

    #[test]
    fn test_fahrenheit_converted() {
        let (sign, value) = classify(678, 98.6).unwrap();
        assert_eq!(sign, VitalSign::TempC);
        assert!((value - 37.0).abs() < 1e-9);
        // Range check applies to the raw Fahrenheit value
        assert_eq!(classify(678, 37.0), None);
    }

    #[test]
    fn test_aggregate_first_day_only() {
        let cohort = vec![stay(1, 10, 100)];
        let mut errored = chart(100, 211, "2150-01-01 10:00", 10.0);
        errored.error = true;
        let events = vec![
            chart(100, 211, "2150-01-01 09:00", 90.0),
            chart(100, 220045, "2150-01-01 20:00", 110.0),
            chart(100, 211, "2150-01-02 08:00", 200.0), // outside window
            chart(100, 211, "2150-01-01 07:00", 20.0),  // before intime
            errored,
            chart(999, 211, "2150-01-01 09:00", 50.0), // not in cohort
        ];

        let rows = aggregate_vitals(&cohort, &events);
        assert_eq!(rows.len(), 1);
        let hr = rows[0].get(VitalSign::HeartRate);
        assert_eq!(hr.min, Some(90.0));
        assert_eq!(hr.max, Some(110.0));
        assert_eq!(hr.mean, Some(100.0));
        assert_eq!(rows[0].get(VitalSign::SysBp), SignalStats::default());
    }

    #[test]
    fn test_table_layout() {
        let row = VitalsFirstDay::new(&stay(1, 10, 100));
        assert_eq!(VitalsFirstDay::columns().len(), row.values().len());
        assert_eq!(VitalsFirstDay::columns()[3].name, "heartrate_min");
    }
}
