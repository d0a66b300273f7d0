// ==============================================================================
// testing.rs - Shared Test Fixtures
// ==============================================================================
// Description: Timestamp and cohort builders used across unit tests
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::NaiveDateTime;

use crate::models::{ChartEvent, IcuStay, LabEvent};

/// Parse "YYYY-MM-DD HH:MM"
pub fn ts(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").expect("valid test timestamp")
}

/// Adult emergency stay with intime 2150-01-01 08:00
pub fn stay(subject_id: i32, hadm_id: i32, icustay_id: i32) -> IcuStay {
    IcuStay {
        subject_id,
        hadm_id,
        icustay_id,
        gender: Some("M".to_string()),
        dob: ts("2090-01-01 00:00"),
        icu_intime: ts("2150-01-01 08:00"),
        icu_outtime: Some(ts("2150-01-04 08:00")),
        admittime: ts("2150-01-01 02:00"),
        dischtime: Some(ts("2150-01-10 12:00")),
        deathtime: None,
        admission_type: Some("EMERGENCY".to_string()),
        discharge_location: Some("HOME".to_string()),
        hospital_expire_flag: Some(0),
        age: 60.0,
    }
}

pub fn chart(icustay_id: i32, itemid: i32, charttime: &str, valuenum: f64) -> ChartEvent {
    ChartEvent {
        icustay_id,
        itemid,
        charttime: ts(charttime),
        value: Some(valuenum.to_string()),
        valuenum: Some(valuenum),
        error: false,
    }
}

pub fn chart_text(icustay_id: i32, itemid: i32, charttime: &str, value: &str) -> ChartEvent {
    ChartEvent {
        icustay_id,
        itemid,
        charttime: ts(charttime),
        value: Some(value.to_string()),
        valuenum: None,
        error: false,
    }
}

pub fn lab(hadm_id: i32, itemid: i32, charttime: &str, valuenum: f64) -> LabEvent {
    LabEvent {
        hadm_id,
        itemid,
        charttime: ts(charttime),
        value: Some(valuenum.to_string()),
        valuenum: Some(valuenum),
    }
}
