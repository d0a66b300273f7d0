// ==============================================================================
// echo.rs - Echocardiography Report Extraction
// ==============================================================================
// Description: Structured fields (time, weight, height, BP, HR) pulled out of
//              free-text echo reports. Weight feeds the SOFA vasopressor dose.
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

use crate::models::NoteEvent;
use crate::table::{Column, SqlValue, TableRow};

pub const ECHO_CATEGORY: &str = "Echo";

/// Pounds to kilograms
pub const LB_TO_KG: f64 = 0.45359237;

static ECHO_PATTERNS: OnceLock<EchoPatterns> = OnceLock::new();

struct EchoPatterns {
    time: Regex,
    indication: Regex,
    height: Regex,
    weight: Regex,
    bsa: Regex,
    bp: Regex,
    bp_parts: Regex,
    hr: Regex,
    status: Regex,
    test: Regex,
    doppler: Regex,
    contrast: Regex,
    technical_quality: Regex,
}

fn patterns() -> &'static EchoPatterns {
    ECHO_PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("Valid regex");
        EchoPatterns {
            time: compile(r"Date/Time: .*? at ([0-9]+:[0-9]{2})"),
            indication: compile(r"Indication: (.*?)(?:\r|\n)"),
            height: compile(r"Height: \(in\) ([0-9]+)"),
            weight: compile(r"Weight \(lb\): ([0-9]+)(?:\r|\n)"),
            bsa: compile(r"BSA \(m2\): ([0-9.]+) m2"),
            bp: compile(r"BP \(mm Hg\): (.+)(?:\r|\n)"),
            bp_parts: compile(r"BP \(mm Hg\): ([0-9]+)/([0-9]+)"),
            hr: compile(r"HR \(bpm\): ([0-9]+)"),
            status: compile(r"Status: (.*?)(?:\r|\n)"),
            test: compile(r"Test: (.*?)(?:\r|\n)"),
            doppler: compile(r"Doppler: (.*?)(?:\r|\n)"),
            contrast: compile(r"Contrast: (.*?)(?:\r|\n)"),
            technical_quality: compile(r"Technical Quality: (.*?)(?:\r|\n)"),
        }
    })
}

fn capture<'t>(regex: &Regex, text: &'t str) -> Option<&'t str> {
    regex.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn capture_number(regex: &Regex, text: &str) -> Option<f64> {
    capture(regex, text).and_then(|v| v.parse().ok())
}

#[derive(Debug, Clone, PartialEq)]
pub struct EchoRecord {
    pub row_id: i32,
    pub subject_id: i32,
    pub hadm_id: Option<i32>,
    pub chartdate: NaiveDateTime,
    /// Chart date combined with the study time from the report header
    pub charttime: Option<NaiveDateTime>,
    pub indication: Option<String>,
    /// Inches
    pub height: Option<f64>,
    /// Pounds
    pub weight: Option<f64>,
    pub bsa: Option<f64>,
    pub bp: Option<String>,
    pub bpsys: Option<f64>,
    pub bpdias: Option<f64>,
    pub hr: Option<f64>,
    pub status: Option<String>,
    pub test: Option<String>,
    pub doppler: Option<String>,
    pub contrast: Option<String>,
    pub technical_quality: Option<String>,
}

impl EchoRecord {
    pub fn weight_kg(&self) -> Option<f64> {
        self.weight.map(|lb| lb * LB_TO_KG)
    }
}

/// Extract structured fields from one echo report
pub fn parse_echo_note(note: &NoteEvent) -> EchoRecord {
    let p = patterns();
    let text = note.text.as_str();

    let charttime = capture(&p.time, text)
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
        .map(|t| note.chartdate.date().and_time(t));
    let bp_parts = p.bp_parts.captures(text);
    let bp_part = |i: usize| {
        bp_parts
            .as_ref()
            .and_then(|c| c.get(i))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    EchoRecord {
        row_id: note.row_id,
        subject_id: note.subject_id,
        hadm_id: note.hadm_id,
        chartdate: note.chartdate,
        charttime,
        indication: capture(&p.indication, text).map(str::to_string),
        height: capture_number(&p.height, text),
        weight: capture_number(&p.weight, text),
        bsa: capture_number(&p.bsa, text),
        bp: capture(&p.bp, text).map(str::to_string),
        bpsys: bp_part(1),
        bpdias: bp_part(2),
        hr: capture_number(&p.hr, text),
        status: capture(&p.status, text).map(str::to_string),
        test: capture(&p.test, text).map(str::to_string),
        doppler: capture(&p.doppler, text).map(str::to_string),
        contrast: capture(&p.contrast, text).map(str::to_string),
        technical_quality: capture(&p.technical_quality, text).map(str::to_string),
    }
}

pub fn extract_echo_data(notes: &[NoteEvent]) -> Vec<EchoRecord> {
    let records: Vec<EchoRecord> = notes.iter().map(parse_echo_note).collect();
    info!(
        "Parsed {} echo reports ({} with weight)",
        records.len(),
        records.iter().filter(|r| r.weight.is_some()).count()
    );
    records
}

impl TableRow for EchoRecord {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("row_id"),
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::timestamp("chartdate"),
            Column::timestamp("charttime"),
            Column::text("indication"),
            Column::float("height"),
            Column::float("weight"),
            Column::float("bsa"),
            Column::text("bp"),
            Column::float("bpsys"),
            Column::float("bpdias"),
            Column::float("hr"),
            Column::text("status"),
            Column::text("test"),
            Column::text("doppler"),
            Column::text("contrast"),
            Column::text("technicalquality"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.row_id.into(),
            self.subject_id.into(),
            self.hadm_id.into(),
            self.chartdate.into(),
            self.charttime.into(),
            (&self.indication).into(),
            self.height.into(),
            self.weight.into(),
            self.bsa.into(),
            (&self.bp).into(),
            self.bpsys.into(),
            self.bpdias.into(),
            self.hr.into(),
            (&self.status).into(),
            (&self.test).into(),
            (&self.doppler).into(),
            (&self.contrast).into(),
            (&self.technical_quality).into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ts;

    const REPORT: &str = "PATIENT/TEST INFORMATION:\n\
Indication: Shortness of breath.\n\
Height: (in) 70\n\
Weight (lb): 200\n\
BSA (m2): 2.09 m2\n\
BP (mm Hg): 120/80\n\
HR (bpm): 88\n\
Status: Inpatient\n\
Date/Time: [**2150-01-01**] at 14:32\n\
Test: TTE (Complete)\n\
Doppler: Full Doppler and color Doppler\n\
Contrast: None\n\
Technical Quality: Adequate\n";

    fn note(text: &str) -> NoteEvent {
        NoteEvent {
            row_id: 1,
            subject_id: 1,
            hadm_id: Some(10),
            chartdate: ts("2150-01-01 00:00"),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_parse_complete_report() {
        let record = parse_echo_note(&note(REPORT));

        assert_eq!(record.charttime, Some(ts("2150-01-01 14:32")));
        assert_eq!(record.indication.as_deref(), Some("Shortness of breath."));
        assert_eq!(record.height, Some(70.0));
        assert_eq!(record.weight, Some(200.0));
        assert_eq!(record.bsa, Some(2.09));
        assert_eq!(record.bp.as_deref(), Some("120/80"));
        assert_eq!(record.bpsys, Some(120.0));
        assert_eq!(record.bpdias, Some(80.0));
        assert_eq!(record.hr, Some(88.0));
        assert_eq!(record.technical_quality.as_deref(), Some("Adequate"));
        assert!((record.weight_kg().unwrap() - 90.718474).abs() < 1e-9);
    }

    #[test]
    fn test_missing_fields_are_null() {
        let record = parse_echo_note(&note("Conclusions: normal study"));
        assert_eq!(record.charttime, None);
        assert_eq!(record.weight, None);
        assert_eq!(record.bpsys, None);
    }
}
