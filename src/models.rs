// ==============================================================================
// models.rs - Source Data Models
// ==============================================================================
// Description: Raw clinical event rows and the ICU stay cohort record
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Patient demographics
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Patient {
    pub subject_id: i32,
    pub gender: Option<String>,
    pub dob: NaiveDateTime,
}

/// Hospital admission
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Admission {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub admittime: NaiveDateTime,
    pub dischtime: Option<NaiveDateTime>,
    pub deathtime: Option<NaiveDateTime>,
    pub admission_type: Option<String>,
    pub discharge_location: Option<String>,
    pub hospital_expire_flag: Option<i32>,
}

/// Raw ICU stay before cohort selection
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct IcuStayRecord {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub intime: NaiveDateTime,
    pub outtime: Option<NaiveDateTime>,
}

/// Bedside chart observation
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ChartEvent {
    pub icustay_id: i32,
    pub itemid: i32,
    pub charttime: NaiveDateTime,
    pub value: Option<String>,
    pub valuenum: Option<f64>,
    /// Row flagged as erroneous by the charting system
    pub error: bool,
}

/// Laboratory result (joined to stays through the admission)
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LabEvent {
    pub hadm_id: i32,
    pub itemid: i32,
    pub charttime: NaiveDateTime,
    pub value: Option<String>,
    pub valuenum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutputEvent {
    pub icustay_id: i32,
    pub itemid: i32,
    pub charttime: NaiveDateTime,
    pub value: Option<f64>,
}

/// CareVue infusion row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct InputEventCv {
    pub icustay_id: i32,
    pub itemid: i32,
    pub charttime: NaiveDateTime,
    pub rate: Option<f64>,
}

/// MetaVision infusion row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct InputEventMv {
    pub icustay_id: i32,
    pub itemid: i32,
    pub starttime: NaiveDateTime,
    pub rate: Option<f64>,
    pub statusdescription: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProcedureEventMv {
    pub icustay_id: i32,
    pub itemid: i32,
    pub starttime: NaiveDateTime,
}

/// Hospital service transfer
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ServiceTransfer {
    pub hadm_id: i32,
    pub transfertime: NaiveDateTime,
    pub curr_service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DiagnosisCode {
    pub hadm_id: i32,
    pub icd9_code: Option<String>,
}

/// Free-text clinical note (echo reports only are loaded)
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct NoteEvent {
    pub row_id: i32,
    pub subject_id: i32,
    pub hadm_id: Option<i32>,
    pub chartdate: NaiveDateTime,
    pub text: String,
}

/// Cohort row: the first ICU stay of an adult patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcuStay {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub gender: Option<String>,
    pub dob: NaiveDateTime,
    pub icu_intime: NaiveDateTime,
    pub icu_outtime: Option<NaiveDateTime>,
    pub admittime: NaiveDateTime,
    pub dischtime: Option<NaiveDateTime>,
    pub deathtime: Option<NaiveDateTime>,
    pub admission_type: Option<String>,
    pub discharge_location: Option<String>,
    pub hospital_expire_flag: Option<i32>,
    /// Years, rounded to two decimals
    pub age: f64,
}

/// Every raw table the severity track reads, already restricted by item code
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub patients: Vec<Patient>,
    pub admissions: Vec<Admission>,
    pub icustays: Vec<IcuStayRecord>,
    pub chartevents: Vec<ChartEvent>,
    pub labevents: Vec<LabEvent>,
    pub outputevents: Vec<OutputEvent>,
    pub inputevents_cv: Vec<InputEventCv>,
    pub inputevents_mv: Vec<InputEventMv>,
    pub procedureevents_mv: Vec<ProcedureEventMv>,
    pub services: Vec<ServiceTransfer>,
    pub diagnoses: Vec<DiagnosisCode>,
    pub notes: Vec<NoteEvent>,
}

impl SourceData {
    pub fn event_count(&self) -> usize {
        self.chartevents.len()
            + self.labevents.len()
            + self.outputevents.len()
            + self.inputevents_cv.len()
            + self.inputevents_mv.len()
            + self.procedureevents_mv.len()
            + self.services.len()
            + self.diagnoses.len()
            + self.notes.len()
    }
}
