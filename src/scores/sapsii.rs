// ==============================================================================
// sapsii.rs - Simplified Acute Physiology Score II
// ==============================================================================
// Description: First-day SAPS-II per ICU stay including chronic disease and
//              admission type components
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{between, cascade, completed_years, ge, logistic, lt, range_of, total, Bucket, FirstDayIndex, SubScore};
use crate::aggregate::labs::LabTest;
use crate::aggregate::ventilation::EpisodeIndex;
use crate::aggregate::vitals::VitalSign;
use crate::aggregate::{min_opt, MinMax, Window};
use crate::models::{ChartEvent, DiagnosisCode, IcuStay, ServiceTransfer};
use crate::table::{Column, SqlValue, TableRow};

/// Oxygen delivery device and ventilation mode items naming CPAP
pub const CPAP_ITEM_IDS: &[i32] = &[467, 469, 226732];

fn mentions_cpap(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower.contains("cpap") || lower.contains("bipap mask")
}

/// Span of first-day CPAP charting, widened 1h before and 4h after
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpapWindow {
    pub starttime: NaiveDateTime,
    pub endtime: NaiveDateTime,
}

impl CpapWindow {
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.starttime <= t && t <= self.endtime
    }
}

pub fn cpap_windows(cohort: &[IcuStay], chartevents: &[ChartEvent]) -> HashMap<i32, CpapWindow> {
    let first_day: HashMap<i32, Window> = cohort
        .iter()
        .map(|s| (s.icustay_id, Window::closed(s.icu_intime, s.icu_intime + Duration::days(1))))
        .collect();

    let mut windows: HashMap<i32, CpapWindow> = HashMap::new();
    for event in chartevents.iter().filter(|e| !e.error && CPAP_ITEM_IDS.contains(&e.itemid)) {
        let Some(window) = first_day.get(&event.icustay_id) else {
            continue;
        };
        if !window.contains(event.charttime) || !event.value.as_deref().is_some_and(mentions_cpap) {
            continue;
        }
        let start = event.charttime - Duration::hours(1);
        let end = event.charttime + Duration::hours(4);
        windows
            .entry(event.icustay_id)
            .and_modify(|w| {
                w.starttime = w.starttime.min(start);
                w.endtime = w.endtime.max(end);
            })
            .or_insert(CpapWindow { starttime: start, endtime: end });
    }

    debug!("Found CPAP on the first day of {} stays", windows.len());
    windows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionType {
    ScheduledSurgical,
    UnscheduledSurgical,
    Medical,
}

impl AdmissionType {
    /// Classify from the admission type and the first service of the admission
    pub fn classify(admission_type: Option<&str>, first_service: Option<&str>) -> Self {
        let surgical = first_service.is_some_and(|s| s.to_lowercase().contains("surg"));
        match (admission_type, surgical) {
            (Some("ELECTIVE"), true) => AdmissionType::ScheduledSurgical,
            (Some(_), true) => AdmissionType::UnscheduledSurgical,
            _ => AdmissionType::Medical,
        }
    }

    pub fn score(&self) -> u32 {
        match self {
            AdmissionType::ScheduledSurgical => 0,
            AdmissionType::Medical => 6,
            AdmissionType::UnscheduledSurgical => 8,
        }
    }
}

/// Chronic diseases that carry SAPS-II points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChronicDisease {
    pub aids: bool,
    pub hematologic_malignancy: bool,
    pub metastatic_cancer: bool,
}

impl ChronicDisease {
    pub fn score(&self) -> u32 {
        if self.aids {
            17
        } else if self.hematologic_malignancy {
            10
        } else if self.metastatic_cancer {
            9
        } else {
            0
        }
    }
}

fn prefix(code: &str, len: usize) -> &str {
    code.get(..len).unwrap_or(code)
}

fn in_range(code: &str, low: &str, high: &str) -> bool {
    low <= code && code <= high
}

const HEMATOLOGIC_RANGES: &[(&str, &str)] = &[
    ("20000", "20238"),
    ("20240", "20248"),
    ("20250", "20302"),
    ("20310", "20312"),
    ("20302", "20382"),
    ("20400", "20522"),
    ("20580", "20702"),
    ("20720", "20892"),
];

fn is_aids(code: &str) -> bool {
    in_range(prefix(code, 3), "042", "044")
}

fn is_hematologic_malignancy(code: &str) -> bool {
    HEMATOLOGIC_RANGES.iter().any(|(low, high)| in_range(code, low, high))
        || matches!(prefix(code, 4), "2386" | "2733")
}

fn is_metastatic_cancer(code: &str) -> bool {
    in_range(prefix(code, 4), "1960", "1991")
        || in_range(code, "20970", "20975")
        || code == "20979"
        || code == "78951"
}

/// ICD-9 chronic disease flags per admission
pub fn chronic_diseases(diagnoses: &[DiagnosisCode]) -> HashMap<i32, ChronicDisease> {
    let mut flags: HashMap<i32, ChronicDisease> = HashMap::new();
    for diagnosis in diagnoses {
        let Some(code) = diagnosis.icd9_code.as_deref() else {
            continue;
        };
        let entry = flags.entry(diagnosis.hadm_id).or_default();
        entry.aids |= is_aids(code);
        entry.hematologic_malignancy |= is_hematologic_malignancy(code);
        entry.metastatic_cancer |= is_metastatic_cancer(code);
    }
    flags
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SapsInputs {
    pub age: Option<f64>,
    pub heartrate: MinMax,
    pub sysbp: MinMax,
    pub tempc: MinMax,
    /// Lowest PaO2/FiO2 while ventilated or on CPAP
    pub pao2fio2_vent_min: Option<f64>,
    pub urineoutput: Option<f64>,
    pub bun: MinMax,
    pub wbc: MinMax,
    pub potassium: MinMax,
    pub sodium: MinMax,
    pub bicarbonate: MinMax,
    pub bilirubin: MinMax,
    pub mingcs: Option<f64>,
    pub chronic: ChronicDisease,
    pub admission: AdmissionType,
}

impl Default for SapsInputs {
    fn default() -> Self {
        Self {
            age: None,
            heartrate: MinMax::default(),
            sysbp: MinMax::default(),
            tempc: MinMax::default(),
            pao2fio2_vent_min: None,
            urineoutput: None,
            bun: MinMax::default(),
            wbc: MinMax::default(),
            potassium: MinMax::default(),
            sodium: MinMax::default(),
            bicarbonate: MinMax::default(),
            bilirubin: MinMax::default(),
            mingcs: None,
            chronic: ChronicDisease::default(),
            admission: AdmissionType::Medical,
        }
    }
}

/// Both extremes inside [low, high)
fn within(range: MinMax, low: f64, high: f64) -> bool {
    ge(range.min, low) && lt(range.min, high) && ge(range.max, low) && lt(range.max, high)
}

const AGE: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.age.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.age, 40.0), score: Some(0) },
    Bucket { when: |i: &SapsInputs| lt(i.age, 60.0), score: Some(7) },
    Bucket { when: |i: &SapsInputs| lt(i.age, 70.0), score: Some(12) },
    Bucket { when: |i: &SapsInputs| lt(i.age, 75.0), score: Some(15) },
    Bucket { when: |i: &SapsInputs| lt(i.age, 80.0), score: Some(16) },
    Bucket { when: |i: &SapsInputs| ge(i.age, 80.0), score: Some(18) },
];

const HEARTRATE: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.heartrate.max.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.heartrate.min, 40.0), score: Some(11) },
    Bucket { when: |i: &SapsInputs| ge(i.heartrate.max, 160.0), score: Some(7) },
    Bucket { when: |i: &SapsInputs| ge(i.heartrate.max, 120.0), score: Some(4) },
    Bucket { when: |i: &SapsInputs| lt(i.heartrate.min, 70.0), score: Some(2) },
    Bucket { when: |i: &SapsInputs| within(i.heartrate, 70.0, 120.0), score: Some(0) },
];

const SYSBP: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.sysbp.min.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.sysbp.min, 70.0), score: Some(13) },
    Bucket { when: |i: &SapsInputs| lt(i.sysbp.min, 100.0), score: Some(5) },
    Bucket { when: |i: &SapsInputs| ge(i.sysbp.max, 200.0), score: Some(2) },
    Bucket { when: |i: &SapsInputs| within(i.sysbp, 100.0, 200.0), score: Some(0) },
];

const TEMPERATURE: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.tempc.max.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.tempc.min, 39.0), score: Some(0) },
    Bucket { when: |i: &SapsInputs| ge(i.tempc.max, 39.0), score: Some(3) },
];

const PAO2FIO2: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.pao2fio2_vent_min.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.pao2fio2_vent_min, 100.0), score: Some(11) },
    Bucket { when: |i: &SapsInputs| lt(i.pao2fio2_vent_min, 200.0), score: Some(9) },
    Bucket { when: |i: &SapsInputs| ge(i.pao2fio2_vent_min, 200.0), score: Some(6) },
];

const URINE_OUTPUT: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.urineoutput.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.urineoutput, 500.0), score: Some(11) },
    Bucket { when: |i: &SapsInputs| lt(i.urineoutput, 1000.0), score: Some(4) },
    Bucket { when: |i: &SapsInputs| ge(i.urineoutput, 1000.0), score: Some(0) },
];

const BUN: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.bun.max.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.bun.max, 28.0), score: Some(0) },
    Bucket { when: |i: &SapsInputs| lt(i.bun.max, 84.0), score: Some(6) },
    Bucket { when: |i: &SapsInputs| ge(i.bun.max, 84.0), score: Some(10) },
];

const WBC: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.wbc.max.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.wbc.min, 1.0), score: Some(12) },
    Bucket { when: |i: &SapsInputs| ge(i.wbc.max, 20.0), score: Some(3) },
    Bucket { when: |i: &SapsInputs| within(i.wbc, 1.0, 20.0), score: Some(0) },
];

const POTASSIUM: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.potassium.max.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.potassium.min, 3.0), score: Some(3) },
    Bucket { when: |i: &SapsInputs| ge(i.potassium.max, 5.0), score: Some(3) },
    Bucket { when: |i: &SapsInputs| within(i.potassium, 3.0, 5.0), score: Some(0) },
];

const SODIUM: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.sodium.max.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.sodium.min, 125.0), score: Some(5) },
    Bucket { when: |i: &SapsInputs| ge(i.sodium.max, 145.0), score: Some(1) },
    Bucket { when: |i: &SapsInputs| within(i.sodium, 125.0, 145.0), score: Some(0) },
];

const BICARBONATE: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.bicarbonate.max.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.bicarbonate.min, 15.0), score: Some(5) },
    Bucket { when: |i: &SapsInputs| lt(i.bicarbonate.min, 20.0), score: Some(3) },
    Bucket {
        when: |i: &SapsInputs| ge(i.bicarbonate.max, 20.0) && ge(i.bicarbonate.min, 20.0),
        score: Some(0),
    },
];

const BILIRUBIN: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.bilirubin.max.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.bilirubin.max, 4.0), score: Some(0) },
    Bucket { when: |i: &SapsInputs| lt(i.bilirubin.max, 6.0), score: Some(4) },
    Bucket { when: |i: &SapsInputs| ge(i.bilirubin.max, 6.0), score: Some(9) },
];

// Totals below 3 are not valid GCS readings
const GCS: &[Bucket<SapsInputs>] = &[
    Bucket { when: |i: &SapsInputs| i.mingcs.is_none(), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.mingcs, 3.0), score: None },
    Bucket { when: |i: &SapsInputs| lt(i.mingcs, 6.0), score: Some(26) },
    Bucket { when: |i: &SapsInputs| lt(i.mingcs, 9.0), score: Some(13) },
    Bucket { when: |i: &SapsInputs| lt(i.mingcs, 11.0), score: Some(7) },
    Bucket { when: |i: &SapsInputs| lt(i.mingcs, 14.0), score: Some(5) },
    Bucket { when: |i: &SapsInputs| between(i.mingcs, 14.0, 15.0), score: Some(0) },
];

#[derive(Debug, Clone, PartialEq)]
pub struct SapsiiScore {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub sapsii: u32,
    pub sapsii_prob: f64,
    pub age_score: SubScore,
    pub hr_score: SubScore,
    pub sysbp_score: SubScore,
    pub temp_score: SubScore,
    pub pao2fio2_score: SubScore,
    pub uo_score: SubScore,
    pub bun_score: SubScore,
    pub wbc_score: SubScore,
    pub potassium_score: SubScore,
    pub sodium_score: SubScore,
    pub bicarbonate_score: SubScore,
    pub bilirubin_score: SubScore,
    pub gcs_score: SubScore,
    pub comorbidity_score: SubScore,
    pub admissiontype_score: SubScore,
}

impl SapsiiScore {
    pub fn from_inputs(stay: &IcuStay, inputs: &SapsInputs) -> Self {
        let age_score = cascade(inputs, AGE);
        let hr_score = cascade(inputs, HEARTRATE);
        let sysbp_score = cascade(inputs, SYSBP);
        let temp_score = cascade(inputs, TEMPERATURE);
        let pao2fio2_score = cascade(inputs, PAO2FIO2);
        let uo_score = cascade(inputs, URINE_OUTPUT);
        let bun_score = cascade(inputs, BUN);
        let wbc_score = cascade(inputs, WBC);
        let potassium_score = cascade(inputs, POTASSIUM);
        let sodium_score = cascade(inputs, SODIUM);
        let bicarbonate_score = cascade(inputs, BICARBONATE);
        let bilirubin_score = cascade(inputs, BILIRUBIN);
        let gcs_score = cascade(inputs, GCS);
        let comorbidity_score = Some(inputs.chronic.score());
        let admissiontype_score = Some(inputs.admission.score());

        let sapsii = total(&[
            age_score,
            hr_score,
            sysbp_score,
            temp_score,
            pao2fio2_score,
            uo_score,
            bun_score,
            wbc_score,
            potassium_score,
            sodium_score,
            bicarbonate_score,
            bilirubin_score,
            gcs_score,
            comorbidity_score,
            admissiontype_score,
        ]);
        let s = sapsii as f64;

        Self {
            subject_id: stay.subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            sapsii,
            sapsii_prob: logistic(-7.7631 + 0.0737 * s + 0.9971 * (s + 1.0).ln()),
            age_score,
            hr_score,
            sysbp_score,
            temp_score,
            pao2fio2_score,
            uo_score,
            bun_score,
            wbc_score,
            potassium_score,
            sodium_score,
            bicarbonate_score,
            bilirubin_score,
            gcs_score,
            comorbidity_score,
            admissiontype_score,
        }
    }
}

/// Raw sources SAPS-II reads beyond the first-day tables
#[derive(Debug, Clone, Copy)]
pub struct SapsSources<'a> {
    pub chartevents: &'a [ChartEvent],
    pub services: &'a [ServiceTransfer],
    pub diagnoses: &'a [DiagnosisCode],
}

/// First service of each admission by transfer time
fn first_services(services: &[ServiceTransfer]) -> HashMap<i32, &ServiceTransfer> {
    let mut first: HashMap<i32, &ServiceTransfer> = HashMap::new();
    for service in services {
        first
            .entry(service.hadm_id)
            .and_modify(|current| {
                if service.transfertime < current.transfertime {
                    *current = service;
                }
            })
            .or_insert(service);
    }
    first
}

pub fn sapsii_inputs(cohort: &[IcuStay], first_day: &FirstDayIndex, sources: &SapsSources) -> Vec<SapsInputs> {
    let cpap = cpap_windows(cohort, sources.chartevents);
    let episodes = EpisodeIndex::new(first_day.episodes);
    let first_service = first_services(sources.services);
    let chronic = chronic_diseases(sources.diagnoses);

    cohort
        .iter()
        .map(|stay| {
            let id = stay.icustay_id;
            let pao2fio2_vent_min = first_day
                .arterial(id)
                .iter()
                .filter(|gas| {
                    episodes.is_ventilated_at(id, gas.charttime())
                        || cpap.get(&id).is_some_and(|w| w.contains(gas.charttime()))
                })
                .fold(None, |acc, gas| min_opt(acc, gas.pao2fio2));
            let service = first_service.get(&stay.hadm_id).and_then(|s| s.curr_service.as_deref());

            SapsInputs {
                age: Some(completed_years(stay.dob, stay.icu_intime) as f64),
                heartrate: range_of(first_day.vital(id, VitalSign::HeartRate)),
                sysbp: range_of(first_day.vital(id, VitalSign::SysBp)),
                tempc: range_of(first_day.vital(id, VitalSign::TempC)),
                pao2fio2_vent_min,
                urineoutput: first_day.urine_output(id),
                bun: first_day.lab(id, LabTest::Bun),
                wbc: first_day.lab(id, LabTest::Wbc),
                potassium: first_day.lab(id, LabTest::Potassium),
                sodium: first_day.lab(id, LabTest::Sodium),
                bicarbonate: first_day.lab(id, LabTest::Bicarbonate),
                bilirubin: first_day.lab(id, LabTest::Bilirubin),
                mingcs: first_day.mingcs(id),
                chronic: chronic.get(&stay.hadm_id).copied().unwrap_or_default(),
                admission: AdmissionType::classify(stay.admission_type.as_deref(), service),
            }
        })
        .collect()
}

pub fn compute_sapsii(cohort: &[IcuStay], first_day: &FirstDayIndex, sources: &SapsSources) -> Vec<SapsiiScore> {
    let inputs = sapsii_inputs(cohort, first_day, sources);
    let rows: Vec<SapsiiScore> = cohort
        .iter()
        .zip(&inputs)
        .map(|(stay, inputs)| SapsiiScore::from_inputs(stay, inputs))
        .collect();

    info!("Computed SAPS-II for {} stays", rows.len());
    rows
}

impl TableRow for SapsiiScore {
    fn columns() -> Vec<Column> {
        let mut columns = vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::int("sapsii"),
            Column::float("sapsii_prob"),
        ];
        for name in [
            "age_score",
            "hr_score",
            "sysbp_score",
            "temp_score",
            "pao2fio2_score",
            "uo_score",
            "bun_score",
            "wbc_score",
            "potassium_score",
            "sodium_score",
            "bicarbonate_score",
            "bilirubin_score",
            "gcs_score",
            "comorbidity_score",
            "admissiontype_score",
        ] {
            columns.push(Column::int(name));
        }
        columns
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            self.sapsii.into(),
            self.sapsii_prob.into(),
            self.age_score.into(),
            self.hr_score.into(),
            self.sysbp_score.into(),
            self.temp_score.into(),
            self.pao2fio2_score.into(),
            self.uo_score.into(),
            self.bun_score.into(),
            self.wbc_score.into(),
            self.potassium_score.into(),
            self.sodium_score.into(),
            self.bicarbonate_score.into(),
            self.bilirubin_score.into(),
            self.gcs_score.into(),
            self.comorbidity_score.into(),
            self.admissiontype_score.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chart_text, stay, ts};

    fn range(min: f64, max: f64) -> MinMax {
        MinMax { min: Some(min), max: Some(max) }
    }

    fn diagnosis(hadm_id: i32, code: &str) -> DiagnosisCode {
        DiagnosisCode { hadm_id, icd9_code: Some(code.to_string()) }
    }

    #[test]
    fn test_admission_type_classification() {
        assert_eq!(
            AdmissionType::classify(Some("ELECTIVE"), Some("CSURG")),
            AdmissionType::ScheduledSurgical
        );
        assert_eq!(
            AdmissionType::classify(Some("EMERGENCY"), Some("NSURG")),
            AdmissionType::UnscheduledSurgical
        );
        assert_eq!(AdmissionType::classify(Some("ELECTIVE"), Some("MED")), AdmissionType::Medical);
        assert_eq!(AdmissionType::classify(None, Some("SURG")), AdmissionType::Medical);
        assert_eq!(AdmissionType::classify(Some("ELECTIVE"), None), AdmissionType::Medical);
    }

    #[test]
    fn test_chronic_disease_codes() {
        let flags = chronic_diseases(&[
            diagnosis(1, "0429"),
            diagnosis(2, "20301"),
            diagnosis(3, "1970"),
            diagnosis(4, "4019"),
            diagnosis(5, "27330"),
        ]);
        assert_eq!(flags[&1].score(), 17);
        assert_eq!(flags[&2].score(), 10);
        assert_eq!(flags[&3].score(), 9);
        assert_eq!(flags[&4].score(), 0);
        assert!(flags[&5].hematologic_malignancy);
    }

    #[test]
    fn test_aids_outranks_other_conditions() {
        let flags = chronic_diseases(&[diagnosis(1, "1970"), diagnosis(1, "042")]);
        assert_eq!(flags[&1].score(), 17);
    }

    #[test]
    fn test_cpap_window_bounds() {
        let cohort = vec![stay(1, 10, 100)];
        let events = vec![
            chart_text(100, 467, "2150-01-01 10:00", "CPAP mask"),
            chart_text(100, 226732, "2150-01-01 14:00", "BiPAP mask "),
            chart_text(100, 467, "2150-01-01 18:00", "Nasal cannula"),
        ];
        let window = cpap_windows(&cohort, &events)[&100];
        assert_eq!(window.starttime, ts("2150-01-01 09:00"));
        assert_eq!(window.endtime, ts("2150-01-01 18:00"));
    }

    #[test]
    fn test_gcs_below_three_is_null() {
        let stay = stay(1, 10, 100);
        let score = |gcs: f64| {
            let inputs = SapsInputs { mingcs: Some(gcs), ..Default::default() };
            SapsiiScore::from_inputs(&stay, &inputs).gcs_score
        };
        assert_eq!(score(2.0), None);
        assert_eq!(score(3.0), Some(26));
        assert_eq!(score(13.0), Some(5));
        assert_eq!(score(15.0), Some(0));
    }

    #[test]
    fn test_vital_components() {
        let stay = stay(1, 10, 100);
        let inputs = SapsInputs {
            age: Some(65.0),
            heartrate: range(65.0, 110.0),
            sysbp: range(105.0, 150.0),
            tempc: range(36.5, 39.2),
            ..Default::default()
        };
        let score = SapsiiScore::from_inputs(&stay, &inputs);
        assert_eq!(score.age_score, Some(12));
        assert_eq!(score.hr_score, Some(2));
        assert_eq!(score.sysbp_score, Some(0));
        assert_eq!(score.temp_score, Some(0));
        // 12 + 2 + medical admission 6
        assert_eq!(score.sapsii, 20);
        assert_eq!(score.comorbidity_score, Some(0));
    }

    #[test]
    fn test_probability_formula() {
        let stay = stay(1, 10, 100);
        let score = SapsiiScore::from_inputs(&stay, &SapsInputs::default());
        assert_eq!(score.sapsii, 6);
        let expected = logistic(-7.7631 + 0.0737 * 6.0 + 0.9971 * 7.0_f64.ln());
        assert!((score.sapsii_prob - expected).abs() < 1e-12);
    }
}
