// ==============================================================================
// oasis.rs - Oxford Acute Severity of Illness Score
// ==============================================================================
// Description: First-day OASIS per ICU stay with mortality probability and
//              the worst value behind each physiologic component
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::Duration;
use std::collections::HashMap;
use tracing::info;

use super::{
    between, cascade, completed_years, ge, gt, le, logistic, lt, range_of, total, Bucket, FirstDayIndex,
    SubScore,
};
use crate::aggregate::vitals::VitalSign;
use crate::aggregate::MinMax;
use crate::models::{IcuStay, ServiceTransfer};
use crate::table::{Column, SqlValue, TableRow};

const ELECTIVE: &str = "ELECTIVE";
const DEAD: &str = "DEAD/EXPIRED";

/// Surgical service for the elective-surgery component
fn is_surgical_service(service: &str) -> bool {
    service.to_lowercase().contains("surg") || service == "ORTHO"
}

/// Surgical service recorded before the end of the first ICU day
pub fn surgical_first_day(stay: &IcuStay, services: &[&ServiceTransfer]) -> bool {
    let cutoff = stay.icu_intime + Duration::days(1);
    services
        .iter()
        .filter(|s| s.transfertime < cutoff)
        .any(|s| s.curr_service.as_deref().is_some_and(is_surgical_service))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeGroup {
    Neonate,
    Middle,
    Adult,
}

impl AgeGroup {
    pub fn from_years(years: i32) -> Self {
        if years <= 1 {
            AgeGroup::Neonate
        } else if years <= 15 {
            AgeGroup::Middle
        } else {
            AgeGroup::Adult
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Neonate => "neonate",
            AgeGroup::Middle => "middle",
            AgeGroup::Adult => "adult",
        }
    }
}

/// Died during the ICU stay
pub fn icustay_expired(stay: &IcuStay) -> bool {
    let died_in_unit = match (stay.deathtime, stay.icu_outtime) {
        (Some(death), Some(out)) => death >= stay.icu_intime && death <= out,
        _ => false,
    };
    // Death charted before admission is a data entry slip
    let died_before_admission = stay.deathtime.is_some_and(|d| d <= stay.icu_intime);
    let discharged_dead = match (stay.dischtime, stay.icu_outtime) {
        (Some(disch), Some(out)) => disch <= out && stay.discharge_location.as_deref() == Some(DEAD),
        _ => false,
    };
    died_in_unit || died_before_admission || discharged_dead
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OasisInputs {
    /// Minutes from hospital to ICU admission
    pub preiculos: Option<f64>,
    pub age: Option<f64>,
    pub mingcs: Option<f64>,
    pub heartrate: MinMax,
    pub meanbp: MinMax,
    pub resprate: MinMax,
    pub tempc: MinMax,
    pub urineoutput: Option<f64>,
    pub mechvent: Option<bool>,
    pub electivesurgery: Option<bool>,
}

const PREICULOS: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.preiculos.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| lt(i.preiculos, 10.2), score: Some(5) },
    Bucket { when: |i: &OasisInputs| lt(i.preiculos, 297.0), score: Some(3) },
    Bucket { when: |i: &OasisInputs| lt(i.preiculos, 1440.0), score: Some(0) },
    Bucket { when: |i: &OasisInputs| lt(i.preiculos, 18708.0), score: Some(1) },
    Bucket { when: |_: &OasisInputs| true, score: Some(2) },
];

const AGE: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.age.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| lt(i.age, 24.0), score: Some(0) },
    Bucket { when: |i: &OasisInputs| le(i.age, 53.0), score: Some(3) },
    Bucket { when: |i: &OasisInputs| le(i.age, 77.0), score: Some(6) },
    Bucket { when: |i: &OasisInputs| le(i.age, 89.0), score: Some(9) },
    Bucket { when: |i: &OasisInputs| ge(i.age, 90.0), score: Some(7) },
    Bucket { when: |_: &OasisInputs| true, score: Some(0) },
];

const GCS: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.mingcs.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| le(i.mingcs, 7.0), score: Some(10) },
    Bucket { when: |i: &OasisInputs| lt(i.mingcs, 14.0), score: Some(4) },
    Bucket { when: |i: &OasisInputs| i.mingcs == Some(14.0), score: Some(3) },
    Bucket { when: |_: &OasisInputs| true, score: Some(0) },
];

const HEARTRATE: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.heartrate.max.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| gt(i.heartrate.max, 125.0), score: Some(6) },
    Bucket { when: |i: &OasisInputs| lt(i.heartrate.min, 33.0), score: Some(4) },
    Bucket { when: |i: &OasisInputs| between(i.heartrate.max, 107.0, 125.0), score: Some(3) },
    Bucket { when: |i: &OasisInputs| between(i.heartrate.max, 89.0, 106.0), score: Some(1) },
    Bucket { when: |_: &OasisInputs| true, score: Some(0) },
];

const MEANBP: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.meanbp.min.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| lt(i.meanbp.min, 20.65), score: Some(4) },
    Bucket { when: |i: &OasisInputs| lt(i.meanbp.min, 51.0), score: Some(3) },
    Bucket { when: |i: &OasisInputs| gt(i.meanbp.max, 143.44), score: Some(3) },
    Bucket {
        when: |i: &OasisInputs| ge(i.meanbp.min, 51.0) && lt(i.meanbp.min, 61.33),
        score: Some(2),
    },
    Bucket { when: |_: &OasisInputs| true, score: Some(0) },
];

const RESPRATE: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.resprate.min.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| lt(i.resprate.min, 6.0), score: Some(10) },
    Bucket { when: |i: &OasisInputs| gt(i.resprate.max, 44.0), score: Some(9) },
    Bucket { when: |i: &OasisInputs| gt(i.resprate.max, 30.0), score: Some(6) },
    Bucket { when: |i: &OasisInputs| gt(i.resprate.max, 22.0), score: Some(1) },
    Bucket { when: |i: &OasisInputs| lt(i.resprate.min, 13.0), score: Some(1) },
    Bucket { when: |_: &OasisInputs| true, score: Some(0) },
];

const TEMPERATURE: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.tempc.max.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| gt(i.tempc.max, 39.88), score: Some(6) },
    Bucket { when: |i: &OasisInputs| between(i.tempc.min, 33.22, 35.93), score: Some(4) },
    Bucket { when: |i: &OasisInputs| between(i.tempc.max, 33.22, 35.93), score: Some(4) },
    Bucket { when: |i: &OasisInputs| lt(i.tempc.min, 33.22), score: Some(3) },
    Bucket {
        when: |i: &OasisInputs| gt(i.tempc.min, 35.93) && le(i.tempc.min, 36.39),
        score: Some(2),
    },
    Bucket { when: |i: &OasisInputs| between(i.tempc.max, 36.89, 39.88), score: Some(2) },
    Bucket { when: |_: &OasisInputs| true, score: Some(0) },
];

const URINE_OUTPUT: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.urineoutput.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| lt(i.urineoutput, 671.09), score: Some(10) },
    Bucket { when: |i: &OasisInputs| gt(i.urineoutput, 6896.80), score: Some(8) },
    Bucket { when: |i: &OasisInputs| between(i.urineoutput, 671.09, 1426.99), score: Some(5) },
    Bucket { when: |i: &OasisInputs| between(i.urineoutput, 1427.00, 2544.14), score: Some(1) },
    Bucket { when: |_: &OasisInputs| true, score: Some(0) },
];

const MECHVENT: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.mechvent.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| i.mechvent == Some(true), score: Some(9) },
    Bucket { when: |_: &OasisInputs| true, score: Some(0) },
];

const ELECTIVE_SURGERY: &[Bucket<OasisInputs>] = &[
    Bucket { when: |i: &OasisInputs| i.electivesurgery.is_none(), score: None },
    Bucket { when: |i: &OasisInputs| i.electivesurgery == Some(true), score: Some(0) },
    Bucket { when: |_: &OasisInputs| true, score: Some(6) },
];

fn midpoint(range: MinMax) -> Option<f64> {
    Some((range.min? + range.max?) / 2.0)
}

/// Heart rate value that drove the component
fn worst_heartrate(hr: MinMax) -> Option<f64> {
    if hr.max.is_none() {
        None
    } else if gt(hr.max, 125.0) {
        hr.max
    } else if lt(hr.min, 33.0) {
        hr.min
    } else if between(hr.max, 107.0, 125.0) || between(hr.max, 89.0, 106.0) {
        hr.max
    } else {
        midpoint(hr)
    }
}

fn worst_meanbp(bp: MinMax) -> Option<f64> {
    if bp.min.is_none() {
        None
    } else if lt(bp.min, 51.0) {
        bp.min
    } else if gt(bp.max, 143.44) {
        bp.max
    } else if lt(bp.min, 61.33) {
        bp.min
    } else {
        midpoint(bp)
    }
}

fn worst_resprate(rr: MinMax) -> Option<f64> {
    if rr.min.is_none() {
        None
    } else if lt(rr.min, 6.0) {
        rr.min
    } else if gt(rr.max, 22.0) {
        rr.max
    } else if lt(rr.min, 13.0) {
        rr.min
    } else {
        midpoint(rr)
    }
}

fn worst_temperature(t: MinMax) -> Option<f64> {
    if t.max.is_none() {
        None
    } else if gt(t.max, 39.88) {
        t.max
    } else if between(t.min, 33.22, 35.93) {
        t.min
    } else if between(t.max, 33.22, 35.93) {
        t.max
    } else if lt(t.min, 33.22) {
        t.min
    } else if gt(t.min, 35.93) && le(t.min, 36.39) {
        t.min
    } else if between(t.max, 36.89, 39.88) {
        t.max
    } else {
        midpoint(t)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OasisScore {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub icustay_age_group: AgeGroup,
    pub hospital_expire_flag: Option<i32>,
    pub icustay_expire_flag: bool,
    pub oasis: u32,
    pub oasis_prob: f64,
    pub inputs: OasisInputs,
    pub age_score: SubScore,
    pub preiculos_score: SubScore,
    pub gcs_score: SubScore,
    pub heartrate_score: SubScore,
    pub meanbp_score: SubScore,
    pub resprate_score: SubScore,
    pub temp_score: SubScore,
    pub urineoutput_score: SubScore,
    pub mechvent_score: SubScore,
    pub electivesurgery_score: SubScore,
}

impl OasisScore {
    pub fn from_inputs(stay: &IcuStay, inputs: OasisInputs) -> Self {
        let age_score = cascade(&inputs, AGE);
        let preiculos_score = cascade(&inputs, PREICULOS);
        let gcs_score = cascade(&inputs, GCS);
        let heartrate_score = cascade(&inputs, HEARTRATE);
        let meanbp_score = cascade(&inputs, MEANBP);
        let resprate_score = cascade(&inputs, RESPRATE);
        let temp_score = cascade(&inputs, TEMPERATURE);
        let urineoutput_score = cascade(&inputs, URINE_OUTPUT);
        let mechvent_score = cascade(&inputs, MECHVENT);
        let electivesurgery_score = cascade(&inputs, ELECTIVE_SURGERY);

        let oasis = total(&[
            age_score,
            preiculos_score,
            gcs_score,
            heartrate_score,
            meanbp_score,
            resprate_score,
            temp_score,
            urineoutput_score,
            mechvent_score,
            electivesurgery_score,
        ]);

        Self {
            subject_id: stay.subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            icustay_age_group: AgeGroup::from_years(completed_years(stay.dob, stay.icu_intime)),
            hospital_expire_flag: stay.hospital_expire_flag,
            icustay_expire_flag: icustay_expired(stay),
            oasis,
            oasis_prob: logistic(-6.1746 + 0.1275 * oasis as f64),
            inputs,
            age_score,
            preiculos_score,
            gcs_score,
            heartrate_score,
            meanbp_score,
            resprate_score,
            temp_score,
            urineoutput_score,
            mechvent_score,
            electivesurgery_score,
        }
    }
}

pub fn oasis_inputs(stay: &IcuStay, first_day: &FirstDayIndex, services: &[&ServiceTransfer]) -> OasisInputs {
    let id = stay.icustay_id;
    let preiculos = (stay.icu_intime - stay.admittime).num_seconds() as f64 / 60.0;
    let electivesurgery = stay
        .admission_type
        .as_deref()
        .map(|kind| kind == ELECTIVE && surgical_first_day(stay, services));

    OasisInputs {
        preiculos: Some(preiculos),
        age: Some(completed_years(stay.dob, stay.icu_intime) as f64),
        mingcs: first_day.mingcs(id),
        heartrate: range_of(first_day.vital(id, VitalSign::HeartRate)),
        meanbp: range_of(first_day.vital(id, VitalSign::MeanBp)),
        resprate: range_of(first_day.vital(id, VitalSign::RespRate)),
        tempc: range_of(first_day.vital(id, VitalSign::TempC)),
        urineoutput: first_day.urine_output(id),
        mechvent: first_day.ventilated_first_day(id),
        electivesurgery,
    }
}

pub fn compute_oasis(
    cohort: &[IcuStay],
    first_day: &FirstDayIndex,
    services: &[ServiceTransfer],
) -> Vec<OasisScore> {
    let mut by_hadm: HashMap<i32, Vec<&ServiceTransfer>> = HashMap::new();
    for service in services {
        by_hadm.entry(service.hadm_id).or_default().push(service);
    }

    let rows: Vec<OasisScore> = cohort
        .iter()
        .map(|stay| {
            let stay_services = by_hadm.get(&stay.hadm_id).map(Vec::as_slice).unwrap_or(&[]);
            OasisScore::from_inputs(stay, oasis_inputs(stay, first_day, stay_services))
        })
        .collect();

    info!("Computed OASIS for {} stays", rows.len());
    rows
}

impl TableRow for OasisScore {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::text("icustay_age_group"),
            Column::int("hospital_expire_flag"),
            Column::int("icustay_expire_flag"),
            Column::int("oasis"),
            Column::float("oasis_prob"),
            Column::float("age"),
            Column::int("age_score"),
            Column::float("preiculos"),
            Column::int("preiculos_score"),
            Column::float("gcs"),
            Column::int("gcs_score"),
            Column::float("heartrate"),
            Column::int("heartrate_score"),
            Column::float("meanbp"),
            Column::int("meanbp_score"),
            Column::float("resprate"),
            Column::int("resprate_score"),
            Column::float("temp"),
            Column::int("temp_score"),
            Column::float("urineoutput"),
            Column::int("urineoutput_score"),
            Column::int("mechvent"),
            Column::int("mechvent_score"),
            Column::int("electivesurgery"),
            Column::int("electivesurgery_score"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        let i = &self.inputs;
        vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            self.icustay_age_group.as_str().into(),
            self.hospital_expire_flag.into(),
            self.icustay_expire_flag.into(),
            self.oasis.into(),
            self.oasis_prob.into(),
            i.age.into(),
            self.age_score.into(),
            i.preiculos.into(),
            self.preiculos_score.into(),
            i.mingcs.into(),
            self.gcs_score.into(),
            worst_heartrate(i.heartrate).into(),
            self.heartrate_score.into(),
            worst_meanbp(i.meanbp).into(),
            self.meanbp_score.into(),
            worst_resprate(i.resprate).into(),
            self.resprate_score.into(),
            worst_temperature(i.tempc).into(),
            self.temp_score.into(),
            i.urineoutput.into(),
            self.urineoutput_score.into(),
            i.mechvent.into(),
            self.mechvent_score.into(),
            i.electivesurgery.into(),
            self.electivesurgery_score.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stay, ts};

    fn range(min: f64, max: f64) -> MinMax {
        MinMax { min: Some(min), max: Some(max) }
    }

    fn service(time: &str, name: &str) -> ServiceTransfer {
        ServiceTransfer { hadm_id: 10, transfertime: ts(time), curr_service: Some(name.to_string()) }
    }

    #[test]
    fn test_component_buckets() {
        let stay = stay(1, 10, 100);
        let inputs = OasisInputs {
            preiculos: Some(360.0),
            age: Some(59.0),
            mingcs: Some(14.0),
            heartrate: range(70.0, 110.0),
            meanbp: range(55.0, 90.0),
            resprate: range(14.0, 20.0),
            tempc: range(36.5, 36.8),
            urineoutput: Some(1200.0),
            mechvent: Some(false),
            electivesurgery: Some(false),
        };
        let score = OasisScore::from_inputs(&stay, inputs);
        assert_eq!(score.preiculos_score, Some(0));
        assert_eq!(score.age_score, Some(6));
        assert_eq!(score.gcs_score, Some(3));
        assert_eq!(score.heartrate_score, Some(3));
        assert_eq!(score.meanbp_score, Some(2));
        assert_eq!(score.resprate_score, Some(0));
        assert_eq!(score.temp_score, Some(0));
        assert_eq!(score.urineoutput_score, Some(5));
        assert_eq!(score.mechvent_score, Some(0));
        assert_eq!(score.electivesurgery_score, Some(6));
        assert_eq!(score.oasis, 25);
        assert!((score.oasis_prob - logistic(-6.1746 + 0.1275 * 25.0)).abs() < 1e-12);
    }

    #[test]
    fn test_missing_inputs_are_null_not_zero() {
        let stay = stay(1, 10, 100);
        let score = OasisScore::from_inputs(&stay, OasisInputs::default());
        assert_eq!(score.gcs_score, None);
        assert_eq!(score.urineoutput_score, None);
        assert_eq!(score.oasis, 0);
    }

    #[test]
    fn test_preiculos_boundaries() {
        let stay = stay(1, 10, 100);
        let score = |minutes: f64| {
            let inputs = OasisInputs { preiculos: Some(minutes), ..Default::default() };
            OasisScore::from_inputs(&stay, inputs).preiculos_score
        };
        assert_eq!(score(10.1), Some(5));
        assert_eq!(score(10.2), Some(3));
        assert_eq!(score(1440.0), Some(1));
        assert_eq!(score(18708.0), Some(2));
    }

    #[test]
    fn test_elective_surgery_needs_early_surgical_service() {
        let mut elective = stay(1, 10, 100);
        elective.admission_type = Some(ELECTIVE.to_string());
        let early = service("2150-01-01 01:00", "CSURG");
        let late = service("2150-01-02 09:00", "ORTHO");

        assert!(surgical_first_day(&elective, &[&early]));
        assert!(!surgical_first_day(&elective, &[&late]));
        assert!(surgical_first_day(&elective, &[&service("2150-01-01 05:00", "ORTHO")]));
        assert!(!surgical_first_day(&elective, &[&service("2150-01-01 05:00", "MED")]));
    }

    #[test]
    fn test_icustay_expire_flag() {
        let mut died = stay(1, 10, 100);
        died.deathtime = Some(ts("2150-01-02 10:00"));
        assert!(icustay_expired(&died));

        let mut discharged_dead = stay(2, 20, 200);
        discharged_dead.dischtime = Some(ts("2150-01-03 10:00"));
        discharged_dead.discharge_location = Some(DEAD.to_string());
        assert!(icustay_expired(&discharged_dead));

        assert!(!icustay_expired(&stay(3, 30, 300)));
    }

    #[test]
    fn test_worst_values() {
        assert_eq!(worst_heartrate(range(30.0, 100.0)), Some(30.0));
        assert_eq!(worst_heartrate(range(70.0, 80.0)), Some(75.0));
        assert_eq!(worst_temperature(range(36.0, 38.0)), Some(36.0));
        assert_eq!(worst_resprate(range(12.0, 18.0)), Some(12.0));
    }

    #[test]
    fn test_age_group() {
        assert_eq!(AgeGroup::from_years(1), AgeGroup::Neonate);
        assert_eq!(AgeGroup::from_years(15), AgeGroup::Middle);
        assert_eq!(AgeGroup::from_years(16).as_str(), "adult");
    }
}
