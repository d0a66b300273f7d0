// ==============================================================================
// cohort.rs - ICU Cohort Selection
// ==============================================================================
// Description: First ICU stay per patient, restricted to ages 16-89
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::models::{Admission, IcuStay, IcuStayRecord, Patient};
use crate::table::{Column, SqlValue, TableRow};

pub const MIN_AGE: f64 = 16.0;
pub const MAX_AGE: f64 = 89.0;

/// Average days per year used for the age calculation
const DAYS_PER_YEAR: f64 = 365.242;

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Select the cohort of first ICU stays.
///
/// The first stay is chosen per patient before the age filter is applied,
/// so a patient whose first stay was paediatric never enters the cohort
/// through a later stay. Identical intimes resolve to the lowest icustay_id.
///
/// # Returns
/// One row per qualifying patient, ordered by subject_id
pub fn select_cohort(
    patients: &[Patient],
    admissions: &[Admission],
    icustays: &[IcuStayRecord],
) -> Vec<IcuStay> {
    let mut first_stays: BTreeMap<i32, &IcuStayRecord> = BTreeMap::new();
    for stay in icustays {
        first_stays
            .entry(stay.subject_id)
            .and_modify(|current| {
                if (stay.intime, stay.icustay_id) < (current.intime, current.icustay_id) {
                    *current = stay;
                }
            })
            .or_insert(stay);
    }

    let patients: HashMap<i32, &Patient> = patients.iter().map(|p| (p.subject_id, p)).collect();
    let admissions: HashMap<(i32, i32), &Admission> = admissions
        .iter()
        .map(|a| ((a.subject_id, a.hadm_id), a))
        .collect();

    let mut cohort = Vec::new();
    for (subject_id, stay) in first_stays {
        let (Some(patient), Some(admission)) = (
            patients.get(&subject_id),
            admissions.get(&(subject_id, stay.hadm_id)),
        ) else {
            debug!("Skipping stay {}: no matching patient or admission", stay.icustay_id);
            continue;
        };

        let days = (stay.intime.date() - patient.dob.date()).num_days();
        let age = round_to(days as f64 / DAYS_PER_YEAR, 2);
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            continue;
        }

        cohort.push(IcuStay {
            subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            gender: patient.gender.clone(),
            dob: patient.dob,
            icu_intime: stay.intime,
            icu_outtime: stay.outtime,
            admittime: admission.admittime,
            dischtime: admission.dischtime,
            deathtime: admission.deathtime,
            admission_type: admission.admission_type.clone(),
            discharge_location: admission.discharge_location.clone(),
            hospital_expire_flag: admission.hospital_expire_flag,
            age,
        });
    }

    info!("Selected {} first ICU stays from {} stays", cohort.len(), icustays.len());
    cohort
}

impl TableRow for IcuStay {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::text("gender"),
            Column::timestamp("icu_intime"),
            Column::timestamp("icu_outtime"),
            Column::timestamp("admittime"),
            Column::timestamp("dischtime"),
            Column::timestamp("deathtime"),
            Column::text("admission_type"),
            Column::float("age"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            (&self.gender).into(),
            self.icu_intime.into(),
            self.icu_outtime.into(),
            self.admittime.into(),
            self.dischtime.into(),
            self.deathtime.into(),
            (&self.admission_type).into(),
            self.age.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ts;

    fn patient(subject_id: i32, dob: &str) -> Patient {
        Patient { subject_id, gender: Some("F".to_string()), dob: ts(dob) }
    }

    fn admission(subject_id: i32, hadm_id: i32) -> Admission {
        Admission {
            subject_id,
            hadm_id,
            admittime: ts("2150-01-01 00:00"),
            dischtime: Some(ts("2150-01-20 00:00")),
            deathtime: None,
            admission_type: Some("EMERGENCY".to_string()),
            discharge_location: Some("HOME".to_string()),
            hospital_expire_flag: Some(0),
        }
    }

    fn stay(subject_id: i32, hadm_id: i32, icustay_id: i32, intime: &str) -> IcuStayRecord {
        IcuStayRecord { subject_id, hadm_id, icustay_id, intime: ts(intime), outtime: None }
    }

    #[test]
    fn test_first_stay_per_patient() {
        let patients = vec![patient(1, "2100-01-01 00:00")];
        let admissions = vec![admission(1, 10), admission(1, 11)];
        let stays = vec![
            stay(1, 11, 201, "2150-03-01 00:00"),
            stay(1, 10, 200, "2150-01-02 00:00"),
        ];

        let cohort = select_cohort(&patients, &admissions, &stays);
        assert_eq!(cohort.len(), 1);
        assert_eq!(cohort[0].icustay_id, 200);
        assert_eq!(cohort[0].hadm_id, 10);
    }

    #[test]
    fn test_identical_intime_picks_lowest_icustay() {
        let patients = vec![patient(1, "2100-01-01 00:00")];
        let admissions = vec![admission(1, 10)];
        let stays = vec![
            stay(1, 10, 305, "2150-01-02 00:00"),
            stay(1, 10, 301, "2150-01-02 00:00"),
        ];

        let cohort = select_cohort(&patients, &admissions, &stays);
        assert_eq!(cohort[0].icustay_id, 301);
    }

    #[test]
    fn test_age_filter_applies_after_first_stay() {
        // Patient 1 is 15 at the first stay and 20 at the second: excluded.
        let patients = vec![patient(1, "2135-01-01 00:00"), patient(2, "2080-01-01 00:00")];
        let admissions = vec![admission(1, 10), admission(1, 11), admission(2, 20)];
        let stays = vec![
            stay(1, 10, 100, "2150-01-02 00:00"),
            stay(1, 11, 101, "2155-06-01 00:00"),
            stay(2, 20, 200, "2150-01-02 00:00"),
        ];

        let cohort = select_cohort(&patients, &admissions, &stays);
        assert_eq!(cohort.len(), 1);
        assert_eq!(cohort[0].subject_id, 2);
        assert_eq!(cohort[0].age, 70.0);
    }

    #[test]
    fn test_age_is_rounded_to_two_decimals() {
        let patients = vec![patient(1, "2100-01-01 00:00")];
        let admissions = vec![admission(1, 10)];
        let stays = vec![stay(1, 10, 100, "2150-01-02 12:00")];

        let cohort = select_cohort(&patients, &admissions, &stays);
        // 18263 days / 365.242
        assert_eq!(cohort[0].age, 50.0);
    }

    #[test]
    fn test_stay_without_admission_is_skipped() {
        let patients = vec![patient(1, "2100-01-01 00:00")];
        let stays = vec![stay(1, 10, 100, "2150-01-02 00:00")];

        assert!(select_cohort(&patients, &[], &stays).is_empty());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234, 2), 1.23);
        assert_eq!(round_to(2.345, 0), 2.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
    }
}
