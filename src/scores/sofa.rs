// ==============================================================================
// sofa.rs - Sequential Organ Failure Assessment
// ==============================================================================
// Description: First-day SOFA score per ICU stay from respiration,
//              coagulation, liver, cardiovascular, CNS and renal components
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::Duration;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{between, cascade, ge, gt, le, lt, total, Bucket, FirstDayIndex, SubScore};
use crate::aggregate::blood_gas::ArterialBloodGas;
use crate::aggregate::echo::{EchoRecord, LB_TO_KG};
use crate::aggregate::labs::LabTest;
use crate::aggregate::ventilation::EpisodeIndex;
use crate::aggregate::vitals::VitalSign;
use crate::aggregate::{min_opt, Accumulator, Window};
use crate::models::{ChartEvent, IcuStay, InputEventCv, InputEventMv};
use crate::table::{Column, SqlValue, TableRow};

const WEIGHT_KG_ITEMS: &[i32] = &[762, 763, 3723, 3580, 226512];
const WEIGHT_LB_ITEM: i32 = 3581;
const WEIGHT_OZ_ITEM: i32 = 3582;
const OZ_TO_KG: f64 = 0.0283495231;

/// Chart items carrying an admission weight
pub const WEIGHT_ITEM_IDS: &[i32] = &[762, 763, 3723, 3580, 226512, WEIGHT_LB_ITEM, WEIGHT_OZ_ITEM];

pub const CAREVUE_VASOPRESSOR_ITEM_IDS: &[i32] =
    &[30047, 30120, 30044, 30119, 30309, 30043, 30307, 30042, 30306];
pub const METAVISION_VASOPRESSOR_ITEM_IDS: &[i32] = &[221906, 221289, 221662, 221653];

/// MetaVision status of superseded infusion rows
const REWRITTEN: &str = "Rewritten";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vasopressor {
    Norepinephrine,
    Epinephrine,
    Dopamine,
    Dobutamine,
}

/// CareVue item, and whether its rate is per minute and needs dividing by weight
fn carevue_drug(itemid: i32) -> Option<(Vasopressor, bool)> {
    Some(match itemid {
        30047 => (Vasopressor::Norepinephrine, true),
        30120 => (Vasopressor::Norepinephrine, false),
        30044 => (Vasopressor::Epinephrine, true),
        30119 | 30309 => (Vasopressor::Epinephrine, false),
        30043 | 30307 => (Vasopressor::Dopamine, false),
        30042 | 30306 => (Vasopressor::Dobutamine, false),
        _ => return None,
    })
}

fn metavision_drug(itemid: i32) -> Option<Vasopressor> {
    Some(match itemid {
        221906 => Vasopressor::Norepinephrine,
        221289 => Vasopressor::Epinephrine,
        221662 => Vasopressor::Dopamine,
        221653 => Vasopressor::Dobutamine,
        _ => return None,
    })
}

/// Maximum first-day infusion rate per drug, mcg/kg/min
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VasopressorRates {
    pub norepinephrine: Option<f64>,
    pub epinephrine: Option<f64>,
    pub dopamine: Option<f64>,
    pub dobutamine: Option<f64>,
}

impl VasopressorRates {
    fn slot(&mut self, drug: Vasopressor) -> &mut Option<f64> {
        match drug {
            Vasopressor::Norepinephrine => &mut self.norepinephrine,
            Vasopressor::Epinephrine => &mut self.epinephrine,
            Vasopressor::Dopamine => &mut self.dopamine,
            Vasopressor::Dobutamine => &mut self.dobutamine,
        }
    }

    fn record(&mut self, drug: Vasopressor, rate: f64) {
        let slot = self.slot(drug);
        *slot = Some(slot.map_or(rate, |r| r.max(rate)));
    }

    /// Per-drug fallback to `other` where this source has nothing
    pub fn or(self, other: VasopressorRates) -> VasopressorRates {
        VasopressorRates {
            norepinephrine: self.norepinephrine.or(other.norepinephrine),
            epinephrine: self.epinephrine.or(other.epinephrine),
            dopamine: self.dopamine.or(other.dopamine),
            dobutamine: self.dobutamine.or(other.dobutamine),
        }
    }
}

fn chart_weight_kg(itemid: i32, value: f64) -> Option<f64> {
    if WEIGHT_KG_ITEMS.contains(&itemid) {
        Some(value)
    } else if itemid == WEIGHT_LB_ITEM {
        Some(value * LB_TO_KG)
    } else if itemid == WEIGHT_OZ_ITEM {
        Some(value * OZ_TO_KG)
    } else {
        None
    }
}

/// Average admission weight in kg per stay.
///
/// Charted weights within a day either side of intime are preferred; stays
/// without one fall back to echo reports from the week before admission.
pub fn admission_weights(
    cohort: &[IcuStay],
    chartevents: &[ChartEvent],
    echo: &[EchoRecord],
) -> HashMap<i32, f64> {
    let mut charted: HashMap<i32, Accumulator> = HashMap::new();
    let windows: HashMap<i32, Window> = cohort
        .iter()
        .map(|s| (s.icustay_id, Window::closed(s.icu_intime - Duration::days(1), s.icu_intime + Duration::days(1))))
        .collect();

    for event in chartevents.iter().filter(|e| !e.error) {
        let Some(window) = windows.get(&event.icustay_id) else {
            continue;
        };
        let Some(value) = event.valuenum.filter(|v| *v != 0.0) else {
            continue;
        };
        if !window.contains(event.charttime) {
            continue;
        }
        if let Some(kg) = chart_weight_kg(event.itemid, value) {
            charted.entry(event.icustay_id).or_default().push(kg);
        }
    }

    let mut echo_by_hadm: HashMap<i32, Vec<&EchoRecord>> = HashMap::new();
    for record in echo {
        if let Some(hadm_id) = record.hadm_id {
            echo_by_hadm.entry(hadm_id).or_default().push(record);
        }
    }

    let mut weights = HashMap::new();
    for stay in cohort {
        let from_chart = charted.get(&stay.icustay_id).and_then(Accumulator::mean);
        let from_echo = || {
            let earliest = stay.icu_intime - Duration::days(7);
            let latest = stay.icu_intime + Duration::days(1);
            let mut acc = Accumulator::default();
            for record in echo_by_hadm.get(&stay.hadm_id).into_iter().flatten() {
                let in_range = record.charttime.is_some_and(|t| t > earliest && t < latest);
                if let (true, Some(kg)) = (in_range, record.weight_kg()) {
                    acc.push(kg);
                }
            }
            acc.mean()
        };
        if let Some(weight) = from_chart.or_else(from_echo) {
            weights.insert(stay.icustay_id, weight);
        }
    }

    debug!("Resolved admission weight for {} of {} stays", weights.len(), cohort.len());
    weights
}

/// First-day vasopressor rates per stay; CareVue preferred over MetaVision
pub fn vasopressor_rates(
    cohort: &[IcuStay],
    weights: &HashMap<i32, f64>,
    inputevents_cv: &[InputEventCv],
    inputevents_mv: &[InputEventMv],
) -> HashMap<i32, VasopressorRates> {
    let windows: HashMap<i32, Window> = cohort
        .iter()
        .map(|s| (s.icustay_id, Window::closed(s.icu_intime, s.icu_intime + Duration::days(1))))
        .collect();

    let mut carevue: HashMap<i32, VasopressorRates> = HashMap::new();
    for event in inputevents_cv {
        let (Some(window), Some((drug, per_weight)), Some(rate)) =
            (windows.get(&event.icustay_id), carevue_drug(event.itemid), event.rate)
        else {
            continue;
        };
        if !window.contains(event.charttime) {
            continue;
        }
        let rates = carevue.entry(event.icustay_id).or_default();
        let normalized = if per_weight {
            weights.get(&event.icustay_id).map(|w| rate / w)
        } else {
            Some(rate)
        };
        if let Some(value) = normalized {
            rates.record(drug, value);
        }
    }

    let mut metavision: HashMap<i32, VasopressorRates> = HashMap::new();
    for event in inputevents_mv {
        let (Some(window), Some(drug)) = (windows.get(&event.icustay_id), metavision_drug(event.itemid)) else {
            continue;
        };
        let current = event.statusdescription.as_deref().is_some_and(|s| s != REWRITTEN);
        if !current || !window.contains(event.starttime) {
            continue;
        }
        let rates = metavision.entry(event.icustay_id).or_default();
        if let Some(rate) = event.rate {
            rates.record(drug, rate);
        }
    }

    cohort
        .iter()
        .map(|stay| {
            let cv = carevue.get(&stay.icustay_id).copied().unwrap_or_default();
            let mv = metavision.get(&stay.icustay_id).copied().unwrap_or_default();
            (stay.icustay_id, cv.or(mv))
        })
        .collect()
}

/// Minimum PaO2/FiO2 inside and outside ventilation episodes
pub fn split_pao2fio2(gases: &[&ArterialBloodGas], episodes: &EpisodeIndex) -> (Option<f64>, Option<f64>) {
    let mut vent = None;
    let mut novent = None;
    for gas in gases {
        if episodes.is_ventilated_at(gas.icustay_id(), gas.charttime()) {
            vent = min_opt(vent, gas.pao2fio2);
        } else {
            novent = min_opt(novent, gas.pao2fio2);
        }
    }
    (vent, novent)
}

/// Everything the SOFA components read for one stay
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SofaInputs {
    pub meanbp_min: Option<f64>,
    pub rates: VasopressorRates,
    pub creatinine_max: Option<f64>,
    pub bilirubin_max: Option<f64>,
    pub platelet_min: Option<f64>,
    pub pao2fio2_vent_min: Option<f64>,
    pub pao2fio2_novent_min: Option<f64>,
    pub urineoutput: Option<f64>,
    pub mingcs: Option<f64>,
}

const RESPIRATION: &[Bucket<SofaInputs>] = &[
    Bucket { when: |i: &SofaInputs| lt(i.pao2fio2_vent_min, 100.0), score: Some(4) },
    Bucket { when: |i: &SofaInputs| lt(i.pao2fio2_vent_min, 200.0), score: Some(3) },
    Bucket { when: |i: &SofaInputs| lt(i.pao2fio2_novent_min, 300.0), score: Some(2) },
    Bucket { when: |i: &SofaInputs| lt(i.pao2fio2_novent_min, 400.0), score: Some(1) },
    Bucket {
        when: |i: &SofaInputs| i.pao2fio2_vent_min.is_none() && i.pao2fio2_novent_min.is_none(),
        score: None,
    },
    Bucket { when: |_: &SofaInputs| true, score: Some(0) },
];

const COAGULATION: &[Bucket<SofaInputs>] = &[
    Bucket { when: |i: &SofaInputs| lt(i.platelet_min, 20.0), score: Some(4) },
    Bucket { when: |i: &SofaInputs| lt(i.platelet_min, 50.0), score: Some(3) },
    Bucket { when: |i: &SofaInputs| lt(i.platelet_min, 100.0), score: Some(2) },
    Bucket { when: |i: &SofaInputs| lt(i.platelet_min, 150.0), score: Some(1) },
    Bucket { when: |i: &SofaInputs| i.platelet_min.is_none(), score: None },
    Bucket { when: |_: &SofaInputs| true, score: Some(0) },
];

const LIVER: &[Bucket<SofaInputs>] = &[
    Bucket { when: |i: &SofaInputs| ge(i.bilirubin_max, 12.0), score: Some(4) },
    Bucket { when: |i: &SofaInputs| ge(i.bilirubin_max, 6.0), score: Some(3) },
    Bucket { when: |i: &SofaInputs| ge(i.bilirubin_max, 2.0), score: Some(2) },
    Bucket { when: |i: &SofaInputs| ge(i.bilirubin_max, 1.2), score: Some(1) },
    Bucket { when: |i: &SofaInputs| i.bilirubin_max.is_none(), score: None },
    Bucket { when: |_: &SofaInputs| true, score: Some(0) },
];

// Any epinephrine or norepinephrine at all scores at least 3
const CARDIOVASCULAR: &[Bucket<SofaInputs>] = &[
    Bucket {
        when: |i: &SofaInputs| {
            gt(i.rates.dopamine, 15.0) || gt(i.rates.epinephrine, 0.1) || gt(i.rates.norepinephrine, 0.1)
        },
        score: Some(4),
    },
    Bucket {
        when: |i: &SofaInputs| {
            gt(i.rates.dopamine, 5.0) || le(i.rates.epinephrine, 0.1) || le(i.rates.norepinephrine, 0.1)
        },
        score: Some(3),
    },
    Bucket {
        when: |i: &SofaInputs| gt(i.rates.dopamine, 0.0) || gt(i.rates.dobutamine, 0.0),
        score: Some(2),
    },
    Bucket { when: |i: &SofaInputs| lt(i.meanbp_min, 70.0), score: Some(1) },
    Bucket {
        when: |i: &SofaInputs| {
            i.meanbp_min.is_none()
                && i.rates.dopamine.is_none()
                && i.rates.dobutamine.is_none()
                && i.rates.epinephrine.is_none()
                && i.rates.norepinephrine.is_none()
        },
        score: None,
    },
    Bucket { when: |_: &SofaInputs| true, score: Some(0) },
];

const CNS: &[Bucket<SofaInputs>] = &[
    Bucket { when: |i: &SofaInputs| between(i.mingcs, 13.0, 14.0), score: Some(1) },
    Bucket { when: |i: &SofaInputs| between(i.mingcs, 10.0, 12.0), score: Some(2) },
    Bucket { when: |i: &SofaInputs| between(i.mingcs, 6.0, 9.0), score: Some(3) },
    Bucket { when: |i: &SofaInputs| lt(i.mingcs, 6.0), score: Some(4) },
    Bucket { when: |i: &SofaInputs| i.mingcs.is_none(), score: None },
    Bucket { when: |_: &SofaInputs| true, score: Some(0) },
];

const RENAL: &[Bucket<SofaInputs>] = &[
    Bucket { when: |i: &SofaInputs| ge(i.creatinine_max, 5.0), score: Some(4) },
    Bucket { when: |i: &SofaInputs| lt(i.urineoutput, 200.0), score: Some(4) },
    Bucket { when: |i: &SofaInputs| ge(i.creatinine_max, 3.5), score: Some(3) },
    Bucket { when: |i: &SofaInputs| lt(i.urineoutput, 500.0), score: Some(3) },
    Bucket { when: |i: &SofaInputs| ge(i.creatinine_max, 2.0), score: Some(2) },
    Bucket { when: |i: &SofaInputs| ge(i.creatinine_max, 1.2), score: Some(1) },
    Bucket {
        when: |i: &SofaInputs| i.urineoutput.is_none() && i.creatinine_max.is_none(),
        score: None,
    },
    Bucket { when: |_: &SofaInputs| true, score: Some(0) },
];

#[derive(Debug, Clone, PartialEq)]
pub struct SofaScore {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub sofa: u32,
    pub respiration: SubScore,
    pub coagulation: SubScore,
    pub liver: SubScore,
    pub cardiovascular: SubScore,
    pub cns: SubScore,
    pub renal: SubScore,
}

impl SofaScore {
    pub fn from_inputs(stay: &IcuStay, inputs: &SofaInputs) -> Self {
        let respiration = cascade(inputs, RESPIRATION);
        let coagulation = cascade(inputs, COAGULATION);
        let liver = cascade(inputs, LIVER);
        let cardiovascular = cascade(inputs, CARDIOVASCULAR);
        let cns = cascade(inputs, CNS);
        let renal = cascade(inputs, RENAL);

        Self {
            subject_id: stay.subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            sofa: total(&[respiration, coagulation, liver, cardiovascular, cns, renal]),
            respiration,
            coagulation,
            liver,
            cardiovascular,
            cns,
            renal,
        }
    }
}

/// Raw sources SOFA reads beyond the first-day tables
#[derive(Debug, Clone, Copy)]
pub struct SofaSources<'a> {
    pub chartevents: &'a [ChartEvent],
    pub echo: &'a [EchoRecord],
    pub inputevents_cv: &'a [InputEventCv],
    pub inputevents_mv: &'a [InputEventMv],
}

/// Gather the SOFA inputs of every cohort stay
pub fn sofa_inputs(
    cohort: &[IcuStay],
    first_day: &FirstDayIndex,
    sources: &SofaSources,
) -> Vec<SofaInputs> {
    let weights = admission_weights(cohort, sources.chartevents, sources.echo);
    let rates = vasopressor_rates(cohort, &weights, sources.inputevents_cv, sources.inputevents_mv);
    let episodes = EpisodeIndex::new(first_day.episodes);

    cohort
        .iter()
        .map(|stay| {
            let id = stay.icustay_id;
            let (vent, novent) = split_pao2fio2(first_day.arterial(id), &episodes);
            SofaInputs {
                meanbp_min: first_day.vital(id, VitalSign::MeanBp).min,
                rates: rates.get(&id).copied().unwrap_or_default(),
                creatinine_max: first_day.lab(id, LabTest::Creatinine).max,
                bilirubin_max: first_day.lab(id, LabTest::Bilirubin).max,
                platelet_min: first_day.lab(id, LabTest::Platelet).min,
                pao2fio2_vent_min: vent,
                pao2fio2_novent_min: novent,
                urineoutput: first_day.urine_output(id),
                mingcs: first_day.mingcs(id),
            }
        })
        .collect()
}

pub fn compute_sofa(cohort: &[IcuStay], first_day: &FirstDayIndex, sources: &SofaSources) -> Vec<SofaScore> {
    let inputs = sofa_inputs(cohort, first_day, sources);
    let rows: Vec<SofaScore> = cohort
        .iter()
        .zip(&inputs)
        .map(|(stay, inputs)| SofaScore::from_inputs(stay, inputs))
        .collect();

    info!("Computed SOFA for {} stays", rows.len());
    rows
}

impl TableRow for SofaScore {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::int("sofa"),
            Column::int("respiration"),
            Column::int("coagulation"),
            Column::int("liver"),
            Column::int("cardiovascular"),
            Column::int("cns"),
            Column::int("renal"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            self.sofa.into(),
            self.respiration.into(),
            self.coagulation.into(),
            self.liver.into(),
            self.cardiovascular.into(),
            self.cns.into(),
            self.renal.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::blood_gas::{BloodGasPanel, GasField};
    use crate::aggregate::ventilation::VentilationEpisode;
    use crate::testing::{chart, stay, ts};

    fn cv(itemid: i32, charttime: &str, rate: f64) -> InputEventCv {
        InputEventCv { icustay_id: 100, itemid, charttime: ts(charttime), rate: Some(rate) }
    }

    fn mv(itemid: i32, starttime: &str, rate: f64, status: &str) -> InputEventMv {
        InputEventMv {
            icustay_id: 100,
            itemid,
            starttime: ts(starttime),
            rate: Some(rate),
            statusdescription: Some(status.to_string()),
        }
    }

    #[test]
    fn test_liver_boundary() {
        let stay = stay(1, 10, 100);
        let score = |bili: Option<f64>| {
            let inputs = SofaInputs { bilirubin_max: bili, ..Default::default() };
            SofaScore::from_inputs(&stay, &inputs).liver
        };
        assert_eq!(score(Some(1.2)), Some(1));
        assert_eq!(score(Some(1.19)), Some(0));
        assert_eq!(score(Some(12.0)), Some(4));
        assert_eq!(score(None), None);
    }

    #[test]
    fn test_respiration_prefers_ventilated_thresholds() {
        let stay = stay(1, 10, 100);
        let inputs = SofaInputs {
            pao2fio2_vent_min: Some(250.0),
            pao2fio2_novent_min: Some(350.0),
            ..Default::default()
        };
        assert_eq!(SofaScore::from_inputs(&stay, &inputs).respiration, Some(1));

        let inputs = SofaInputs { pao2fio2_vent_min: Some(150.0), ..Default::default() };
        assert_eq!(SofaScore::from_inputs(&stay, &inputs).respiration, Some(3));
    }

    #[test]
    fn test_any_catecholamine_scores_three() {
        let stay = stay(1, 10, 100);
        let rates = VasopressorRates { norepinephrine: Some(0.05), ..Default::default() };
        let inputs = SofaInputs { rates, meanbp_min: Some(90.0), ..Default::default() };
        assert_eq!(SofaScore::from_inputs(&stay, &inputs).cardiovascular, Some(3));

        let inputs = SofaInputs { meanbp_min: Some(90.0), ..Default::default() };
        assert_eq!(SofaScore::from_inputs(&stay, &inputs).cardiovascular, Some(0));
        assert_eq!(SofaScore::from_inputs(&stay, &SofaInputs::default()).cardiovascular, None);
    }

    #[test]
    fn test_renal_uses_urine_output() {
        let stay = stay(1, 10, 100);
        let inputs = SofaInputs { creatinine_max: Some(1.0), urineoutput: Some(150.0), ..Default::default() };
        assert_eq!(SofaScore::from_inputs(&stay, &inputs).renal, Some(4));

        let inputs = SofaInputs { creatinine_max: Some(2.5), urineoutput: Some(1500.0), ..Default::default() };
        assert_eq!(SofaScore::from_inputs(&stay, &inputs).renal, Some(2));
    }

    #[test]
    fn test_total_ignores_null_components() {
        let stay = stay(1, 10, 100);
        let inputs = SofaInputs { platelet_min: Some(40.0), mingcs: Some(14.0), ..Default::default() };
        let score = SofaScore::from_inputs(&stay, &inputs);
        assert_eq!(score.coagulation, Some(3));
        assert_eq!(score.cns, Some(1));
        assert_eq!(score.renal, None);
        assert_eq!(score.sofa, 4);
    }

    #[test]
    fn test_weight_falls_back_to_echo() {
        let cohort = vec![stay(1, 10, 100)];
        let echo = EchoRecord {
            row_id: 1,
            subject_id: 1,
            hadm_id: Some(10),
            chartdate: ts("2149-12-30 00:00"),
            charttime: Some(ts("2149-12-30 10:00")),
            indication: None,
            height: None,
            weight: Some(200.0),
            bsa: None,
            bp: None,
            bpsys: None,
            bpdias: None,
            hr: None,
            status: None,
            test: None,
            doppler: None,
            contrast: None,
            technical_quality: None,
        };

        let weights = admission_weights(&cohort, &[], std::slice::from_ref(&echo));
        assert!((weights[&100] - 200.0 * LB_TO_KG).abs() < 1e-9);

        let charted = vec![chart(100, 762, "2150-01-01 06:00", 80.0)];
        let weights = admission_weights(&cohort, &charted, &[echo]);
        assert_eq!(weights[&100], 80.0);
    }

    #[test]
    fn test_vasopressor_rates_weight_adjusted() {
        let cohort = vec![stay(1, 10, 100)];
        let weights = HashMap::from([(100, 80.0)]);
        let carevue = vec![
            cv(30047, "2150-01-01 10:00", 8.0),
            cv(30043, "2150-01-01 11:00", 4.0),
            cv(30043, "2150-01-03 11:00", 20.0), // after the first day
        ];
        let metavision = vec![
            mv(221906, "2150-01-01 12:00", 0.5, "FinishedRunning"),
            mv(221653, "2150-01-01 12:00", 9.0, REWRITTEN),
            mv(221653, "2150-01-01 13:00", 3.0, "FinishedRunning"),
        ];

        let rates = vasopressor_rates(&cohort, &weights, &carevue, &metavision)[&100];
        assert_eq!(rates.norepinephrine, Some(0.1));
        assert_eq!(rates.dopamine, Some(4.0));
        assert_eq!(rates.dobutamine, Some(3.0));
        assert_eq!(rates.epinephrine, None);
    }

    #[test]
    fn test_pao2fio2_split_by_episode() {
        let stay = stay(1, 10, 100);
        let gas = |time: &str, ratio: f64| {
            let mut panel = BloodGasPanel::new(&stay, ts(time));
            panel.set(GasField::Po2, Some(ratio));
            ArterialBloodGas {
                panel,
                specimen_pred: Some("ART".to_string()),
                specimen_prob: 1.0,
                spo2: None,
                fio2_chartevents: None,
                aado2_calc: None,
                pao2fio2: Some(ratio),
            }
        };
        let gases = [gas("2150-01-01 09:00", 180.0), gas("2150-01-01 20:00", 320.0)];
        let episodes = vec![VentilationEpisode {
            icustay_id: 100,
            ventnum: 1,
            starttime: ts("2150-01-01 08:00"),
            endtime: ts("2150-01-01 12:00"),
            duration_hours: 4.0,
        }];
        let refs: Vec<&ArterialBloodGas> = gases.iter().collect();

        let (vent, novent) = split_pao2fio2(&refs, &EpisodeIndex::new(&episodes));
        assert_eq!(vent, Some(180.0));
        assert_eq!(novent, Some(320.0));
    }
}
