// ==============================================================================
// gcs.rs - First-Day Glasgow Coma Scale
// ==============================================================================
// Description: Worst (minimum) GCS in the first day, with intubated verbal
//              scores handled through a sentinel value
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use super::{max_opt, StayIndex, Window};
use crate::models::{ChartEvent, IcuStay};
use crate::table::{Column, SqlValue, TableRow};

pub const ITEM_IDS: &[i32] = &[184, 454, 723, 223900, 223901, 220739];

/// Verbal score recorded for intubated patients
const INTUBATED_VERBAL: f64 = 0.0;

const DEFAULT_MOTOR: f64 = 6.0;
const DEFAULT_VERBAL: f64 = 5.0;
const DEFAULT_EYES: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Motor,
    Verbal,
    Eyes,
}

/// One charted GCS assessment (components at a single charttime)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GcsObservation {
    pub motor: Option<f64>,
    pub verbal: Option<f64>,
    pub eyes: Option<f64>,
}

impl GcsObservation {
    pub fn endotracheal(&self) -> bool {
        self.verbal == Some(INTUBATED_VERBAL)
    }
}

fn component_value(event: &ChartEvent) -> Option<(Component, Option<f64>)> {
    let component = match event.itemid {
        454 | 223901 => Component::Motor,
        723 | 223900 => Component::Verbal,
        184 | 220739 => Component::Eyes,
        _ => return None,
    };
    let intubated = matches!(
        (event.itemid, event.value.as_deref()),
        (723, Some("1.0 ET/Trach")) | (223900, Some("No Response-ETT"))
    );
    let value = if intubated { Some(INTUBATED_VERBAL) } else { event.valuenum };
    Some((component, value))
}

/// Total GCS of an observation given the preceding one (if within 6 hours).
///
/// Rules apply in order:
/// 1. intubated now: 15
/// 2. verbal missing now and intubated previously: 15
/// 3. intubated previously: current components with defaults
/// 4. otherwise each component falls back to the previous value, then the
///    default
pub fn total_gcs(current: &GcsObservation, previous: Option<&GcsObservation>) -> f64 {
    let prev_intubated = previous.is_some_and(|p| p.endotracheal());

    if current.endotracheal() {
        return 15.0;
    }
    if current.verbal.is_none() && prev_intubated {
        return 15.0;
    }
    if prev_intubated {
        return current.motor.unwrap_or(DEFAULT_MOTOR)
            + current.verbal.unwrap_or(DEFAULT_VERBAL)
            + current.eyes.unwrap_or(DEFAULT_EYES);
    }

    let prev = previous.copied().unwrap_or_default();
    current.motor.or(prev.motor).unwrap_or(DEFAULT_MOTOR)
        + current.verbal.or(prev.verbal).unwrap_or(DEFAULT_VERBAL)
        + current.eyes.or(prev.eyes).unwrap_or(DEFAULT_EYES)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GcsFirstDay {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub mingcs: Option<f64>,
    pub gcsmotor: Option<f64>,
    pub gcsverbal: Option<f64>,
    pub gcseyes: Option<f64>,
    pub endotrachflag: Option<bool>,
}

impl GcsFirstDay {
    fn empty(stay: &IcuStay) -> Self {
        Self {
            subject_id: stay.subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            mingcs: None,
            gcsmotor: None,
            gcsverbal: None,
            gcseyes: None,
            endotrachflag: None,
        }
    }
}

/// Worst assessment of a single stay from its time-ordered observations
fn worst_assessment(
    stay: &IcuStay,
    observations: &BTreeMap<NaiveDateTime, GcsObservation>,
) -> GcsFirstDay {
    let mut worst = GcsFirstDay::empty(stay);
    let mut previous: Option<(NaiveDateTime, GcsObservation)> = None;

    for (charttime, current) in observations {
        let prev = previous
            .filter(|(t, _)| *t > *charttime - Duration::hours(6))
            .map(|(_, obs)| obs);
        let gcs = total_gcs(current, prev.as_ref());

        // Strict comparison keeps the earliest assessment on ties
        if worst.mingcs.map_or(true, |m| gcs < m) {
            let prev = prev.unwrap_or_default();
            worst.mingcs = Some(gcs);
            worst.gcsmotor = current.motor.or(prev.motor);
            worst.gcsverbal = current.verbal.or(prev.verbal);
            worst.gcseyes = current.eyes.or(prev.eyes);
            worst.endotrachflag = Some(current.endotracheal());
        }
        previous = Some((*charttime, *current));
    }
    worst
}

pub fn aggregate_gcs(cohort: &[IcuStay], events: &[ChartEvent]) -> Vec<GcsFirstDay> {
    let index = StayIndex::new(cohort);
    let mut observations: HashMap<i32, BTreeMap<NaiveDateTime, GcsObservation>> = HashMap::new();

    for event in events.iter().filter(|e| !e.error) {
        let Some((component, value)) = component_value(event) else {
            continue;
        };
        let Some(stay) = index.by_icustay(event.icustay_id) else {
            continue;
        };
        let window = Window::closed(stay.icu_intime, stay.icu_intime + Duration::days(1));
        if !window.contains(event.charttime) {
            continue;
        }

        let obs = observations
            .entry(stay.icustay_id)
            .or_default()
            .entry(event.charttime)
            .or_default();
        match component {
            Component::Motor => obs.motor = max_opt(obs.motor, value),
            Component::Verbal => obs.verbal = max_opt(obs.verbal, value),
            Component::Eyes => obs.eyes = max_opt(obs.eyes, value),
        }
    }

    let rows: Vec<GcsFirstDay> = cohort
        .iter()
        .map(|stay| match observations.get(&stay.icustay_id) {
            Some(obs) => worst_assessment(stay, obs),
            None => GcsFirstDay::empty(stay),
        })
        .collect();

    info!("Computed first-day GCS for {} stays ({} assessed)", rows.len(), observations.len());
    rows
}

impl TableRow for GcsFirstDay {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::float("mingcs"),
            Column::float("gcsmotor"),
            Column::float("gcsverbal"),
            Column::float("gcseyes"),
            Column::int("endotrachflag"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            self.mingcs.into(),
            self.gcsmotor.into(),
            self.gcsverbal.into(),
            self.gcseyes.into(),
            self.endotrachflag.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chart, chart_text, stay};

    fn obs(motor: Option<f64>, verbal: Option<f64>, eyes: Option<f64>) -> GcsObservation {
        GcsObservation { motor, verbal, eyes }
    }

    #[test]
    fn test_intubated_scores_fifteen() {
        let current = obs(Some(3.0), Some(0.0), Some(2.0));
        assert_eq!(total_gcs(&current, None), 15.0);
    }

    #[test]
    fn test_missing_verbal_after_intubation() {
        let previous = obs(Some(5.0), Some(0.0), Some(3.0));
        assert_eq!(total_gcs(&obs(Some(4.0), None, Some(2.0)), Some(&previous)), 15.0);
        // Verbal present: current components only, defaults for gaps
        assert_eq!(total_gcs(&obs(None, Some(2.0), Some(1.0)), Some(&previous)), 9.0);
    }

    #[test]
    fn test_carry_forward_then_defaults() {
        let previous = obs(Some(2.0), Some(3.0), None);
        assert_eq!(total_gcs(&obs(None, None, Some(1.0)), Some(&previous)), 6.0);
        assert_eq!(total_gcs(&obs(None, None, None), None), 15.0);
    }

    #[test]
    fn test_sentinel_text_values() {
        let trach = chart_text(100, 723, "2150-01-01 09:00", "1.0 ET/Trach");
        let ett = chart_text(100, 223900, "2150-01-01 09:00", "No Response-ETT");
        assert_eq!(component_value(&trach).unwrap().1, Some(0.0));
        assert_eq!(component_value(&ett).unwrap().1, Some(0.0));
    }

    #[test]
    fn test_minimum_over_first_day() {
        let cohort = vec![stay(1, 10, 100)];
        let events = vec![
            chart(100, 454, "2150-01-01 09:00", 6.0),
            chart(100, 723, "2150-01-01 09:00", 5.0),
            chart(100, 184, "2150-01-01 09:00", 4.0),
            // 3h later only motor and eyes: verbal carried forward
            chart(100, 223901, "2150-01-01 12:00", 4.0),
            chart(100, 220739, "2150-01-01 12:00", 2.0),
            // 10h after that: nothing carried forward
            chart(100, 454, "2150-01-01 22:00", 5.0),
            // outside the window
            chart(100, 454, "2150-01-02 09:00", 1.0),
        ];

        let rows = aggregate_gcs(&cohort, &events);
        assert_eq!(rows[0].mingcs, Some(11.0));
        assert_eq!(rows[0].gcsmotor, Some(4.0));
        assert_eq!(rows[0].gcsverbal, Some(5.0));
        assert_eq!(rows[0].gcseyes, Some(2.0));
        assert_eq!(rows[0].endotrachflag, Some(false));
    }

    #[test]
    fn test_stay_without_assessment() {
        let rows = aggregate_gcs(&[stay(1, 10, 100)], &[]);
        assert_eq!(rows[0].mingcs, None);
    }
}
