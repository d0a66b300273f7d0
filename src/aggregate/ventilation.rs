// ==============================================================================
// ventilation.rs - Mechanical Ventilation
// ==============================================================================
// Description: Classifies charted observations as ventilation / oxygen
//              therapy / extubation, groups them into ventilation episodes and
//              flags ventilation on the first ICU day
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::StayIndex;
use crate::models::{ChartEvent, IcuStay, ProcedureEventMv};
use crate::table::{Column, SqlValue, TableRow};

/// Gap between ventilator observations that starts a new episode
const NEW_EPISODE_GAP_HOURS: i64 = 8;

const VENT_TYPE_CV: i32 = 720;
const VENT_TYPE_MV: i32 = 223848;
const VENT_MODE_MV: i32 = 223849;
const O2_DEVICE_CV: i32 = 467;
const O2_DEVICE_MV: i32 = 226732;
const EXTUBATION_CV: i32 = 640;

/// Ventilator settings whose presence implies mechanical ventilation
const VENTILATOR_SETTINGS: &[i32] = &[
    445, 448, 449, 450, 1340, 1486, 1600, 224687, // minute volume
    639, 654, 681, 682, 683, 684, 224685, 224684, 224686, // tidal volume
    218, 436, 535, 444, 459, 224697, 224695, 224696, 224746, 224747, // resp pressure
    221, 1, 1211, 1655, 2000, 226873, 224738, 224419, 224750, 227187, // insp pressure
    543, // plateau pressure
    5865, 5866, 224707, 224709, 224705, 224706, // APRV pressure
    60, 437, 505, 506, 686, 220339, 224700, // PEEP
    3459, // high pressure relief
    501, 502, 503, 224702, // PCV
    223, 667, 668, 669, 670, 671, 672, // TCPCV
    224701, // PSV level
];

const OXYGEN_DEVICES_MV: &[&str] = &[
    "Nasal cannula",
    "Face tent",
    "Aerosol-cool",
    "Trach mask ",
    "High flow neb",
    "Non-rebreather",
    "Venti mask ",
    "Medium conc mask ",
    "T-piece",
    "High flow nasal cannula",
    "Ultrasonic neb",
    "Vapomist",
];

const OXYGEN_DEVICES_CV: &[&str] = &[
    "Cannula",
    "Nasal Cannula",
    "Face Tent",
    "Aerosol-Cool",
    "Trach Mask",
    "Hi Flow Neb",
    "Non-Rebreather",
    "Venti Mask",
    "Medium Conc Mask",
    "Vapotherm",
    "T-Piece",
    "Hood",
    "Hut",
    "TranstrachealCat",
    "Heated Neb",
    "Ultrasonic Neb",
];

const PLANNED_EXTUBATION: i32 = 227194;
const SELF_EXTUBATION: i32 = 225468;
const UNPLANNED_EXTUBATION: i32 = 225477;

pub const PROCEDURE_ITEM_IDS: &[i32] = &[PLANNED_EXTUBATION, SELF_EXTUBATION, UNPLANNED_EXTUBATION];

/// Every chart item read by the classifier
pub fn chart_item_ids() -> Vec<i32> {
    let mut items = vec![VENT_TYPE_CV, VENT_TYPE_MV, VENT_MODE_MV, O2_DEVICE_CV, O2_DEVICE_MV, EXTUBATION_CV];
    items.extend_from_slice(VENTILATOR_SETTINGS);
    items
}

/// Ventilation state observed at one charttime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VentilationFlags {
    pub mechvent: bool,
    pub oxygen_therapy: bool,
    pub extubated: bool,
    pub self_extubated: bool,
}

impl VentilationFlags {
    fn merge(&mut self, other: VentilationFlags) {
        self.mechvent |= other.mechvent;
        self.oxygen_therapy |= other.oxygen_therapy;
        self.extubated |= other.extubated;
        self.self_extubated |= other.self_extubated;
    }
}

/// Flags implied by a single chart observation, `None` for unrelated items
pub fn classify_chart_value(itemid: i32, value: &str) -> Option<VentilationFlags> {
    let mechvent = match itemid {
        VENT_TYPE_CV => value != "Other/Remarks",
        VENT_TYPE_MV => value != "Other",
        VENT_MODE_MV => true,
        O2_DEVICE_CV => value == "Ventilator",
        _ => VENTILATOR_SETTINGS.contains(&itemid),
    };
    let oxygen_therapy = match itemid {
        O2_DEVICE_MV => OXYGEN_DEVICES_MV.contains(&value),
        O2_DEVICE_CV => OXYGEN_DEVICES_CV.contains(&value),
        _ => false,
    };
    let extubated =
        itemid == EXTUBATION_CV && (value == "Extubated" || value == "Self Extubation");
    let self_extubated = itemid == EXTUBATION_CV && value == "Self Extubation";

    let relevant = mechvent
        || oxygen_therapy
        || extubated
        || matches!(itemid, VENT_TYPE_CV | VENT_TYPE_MV | O2_DEVICE_CV | O2_DEVICE_MV | EXTUBATION_CV);
    relevant.then_some(VentilationFlags { mechvent, oxygen_therapy, extubated, self_extubated })
}

#[derive(Debug, Clone, PartialEq)]
pub struct VentilationClassification {
    pub icustay_id: i32,
    pub charttime: NaiveDateTime,
    pub flags: VentilationFlags,
}

/// Classify chart observations and extubation procedures, one row per
/// (stay, charttime) with flags OR-ed together
pub fn classify_ventilation(
    cohort: &[IcuStay],
    chartevents: &[ChartEvent],
    procedures: &[ProcedureEventMv],
) -> Vec<VentilationClassification> {
    let index = StayIndex::new(cohort);
    let mut rows: BTreeMap<(i32, NaiveDateTime), VentilationFlags> = BTreeMap::new();

    for event in chartevents.iter().filter(|e| !e.error) {
        if index.by_icustay(event.icustay_id).is_none() {
            continue;
        }
        let Some(flags) = event
            .value
            .as_deref()
            .and_then(|v| classify_chart_value(event.itemid, v))
        else {
            continue;
        };
        rows.entry((event.icustay_id, event.charttime)).or_default().merge(flags);
    }

    for procedure in procedures {
        if !PROCEDURE_ITEM_IDS.contains(&procedure.itemid)
            || index.by_icustay(procedure.icustay_id).is_none()
        {
            continue;
        }
        let flags = VentilationFlags {
            extubated: true,
            self_extubated: procedure.itemid == SELF_EXTUBATION,
            ..Default::default()
        };
        rows.entry((procedure.icustay_id, procedure.starttime)).or_default().merge(flags);
    }

    debug!("Classified {} ventilation observations", rows.len());
    rows.into_iter()
        .map(|((icustay_id, charttime), flags)| VentilationClassification { icustay_id, charttime, flags })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct VentilationEpisode {
    pub icustay_id: i32,
    /// 1-based, in chronological order
    pub ventnum: u32,
    pub starttime: NaiveDateTime,
    pub endtime: NaiveDateTime,
    pub duration_hours: f64,
}

impl VentilationEpisode {
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.starttime <= t && t <= self.endtime
    }
}

/// Group one stay's time-ordered observations into episodes
fn stay_episodes(icustay_id: i32, observations: &[&VentilationClassification]) -> Vec<VentilationEpisode> {
    let gap = Duration::hours(NEW_EPISODE_GAP_HOURS);
    let mut last_vent_time: Option<NaiveDateTime> = None;
    let mut last_vent_or_extubation_extubated = false;
    let mut running: u32 = 0;
    // episode number -> (start, end, any mech vent)
    let mut groups: BTreeMap<u32, (NaiveDateTime, NaiveDateTime, bool)> = BTreeMap::new();

    for obs in observations {
        let flags = obs.flags;
        let in_vent_partition = flags.mechvent || flags.extubated;
        let lag = if flags.mechvent { last_vent_time } else { None };

        let newvent = (in_vent_partition && last_vent_or_extubation_extubated)
            || (!flags.mechvent && flags.oxygen_therapy)
            || lag.is_some_and(|l| obs.charttime > l + gap);
        if newvent {
            running += 1;
        }

        if in_vent_partition {
            groups
                .entry(running)
                .and_modify(|(start, end, vented)| {
                    *start = (*start).min(obs.charttime);
                    *end = (*end).max(obs.charttime);
                    *vented |= flags.mechvent;
                })
                .or_insert((obs.charttime, obs.charttime, flags.mechvent));
            last_vent_or_extubation_extubated = flags.extubated;
        }
        if flags.mechvent {
            last_vent_time = Some(obs.charttime);
        }
    }

    groups
        .into_values()
        .filter(|(start, end, vented)| start != end && *vented)
        .enumerate()
        .map(|(i, (start, end, _))| VentilationEpisode {
            icustay_id,
            ventnum: i as u32 + 1,
            starttime: start,
            endtime: end,
            duration_hours: (end - start).num_seconds() as f64 / 3600.0,
        })
        .collect()
}

/// Derive ventilation episodes from classified observations.
///
/// A new episode starts after an extubation, when oxygen therapy is charted
/// without the ventilator, or after more than 8 hours without a ventilator
/// observation. Episodes of zero length or without any ventilator row are
/// dropped.
pub fn ventilation_durations(classifications: &[VentilationClassification]) -> Vec<VentilationEpisode> {
    let mut by_stay: BTreeMap<i32, Vec<&VentilationClassification>> = BTreeMap::new();
    for row in classifications {
        by_stay.entry(row.icustay_id).or_default().push(row);
    }

    let episodes: Vec<VentilationEpisode> = by_stay
        .into_iter()
        .flat_map(|(icustay_id, mut rows)| {
            rows.sort_by_key(|r| r.charttime);
            stay_episodes(icustay_id, &rows)
        })
        .collect();

    info!("Derived {} ventilation episodes", episodes.len());
    episodes
}

/// Episodes grouped by stay for time-point lookups
pub struct EpisodeIndex<'a> {
    by_stay: HashMap<i32, Vec<&'a VentilationEpisode>>,
}

impl<'a> EpisodeIndex<'a> {
    pub fn new(episodes: &'a [VentilationEpisode]) -> Self {
        let mut by_stay: HashMap<i32, Vec<&'a VentilationEpisode>> = HashMap::new();
        for episode in episodes {
            by_stay.entry(episode.icustay_id).or_default().push(episode);
        }
        Self { by_stay }
    }

    pub fn episodes(&self, icustay_id: i32) -> &[&'a VentilationEpisode] {
        self.by_stay.get(&icustay_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `t` falls inside any episode of the stay
    pub fn is_ventilated_at(&self, icustay_id: i32, t: NaiveDateTime) -> bool {
        self.episodes(icustay_id).iter().any(|e| e.contains(t))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VentilationFirstDay {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub vent: bool,
}

/// Ventilated on admission or within the first day
pub fn ventilation_first_day(cohort: &[IcuStay], episodes: &[VentilationEpisode]) -> Vec<VentilationFirstDay> {
    let index = EpisodeIndex::new(episodes);

    cohort
        .iter()
        .map(|stay| {
            let intime = stay.icu_intime;
            let day_end = intime + Duration::days(1);
            let vent = index.episodes(stay.icustay_id).iter().any(|e| {
                e.contains(intime) || (e.starttime >= intime && e.starttime <= day_end)
            });
            VentilationFirstDay {
                subject_id: stay.subject_id,
                hadm_id: stay.hadm_id,
                icustay_id: stay.icustay_id,
                vent,
            }
        })
        .collect()
}

impl TableRow for VentilationClassification {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("icustay_id"),
            Column::timestamp("charttime"),
            Column::int("mechvent"),
            Column::int("oxygentherapy"),
            Column::int("extubated"),
            Column::int("selfextubated"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.icustay_id.into(),
            self.charttime.into(),
            self.flags.mechvent.into(),
            self.flags.oxygen_therapy.into(),
            self.flags.extubated.into(),
            self.flags.self_extubated.into(),
        ]
    }
}

impl TableRow for VentilationEpisode {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("icustay_id"),
            Column::int("ventnum"),
            Column::timestamp("starttime"),
            Column::timestamp("endtime"),
            Column::float("duration_hours"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.icustay_id.into(),
            self.ventnum.into(),
            self.starttime.into(),
            self.endtime.into(),
            self.duration_hours.into(),
        ]
    }
}

impl TableRow for VentilationFirstDay {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::int("vent"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            self.vent.into(),
        ]
    }
}
