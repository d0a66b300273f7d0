// ==============================================================================
// blood_gas.rs - First-Day Blood Gases
// ==============================================================================
// Description: Blood gas panels around ICU admission and the arterial
//              specimen classifier used for PaO2/FiO2
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use super::{max_opt, StayIndex, Window};
use crate::models::{ChartEvent, IcuStay, LabEvent};
use crate::table::{Column, SqlValue, TableRow};

pub const SPECIMEN_ITEM: i32 = 50800;

/// Probability above which an unlabelled specimen is treated as arterial
pub const ARTERIAL_PROBABILITY: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasField {
    Aado2,
    BaseExcess,
    Bicarbonate,
    TotalCo2,
    Carboxyhemoglobin,
    Chloride,
    Calcium,
    Glucose,
    Hematocrit,
    Hemoglobin,
    Intubated,
    Lactate,
    Methemoglobin,
    O2Flow,
    Fio2,
    So2,
    Pco2,
    Peep,
    Ph,
    Po2,
    Potassium,
    RequiredO2,
    Sodium,
    Temperature,
    TidalVolume,
    VentilationRate,
    Ventilator,
}

impl GasField {
    pub const ALL: [GasField; 27] = [
        GasField::Aado2,
        GasField::BaseExcess,
        GasField::Bicarbonate,
        GasField::TotalCo2,
        GasField::Carboxyhemoglobin,
        GasField::Chloride,
        GasField::Calcium,
        GasField::Glucose,
        GasField::Hematocrit,
        GasField::Hemoglobin,
        GasField::Intubated,
        GasField::Lactate,
        GasField::Methemoglobin,
        GasField::O2Flow,
        GasField::Fio2,
        GasField::So2,
        GasField::Pco2,
        GasField::Peep,
        GasField::Ph,
        GasField::Po2,
        GasField::Potassium,
        GasField::RequiredO2,
        GasField::Sodium,
        GasField::Temperature,
        GasField::TidalVolume,
        GasField::VentilationRate,
        GasField::Ventilator,
    ];

    pub fn from_itemid(itemid: i32) -> Option<Self> {
        Some(match itemid {
            50801 => GasField::Aado2,
            50802 => GasField::BaseExcess,
            50803 => GasField::Bicarbonate,
            50804 => GasField::TotalCo2,
            50805 => GasField::Carboxyhemoglobin,
            50806 => GasField::Chloride,
            50808 => GasField::Calcium,
            50809 => GasField::Glucose,
            50810 => GasField::Hematocrit,
            50811 => GasField::Hemoglobin,
            50812 => GasField::Intubated,
            50813 => GasField::Lactate,
            50814 => GasField::Methemoglobin,
            50815 => GasField::O2Flow,
            50816 => GasField::Fio2,
            50817 => GasField::So2,
            50818 => GasField::Pco2,
            50819 => GasField::Peep,
            50820 => GasField::Ph,
            50821 => GasField::Po2,
            50822 => GasField::Potassium,
            50823 => GasField::RequiredO2,
            50824 => GasField::Sodium,
            50825 => GasField::Temperature,
            50826 => GasField::TidalVolume,
            50827 => GasField::VentilationRate,
            50828 => GasField::Ventilator,
            _ => return None,
        })
    }

    pub fn column(&self) -> &'static str {
        match self {
            GasField::Aado2 => "aado2",
            GasField::BaseExcess => "baseexcess",
            GasField::Bicarbonate => "bicarbonate",
            GasField::TotalCo2 => "totalco2",
            GasField::Carboxyhemoglobin => "carboxyhemoglobin",
            GasField::Chloride => "chloride",
            GasField::Calcium => "calcium",
            GasField::Glucose => "glucose",
            GasField::Hematocrit => "hematocrit",
            GasField::Hemoglobin => "hemoglobin",
            GasField::Intubated => "intubated",
            GasField::Lactate => "lactate",
            GasField::Methemoglobin => "methemoglobin",
            GasField::O2Flow => "o2flow",
            GasField::Fio2 => "fio2",
            GasField::So2 => "so2",
            GasField::Pco2 => "pco2",
            GasField::Peep => "peep",
            GasField::Ph => "ph",
            GasField::Po2 => "po2",
            GasField::Potassium => "potassium",
            GasField::RequiredO2 => "requiredo2",
            GasField::Sodium => "sodium",
            GasField::Temperature => "temperature",
            GasField::TidalVolume => "tidalvolume",
            GasField::VentilationRate => "ventilationrate",
            GasField::Ventilator => "ventilator",
        }
    }

    /// Range cleaning. Base excess is the only field allowed to be negative.
    pub fn clean(&self, value: f64) -> Option<f64> {
        let rejected = match self {
            _ if value <= 0.0 && *self != GasField::BaseExcess => true,
            GasField::Hematocrit => value > 100.0,
            GasField::Fio2 => !(20.0..=100.0).contains(&value),
            GasField::So2 => value > 100.0,
            GasField::O2Flow => value > 70.0,
            GasField::Po2 => value > 800.0,
            _ => false,
        };
        (!rejected).then_some(value)
    }
}

pub fn lab_item_ids() -> Vec<i32> {
    (SPECIMEN_ITEM..=50828).collect()
}

/// One blood gas panel: every gas result sharing a charttime
#[derive(Debug, Clone, PartialEq)]
pub struct BloodGasPanel {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub charttime: NaiveDateTime,
    pub specimen: Option<String>,
    values: HashMap<GasField, f64>,
}

impl BloodGasPanel {
    pub fn new(stay: &IcuStay, charttime: NaiveDateTime) -> Self {
        Self {
            subject_id: stay.subject_id,
            hadm_id: stay.hadm_id,
            icustay_id: stay.icustay_id,
            charttime,
            specimen: None,
            values: HashMap::new(),
        }
    }

    pub fn get(&self, field: GasField) -> Option<f64> {
        self.values.get(&field).copied()
    }

    pub fn set(&mut self, field: GasField, value: Option<f64>) {
        match value {
            Some(v) => {
                self.values.insert(field, v);
            }
            None => {
                self.values.remove(&field);
            }
        }
    }
}

/// Pivot blood gas results into panels, max per field per charttime
pub fn aggregate_blood_gas(cohort: &[IcuStay], events: &[LabEvent]) -> Vec<BloodGasPanel> {
    let index = StayIndex::new(cohort);
    let mut panels: BTreeMap<(i32, NaiveDateTime), BloodGasPanel> = BTreeMap::new();

    for event in events {
        if !(SPECIMEN_ITEM..=50828).contains(&event.itemid) {
            continue;
        }
        let Some(stay) = index.by_hadm(event.hadm_id) else {
            continue;
        };
        if !Window::first_day_with_lookback(stay.icu_intime, Duration::hours(6))
            .contains(event.charttime)
        {
            continue;
        }

        let panel = panels
            .entry((stay.icustay_id, event.charttime))
            .or_insert_with(|| BloodGasPanel::new(stay, event.charttime));

        if event.itemid == SPECIMEN_ITEM {
            if let Some(specimen) = &event.value {
                if panel.specimen.as_ref().map_or(true, |s| specimen > s) {
                    panel.specimen = Some(specimen.clone());
                }
            }
            continue;
        }
        if let Some(field) = GasField::from_itemid(event.itemid) {
            let cleaned = event.valuenum.and_then(|v| field.clean(v));
            panel.set(field, max_opt(panel.get(field), cleaned));
        }
    }

    let panels: Vec<BloodGasPanel> = panels.into_values().collect();
    info!("Aggregated {} blood gas panels", panels.len());
    panels
}

/// Logistic model term: coefficient times value, or the population-mean
/// substitute when the value is missing
struct Predictor {
    coefficient: f64,
    mean: f64,
    missing_adjustment: f64,
}

impl Predictor {
    const fn new(coefficient: f64, mean: f64, missing_adjustment: f64) -> Self {
        Self { coefficient, mean, missing_adjustment }
    }

    fn term(&self, value: Option<f64>) -> f64 {
        match value {
            Some(v) => self.coefficient * v,
            None => self.coefficient * self.mean + self.missing_adjustment,
        }
    }
}

const INTERCEPT: f64 = -0.02544;
const PO2_COEFFICIENT: f64 = 0.04598;
const SPO2: Predictor = Predictor::new(-0.15356, 97.49420, 0.13429);
const FIO2_CHART: Predictor = Predictor::new(0.00621, 51.49550, -0.24958);
const HEMOGLOBIN: Predictor = Predictor::new(0.10559, 10.32307, 0.05954);
const SO2: Predictor = Predictor::new(0.13251, 93.66539, -0.23172);
const PCO2: Predictor = Predictor::new(-0.01511, 42.08866, -0.01630);
const FIO2: Predictor = Predictor::new(0.01480, 63.97836, -0.31142);
const AADO2: Predictor = Predictor::new(-0.00200, 442.21186, -0.01328);
const BICARBONATE: Predictor = Predictor::new(-0.03220, 22.96894, -0.06535);
const TOTALCO2: Predictor = Predictor::new(0.05384, 24.72632, -0.01405);
const LACTATE: Predictor = Predictor::new(0.08202, 3.06436, 0.06038);
const PH: Predictor = Predictor::new(0.10956, 7.36233, -0.00617);
const O2FLOW: Predictor = Predictor::new(0.00848, 7.59362, -0.35803);

/// Probability that a panel with a PO2 came from an arterial specimen
pub fn arterial_probability(panel: &BloodGasPanel, spo2: Option<f64>, fio2_chart: Option<f64>, po2: f64) -> f64 {
    let z = INTERCEPT
        + PO2_COEFFICIENT * po2
        + SPO2.term(spo2)
        + FIO2_CHART.term(fio2_chart)
        + HEMOGLOBIN.term(panel.get(GasField::Hemoglobin))
        + SO2.term(panel.get(GasField::So2))
        + PCO2.term(panel.get(GasField::Pco2))
        + FIO2.term(panel.get(GasField::Fio2))
        + AADO2.term(panel.get(GasField::Aado2))
        + BICARBONATE.term(panel.get(GasField::Bicarbonate))
        + TOTALCO2.term(panel.get(GasField::TotalCo2))
        + LACTATE.term(panel.get(GasField::Lactate))
        + PH.term(panel.get(GasField::Ph))
        + O2FLOW.term(panel.get(GasField::O2Flow));
    1.0 / (1.0 + (-z).exp())
}

pub const SPO2_ITEM_IDS: &[i32] = &[646, 220277];
pub const FIO2_ITEM_IDS: &[i32] = &[3420, 190, 223835, 3422];

/// Chart FiO2 normalised to percent; `None` for implausible values
pub fn normalize_chart_fio2(itemid: i32, value: f64) -> Option<f64> {
    match itemid {
        223835 if value > 0.0 && value <= 1.0 => Some(value * 100.0),
        223835 if (21.0..=100.0).contains(&value) => Some(value),
        3420 | 3422 => Some(value),
        190 if value > 0.20 && value < 1.0 => Some(value * 100.0),
        _ => None,
    }
}

/// Chart readings per stay and charttime. A charttime whose readings were
/// all implausible is kept with a null value.
type ChartSeries = HashMap<i32, BTreeMap<NaiveDateTime, Option<f64>>>;

fn chart_series<F>(events: &[ChartEvent], items: &[i32], skip_errors: bool, normalize: F) -> ChartSeries
where
    F: Fn(i32, f64) -> Option<f64>,
{
    let mut series: ChartSeries = HashMap::new();
    for event in events {
        if !items.contains(&event.itemid) || (skip_errors && event.error) {
            continue;
        }
        let value = event.valuenum.and_then(|v| normalize(event.itemid, v));
        let slot = series.entry(event.icustay_id).or_default().entry(event.charttime).or_insert(None);
        *slot = max_opt(*slot, value);
    }
    series
}

/// Value of the latest reading in [t - lookback, t]
fn latest_reading(series: &ChartSeries, icustay_id: i32, t: NaiveDateTime, lookback: Duration) -> Option<f64> {
    series
        .get(&icustay_id)
        .and_then(|readings| readings.range(t - lookback..=t).next_back())
        .and_then(|(_, value)| *value)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArterialBloodGas {
    pub panel: BloodGasPanel,
    pub specimen_pred: Option<String>,
    pub specimen_prob: f64,
    pub spo2: Option<f64>,
    pub fio2_chartevents: Option<f64>,
    pub aado2_calc: Option<f64>,
    pub pao2fio2: Option<f64>,
}

impl ArterialBloodGas {
    pub fn icustay_id(&self) -> i32 {
        self.panel.icustay_id
    }

    pub fn charttime(&self) -> NaiveDateTime {
        self.panel.charttime
    }
}

/// Keep panels with a PO2 that are labelled arterial or predicted arterial,
/// and derive the PaO2/FiO2 ratio and A-a gradient
pub fn arterial_blood_gas(panels: &[BloodGasPanel], chartevents: &[ChartEvent]) -> Vec<ArterialBloodGas> {
    let spo2_series = chart_series(chartevents, SPO2_ITEM_IDS, false, |_, v| {
        (v > 0.0 && v <= 100.0).then_some(v)
    });
    let fio2_series = chart_series(chartevents, FIO2_ITEM_IDS, true, normalize_chart_fio2);

    let rows: Vec<ArterialBloodGas> = panels
        .iter()
        .filter_map(|panel| {
            let po2 = panel.get(GasField::Po2)?;
            let spo2 = latest_reading(&spo2_series, panel.icustay_id, panel.charttime, Duration::hours(2));
            let fio2_chartevents =
                latest_reading(&fio2_series, panel.icustay_id, panel.charttime, Duration::hours(4));
            let specimen_prob = arterial_probability(panel, spo2, fio2_chartevents, po2);

            let labelled_arterial = panel.specimen.as_deref() == Some("ART");
            if !labelled_arterial && specimen_prob <= ARTERIAL_PROBABILITY {
                return None;
            }

            let specimen_pred = panel.specimen.clone().or_else(|| {
                (specimen_prob > ARTERIAL_PROBABILITY).then(|| "ART".to_string())
            });
            let fio2 = panel.get(GasField::Fio2).or(fio2_chartevents);
            let aado2_calc = match (fio2, panel.get(GasField::Pco2)) {
                (Some(f), Some(pco2)) => Some(f / 100.0 * (760.0 - 47.0) - pco2 / 0.8 - po2),
                _ => None,
            };
            let pao2fio2 = fio2.map(|f| 100.0 * po2 / f);

            Some(ArterialBloodGas {
                panel: panel.clone(),
                specimen_pred,
                specimen_prob,
                spo2,
                fio2_chartevents,
                aado2_calc,
                pao2fio2,
            })
        })
        .collect();

    info!("Classified {} of {} blood gas panels as arterial", rows.len(), panels.len());
    rows
}

impl TableRow for BloodGasPanel {
    fn columns() -> Vec<Column> {
        let mut columns = vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::timestamp("charttime"),
            Column::text("specimen"),
        ];
        columns.extend(GasField::ALL.iter().map(|f| Column::float(f.column())));
        columns
    }

    fn values(&self) -> Vec<SqlValue> {
        let mut values: Vec<SqlValue> = vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            self.charttime.into(),
            (&self.specimen).into(),
        ];
        values.extend(GasField::ALL.iter().map(|f| SqlValue::from(self.get(*f))));
        values
    }
}

impl TableRow for ArterialBloodGas {
    fn columns() -> Vec<Column> {
        let mut columns = BloodGasPanel::columns();
        columns.extend([
            Column::text("specimen_pred"),
            Column::float("specimen_prob"),
            Column::float("spo2"),
            Column::float("fio2_chartevents"),
            Column::float("aado2_calc"),
            Column::float("pao2fio2"),
        ]);
        columns
    }

    fn values(&self) -> Vec<SqlValue> {
        let mut values = self.panel.values();
        values.extend([
            SqlValue::from(&self.specimen_pred),
            self.specimen_prob.into(),
            self.spo2.into(),
            self.fio2_chartevents.into(),
            self.aado2_calc.into(),
            self.pao2fio2.into(),
        ]);
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chart, lab, stay, ts};
    use crate::models::LabEvent;

    fn specimen(hadm_id: i32, charttime: &str, value: &str) -> LabEvent {
        LabEvent {
            hadm_id,
            itemid: SPECIMEN_ITEM,
            charttime: ts(charttime),
            value: Some(value.to_string()),
            valuenum: None,
        }
    }

    #[test]
    fn test_cleaning_rules() {
        assert_eq!(GasField::BaseExcess.clean(-4.0), Some(-4.0));
        assert_eq!(GasField::Ph.clean(0.0), None);
        assert_eq!(GasField::Fio2.clean(19.9), None);
        assert_eq!(GasField::Fio2.clean(100.0), Some(100.0));
        assert_eq!(GasField::Po2.clean(801.0), None);
        assert_eq!(GasField::O2Flow.clean(70.0), Some(70.0));
        assert_eq!(GasField::from_itemid(50807), None);
    }

    #[test]
    fn test_chart_fio2_normalisation() {
        assert_eq!(normalize_chart_fio2(223835, 0.5), Some(50.0));
        assert_eq!(normalize_chart_fio2(223835, 15.0), None);
        assert_eq!(normalize_chart_fio2(223835, 40.0), Some(40.0));
        assert_eq!(normalize_chart_fio2(190, 0.4), Some(40.0));
        assert_eq!(normalize_chart_fio2(190, 0.2), None);
        assert_eq!(normalize_chart_fio2(3420, 60.0), Some(60.0));
    }

    #[test]
    fn test_panels_pivot_per_charttime() {
        let cohort = vec![stay(1, 10, 100)];
        let events = vec![
            specimen(10, "2150-01-01 09:00", "ART"),
            lab(10, 50821, "2150-01-01 09:00", 80.0),
            lab(10, 50821, "2150-01-01 09:00", 90.0),
            lab(10, 50816, "2150-01-01 09:00", 10.0), // implausible FiO2
            lab(10, 50818, "2150-01-01 11:00", 40.0),
            lab(10, 50818, "2150-01-03 11:00", 40.0), // out of window
        ];

        let panels = aggregate_blood_gas(&cohort, &events);
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].specimen.as_deref(), Some("ART"));
        assert_eq!(panels[0].get(GasField::Po2), Some(90.0));
        assert_eq!(panels[0].get(GasField::Fio2), None);
        assert_eq!(panels[1].get(GasField::Pco2), Some(40.0));
    }

    #[test]
    fn test_arterial_selection_and_ratio() {
        let cohort = vec![stay(1, 10, 100)];
        let events = vec![
            specimen(10, "2150-01-01 09:00", "ART"),
            lab(10, 50821, "2150-01-01 09:00", 80.0),
            lab(10, 50818, "2150-01-01 09:00", 40.0),
            // venous sample, low PO2: dropped
            specimen(10, "2150-01-01 12:00", "VEN"),
            lab(10, 50821, "2150-01-01 12:00", 35.0),
        ];
        let chartevents = vec![
            chart(100, 223835, "2150-01-01 06:00", 0.5),
            chart(100, 3420, "2150-01-01 04:00", 80.0), // older than 4h
        ];

        let panels = aggregate_blood_gas(&cohort, &events);
        let arterial = arterial_blood_gas(&panels, &chartevents);

        assert_eq!(arterial.len(), 1);
        let abg = &arterial[0];
        assert_eq!(abg.specimen_pred.as_deref(), Some("ART"));
        assert_eq!(abg.fio2_chartevents, Some(50.0));
        assert_eq!(abg.pao2fio2, Some(160.0));
        let expected_aado2 = 0.5 * 713.0 - 40.0 / 0.8 - 80.0;
        assert!((abg.aado2_calc.unwrap() - expected_aado2).abs() < 1e-9);
    }

    #[test]
    fn test_probability_with_all_inputs_missing() {
        let panel = BloodGasPanel::new(&stay(1, 10, 100), ts("2150-01-01 09:00"));
        let p = arterial_probability(&panel, None, None, 100.0);
        assert!(p > 0.0 && p < 1.0);

        // High PO2 pushes the prediction over the threshold
        let high = arterial_probability(&panel, None, None, 400.0);
        assert!(high > ARTERIAL_PROBABILITY);
    }
}
