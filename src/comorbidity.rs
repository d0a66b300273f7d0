// ==============================================================================
// comorbidity.rs - Comorbidity Feature Builder
// ==============================================================================
// Description: Elixhauser indicators and the categorical feature table fed to
//              latent class analysis
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::table::{Column, SqlValue, TableRow};

/// The 30 Elixhauser comorbidity groups (Quan coding)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Elixhauser {
    CongestiveHeartFailure,
    CardiacArrhythmias,
    ValvularDisease,
    PulmonaryCirculation,
    PeripheralVascular,
    Hypertension,
    Paralysis,
    OtherNeurological,
    ChronicPulmonary,
    DiabetesUncomplicated,
    DiabetesComplicated,
    Hypothyroidism,
    RenalFailure,
    LiverDisease,
    PepticUlcer,
    Aids,
    Lymphoma,
    MetastaticCancer,
    SolidTumor,
    RheumatoidArthritis,
    Coagulopathy,
    Obesity,
    WeightLoss,
    FluidElectrolyte,
    BloodLossAnemia,
    DeficiencyAnemias,
    AlcoholAbuse,
    DrugAbuse,
    Psychoses,
    Depression,
}

impl Elixhauser {
    pub const ALL: [Elixhauser; 30] = [
        Elixhauser::CongestiveHeartFailure,
        Elixhauser::CardiacArrhythmias,
        Elixhauser::ValvularDisease,
        Elixhauser::PulmonaryCirculation,
        Elixhauser::PeripheralVascular,
        Elixhauser::Hypertension,
        Elixhauser::Paralysis,
        Elixhauser::OtherNeurological,
        Elixhauser::ChronicPulmonary,
        Elixhauser::DiabetesUncomplicated,
        Elixhauser::DiabetesComplicated,
        Elixhauser::Hypothyroidism,
        Elixhauser::RenalFailure,
        Elixhauser::LiverDisease,
        Elixhauser::PepticUlcer,
        Elixhauser::Aids,
        Elixhauser::Lymphoma,
        Elixhauser::MetastaticCancer,
        Elixhauser::SolidTumor,
        Elixhauser::RheumatoidArthritis,
        Elixhauser::Coagulopathy,
        Elixhauser::Obesity,
        Elixhauser::WeightLoss,
        Elixhauser::FluidElectrolyte,
        Elixhauser::BloodLossAnemia,
        Elixhauser::DeficiencyAnemias,
        Elixhauser::AlcoholAbuse,
        Elixhauser::DrugAbuse,
        Elixhauser::Psychoses,
        Elixhauser::Depression,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Elixhauser::CongestiveHeartFailure => "congestive_heart_failure",
            Elixhauser::CardiacArrhythmias => "cardiac_arrhythmias",
            Elixhauser::ValvularDisease => "valvular_disease",
            Elixhauser::PulmonaryCirculation => "pulmonary_circulation",
            Elixhauser::PeripheralVascular => "peripheral_vascular",
            Elixhauser::Hypertension => "hypertension",
            Elixhauser::Paralysis => "paralysis",
            Elixhauser::OtherNeurological => "other_neurological",
            Elixhauser::ChronicPulmonary => "chronic_pulmonary",
            Elixhauser::DiabetesUncomplicated => "diabetes_uncomplicated",
            Elixhauser::DiabetesComplicated => "diabetes_complicated",
            Elixhauser::Hypothyroidism => "hypothyroidism",
            Elixhauser::RenalFailure => "renal_failure",
            Elixhauser::LiverDisease => "liver_disease",
            Elixhauser::PepticUlcer => "peptic_ulcer",
            Elixhauser::Aids => "aids",
            Elixhauser::Lymphoma => "lymphoma",
            Elixhauser::MetastaticCancer => "metastatic_cancer",
            Elixhauser::SolidTumor => "solid_tumor",
            Elixhauser::RheumatoidArthritis => "rheumatoid_arthritis",
            Elixhauser::Coagulopathy => "coagulopathy",
            Elixhauser::Obesity => "obesity",
            Elixhauser::WeightLoss => "weight_loss",
            Elixhauser::FluidElectrolyte => "fluid_electrolyte",
            Elixhauser::BloodLossAnemia => "blood_loss_anemia",
            Elixhauser::DeficiencyAnemias => "deficiency_anemias",
            Elixhauser::AlcoholAbuse => "alcohol_abuse",
            Elixhauser::DrugAbuse => "drug_abuse",
            Elixhauser::Psychoses => "psychoses",
            Elixhauser::Depression => "depression",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Number of indicator columns
pub const INDICATOR_COUNT: usize = Elixhauser::ALL.len();

/// One admission's row of the comorbidity indicator table
#[derive(Debug, Clone, PartialEq)]
pub struct ComorbidityIndicators {
    pub hadm_id: i32,
    values: [Option<i64>; INDICATOR_COUNT],
}

impl ComorbidityIndicators {
    pub fn new(hadm_id: i32, values: [Option<i64>; INDICATOR_COUNT]) -> Self {
        Self { hadm_id, values }
    }

    pub fn get(&self, condition: Elixhauser) -> Option<i64> {
        self.values[condition.index()]
    }

    pub fn present(&self, condition: Elixhauser) -> bool {
        self.get(condition) == Some(1)
    }

    /// Number of conditions present, missing treated as absent
    pub fn count(&self) -> u32 {
        self.values.iter().flatten().filter(|v| **v == 1).count() as u32
    }
}

/// A row of the configured target patient table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TargetPatient {
    pub hadm_id: i32,
    pub age: Option<f64>,
    pub admission_type: Option<String>,
}

const AGE_EDGES: [f64; 6] = [16.0, 25.0, 45.0, 65.0, 85.0, 100.0];

/// Age bucket, right-closed: [16,25] (25,45] (45,65] (65,85] (85,100].
/// The lowest edge is included so a cohort minimum of exactly 16 is binned.
pub fn age_bin(age: f64) -> Option<u8> {
    if age == AGE_EDGES[0] {
        return Some(1);
    }
    AGE_EDGES
        .windows(2)
        .position(|edge| edge[0] < age && age <= edge[1])
        .map(|i| i as u8 + 1)
}

/// Elective admissions are 1, anything else 2
pub fn admission_binary(admission_type: Option<&str>) -> u8 {
    match admission_type {
        Some(kind) if kind.eq_ignore_ascii_case("elective") => 1,
        _ => 2,
    }
}

/// Categorical feature row; every cell is a positive small integer
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub hadm_id: i32,
    pub indicators: [u8; INDICATOR_COUNT],
    pub admission_type_binary: u8,
    pub age_bin: u8,
}

impl FeatureRow {
    /// Manifest variable names in column order
    pub fn manifest() -> Vec<String> {
        let mut names: Vec<String> = Elixhauser::ALL.iter().map(|c| c.column().to_string()).collect();
        names.push("admission_type_binary".to_string());
        names.push("age_bin".to_string());
        names
    }

    fn cells(&self) -> impl Iterator<Item = (String, u8)> + '_ {
        FeatureRow::manifest().into_iter().zip(
            self.indicators
                .iter()
                .copied()
                .chain([self.admission_type_binary, self.age_bin]),
        )
    }
}

fn remap_indicator(hadm_id: i32, condition: Elixhauser, value: i64) -> PipelineResult<u8> {
    match value {
        1 => Ok(1),
        0 => Ok(2),
        other => Err(PipelineError::InvalidFeature {
            hadm_id,
            column: condition.column().to_string(),
            value: other,
        }),
    }
}

/// Build the LCA feature table from the target cohort and its indicators.
///
/// Admissions with any missing indicator are dropped. Indicators are
/// remapped 0 → 2 so that no cell is zero.
pub fn build_features(
    targets: &[TargetPatient],
    indicators: &[ComorbidityIndicators],
) -> PipelineResult<Vec<FeatureRow>> {
    let by_hadm: HashMap<i32, &ComorbidityIndicators> = indicators.iter().map(|i| (i.hadm_id, i)).collect();
    let mut rows = Vec::with_capacity(targets.len());
    let mut incomplete = 0usize;
    let mut out_of_range = 0usize;

    for target in targets {
        let Some(found) = by_hadm.get(&target.hadm_id) else {
            incomplete += 1;
            continue;
        };
        if found.values.iter().any(Option::is_none) {
            incomplete += 1;
            continue;
        }
        let Some(bin) = target.age.and_then(age_bin) else {
            out_of_range += 1;
            continue;
        };

        let mut cells = [0u8; INDICATOR_COUNT];
        for condition in Elixhauser::ALL {
            let value = found.get(condition).unwrap_or_default();
            cells[condition.index()] = remap_indicator(target.hadm_id, condition, value)?;
        }

        rows.push(FeatureRow {
            hadm_id: target.hadm_id,
            indicators: cells,
            admission_type_binary: admission_binary(target.admission_type.as_deref()),
            age_bin: bin,
        });
    }

    if incomplete > 0 {
        warn!("Dropped {} admissions with missing comorbidity indicators", incomplete);
    }
    if out_of_range > 0 {
        warn!("Dropped {} admissions with age outside [16, 100]", out_of_range);
    }

    validate_features(&rows)?;
    info!("Built feature table: {} rows x {} manifest variables", rows.len(), FeatureRow::manifest().len());
    Ok(rows)
}

/// Reject any zero or out-of-domain cell
pub fn validate_features(rows: &[FeatureRow]) -> PipelineResult<()> {
    for row in rows {
        for (column, value) in row.cells() {
            let allowed = if column == "age_bin" { (1..=5).contains(&value) } else { value == 1 || value == 2 };
            if !allowed {
                return Err(PipelineError::InvalidFeature { hadm_id: row.hadm_id, column, value: value as i64 });
            }
        }
    }
    Ok(())
}

impl TableRow for FeatureRow {
    fn columns() -> Vec<Column> {
        let mut columns = vec![Column::int("hadm_id")];
        columns.extend(FeatureRow::manifest().into_iter().map(Column::int));
        columns
    }

    fn values(&self) -> Vec<SqlValue> {
        let mut values: Vec<SqlValue> = vec![self.hadm_id.into()];
        values.extend(self.cells().map(|(_, v)| SqlValue::from(v as u32)));
        values
    }
}
