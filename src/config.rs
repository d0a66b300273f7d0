// ==============================================================================
// config.rs - Environment Configuration
// ==============================================================================
// Description: Loads database and table settings from the environment / .env
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use crate::error::{PipelineError, PipelineResult};
use tracing::debug;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const ADMISSION_COMORBIDITY_TABLE: &str = "ADMISSION_COMORBIDITY_TABLE";
pub const TARGET_PATIENT: &str = "TARGET_PATIENT";
pub const MIMIC_SCHEMA: &str = "MIMIC_SCHEMA";

const DEFAULT_SCHEMA: &str = "mimiciii";

/// Resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    /// Table holding the 30 Elixhauser indicators keyed by hadm_id
    pub comorbidity_table: String,
    /// Table holding the target cohort (hadm_id, age, admission_type).
    /// Only the feature export reads it.
    pub target_table: Option<String>,
    /// Schema containing the raw source tables
    pub source_schema: String,
}

impl Settings {
    /// Load settings from the process environment, honouring a `.env` file
    pub fn from_env() -> PipelineResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup.
    ///
    /// Every missing required key is reported at once.
    pub fn from_lookup<F>(lookup: F) -> PipelineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = fetch(DATABASE_URL);
        let comorbidity_table = fetch(ADMISSION_COMORBIDITY_TABLE);

        let missing: Vec<String> = [
            (DATABASE_URL, database_url.is_none()),
            (ADMISSION_COMORBIDITY_TABLE, comorbidity_table.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(key, _)| key.to_string())
        .collect();

        match (database_url, comorbidity_table) {
            (Some(database_url), Some(comorbidity_table)) => Ok(Self {
                database_url,
                comorbidity_table,
                target_table: fetch(TARGET_PATIENT),
                source_schema: fetch(MIMIC_SCHEMA).unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            }),
            _ => Err(PipelineError::MissingConfiguration(missing)),
        }
    }

    /// Target cohort table, required by the feature export
    pub fn target_table(&self) -> PipelineResult<&str> {
        self.target_table
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfiguration(vec![TARGET_PATIENT.to_string()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_complete_settings() {
        let settings = Settings::from_lookup(lookup(&[
            (DATABASE_URL, "postgres://localhost/mimic"),
            (ADMISSION_COMORBIDITY_TABLE, "elixhauser_quan"),
            (TARGET_PATIENT, "icu_cohort"),
        ]))
        .unwrap();

        assert_eq!(settings.comorbidity_table, "elixhauser_quan");
        assert_eq!(settings.source_schema, "mimiciii");
        assert_eq!(settings.target_table().unwrap(), "icu_cohort");
    }

    #[test]
    fn test_missing_keys_are_all_reported() {
        let err = Settings::from_lookup(lookup(&[(MIMIC_SCHEMA, "mimic")])).unwrap_err();
        match err {
            PipelineError::MissingConfiguration(keys) => {
                assert_eq!(keys, vec![DATABASE_URL, ADMISSION_COMORBIDITY_TABLE]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_target_table_only_required_on_use() {
        let settings = Settings::from_lookup(lookup(&[
            (DATABASE_URL, "postgres://localhost/mimic"),
            (ADMISSION_COMORBIDITY_TABLE, "elixhauser_quan"),
        ]))
        .unwrap();

        assert_eq!(settings.target_table, None);
        let err = settings.target_table().unwrap_err();
        assert!(matches!(err, PipelineError::MissingConfiguration(k) if k == vec![TARGET_PATIENT]));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let err = Settings::from_lookup(lookup(&[
            (DATABASE_URL, "  "),
            (ADMISSION_COMORBIDITY_TABLE, "elix"),
            (TARGET_PATIENT, "cohort"),
            (MIMIC_SCHEMA, "mimic"),
        ]))
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingConfiguration(k) if k == vec![DATABASE_URL]));
    }
}
