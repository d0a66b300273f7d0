// ==============================================================================
// store.rs - PostgreSQL Access
// ==============================================================================
// Description: Loads the source tables the pipeline reads and writes derived
//              tables by drop-and-recreate inside a single transaction
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::aggregate::{blood_gas, echo, gcs, labs, urine, ventilation, vitals};
use crate::cohort::select_cohort;
use crate::comorbidity::{ComorbidityIndicators, Elixhauser, TargetPatient, INDICATOR_COUNT};
use crate::error::PipelineResult;
use crate::models::*;
use crate::scores::{sapsii, sofa};
use crate::table::{SqlValue, TableRow};

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMETERS: usize = 65535;

/// Quote a possibly schema-qualified identifier, e.g. `a.b` → `"a"."b"`
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.trim().trim_matches('"').replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Chart item codes read by any aggregator or score
pub fn chart_item_ids() -> Vec<i32> {
    let ids: BTreeSet<i32> = vitals::ITEM_IDS
        .iter()
        .chain(gcs::ITEM_IDS)
        .chain(blood_gas::SPO2_ITEM_IDS)
        .chain(blood_gas::FIO2_ITEM_IDS)
        .chain(sofa::WEIGHT_ITEM_IDS)
        .chain(sapsii::CPAP_ITEM_IDS)
        .copied()
        .chain(ventilation::chart_item_ids())
        .collect();
    ids.into_iter().collect()
}

pub fn lab_item_ids() -> Vec<i32> {
    let ids: BTreeSet<i32> = labs::ITEM_IDS.iter().copied().chain(blood_gas::lab_item_ids()).collect();
    ids.into_iter().collect()
}

/// Database handle bound to a source schema
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    schema: String,
}

impl Store {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self { pool, schema: schema.into() }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fully qualified, quoted name of a table in the source schema
    pub fn table(&self, name: &str) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(name))
    }

    pub async fn load_patients(&self) -> PipelineResult<Vec<Patient>> {
        let rows = sqlx::query_as::<_, Patient>(&format!(
            "SELECT subject_id, gender, dob FROM {}",
            self.table("patients")
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn load_admissions(&self) -> PipelineResult<Vec<Admission>> {
        let rows = sqlx::query_as::<_, Admission>(&format!(
            r#"
            SELECT subject_id, hadm_id, admittime, dischtime, deathtime,
                   admission_type, discharge_location,
                   hospital_expire_flag::int4 AS hospital_expire_flag
            FROM {}
            "#,
            self.table("admissions")
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn load_icustays(&self) -> PipelineResult<Vec<IcuStayRecord>> {
        let rows = sqlx::query_as::<_, IcuStayRecord>(&format!(
            "SELECT subject_id, hadm_id, icustay_id, intime, outtime FROM {} WHERE intime IS NOT NULL",
            self.table("icustays")
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_chartevents(&self, stays: &[i32]) -> PipelineResult<Vec<ChartEvent>> {
        let rows = sqlx::query_as::<_, ChartEvent>(&format!(
            r#"
            SELECT icustay_id, itemid, charttime, value, valuenum,
                   COALESCE(error, 0) = 1 AS error
            FROM {}
            WHERE icustay_id = ANY($1) AND itemid = ANY($2)
            "#,
            self.table("chartevents")
        ))
        .bind(stays)
        .bind(chart_item_ids())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_labevents(&self, admissions: &[i32]) -> PipelineResult<Vec<LabEvent>> {
        let rows = sqlx::query_as::<_, LabEvent>(&format!(
            r#"
            SELECT hadm_id, itemid, charttime, value, valuenum
            FROM {}
            WHERE hadm_id = ANY($1) AND itemid = ANY($2)
            "#,
            self.table("labevents")
        ))
        .bind(admissions)
        .bind(lab_item_ids())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_outputevents(&self, stays: &[i32]) -> PipelineResult<Vec<OutputEvent>> {
        let rows = sqlx::query_as::<_, OutputEvent>(&format!(
            r#"
            SELECT icustay_id, itemid, charttime, value
            FROM {}
            WHERE icustay_id = ANY($1) AND itemid = ANY($2)
            "#,
            self.table("outputevents")
        ))
        .bind(stays)
        .bind(urine::ITEM_IDS)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_inputevents_cv(&self, stays: &[i32]) -> PipelineResult<Vec<InputEventCv>> {
        let rows = sqlx::query_as::<_, InputEventCv>(&format!(
            r#"
            SELECT icustay_id, itemid, charttime, rate
            FROM {}
            WHERE icustay_id = ANY($1) AND itemid = ANY($2)
            "#,
            self.table("inputevents_cv")
        ))
        .bind(stays)
        .bind(sofa::CAREVUE_VASOPRESSOR_ITEM_IDS)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_inputevents_mv(&self, stays: &[i32]) -> PipelineResult<Vec<InputEventMv>> {
        let rows = sqlx::query_as::<_, InputEventMv>(&format!(
            r#"
            SELECT icustay_id, itemid, starttime, rate, statusdescription
            FROM {}
            WHERE icustay_id = ANY($1) AND itemid = ANY($2)
            "#,
            self.table("inputevents_mv")
        ))
        .bind(stays)
        .bind(sofa::METAVISION_VASOPRESSOR_ITEM_IDS)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_procedureevents_mv(&self, stays: &[i32]) -> PipelineResult<Vec<ProcedureEventMv>> {
        let rows = sqlx::query_as::<_, ProcedureEventMv>(&format!(
            r#"
            SELECT icustay_id, itemid, starttime
            FROM {}
            WHERE icustay_id = ANY($1) AND itemid = ANY($2)
            "#,
            self.table("procedureevents_mv")
        ))
        .bind(stays)
        .bind(ventilation::PROCEDURE_ITEM_IDS)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_services(&self, admissions: &[i32]) -> PipelineResult<Vec<ServiceTransfer>> {
        let rows = sqlx::query_as::<_, ServiceTransfer>(&format!(
            "SELECT hadm_id, transfertime, curr_service FROM {} WHERE hadm_id = ANY($1)",
            self.table("services")
        ))
        .bind(admissions)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_diagnoses(&self, admissions: &[i32]) -> PipelineResult<Vec<DiagnosisCode>> {
        let rows = sqlx::query_as::<_, DiagnosisCode>(&format!(
            "SELECT hadm_id, icd9_code FROM {} WHERE hadm_id = ANY($1)",
            self.table("diagnoses_icd")
        ))
        .bind(admissions)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_echo_notes(&self, subjects: &[i32]) -> PipelineResult<Vec<NoteEvent>> {
        let rows = sqlx::query_as::<_, NoteEvent>(&format!(
            r#"
            SELECT row_id, subject_id, hadm_id, chartdate::timestamp AS chartdate, text
            FROM {}
            WHERE category = $1 AND subject_id = ANY($2)
            "#,
            self.table("noteevents")
        ))
        .bind(echo::ECHO_CATEGORY)
        .bind(subjects)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Load every source table, with event tables restricted to the
    /// admissions and stays of the cohort.
    pub async fn load_source(&self) -> PipelineResult<SourceData> {
        let patients = self.load_patients().await?;
        let admissions = self.load_admissions().await?;
        let icustays = self.load_icustays().await?;
        info!(
            "Loaded {} patients, {} admissions, {} ICU stays from {}",
            patients.len(),
            admissions.len(),
            icustays.len(),
            self.schema
        );

        let cohort = select_cohort(&patients, &admissions, &icustays);
        let stays: Vec<i32> = cohort.iter().map(|s| s.icustay_id).collect();
        let hadms: Vec<i32> = cohort.iter().map(|s| s.hadm_id).collect();
        let subjects: Vec<i32> = cohort.iter().map(|s| s.subject_id).collect();

        let data = SourceData {
            chartevents: self.load_chartevents(&stays).await?,
            labevents: self.load_labevents(&hadms).await?,
            outputevents: self.load_outputevents(&stays).await?,
            inputevents_cv: self.load_inputevents_cv(&stays).await?,
            inputevents_mv: self.load_inputevents_mv(&stays).await?,
            procedureevents_mv: self.load_procedureevents_mv(&stays).await?,
            services: self.load_services(&hadms).await?,
            diagnoses: self.load_diagnoses(&hadms).await?,
            notes: self.load_echo_notes(&subjects).await?,
            patients,
            admissions,
            icustays,
        };

        info!("Loaded {} source events for {} cohort stays", data.event_count(), stays.len());
        Ok(data)
    }

    /// Rows of the configured target patient table
    pub async fn load_targets(&self, table: &str) -> PipelineResult<Vec<TargetPatient>> {
        let rows = sqlx::query_as::<_, TargetPatient>(&format!(
            "SELECT hadm_id::int4 AS hadm_id, age::float8 AS age, admission_type::text AS admission_type FROM {}",
            quote_identifier(table)
        ))
        .fetch_all(&self.pool)
        .await?;

        info!("Loaded {} target admissions from {}", rows.len(), table);
        Ok(rows)
    }

    /// Rows of the configured comorbidity indicator table
    pub async fn load_indicators(&self, table: &str) -> PipelineResult<Vec<ComorbidityIndicators>> {
        let columns = Elixhauser::ALL
            .iter()
            .map(|c| format!("{col}::bigint AS {col}", col = quote_identifier(c.column())))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT hadm_id::int4 AS hadm_id, {} FROM {}", columns, quote_identifier(table));

        let rows = sqlx::query(&sql)
            .try_map(|row: PgRow| {
                let mut values = [None; INDICATOR_COUNT];
                for (i, condition) in Elixhauser::ALL.iter().enumerate() {
                    values[i] = row.try_get::<Option<i64>, _>(condition.column())?;
                }
                Ok(ComorbidityIndicators::new(row.try_get("hadm_id")?, values))
            })
            .fetch_all(&self.pool)
            .await?;

        info!("Loaded {} comorbidity rows from {}", rows.len(), table);
        Ok(rows)
    }

    /// Replace a derived table in the source schema with `rows`.
    ///
    /// Drop, create and insert share one transaction, so readers see either
    /// the previous table or the complete new one.
    pub async fn replace_table<R: TableRow>(&self, name: &str, rows: &[R]) -> PipelineResult<()> {
        let table = self.table(name);
        let columns = R::columns();
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *tx)
            .await?;

        let ddl = columns
            .iter()
            .map(|c| format!("{} {}", quote_identifier(&c.name), c.kind.ddl()))
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!("CREATE TABLE {} ({})", table, ddl))
            .execute(&mut *tx)
            .await?;

        let column_list = columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let chunk_size = (MAX_BIND_PARAMETERS / columns.len().max(1)).max(1);

        for chunk in rows.chunks(chunk_size) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, column_list));
            builder.push_values(chunk, |mut b, row| {
                for value in row.values() {
                    match value {
                        SqlValue::Int(v) => b.push_bind(v),
                        SqlValue::Float(v) => b.push_bind(v),
                        SqlValue::Text(v) => b.push_bind(v),
                        SqlValue::Timestamp(v) => b.push_bind(v),
                    };
                }
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!("Replaced {} ({} columns)", table, columns.len());
        info!("Wrote {} rows to {}", rows.len(), table);
        Ok(())
    }
}
