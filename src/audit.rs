// ==============================================================================
// audit.rs - Pipeline Audit Trail
// ==============================================================================
// Description: Records run and stage events, with table fingerprints, in the
//              pipeline_audit table
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineResult;
use crate::store::Store;

pub const AUDIT_TABLE: &str = "pipeline_audit";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RunStarted,
    StageCompleted,
    RunCompleted,
    RunFailed,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RunStarted => "run_started",
            AuditEventType::StageCompleted => "stage_completed",
            AuditEventType::RunCompleted => "run_completed",
            AuditEventType::RunFailed => "run_failed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Error,
}

impl LogSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSeverity::Info => "info",
            LogSeverity::Error => "error",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Derived table or stage name
    pub stage: Option<String>,
    pub row_count: Option<i64>,
    /// SHA-256 of the table's canonical CSV form
    pub fingerprint: Option<String>,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(run_id: Uuid, event_type: AuditEventType, details: serde_json::Value) -> Self {
        let severity = match event_type {
            AuditEventType::RunFailed => LogSeverity::Error,
            _ => LogSeverity::Info,
        };

        Self {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
            event_type,
            stage: None,
            row_count: None,
            fingerprint: None,
            details,
            severity,
        }
    }

    pub fn stage(run_id: Uuid, stage: &str, row_count: usize, fingerprint: String) -> Self {
        Self {
            stage: Some(stage.to_string()),
            row_count: Some(row_count as i64),
            fingerprint: Some(fingerprint),
            ..Self::new(run_id, AuditEventType::StageCompleted, serde_json::json!({}))
        }
    }

    pub async fn log(&self, store: &Store) -> PipelineResult<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (
                id, run_id, timestamp, event_type, stage,
                row_count, fingerprint, details, severity
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            store.table(AUDIT_TABLE)
        ))
        .bind(self.id)
        .bind(self.run_id)
        .bind(self.timestamp)
        .bind(self.event_type.as_str())
        .bind(&self.stage)
        .bind(self.row_count)
        .bind(&self.fingerprint)
        .bind(&self.details)
        .bind(self.severity.as_str())
        .execute(store.pool())
        .await?;

        Ok(())
    }
}

/// Create the audit table if it does not exist yet. Unlike derived
/// tables it is never dropped.
pub async fn ensure_table(store: &Store) -> PipelineResult<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            run_id UUID NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            event_type TEXT NOT NULL,
            stage TEXT,
            row_count BIGINT,
            fingerprint TEXT,
            details JSONB NOT NULL,
            severity TEXT NOT NULL
        )
        "#,
        store.table(AUDIT_TABLE)
    ))
    .execute(store.pool())
    .await?;

    Ok(())
}

/// Convenience function to log a run-level event
pub async fn log_event(
    store: &Store,
    run_id: Uuid,
    event_type: AuditEventType,
    details: serde_json::Value,
) -> PipelineResult<()> {
    AuditEvent::new(run_id, event_type, details).log(store).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_event_carries_fingerprint() {
        let run_id = Uuid::new_v4();
        let event = AuditEvent::stage(run_id, "sofa", 42, "ab".repeat(32));

        assert_eq!(event.run_id, run_id);
        assert_eq!(event.event_type, AuditEventType::StageCompleted);
        assert_eq!(event.stage.as_deref(), Some("sofa"));
        assert_eq!(event.row_count, Some(42));
        assert_eq!(event.fingerprint.as_ref().map(String::len), Some(64));
        assert_eq!(event.severity, LogSeverity::Info);
    }

    #[test]
    fn test_failure_severity() {
        let event = AuditEvent::new(Uuid::new_v4(), AuditEventType::RunFailed, serde_json::json!({"error": "boom"}));
        assert_eq!(event.severity, LogSeverity::Error);
        assert_eq!(event.event_type.as_str(), "run_failed");
    }

    #[test]
    fn test_event_type_serializes_like_column_value() {
        for kind in [
            AuditEventType::RunStarted,
            AuditEventType::StageCompleted,
            AuditEventType::RunCompleted,
            AuditEventType::RunFailed,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), serde_json::json!(kind.as_str()));
        }
    }
}
