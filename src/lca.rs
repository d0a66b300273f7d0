// ==============================================================================
// lca.rs - External Latent Class Analysis Runner
// ==============================================================================
// Description: Exports the feature table, generates the poLCA script, runs it
//              through the R interpreter and loads the fitted results
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::canonicalize::SubgroupAssignment;
use crate::comorbidity::FeatureRow;
use crate::error::{PipelineError, PipelineResult};
use crate::table::write_csv_file;

pub const DATA_FILE: &str = "lca_data.csv";
pub const SCRIPT_FILE: &str = "lca_script.R";
pub const MODEL_COMPARISON_FILE: &str = "lca_model_comparison.csv";
pub const ALL_SUBGROUPS_FILE: &str = "lca_all_subgroups.csv";
pub const BEST_MODEL_FILE: &str = "lca_best_model.csv";
pub const RELABELED_FILE: &str = "lca_all_subgroups_relabeled.csv";

/// LCA procedure settings
#[derive(Debug, Clone, PartialEq)]
pub struct LcaConfig {
    /// Interpreter used to run the generated script
    pub program: String,
    pub work_dir: PathBuf,
    /// Largest class count fitted; models run for K = 1..=kmax
    pub kmax: u32,
    /// Random restarts per K
    pub nrep: u32,
    pub maxiter: u32,
    pub seed: Option<u64>,
}

impl Default for LcaConfig {
    fn default() -> Self {
        Self {
            program: "Rscript".to_string(),
            work_dir: PathBuf::from("temp"),
            kmax: 8,
            nrep: 10,
            maxiter: 5000,
            seed: None,
        }
    }
}

impl LcaConfig {
    pub fn path(&self, file: &str) -> PathBuf {
        self.work_dir.join(file)
    }
}

/// Fit statistics for one class count; `None` when the fit failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFit {
    pub k: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub llik: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub aic: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub bic: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub npar: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LcaExport {
    pub data_path: PathBuf,
    pub script_path: PathBuf,
    pub manifest: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LcaResults {
    pub comparison: Vec<ModelFit>,
    /// Minimum-BIC model, absent when no K could be fitted
    pub best: Option<ModelFit>,
    pub assignments_path: PathBuf,
}

/// Quote a name as an R string literal
fn r_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Generate the poLCA script. It reads `lca_data.csv` from its working
/// directory and writes the three result files next to it.
pub fn render_script(config: &LcaConfig, manifest: &[String]) -> String {
    let columns = manifest.iter().map(|m| r_string(m)).collect::<Vec<_>>().join(", ");
    let formula = format!("cbind({}) ~ 1", manifest.join(", "));
    let seed = config.seed.map(|s| format!("set.seed({})\n", s)).unwrap_or_default();

    format!(
        r#"library(poLCA)
{seed}
data <- read.csv({data})
ids <- data$hadm_id
manifest <- c({columns})
features <- data[, manifest]

# poLCA requires categories coded 1..n
for (col in manifest) {{
    features[[col]] <- as.numeric(as.factor(features[[col]]))
}}

formula <- as.formula({formula})
fits <- list()

for (k in 1:{kmax}) {{
    tryCatch({{
        fit <- poLCA(formula, features, nclass = k, nrep = {nrep}, maxiter = {maxiter}, verbose = FALSE, na.rm = FALSE)
        fits[[as.character(k)]] <- fit
        message(paste0("K=", k, ": BIC=", round(fit$bic, 1), ", AIC=", round(fit$aic, 1)))
    }}, error = function(e) {{
        message(paste0("K=", k, ": failed - ", conditionMessage(e)))
    }})
}}

comparison <- data.frame(k = integer(), llik = numeric(), aic = numeric(), bic = numeric(), npar = numeric())
assignments <- data.frame(hadm_id = ids)

for (k in 1:{kmax}) {{
    fit <- fits[[as.character(k)]]
    column <- paste0("subgroup_K", k)
    if (is.null(fit)) {{
        comparison <- rbind(comparison, data.frame(k = k, llik = NA, aic = NA, bic = NA, npar = NA))
        assignments[[column]] <- NA
    }} else {{
        comparison <- rbind(comparison, data.frame(k = k, llik = fit$llik, aic = fit$aic, bic = fit$bic, npar = fit$npar))
        assignments[[column]] <- fit$predclass
    }}
}}

fitted <- comparison[!is.na(comparison$bic), ]
best <- fitted[which.min(fitted$bic), ]

write.csv(comparison, {comparison_file}, row.names = FALSE, na = "")
write.csv(assignments, {subgroups_file}, row.names = FALSE, na = "")
write.csv(best, {best_file}, row.names = FALSE, na = "")
"#,
        seed = seed,
        data = r_string(DATA_FILE),
        columns = columns,
        formula = r_string(&formula),
        kmax = config.kmax,
        nrep = config.nrep,
        maxiter = config.maxiter,
        comparison_file = r_string(MODEL_COMPARISON_FILE),
        subgroups_file = r_string(ALL_SUBGROUPS_FILE),
        best_file = r_string(BEST_MODEL_FILE),
    )
}

/// Write `lca_data.csv` and the R script into the work directory
pub fn export(rows: &[FeatureRow], config: &LcaConfig) -> PipelineResult<LcaExport> {
    std::fs::create_dir_all(&config.work_dir)?;

    let manifest = FeatureRow::manifest();
    let data_path = config.path(DATA_FILE);
    write_csv_file(rows, &data_path)?;

    let script_path = config.path(SCRIPT_FILE);
    std::fs::write(&script_path, render_script(config, &manifest))?;

    info!(
        "Exported {} rows x {} manifest variables to {:?}",
        rows.len(),
        manifest.len(),
        data_path
    );
    debug!("LCA script written to {:?}", script_path);

    Ok(LcaExport { data_path, script_path, manifest })
}

/// Run the generated script and wait for it to finish.
///
/// No retry and no timeout: the call blocks until the interpreter exits.
pub async fn run_procedure(config: &LcaConfig) -> PipelineResult<()> {
    info!("Running {} {} (K = 1..={})", config.program, SCRIPT_FILE, config.kmax);

    let output = Command::new(&config.program)
        .arg(SCRIPT_FILE)
        .current_dir(&config.work_dir)
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::ProcedureNotFound { program: config.program.clone() },
            _ => PipelineError::Io(e),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(PipelineError::ProcedureFailed { status: output.status.to_string(), stderr, stdout });
    }
    debug!("LCA procedure output:\n{}{}", stdout, stderr);

    for file in [MODEL_COMPARISON_FILE, ALL_SUBGROUPS_FILE, BEST_MODEL_FILE] {
        let path = config.path(file);
        if !path.exists() {
            return Err(PipelineError::MissingOutput { path });
        }
    }

    info!("LCA procedure completed");
    Ok(())
}

fn read_fits(path: &Path) -> PipelineResult<Vec<ModelFit>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut fits = Vec::new();
    for record in reader.deserialize() {
        fits.push(record?);
    }
    Ok(fits)
}

/// Load the model comparison and the selected best model
pub fn load_results(config: &LcaConfig) -> PipelineResult<LcaResults> {
    let comparison = read_fits(&config.path(MODEL_COMPARISON_FILE))?;
    let best = read_fits(&config.path(BEST_MODEL_FILE))?.into_iter().next();

    for fit in comparison.iter().filter(|f| f.bic.is_none()) {
        warn!("LCA model with K={} failed to fit", fit.k);
    }
    match &best {
        Some(fit) => info!("Best LCA model by BIC: K={} (BIC={:?})", fit.k, fit.bic),
        None => warn!("No LCA model could be fitted"),
    }

    Ok(LcaResults { comparison, best, assignments_path: config.path(ALL_SUBGROUPS_FILE) })
}

/// Read the `subgroup_K{k}` column of an assignments file.
///
/// Rows whose admission or class is missing (`NA` or empty) are skipped.
pub fn read_assignments(path: &Path, k: u32) -> PipelineResult<Vec<SubgroupAssignment>> {
    let column = format!("subgroup_K{}", k);
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h.trim_matches('"') == name);
    let hadm_index = position("hadm_id").ok_or_else(|| PipelineError::MissingSubgroupColumn("hadm_id".to_string()))?;
    let class_index = position(&column).ok_or_else(|| PipelineError::MissingSubgroupColumn(column.clone()))?;

    let mut assignments = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let hadm_id = record.get(hadm_index).and_then(|v| v.trim().parse::<i32>().ok());
        let subgroup = record.get(class_index).and_then(|v| v.trim().parse::<u32>().ok());
        match (hadm_id, subgroup) {
            (Some(hadm_id), Some(subgroup)) => assignments.push(SubgroupAssignment { hadm_id, subgroup }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} rows without a {} assignment", skipped, column);
    }
    info!("Loaded {} assignments from {:?}", assignments.len(), path);
    Ok(assignments)
}

/// Export, run and load in one step
pub async fn run_lca(rows: &[FeatureRow], config: &LcaConfig) -> PipelineResult<LcaResults> {
    export(rows, config)?;
    run_procedure(config).await?;
    load_results(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comorbidity::INDICATOR_COUNT;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, program: &str) -> LcaConfig {
        LcaConfig { program: program.to_string(), work_dir: dir.path().to_path_buf(), ..LcaConfig::default() }
    }

    fn feature(hadm_id: i32) -> FeatureRow {
        FeatureRow { hadm_id, indicators: [2; INDICATOR_COUNT], admission_type_binary: 1, age_bin: 3 }
    }

    #[test]
    fn test_script_excludes_hadm_id_from_formula() {
        let manifest = FeatureRow::manifest();
        let script = render_script(&LcaConfig::default(), &manifest);

        let formula_line = script.lines().find(|l| l.starts_with("formula <-")).unwrap();
        assert!(formula_line.contains("cbind(congestive_heart_failure, "));
        assert!(formula_line.contains("admission_type_binary, age_bin) ~ 1"));
        assert!(!formula_line.contains("hadm_id"));
        assert!(script.contains("for (k in 1:8)"));
        assert!(script.contains("nrep = 10, maxiter = 5000"));
        assert!(!script.contains("set.seed"));
    }

    #[test]
    fn test_script_honours_configuration() {
        let config = LcaConfig { kmax: 6, nrep: 3, maxiter: 100, seed: Some(42), ..LcaConfig::default() };
        let script = render_script(&config, &FeatureRow::manifest());
        assert!(script.contains("for (k in 1:6)"));
        assert!(script.contains("nrep = 3, maxiter = 100"));
        assert!(script.contains("set.seed(42)"));
    }

    #[test]
    fn test_export_writes_data_and_script() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "Rscript");
        let exported = export(&[feature(100), feature(101)], &config).unwrap();

        let data = std::fs::read_to_string(&exported.data_path).unwrap();
        let mut lines = data.lines();
        assert!(lines.next().unwrap().starts_with("hadm_id,congestive_heart_failure,"));
        assert!(lines.next().unwrap().starts_with("100,2,2,"));
        assert_eq!(data.lines().count(), 3);
        assert!(exported.script_path.exists());
        assert_eq!(exported.manifest.len(), INDICATOR_COUNT + 2);
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "icu-subgroups-no-such-interpreter");
        let err = run_procedure(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::ProcedureNotFound { ref program } if program == "icu-subgroups-no-such-interpreter"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_captures_output() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "sh");
        std::fs::write(config.path(SCRIPT_FILE), "echo fitting\necho 'poLCA not installed' >&2\nexit 3\n").unwrap();

        match run_procedure(&config).await.unwrap_err() {
            PipelineError::ProcedureFailed { stderr, stdout, .. } => {
                assert!(stderr.contains("poLCA not installed"));
                assert!(stdout.contains("fitting"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_output_file() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "sh");
        std::fs::write(config.path(SCRIPT_FILE), "exit 0\n").unwrap();

        let err = run_procedure(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingOutput { ref path } if path.ends_with(MODEL_COMPARISON_FILE)));
    }

    #[tokio::test]
    async fn test_successful_run_loads_results() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir, "sh");
        let script = format!(
            "printf 'k,llik,aic,bic,npar\\n1,-10.5,25,30,2\\n2,,,,\\n3,-8,22,28.5,5\\n' > {}\n\
             printf 'hadm_id,subgroup_K1,subgroup_K2,subgroup_K3\\n100,1,,2\\n101,1,,NA\\n' > {}\n\
             printf 'k,llik,aic,bic,npar\\n3,-8,22,28.5,5\\n' > {}\n",
            MODEL_COMPARISON_FILE, ALL_SUBGROUPS_FILE, BEST_MODEL_FILE
        );
        std::fs::write(config.path(SCRIPT_FILE), script).unwrap();

        run_procedure(&config).await.unwrap();
        let results = load_results(&config).unwrap();

        assert_eq!(results.comparison.len(), 3);
        assert_eq!(results.comparison[1].bic, None);
        assert_eq!(results.best.as_ref().map(|b| b.k), Some(3));

        let k3 = read_assignments(&results.assignments_path, 3).unwrap();
        assert_eq!(k3, vec![SubgroupAssignment { hadm_id: 100, subgroup: 2 }]);
        assert!(read_assignments(&results.assignments_path, 2).unwrap().is_empty());
    }

    #[test]
    fn test_missing_subgroup_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(ALL_SUBGROUPS_FILE);
        std::fs::write(&path, "hadm_id,subgroup_K1\n1,1\n").unwrap();

        let err = read_assignments(&path, 6).unwrap_err();
        assert!(matches!(err, PipelineError::MissingSubgroupColumn(ref c) if c == "subgroup_K6"));
    }

    #[test]
    fn test_reads_quoted_r_headers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(ALL_SUBGROUPS_FILE);
        std::fs::write(&path, "\"hadm_id\",\"subgroup_K6\"\n7,4\n8,6\n").unwrap();

        let rows = read_assignments(&path, 6).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], SubgroupAssignment { hadm_id: 8, subgroup: 6 });
    }
}
