// ==============================================================================
// main.rs - ICU Subgroups Entry Point
// ==============================================================================
// Description: Command line entry point for severity scoring, LCA export,
//              clustering and subgroup relabeling
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use icu_subgroups::config::Settings;
use icu_subgroups::lca::LcaConfig;
use icu_subgroups::pipeline::Pipeline;
use icu_subgroups::store::Store;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema holding the source tables (overrides MIMIC_SCHEMA)
    #[arg(long, env = "MIMIC_SCHEMA")]
    schema: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cohort, first-day aggregates, SOFA, OASIS and SAPS-II
    Scores,
    /// Write the LCA feature table and script without running it
    ExportLca(LcaArgs),
    /// Export, fit latent class models, relabel K=6 and write profiles
    Cluster {
        #[command(flatten)]
        lca: LcaArgs,

        /// Directory for relabeled assignments and profiles
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Relabel an existing assignments file and write profiles
    Relabel {
        /// CSV with hadm_id and subgroup_K6 columns
        #[arg(long)]
        assignments: PathBuf,

        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct LcaArgs {
    /// R interpreter used for poLCA
    #[arg(long, default_value = "Rscript")]
    program: String,

    /// Directory for the feature table, script and model outputs
    #[arg(long, default_value = "temp")]
    work_dir: PathBuf,

    #[arg(long, default_value_t = 8)]
    kmax: u32,

    #[arg(long, default_value_t = 10)]
    nrep: u32,

    #[arg(long, default_value_t = 5000)]
    maxiter: u32,

    /// Seed passed to set.seed for reproducible fits
    #[arg(long)]
    seed: Option<u64>,
}

impl From<LcaArgs> for LcaConfig {
    fn from(args: LcaArgs) -> Self {
        Self {
            program: args.program,
            work_dir: args.work_dir,
            kmax: args.kmax,
            nrep: args.nrep,
            maxiter: args.maxiter,
            seed: args.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "icu_subgroups=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("Failed to load configuration")?;
    if let Some(schema) = cli.schema {
        settings.source_schema = schema;
    }
    if matches!(cli.command, Command::ExportLca(_) | Command::Cluster { .. }) {
        settings.target_table().context("Feature export needs a target cohort table")?;
    }

    // Connect to database
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("Failed to connect to database")?;

    info!("Connected to database (schema {})", settings.source_schema);

    let store = Store::new(pool, settings.source_schema.clone());
    let pipeline = Pipeline::new(store, settings);
    info!("Run {}", pipeline.run_id());

    match cli.command {
        Command::Scores => {
            let tables = pipeline.run_scores().await.context("Severity scoring failed")?;
            info!(
                "Scored {} stays ({} SOFA, {} OASIS, {} SAPS-II rows)",
                tables.cohort.len(),
                tables.sofa.len(),
                tables.oasis.len(),
                tables.sapsii.len()
            );
        }
        Command::ExportLca(args) => {
            let exported = pipeline
                .export_lca(&args.into())
                .await
                .context("LCA export failed")?;
            info!(
                "Wrote {:?} and {:?} ({} features)",
                exported.data_path,
                exported.script_path,
                exported.manifest.len()
            );
        }
        Command::Cluster { lca, output_dir } => {
            let assignments = pipeline
                .cluster(&lca.into(), &output_dir)
                .await
                .context("Clustering failed")?;
            info!("Assigned {} admissions; profiles in {:?}", assignments.len(), output_dir);
        }
        Command::Relabel { assignments, output_dir } => {
            let relabeled = pipeline
                .relabel(&assignments, &output_dir)
                .await
                .context("Relabeling failed")?;
            info!("Relabeled {} admissions; profiles in {:?}", relabeled.len(), output_dir);
        }
    }

    Ok(())
}
