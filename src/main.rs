use admissions_etl::app::ports::{StagingSink, WarehouseMerger};
use admissions_etl::config::EtlConfig;
use admissions_etl::infra::sqlite_warehouse::SqliteWarehouse;
use admissions_etl::pipeline::keyer::assign_keys;
use admissions_etl::pipeline::{Pipeline, PipelineReport};
use admissions_etl::{generator, logging, metrics, schema, server};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "admissions_etl")]
#[command(about = "Hospital admissions batch ETL: clean, deduplicate, key, stage and merge")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./etl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for one CSV file
    Run {
        #[arg(long)]
        file: PathBuf,
    },
    /// Clean, deduplicate and key a CSV without touching the database
    Validate {
        #[arg(long)]
        file: PathBuf,
        /// Also print the cleaned batch as JSON
        #[arg(long)]
        dump: bool,
    },
    /// Generate a synthetic admissions CSV
    Generate {
        #[arg(long, default_value_t = 10_000)]
        rows: usize,
        #[arg(long, default_value = "generated_admissions_batch_1.csv")]
        output: PathBuf,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
        /// Also key the rows and load them through staging and merge
        #[arg(long)]
        push: bool,
    },
    /// Serve the upload form and HTTP endpoints
    Serve {
        /// Overrides the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
}

type Ports = (Arc<dyn StagingSink>, Arc<dyn WarehouseMerger>);

#[cfg(feature = "db")]
async fn remote_warehouse(config: &EtlConfig) -> anyhow::Result<Option<Ports>> {
    use admissions_etl::infra::libsql_warehouse::LibsqlWarehouse;

    let (Some(url), Some(token)) = (&config.libsql_url, &config.libsql_auth_token) else {
        return Ok(None);
    };
    let wh = Arc::new(
        LibsqlWarehouse::connect(url, token, &config.staging_table, &config.merge_procedure)
            .await?,
    );
    let staging: Arc<dyn StagingSink> = wh.clone();
    let merger: Arc<dyn WarehouseMerger> = wh;
    Ok(Some((staging, merger)))
}

#[cfg(not(feature = "db"))]
async fn remote_warehouse(_config: &EtlConfig) -> anyhow::Result<Option<Ports>> {
    Ok(None)
}

/// Open the warehouse once; every run in this process shares it.
async fn open_warehouse(config: &EtlConfig) -> anyhow::Result<Ports> {
    if let Some(ports) = remote_warehouse(config).await? {
        return Ok(ports);
    }
    let wh = Arc::new(
        SqliteWarehouse::open(
            &config.database_path,
            &config.staging_table,
            &config.merge_procedure,
        )
        .with_context(|| {
            format!(
                "Failed to open warehouse at {}",
                config.database_path.display()
            )
        })?,
    );
    let staging: Arc<dyn StagingSink> = wh.clone();
    let merger: Arc<dyn WarehouseMerger> = wh;
    Ok((staging, merger))
}

async fn build_pipeline(config: &EtlConfig) -> anyhow::Result<Pipeline> {
    let (staging, merger) = open_warehouse(config).await?;
    Ok(Pipeline::new(staging, merger, config.staging_table.clone()))
}

fn print_report(report: &PipelineReport) {
    println!("\n📊 Batch {}", report.batch_id);
    println!("   Rows read: {}", report.load.rows_read);
    if !report.load.ignored_columns.is_empty() {
        println!("   Ignored columns: {}", report.load.ignored_columns.join(", "));
    }
    println!(
        "   Dropped (missing Name/Admission Date): {}",
        report.clean.dropped_missing_required
    );
    for (column, count) in &report.clean.coerced_to_null {
        println!("   Coerced to null in {column}: {count}");
    }
    println!(
        "   Exact duplicates removed: {}",
        report.dedup.exact_duplicates_removed
    );
    println!(
        "   Consolidated by minimum age: {}",
        report.dedup.age_consolidated
    );
    if report.shared_keys > 0 {
        println!("   Rows sharing a SourceAdmissionID: {}", report.shared_keys);
    }
    println!("   Clean rows: {}", report.records);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = EtlConfig::load(cli.config.as_deref())?;
    let _log_guard = logging::init_logging(&config.log_dir);

    match cli.command {
        Commands::Run { file } => {
            let bytes = fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            info!("Running ETL for {}", file.display());

            let pipeline = build_pipeline(&config).await?;
            let outcome = pipeline.run(&bytes).await;
            if let Some(report) = &outcome.report {
                print_report(report);
            }
            if outcome.ok {
                println!("✅ {}", outcome.message);
            } else {
                println!("❌ {}", outcome.message);
                bail!("ETL run failed: {}", outcome.message);
            }
        }
        Commands::Validate { file, dump } => {
            let bytes = fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let prepared = Pipeline::prepare(&bytes)?;
            print_report(&prepared.report);
            if dump {
                println!("{}", serde_json::to_string_pretty(&prepared.records)?);
            }
        }
        Commands::Generate {
            rows,
            output,
            seed,
            push,
        } => {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            let today = chrono::Local::now().date_naive();
            info!("Generating {} new rows of data", rows);
            let mut records = generator::generate_rows(rows, &mut rng, today);

            let file = fs::File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            generator::write_csv(&records, file)?;
            println!("📝 Wrote {} rows to {}", records.len(), output.display());

            if push {
                assign_keys(&mut records);
                schema::validate_batch(&records)?;

                let pipeline = build_pipeline(&config).await?;
                let loaded = match pipeline.stage(&records).await {
                    Ok(()) => pipeline.merge().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = loaded {
                    error!("Generated batch load failed: {}", e);
                    return Err(e.into());
                }
                println!("✅ Successfully generated and loaded {} rows", records.len());
            }
        }
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            let addr = config.socket_addr()?;

            metrics::init_metrics();
            let pipeline = Arc::new(build_pipeline(&config).await?);
            if let Err(e) = server::start_server(pipeline, addr).await {
                bail!("Server error: {e}");
            }
        }
    }

    Ok(())
}
