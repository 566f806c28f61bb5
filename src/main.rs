use aqi_forecast::application::bootstrap::{PersistenceBootstrap, ServicesBootstrap};
use aqi_forecast::application::ml::algorithms::AlgorithmKind;
use aqi_forecast::application::sync::fetcher::SelectionPolicy;
use aqi_forecast::config::Config;
use aqi_forecast::domain::ml::{AlgorithmTag, Horizon};
use aqi_forecast::domain::ml::horizon::parse_horizons;
use aqi_forecast::domain::repositories::ModelRegistry;
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::atomic::Ordering;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "AQI feature sync and multi-horizon model pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full cycle: fetch, merge, materialize, verify, train, promote
    Run {
        /// Bundle selection: "latest", "completed" or a run number
        #[arg(long)]
        policy: Option<String>,

        /// Lookback window in hours for bundle selection
        #[arg(long)]
        lookback_hours: Option<i64>,

        /// Horizons to train (comma separated, e.g. "24,48,72")
        #[arg(long)]
        horizons: Option<String>,
    },
    /// Performance history of one horizon, most recent first
    History {
        /// Horizon in hours
        #[arg(long)]
        horizon: u32,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Only entries of this algorithm family (e.g. "random_forest")
        #[arg(long)]
        algorithm: Option<String>,
    },
    /// Active model and rollback target per horizon
    Status,
    /// Predict AQI for one entity with the deployed model
    Predict {
        #[arg(long)]
        entity: String,

        /// Horizon in hours
        #[arg(long)]
        horizon: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    let persistence = PersistenceBootstrap::init(&config.store).await?;

    match cli.command {
        Commands::Run {
            policy,
            lookback_hours,
            horizons,
        } => {
            let mut handle = ServicesBootstrap::init(&config, &persistence)?;

            let options = handle.driver.options_mut();
            if let Some(policy) = policy {
                options.selection_policy = policy.parse::<SelectionPolicy>()?;
            }
            if let Some(hours) = lookback_hours {
                if hours <= 0 {
                    anyhow::bail!("--lookback-hours must be positive");
                }
                options.lookback = chrono::Duration::hours(hours);
            }
            if let Some(horizons) = horizons {
                options.horizons = parse_horizons(&horizons)?;
            }

            // Ctrl-C stops training at the next unit boundary
            let cancel = handle.driver.trainer().cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling remaining training units");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let summary = handle.driver.run(Utc::now()).await;

            if config.observability.enabled {
                info!("Metrics after run:\n{}", handle.metrics.render());
                if let Some(path) = &config.observability.metrics_path
                    && let Err(e) = handle.metrics.write_textfile(path)
                {
                    warn!("Failed to write metrics to {:?}: {:#}", path, e);
                }
            }

            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.is_failure() {
                std::process::exit(1);
            }
        }
        Commands::History {
            horizon,
            limit,
            algorithm,
        } => {
            let algorithm = algorithm
                .map(|name| name.parse::<AlgorithmKind>().map(|kind| AlgorithmTag::new(kind.as_str())))
                .transpose()?;
            let entries = persistence
                .registry
                .list_history_filtered(Horizon(horizon), limit, algorithm.as_ref())
                .await?;
            if entries.is_empty() {
                println!("No history for horizon {}", Horizon(horizon));
            }
            for entry in entries {
                println!(
                    "v{:<4} {:<18} rmse={:>8.3} mae={:>8.3} r2={:>7.3} {} {}",
                    entry.version,
                    entry.candidate.algorithm,
                    entry.candidate.metrics.rmse,
                    entry.candidate.metrics.mae,
                    entry.candidate.metrics.r2,
                    entry.decision.reason,
                    if entry.deployed { "[deployed]" } else { "" }
                );
            }
        }
        Commands::Status => {
            for horizon in &config.pipeline.horizons {
                let active = persistence.registry.get_active(*horizon).await?;
                let rollback = persistence.registry.rollback_target(*horizon).await?;
                match active {
                    Some(model) => println!(
                        "{}: v{} {} rmse={:.3} promoted {} (rollback: {})",
                        horizon,
                        model.version,
                        model.candidate.algorithm,
                        model.rmse(),
                        model.promoted_at.to_rfc3339(),
                        rollback.map_or("none".to_string(), |r| format!("v{}", r.version))
                    ),
                    None => println!("{}: no deployed model", horizon),
                }
            }
        }
        Commands::Predict { entity, horizon } => {
            let handle = ServicesBootstrap::init(&config, &persistence)?;
            let prediction = handle.serving.predict(&entity, Horizon(horizon)).await?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
    }

    Ok(())
}
