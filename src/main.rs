use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod averages;
mod config;
mod db;
mod engine;
mod error;
mod ingest;
mod models;
mod performance;
mod progression;
mod ranking;
mod report;
mod score;
mod standardized;
mod store;

use config::Settings;
use db::PgRecordStore;
use engine::Engine;
use models::{AverageMode, PersonKey, Scale};
use ranking::{Columns, Metric};
use store::{InMemoryStore, RecordStore};

#[derive(Parser)]
#[command(name = "training-coefficients")]
#[command(
    about = "Performance coefficients and rankings for training exam results",
    long_about = None
)]
struct Cli {
    /// Compute from a CSV export instead of Postgres
    #[arg(long, global = true)]
    records: Option<PathBuf>,
    /// Deadline for each request against the record store
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(multiple = false)]
struct PersonArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    login: Option<String>,
    #[arg(long)]
    external_id: Option<String>,
}

impl PersonArgs {
    fn optional_key(self) -> Option<PersonKey> {
        self.name
            .map(PersonKey::Name)
            .or(self.login.map(PersonKey::LoginCode))
            .or(self.external_id.map(PersonKey::ExternalId))
    }

    fn key(self) -> anyhow::Result<PersonKey> {
        self.optional_key()
            .context("one of --name, --login or --external-id is required")
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RankMetric {
    Average,
    Performance,
    Progression,
    Standardized,
    Score,
}

#[derive(Clone, Copy, ValueEnum)]
enum MeanMetric {
    Performance,
    Progression,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import exam results from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    #[command(flatten)]
    Query(QueryCommand),
}

#[derive(Subcommand)]
enum QueryCommand {
    /// Average score of one person, or of a whole scope when no person is given
    Average {
        #[command(flatten)]
        person: PersonArgs,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        training: Option<String>,
        /// general, primary, final or all
        #[arg(long, default_value = "general")]
        mode: String,
    },
    /// Performance coefficient (CR)
    Performance {
        #[command(flatten)]
        person: PersonArgs,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        training: Option<String>,
    },
    /// Progression coefficient (CP)
    Progression {
        #[command(flatten)]
        person: PersonArgs,
        #[arg(long)]
        category: Option<String>,
    },
    /// Standardized performance coefficient (CRP)
    Standardized {
        #[command(flatten)]
        person: PersonArgs,
        #[arg(long)]
        category: Option<String>,
    },
    /// Final score combining CR, CP and CRP
    Score {
        #[command(flatten)]
        person: PersonArgs,
        #[arg(long)]
        category: Option<String>,
        /// Divide the score by 100
        #[arg(long)]
        normalized: bool,
        /// Print the CR, CP and CRP behind the score
        #[arg(long)]
        breakdown: bool,
    },
    /// Population mean of a coefficient
    Mean {
        #[arg(value_enum)]
        metric: MeanMetric,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        training: Option<String>,
    },
    /// Rank everyone with an exam in scope
    Ranking {
        #[arg(value_enum)]
        metric: RankMetric,
        /// Average mode when ranking by average
        #[arg(long, default_value = "general")]
        mode: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        no_name: bool,
        #[arg(long)]
        external_id: bool,
        #[arg(long)]
        top20: bool,
        /// Score rankings: keep only the final score column
        #[arg(long)]
        metric_only: bool,
        #[arg(long)]
        json: bool,
    },
}

enum Backend {
    Postgres(PgRecordStore),
    Memory(InMemoryStore),
}

impl Backend {
    fn store(&self) -> &dyn RecordStore {
        match self {
            Backend::Postgres(store) => store,
            Backend::Memory(store) => store,
        }
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect(settings.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

async fn open_backend(
    cli_records: Option<&PathBuf>,
    settings: &Settings,
) -> anyhow::Result<Backend> {
    match cli_records {
        Some(path) => {
            let store = InMemoryStore::from_csv_rows(ingest::read_exam_csv(path)?);
            info!(
                records = store.record_count(),
                path = %path.display(),
                "loaded offline record store"
            );
            Ok(Backend::Memory(store))
        }
        None => Ok(Backend::Postgres(PgRecordStore::new(connect(settings).await?))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "training_coefficients=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let timeout = cli
        .timeout_secs
        .map(Duration::from_secs)
        .or(settings.request_timeout);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect(&settings).await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&connect(&settings).await?).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let rows = ingest::read_exam_csv(&csv)?;
            let pool = connect(&settings).await?;
            let inserted = db::import_csv(&pool, rows).await?;
            println!("Inserted {inserted} exam results from {}.", csv.display());
        }
        Commands::Query(command) => {
            let backend = open_backend(cli.records.as_ref(), &settings).await?;
            let engine = Engine::new(backend.store()).with_timeout(timeout);
            run_query(&engine, command).await?;
        }
    }

    Ok(())
}

async fn run_query(engine: &Engine<'_>, command: QueryCommand) -> anyhow::Result<()> {
    match command {
        QueryCommand::Average {
            person,
            category,
            training,
            mode,
        } => {
            let mode: AverageMode = mode.parse()?;
            let value = match person.optional_key() {
                Some(key) => {
                    engine
                        .person_average(key, category.as_deref(), training.as_deref(), mode)
                        .await?
                }
                None => {
                    engine
                        .scope_average(category.as_deref(), training.as_deref(), mode)
                        .await?
                }
            };
            println!("{mode} average: {}", report::format_average(&value));
        }
        QueryCommand::Performance {
            person,
            category,
            training,
        } => {
            let value = engine
                .performance(person.key()?, category.as_deref(), training.as_deref())
                .await?;
            println!("Performance coefficient: {value:.4}");
        }
        QueryCommand::Progression { person, category } => {
            let value = engine.progression(person.key()?, category.as_deref()).await?;
            println!("Progression coefficient: {value:.4}");
        }
        QueryCommand::Standardized { person, category } => {
            let value = engine.standardized(person.key()?, category.as_deref()).await?;
            println!("Standardized coefficient: {value:.4}");
        }
        QueryCommand::Score {
            person,
            category,
            normalized,
            breakdown,
        } => {
            let key = person.key()?;
            if breakdown {
                let result = engine.score_breakdown(key, category.as_deref()).await?;
                println!("{}", report::format_breakdown(&result));
            } else {
                let scale = if normalized { Scale::Unit } else { Scale::Hundred };
                let value = engine.final_score(key, category.as_deref(), scale).await?;
                println!("Final score: {value:.4}");
            }
        }
        QueryCommand::Mean {
            metric,
            category,
            training,
        } => {
            let value = match metric {
                MeanMetric::Performance => {
                    engine
                        .mean_performance(category.as_deref(), training.as_deref())
                        .await?
                }
                MeanMetric::Progression => {
                    if training.is_some() {
                        anyhow::bail!("mean progression is scoped by category only");
                    }
                    engine.mean_progression(category.as_deref()).await?
                }
            };
            println!("Population mean: {value:.4}");
        }
        QueryCommand::Ranking {
            metric,
            mode,
            category,
            no_name,
            external_id,
            top20,
            metric_only,
            json,
        } => {
            let metric = match metric {
                RankMetric::Average => Metric::Average(mode.parse()?),
                RankMetric::Performance => Metric::Performance,
                RankMetric::Progression => Metric::Progression,
                RankMetric::Standardized => Metric::Standardized,
                RankMetric::Score => Metric::Score,
            };
            let columns = Columns {
                include_name: !no_name,
                include_external_id: external_id,
                metric_only,
            };

            let ranking = engine
                .ranking(metric, category.as_deref(), top20)
                .await
                .context("no result")?;
            if json {
                println!("{}", report::ranking_json(&ranking, &columns)?);
            } else {
                print!("{}", report::build_ranking_report(&ranking, &columns));
            }
        }
    }

    Ok(())
}
