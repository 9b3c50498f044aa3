use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use intake::http::{router, AppState};
use intake_core::archive::UploadArchive;
use intake_core::config::IntakeConfig;
use intake_core::normalize::NormalizeOptions;
use intake_core::store::{MemoryRepository, PgRepository, RequestRepository};
use intake_core::{db, IngestPipeline};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Request CSV intake: staging, dispatch and statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the upload HTTP server
    Serve(ServeArgs),
    /// Run database migrations
    Migrate,
    /// Ingest a local CSV file and print the outcome
    Import(ImportArgs),
    /// Print statistics for the currently staged generation
    Stats,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Keep everything in process memory instead of Postgres
    #[arg(long)]
    in_memory: bool,
    /// Skip running migrations before serving
    #[arg(long)]
    skip_migrations: bool,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// CSV file with RequestType, RequestStatus and RequestData columns
    file: PathBuf,
    /// Keep everything in process memory instead of Postgres
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = IntakeConfig::from_env().context("invalid intake configuration")?;

    match cli.command {
        Command::Serve(args) => {
            let repository = open_repository(&config, args.in_memory, !args.skip_migrations).await?;
            let pipeline = Arc::new(build_pipeline(&config, repository));
            let app = router(AppState::new(pipeline), config.max_upload_bytes);

            let listener = TcpListener::bind(config.bind_addr)
                .await
                .with_context(|| format!("failed to bind {}", config.bind_addr))?;
            info!("listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app.into_make_service()).await?;
            Ok(())
        }
        Command::Migrate => {
            let pool = connect_pool(&config).await?;
            db::run_migrations(&pool)
                .await
                .context("failed to run database migrations")?;
            info!("Database migrations applied");
            Ok(())
        }
        Command::Import(args) => {
            let contents = tokio::fs::read(&args.file)
                .await
                .with_context(|| format!("failed to read {}", args.file.display()))?;
            let repository = open_repository(&config, args.in_memory, true).await?;
            let pipeline = build_pipeline(&config, repository);
            let outcome = pipeline
                .ingest(&contents)
                .await
                .with_context(|| format!("failed to ingest {}", args.file.display()))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Stats => {
            let pool = connect_pool(&config).await?;
            let pipeline = build_pipeline(&config, Arc::new(PgRepository::new(pool)));
            let statistics = pipeline.current_statistics().await?;
            println!("{}", serde_json::to_string_pretty(&statistics)?);
            Ok(())
        }
    }
}

async fn open_repository(
    config: &IntakeConfig,
    in_memory: bool,
    run_migrations: bool,
) -> Result<Arc<dyn RequestRepository>> {
    if in_memory {
        warn!("Using in-memory repository; staged data is lost on exit");
        return Ok(Arc::new(MemoryRepository::new()));
    }

    let pool = connect_pool(config).await?;
    if run_migrations {
        db::run_migrations(&pool)
            .await
            .context("failed to run database migrations")?;
    } else {
        warn!("Skipping migrations before serving");
    }
    Ok(Arc::new(PgRepository::new(pool)))
}

fn build_pipeline(config: &IntakeConfig, repository: Arc<dyn RequestRepository>) -> IngestPipeline {
    let archive = match &config.upload_dir {
        Some(dir) => UploadArchive::directory(dir.clone()),
        None => UploadArchive::noop(),
    };
    IngestPipeline::new(repository)
        .with_archive(archive)
        .with_options(NormalizeOptions {
            strict: config.strict_validation,
        })
}

async fn connect_pool(config: &IntakeConfig) -> Result<db::DbPool> {
    let database_url = config.require_database_url()?;
    db::connect(database_url, config.max_connections)
        .await
        .context("failed to connect to Postgres")
}
