use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dossier::config::{CommandLineArgs, Config, ExportFormat};
use dossier::models::Dossier;
use dossier::services::{
    discover_targets, read_dev_file_db_ids, render_compact, render_verbose, LlmClient,
    Orchestrator, OrchestratorOptions, Reasoner,
};
use dossier::utils::{DossierError, DossierResult};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = CommandLineArgs::parse();
    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    let _log_guard = init_logging(&config);
    tracing::info!("dossier starting up");

    let result = match args.export {
        Some(format) => export_prompt(&config, &args, format),
        None => run_pipeline(&config, &args).await,
    };

    match result {
        Ok(code) => code,
        Err(e @ DossierError::Config(_)) => {
            eprintln!("configuration error: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("fatal error: {}", e);
            ExitCode::from(1)
        }
    }
}

/// Tracing registry with an optional daily-rolling file layer
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("dossier.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        Some(guard)
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        None
    }
}

/// Maintenance mode: render a prompt from an already-persisted dossier
fn export_prompt(
    config: &Config,
    args: &CommandLineArgs,
    format: ExportFormat,
) -> DossierResult<ExitCode> {
    let db = args
        .db
        .as_deref()
        .ok_or_else(|| DossierError::config("--export requires --db NAME"))?;
    let path = config.output_dir().join(format!("{}.json", db));
    let text = std::fs::read_to_string(&path).map_err(|e| {
        DossierError::config(format!("cannot read dossier {}: {}", path.display(), e))
    })?;
    let dossier: Dossier = serde_json::from_str(&text)?;

    let rendered = match format {
        ExportFormat::Compact => render_compact(&dossier),
        ExportFormat::Verbose => render_verbose(&dossier),
    };
    println!("{}", rendered);
    Ok(ExitCode::SUCCESS)
}

async fn run_pipeline(config: &Config, args: &CommandLineArgs) -> DossierResult<ExitCode> {
    let db_dir = config.db_dir()?;

    let dev_ids = match &args.dev_file {
        Some(path) => Some(read_dev_file_db_ids(path)?),
        None => None,
    };
    let targets = discover_targets(db_dir, args.db.as_deref(), dev_ids.as_deref())?;
    if targets.is_empty() {
        return Err(DossierError::config(format!(
            "no databases found under {}",
            db_dir.display()
        )));
    }
    tracing::info!("{} databases to process", targets.len());

    let reasoner: Arc<dyn Reasoner> = Arc::new(
        LlmClient::new(config.provider())
            .map_err(|e| DossierError::config(e.to_string()))?,
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing in-flight work");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let orchestrator = Orchestrator::new(
        reasoner,
        OrchestratorOptions {
            output_dir: config.output_dir(),
            database_workers: config.pipeline.database_workers,
            table_workers: config.pipeline.table_workers,
            skip_existing: args.skip_existing,
        },
        shutdown,
    );

    let summary = orchestrator.run_batch(targets).await?;
    println!("{}", summary.render());

    // per-database failures are reported but do not fail a partial success
    Ok(ExitCode::SUCCESS)
}
