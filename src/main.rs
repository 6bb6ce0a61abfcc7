use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};

use ironplate::migrator::Migrator;
use ironplate::models;
use ironplate::orm::Db;
use ironplate::request_log::RequestLogger;
use ironplate::router::AppState;
use ironplate::routes;
use ironplate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "ironplate", version, about = "HTTP backend with auth, request logging and schema migration")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Migrate the schema, then serve HTTP until Ctrl-C.
    Serve,
    /// Bring the schema up to date and exit.
    Migrate {
        /// Write the pending SQL to this file instead of applying it.
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = ironplate::logging::init(&settings) {
        eprintln!("❌ Could not initialize logger: {e}");
        return ExitCode::FAILURE;
    }

    let db = match Db::connect(&settings.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("❌ Could not connect to database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db.clone(), settings).await,
        Command::Migrate { plan } => migrate(db.clone(), plan).await,
    };
    db.close().await;
    outcome
}

async fn serve(db: Arc<Db>, settings: Settings) -> ExitCode {
    let migrator = match Migrator::new(db.clone(), &models::registry()) {
        Ok(migrator) => migrator,
        Err(e) => {
            error!("❌ Invalid model definitions: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match migrator.migrate().await {
        Ok(report) => info!(
            "✅ Database migrated ({} operations, marker {})",
            report.operations.len(),
            report.record.name
        ),
        Err(e) => {
            error!("❌ Migration failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let (logger, worker) = RequestLogger::spawn(
        db.clone(),
        settings.request_log_capacity,
        settings.request_log_policy,
    );
    let address = settings.address();
    let state = AppState::new(db, settings).with_request_logger(logger);
    let router = routes::build(state);

    println!("\n🚀 Server is running on http://{address}");
    println!("📝 All HTTP requests will be logged below:");
    println!("{}", "=".repeat(80));

    let result = router.run(&address).await;
    let written = worker.shutdown().await;
    info!("Request logger flushed {} entries", written);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Failed to start server: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn migrate(db: Arc<Db>, plan: Option<PathBuf>) -> ExitCode {
    let migrator = match Migrator::new(db, &models::registry()) {
        Ok(migrator) => migrator,
        Err(e) => {
            error!("❌ Invalid model definitions: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let outcome = match plan {
        Some(path) => migrator.write_plan(&path).await.map(|_| ()),
        None => migrator.run().await.map(|_| ()),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Migration failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
