use clap::Parser;
use factsweep::{
    cli::{Args, CleanupFactsArgs, Command, CommandError, handle_cleanup_facts},
    config::SweeperConfig,
    db::DbPool,
    observability,
    retention::{FactCleanup, start_cleanup_worker},
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match SweeperConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Error: Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        eprintln!("Error: Failed to initialize metrics: {}", e);
        std::process::exit(1);
    }

    match args.command {
        Command::CleanupFacts(cleanup_args) => {
            run_cleanup_facts(&config, &cleanup_args).await;
        }
        Command::Worker => {
            run_worker(&config).await;
        }
        Command::Migrate => {
            run_migrate(&config).await;
        }
    }
}

async fn run_cleanup_facts(config: &SweeperConfig, cleanup_args: &CleanupFactsArgs) {
    // Reject bad flags before connecting
    if let Err(e) = cleanup_args.parse_request() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let db = connect(config).await;
    let cleanup =
        FactCleanup::new(db.facts(), &config.cleanup).with_dry_run(cleanup_args.dry_run);

    match handle_cleanup_facts(cleanup_args, &cleanup).await {
        Ok(summary) => println!("{}", summary),
        Err(e) => {
            tracing::error!(error = %e, "Fact cleanup failed");
            eprintln!("Error: {}", e);
            flush_metrics(config);
            std::process::exit(1);
        }
    }

    flush_metrics(config);
}

async fn run_worker(config: &SweeperConfig) {
    let db = connect(config).await;
    let cleanup = FactCleanup::new(db.facts(), &config.cleanup);

    start_cleanup_worker(&cleanup, config.cleanup.schedule.clone()).await;
}

async fn run_migrate(config: &SweeperConfig) {
    tracing::info!("Running database migrations");

    // Validate database is configured
    if config.database.is_none() {
        eprintln!("Error: Database is not configured. Nothing to migrate.");
        std::process::exit(1);
    }

    // Connect to database and run migrations
    match DbPool::from_config(&config.database).await {
        Ok(pool) => match pool.run_migrations().await {
            Ok(()) => {
                tracing::info!("Database migrations completed successfully");
                std::process::exit(0);
            }
            Err(e) => {
                tracing::error!(error = %e, "Database migrations failed");
                eprintln!("Error: Database migrations failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

/// Connect to the configured database, running migrations if enabled.
async fn connect(config: &SweeperConfig) -> DbPool {
    if config.database.is_none() {
        eprintln!("Error: {}", CommandError::DatabaseNotConfigured);
        std::process::exit(1);
    }

    let pool = match DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pool.health_check().await {
        tracing::error!(error = %e, "Database health check failed");
        eprintln!("Error: Database health check failed: {}", e);
        std::process::exit(1);
    }

    if config.database.run_migrations()
        && let Err(e) = pool.run_migrations().await
    {
        tracing::error!(error = %e, "Database migrations failed");
        eprintln!("Error: Database migrations failed: {}", e);
        std::process::exit(1);
    }

    pool
}

fn flush_metrics(config: &SweeperConfig) {
    if let Err(e) = observability::metrics::write_textfile(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to write metrics textfile");
    }
}
