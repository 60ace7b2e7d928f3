pub mod api;
pub mod config;
pub mod db;
pub mod entities;
pub mod scheduler;
pub mod services;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
pub use config::Config;
use scheduler::Scheduler;
use services::{LogMailer, Mailer, OnboardingService, SmtpMailer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "kadro")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "daemon" | "-d" | "--daemon" => run_daemon(config, prometheus_handle).await,

        "onboard" => run_onboarding_once(config).await,

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Kadro - Lightweight HR/ERP Backend");
    println!();
    println!("USAGE:");
    println!("  kadro <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("  daemon            Run the API server and the onboarding scheduler");
    println!("  onboard           Run the onboarding job once and exit");
    println!("  init              Create default config file");
    println!("  help              Show this help message");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml to configure the server, database, SMTP, etc.");
    println!("  DATABASE_URL / DB_* and SMTP_* environment variables override the file.");
}

fn build_mailer(config: &Config) -> anyhow::Result<Arc<dyn Mailer>> {
    if config.smtp.enabled {
        Ok(Arc::new(SmtpMailer::from_config(&config.smtp)?))
    } else {
        info!("SMTP disabled; credentials emails will only be logged");
        Ok(Arc::new(LogMailer))
    }
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Kadro v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let state = api::create_app_state_from_config(config.clone(), prometheus_handle).await?;

    let mailer = build_mailer(&config)?;
    let onboarding = Arc::new(OnboardingService::new(
        state.store.clone(),
        state.policy.clone(),
        state.hasher.clone(),
        mailer,
    ));

    let scheduler = Arc::new(Scheduler::new(onboarding, config.scheduler.clone()));

    let scheduler_handle = {
        let sched = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if let Err(e) = sched.start().await {
                error!("Scheduler error: {e:#}");
            }
        })
    };

    let server_handle: Option<tokio::task::JoinHandle<()>> = if config.server.enabled {
        let port = config.server.port;
        info!("Starting Web API on port {}", port);

        let app = api::router(state);
        let addr = format!("0.0.0.0:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        Some(tokio::spawn(async move {
            info!("Web server running at http://0.0.0.0:{}", port);
            if let Err(e) = axum::serve(listener, app).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler.stop().await;
    scheduler_handle.abort();
    if let Some(handle) = server_handle {
        handle.abort();
    }
    info!("Daemon stopped");

    Ok(())
}

async fn run_onboarding_once(config: Config) -> anyhow::Result<()> {
    let state = api::create_app_state_from_config(config.clone(), None).await?;

    let mailer = build_mailer(&config)?;
    let onboarding = Arc::new(OnboardingService::new(
        state.store.clone(),
        state.policy.clone(),
        state.hasher.clone(),
        mailer,
    ));

    let scheduler = Scheduler::new(onboarding, config.scheduler.clone());
    let report = scheduler.run_once().await?;

    println!(
        "Onboarding complete: {} accounts created, {} emails sent, {} emails failed",
        report.accounts_created, report.emails_sent, report.emails_failed
    );

    Ok(())
}
