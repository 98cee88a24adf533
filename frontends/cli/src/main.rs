mod args;

use anyhow::{Context, Result};
use args::{parse_args, CliArgs, Command, USAGE};
use fieldsync::capture::PointDetails;
use fieldsync::{SyncConfig, SyncContext};
use std::fs::OpenOptions;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(config: &SyncConfig) -> Result<()> {
    // Default to INFO, overridable with RUST_LOG
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(file).with_ansi(false))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let CliArgs {
        config_path,
        db_path,
        command,
    } = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let mut config = SyncConfig::load(config_path.as_deref())?;
    if let Some(path) = db_path {
        config.database_path = path;
    }
    init_logging(&config)?;

    info!(
        "Using cache {} and remote {}",
        config.database_path.display(),
        config.remote_url
    );
    let ctx = Arc::new(SyncContext::open(&config).await?);

    match command {
        Command::Run => run(ctx).await,
        Command::List => {
            for feature in ctx.map_features().await? {
                println!("{}", serde_json::to_string(&feature)?);
            }
            Ok(())
        }
        Command::Pending => {
            for asset in ctx.pending().await? {
                println!("{}\t{}", asset.id, asset.name().unwrap_or("-"));
            }
            Ok(())
        }
        Command::Place { position, name } => {
            let details = PointDetails {
                name,
                ..PointDetails::default()
            };
            let asset = ctx.capture_point(position, details).await?;
            println!("Captured {}", asset.id);
            sync_once(&ctx).await
        }
        Command::Cable { from, to } => {
            ctx.activate_line_tool();
            ctx.select_for_cable(&from).await?;
            let cable = ctx
                .select_for_cable(&to)
                .await?
                .with_context(|| format!("{} and {} are the same asset", from, to))?;
            println!("Captured {}", cable.id);
            sync_once(&ctx).await
        }
        Command::Push => {
            let outcome = ctx.engine().push().await?;
            println!("{:?}", outcome);
            Ok(())
        }
        Command::Pull => {
            let outcome = ctx.engine().pull().await?;
            println!("{:?}", outcome);
            Ok(())
        }
    }
}

/// After a one-shot capture: probe once and sync if the remote answers
async fn sync_once(ctx: &SyncContext) -> Result<()> {
    ctx.probe_and_sync().await?;
    println!("{}", ctx.badge_label());
    Ok(())
}

async fn run(ctx: Arc<SyncContext>) -> Result<()> {
    let mut states = ctx.monitor().subscribe_state();
    tokio::spawn(async move {
        println!("{}", states.borrow_and_update().badge_label());
        while states.changed().await.is_ok() {
            println!("{}", states.borrow_and_update().badge_label());
        }
    });

    // No platform network notifications here; keep the sender so the
    // channel stays open
    let (_signal_tx, signal_rx) = mpsc::channel(16);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    ctx.run(signal_rx, shutdown).await?;
    Ok(())
}
