//! LeakWatch Monitor - Main Entry Point

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use monitor::{
    init_logging, Monitor, MonitorSettings, SmtpSettings, WebhookSettings, DEFAULT_CONFIG_FILE,
};
use response::{
    EmailChannel, LogChannel, NotificationChannel, ResponseDispatcher, SimulatedValveController,
    WebhookChannel,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::{CaseStore, MemoryStore, SqliteStore};
use telemetry::RandomizedSource;
use tokio::sync::watch;
use tracing::{error, info, warn};
use water_model::{network::reference_network, ChannelKind};

#[derive(Parser, Debug)]
#[command(name = "leak-monitor", version, about = "Water leak detection and emergency response")]
struct Cli {
    /// Configuration file (TOML); missing files fall back to defaults
    #[arg(long, env = "LEAKWATCH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Seed for the simulated telemetry
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Run this many cycles back to back, then exit
    #[arg(long)]
    cycles: Option<u64>,
}

/// Log-only stand-in for a channel with no provider configured
fn demo_channel(kind: ChannelKind) -> Arc<dyn NotificationChannel> {
    warn!("No {} provider configured, notifications are only logged", kind);
    Arc::new(LogChannel::new(kind).with_latency(Duration::from_millis(200)))
}

fn webhook_channel(kind: ChannelKind, url: Option<&str>) -> Arc<dyn NotificationChannel> {
    match url {
        Some(url) => {
            info!("{} notifications via webhook {}", kind, url);
            Arc::new(WebhookChannel::new(kind, url))
        }
        None => demo_channel(kind),
    }
}

fn email_channel(smtp: &SmtpSettings) -> anyhow::Result<Arc<dyn NotificationChannel>> {
    let Some(host) = smtp.host.as_deref() else {
        return Ok(demo_channel(ChannelKind::Email));
    };
    let channel = EmailChannel::new(
        host,
        smtp.port,
        smtp.starttls,
        &smtp.from,
        smtp.credentials(),
    )
    .with_context(|| format!("configuring SMTP relay {}", host))?;
    info!("email notifications via SMTP {}:{}", host, smtp.port);
    Ok(Arc::new(channel))
}

fn channels(
    webhooks: &WebhookSettings,
    smtp: &SmtpSettings,
) -> anyhow::Result<Vec<Arc<dyn NotificationChannel>>> {
    Ok(vec![
        webhook_channel(ChannelKind::Chat, webhooks.chat_url.as_deref()),
        email_channel(smtp)?,
        webhook_channel(ChannelKind::Sms, webhooks.sms_url.as_deref()),
    ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = MonitorSettings::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    init_logging(settings.log_format)
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;

    info!("=== LeakWatch Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    settings.log_settings();

    if let Some(addr) = settings.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("starting Prometheus exporter")?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }

    let (sensors, teams, valves) = reference_network().context("building reference network")?;
    info!(
        "Reference network: {} sensors, {} teams, {} valves",
        sensors.len(),
        teams.len(),
        valves.len()
    );

    let store: Arc<dyn CaseStore> = match &settings.storage.database_url {
        Some(url) => Arc::new(
            SqliteStore::connect(url)
                .await
                .with_context(|| format!("opening case store {}", url))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let controller =
        Arc::new(SimulatedValveController::new().with_latency(Duration::from_millis(500)));
    let mut dispatcher = ResponseDispatcher::new(
        settings.response.clone(),
        Arc::new(teams),
        Arc::new(valves),
        controller,
        Arc::clone(&store),
    );
    for channel in channels(&settings.webhooks, &settings.smtp)? {
        dispatcher = dispatcher.with_channel(channel);
    }

    let monitor = Monitor::new(
        &settings,
        sensors,
        Arc::new(RandomizedSource::new(cli.seed)),
        Arc::new(dispatcher),
        store,
    );

    match cli.cycles {
        Some(cycles) => {
            for _ in 0..cycles {
                monitor.poll_cycle().await;
            }
        }
        None => {
            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Ctrl-C received, finishing current cycle");
                        let _ = stop_tx.send(true);
                    }
                    Err(e) => {
                        error!("Cannot listen for Ctrl-C: {}", e);
                        // Keep the sender alive so the monitor keeps running
                        std::future::pending::<()>().await;
                    }
                }
            });
            monitor.run(settings.poll_interval(), stop_rx).await;
        }
    }

    let status = monitor.status();
    info!(
        "Final status: {}",
        serde_json::to_string(&status).context("serializing status")?
    );
    Ok(())
}
