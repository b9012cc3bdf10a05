//! Collects funnel metrics once and posts them to Slack.
//!
//! Meant for an external scheduler (cron, Fly machines, GitHub Actions) when
//! the server's own `METRICS_REPORT_INTERVAL_SECS` loop is not used.

use agency_ops::config::Config;
use agency_ops::handlers::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agency_ops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.slack_webhook_url.is_none() {
        anyhow::bail!("SLACK_WEBHOOK_URL must be set to send the metrics report");
    }

    let state = AppState::from_config(config)?;
    let snapshot = state.metrics.report().await?;

    println!(
        "Report sent: {} emails, {} replies ({:.1}%), {} pipeline stages, {} source error(s)",
        snapshot.emails_sent,
        snapshot.replies,
        snapshot.reply_rate,
        snapshot.opportunities_by_stage.len(),
        snapshot.errors.len()
    );

    if !snapshot.errors.is_empty() {
        for error in &snapshot.errors {
            eprintln!("  - {}", error);
        }
        std::process::exit(1);
    }

    Ok(())
}
