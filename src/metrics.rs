//! Funnel metrics aggregated from the CRM, outreach and calendar APIs.
//!
//! A snapshot costs one request per configured pipeline stage plus one per
//! campaign, so it is cached. Concurrent requests for an expired snapshot
//! share a single upstream round (`moka`'s `get_with`).

use crate::errors::AppError;
use crate::integrations::calendar::CalendarClient;
use crate::integrations::gohighlevel::GhlClient;
use crate::integrations::instantly::{CampaignAnalytics, InstantlyClient};
use crate::integrations::slack::{context_block, fields_block, header_block, section_block, SlackNotifier};
use crate::models::OpportunityStage;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SNAPSHOT_KEY: &str = "snapshot";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCount {
    pub stage: OpportunityStage,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub collected_at: DateTime<Utc>,
    /// Funnel order, only stages with a configured pipeline id.
    pub opportunities_by_stage: Vec<StageCount>,
    pub emails_sent: u64,
    pub replies: u64,
    pub bounced: u64,
    /// Percentage of sent emails that got a reply.
    pub reply_rate: f64,
    pub upcoming_bookings: Option<u64>,
    /// One entry per source that could not be read.
    pub errors: Vec<String>,
}

/// Upstreams a snapshot is built from. Missing clients are skipped.
#[derive(Clone, Default)]
pub struct MetricsSources {
    pub ghl: Option<GhlClient>,
    pub stage_ids: HashMap<OpportunityStage, String>,
    pub instantly: Option<InstantlyClient>,
    pub campaign_ids: Vec<String>,
    pub calendar: Option<CalendarClient>,
}

pub struct MetricsCollector {
    sources: MetricsSources,
    slack: Option<SlackNotifier>,
    cache: Cache<&'static str, Arc<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new(sources: MetricsSources, slack: Option<SlackNotifier>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(1)
            .build();

        Self {
            sources,
            slack,
            cache,
        }
    }

    /// Cached snapshot, gathered on first use and after the TTL expires.
    pub async fn collect(&self) -> Arc<MetricsSnapshot> {
        self.cache
            .get_with(SNAPSHOT_KEY, async {
                tracing::info!("📊 Collecting metrics snapshot");
                Arc::new(gather(&self.sources).await)
            })
            .await
    }

    /// Drops the cached snapshot and gathers a new one.
    pub async fn refresh(&self) -> Arc<MetricsSnapshot> {
        self.cache.invalidate(SNAPSHOT_KEY).await;
        self.collect().await
    }

    /// Posts the current snapshot to Slack.
    pub async fn report(&self) -> Result<Arc<MetricsSnapshot>, AppError> {
        let slack = self
            .slack
            .as_ref()
            .ok_or_else(|| AppError::NotConfigured("SLACK_WEBHOOK_URL".to_string()))?;

        let snapshot = self.collect().await;
        let (text, blocks) = format_slack_report(&snapshot);
        slack.send(&text, Some(blocks)).await?;

        tracing::info!("✓ Metrics report sent to Slack");
        Ok(snapshot)
    }
}

async fn gather(sources: &MetricsSources) -> MetricsSnapshot {
    let (pipeline, outreach, bookings) = tokio::join!(
        pipeline_counts(sources),
        outreach_totals(sources),
        upcoming_bookings(sources)
    );

    let mut errors = Vec::new();
    let (opportunities_by_stage, mut pipeline_errors) = pipeline;
    errors.append(&mut pipeline_errors);

    let (analytics, mut outreach_errors) = outreach;
    errors.append(&mut outreach_errors);

    let upcoming_bookings = match bookings {
        Some(Ok(count)) => Some(count),
        Some(Err(e)) => {
            errors.push(format!("Cal.com: {}", e));
            None
        }
        None => None,
    };

    for error in &errors {
        tracing::warn!("⚠️  Metrics source failed: {}", error);
    }

    MetricsSnapshot {
        collected_at: Utc::now(),
        opportunities_by_stage,
        emails_sent: analytics.emails_sent,
        replies: analytics.replies,
        bounced: analytics.bounced,
        reply_rate: reply_rate(analytics.replies, analytics.emails_sent),
        upcoming_bookings,
        errors,
    }
}

async fn pipeline_counts(sources: &MetricsSources) -> (Vec<StageCount>, Vec<String>) {
    let mut counts = Vec::new();
    let mut errors = Vec::new();
    let Some(ghl) = &sources.ghl else {
        return (counts, errors);
    };

    for stage in OpportunityStage::ALL {
        let Some(stage_id) = sources.stage_ids.get(&stage) else {
            continue;
        };
        match ghl.count_opportunities(stage_id).await {
            Ok(count) => counts.push(StageCount { stage, count }),
            Err(e) => errors.push(format!("GoHighLevel {}: {}", stage.as_str(), e)),
        }
    }
    (counts, errors)
}

async fn outreach_totals(sources: &MetricsSources) -> (CampaignAnalytics, Vec<String>) {
    let mut total = CampaignAnalytics::default();
    let mut errors = Vec::new();
    let Some(instantly) = &sources.instantly else {
        return (total, errors);
    };

    for campaign_id in &sources.campaign_ids {
        match instantly.campaign_analytics(campaign_id).await {
            Ok(analytics) => total.merge(&analytics),
            Err(e) => errors.push(format!("Instantly campaign {}: {}", campaign_id, e)),
        }
    }
    (total, errors)
}

async fn upcoming_bookings(sources: &MetricsSources) -> Option<Result<u64, AppError>> {
    match &sources.calendar {
        Some(calendar) => Some(calendar.count_upcoming_bookings().await),
        None => None,
    }
}

/// Replies as a percentage of sent emails, 0 when nothing was sent.
pub fn reply_rate(replies: u64, sent: u64) -> f64 {
    if sent == 0 {
        return 0.0;
    }
    replies as f64 / sent as f64 * 100.0
}

/// Slack fallback text and Block Kit blocks for a snapshot.
pub fn format_slack_report(snapshot: &MetricsSnapshot) -> (String, Vec<Value>) {
    let text = format!(
        "Daily metrics: {} emails sent, {} replies ({:.1}%)",
        snapshot.emails_sent, snapshot.replies, snapshot.reply_rate
    );

    let mut blocks = vec![
        header_block("📊 Agency metrics"),
        fields_block(&[
            ("Emails sent", snapshot.emails_sent.to_string()),
            ("Replies", snapshot.replies.to_string()),
            ("Reply rate", format!("{:.1}%", snapshot.reply_rate)),
            ("Bounced", snapshot.bounced.to_string()),
            (
                "Upcoming calls",
                snapshot
                    .upcoming_bookings
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
            ),
        ]),
    ];

    if !snapshot.opportunities_by_stage.is_empty() {
        let pipeline = snapshot
            .opportunities_by_stage
            .iter()
            .map(|s| format!("• {}: *{}*", s.stage.as_str(), s.count))
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(section_block(&format!("*Pipeline*\n{}", pipeline)));
    }

    if !snapshot.errors.is_empty() {
        blocks.push(section_block(&format!(
            "⚠️ *Unavailable sources*\n{}",
            snapshot.errors.join("\n")
        )));
    }

    blocks.push(context_block(&format!(
        "Collected {}",
        snapshot.collected_at.format("%Y-%m-%d %H:%M UTC")
    )));

    (text, blocks)
}
