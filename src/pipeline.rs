//! Lead flows shared by the webhooks: dataset ingestion and stage moves.

use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::integrations::apify::lead_from_item;
use crate::models::{Approach, Lead, OpportunityStage};
use crate::validation::validate_lead;
use serde::Serialize;
use std::collections::HashMap;

/// Result of moving a contact's opportunity towards a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StageChange {
    Created {
        contact_id: String,
        opportunity_id: String,
        stage: OpportunityStage,
    },
    Moved {
        contact_id: String,
        opportunity_id: String,
        from: OpportunityStage,
        to: OpportunityStage,
    },
    Unchanged {
        contact_id: String,
        reason: String,
    },
}

impl StageChange {
    pub fn contact_id(&self) -> &str {
        match self {
            StageChange::Created { contact_id, .. }
            | StageChange::Moved { contact_id, .. }
            | StageChange::Unchanged { contact_id, .. } => contact_id,
        }
    }
}

/// Counters for one scraped dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub dataset_id: String,
    pub items: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub crm_synced: usize,
    pub outreach_queued: usize,
    pub fallback_emails: usize,
    pub failures: usize,
}

/// Reverse lookup of a pipeline stage id.
pub fn stage_for_id(
    stage_ids: &HashMap<OpportunityStage, String>,
    stage_id: &str,
) -> Option<OpportunityStage> {
    stage_ids
        .iter()
        .find(|(_, id)| id.as_str() == stage_id)
        .map(|(stage, _)| *stage)
}

fn opportunity_name(lead: &Lead) -> String {
    match &lead.company {
        Some(company) if company != &lead.name => format!("{} ({})", company, lead.name),
        Some(company) => company.clone(),
        None => lead.name.clone(),
    }
}

/// Upserts the lead in GoHighLevel, attaches `note`, and moves its
/// opportunity to `target` when that is a forward move.
///
/// Opportunities sitting in a stage this service has no id for are left
/// alone, since their position in the funnel is unknown.
pub async fn advance_contact(
    state: &AppState,
    lead: &Lead,
    target: OpportunityStage,
    note: Option<&str>,
) -> Result<StageChange, AppError> {
    let ghl = state.require_ghl()?;
    let stage_ids = &state.config.ghl_stage_ids;

    let contact_id = ghl.upsert_contact(lead).await?;
    if let Some(note) = note {
        ghl.add_note(&contact_id, note)
            .await
            .context("Failed to add contact note")?;
    }

    let Some(target_id) = stage_ids.get(&target) else {
        tracing::debug!("No pipeline stage configured for {}", target.as_str());
        return Ok(StageChange::Unchanged {
            contact_id,
            reason: format!("no GHL_STAGE_{} configured", target.env_key()),
        });
    };

    let name = opportunity_name(lead);
    let existing = ghl.find_opportunity(&contact_id).await?;

    let Some(opportunity) = existing else {
        let opportunity_id = ghl.upsert_opportunity(&contact_id, target_id, &name).await?;
        tracing::info!("✓ Opportunity created for {} at {}", lead.name, target.as_str());
        return Ok(StageChange::Created {
            contact_id,
            opportunity_id,
            stage: target,
        });
    };

    let current = opportunity
        .pipeline_stage_id
        .as_deref()
        .and_then(|id| stage_for_id(stage_ids, id));

    match current {
        Some(from) if from.can_transition_to(target) => {
            let opportunity_id = ghl.upsert_opportunity(&contact_id, target_id, &name).await?;
            tracing::info!(
                "✓ Opportunity for {} moved {} → {}",
                lead.name,
                from.as_str(),
                target.as_str()
            );
            Ok(StageChange::Moved {
                contact_id,
                opportunity_id,
                from,
                to: target,
            })
        }
        Some(from) => Ok(StageChange::Unchanged {
            contact_id,
            reason: format!("already at {}", from.as_str()),
        }),
        None => Ok(StageChange::Unchanged {
            contact_id,
            reason: "opportunity is in an unmapped stage".to_string(),
        }),
    }
}

/// Pulls a finished scrape's dataset and pushes every usable lead through
/// CRM and outreach. Individual lead failures are counted, not returned.
pub async fn ingest_dataset(state: &AppState, dataset_id: &str) -> Result<IngestSummary, AppError> {
    let apify = state.require_apify()?;
    let items = apify
        .dataset_items(dataset_id)
        .await
        .with_context(|| format!("Failed to fetch dataset {}", dataset_id))?;

    let mut summary = IngestSummary {
        dataset_id: dataset_id.to_string(),
        items: items.len(),
        ..Default::default()
    };
    tracing::info!("📥 Ingesting {} items from dataset {}", items.len(), dataset_id);

    for item in &items {
        let Some(mut lead) = lead_from_item(item) else {
            summary.skipped += 1;
            continue;
        };
        if let Err(e) = validate_lead(&mut lead) {
            tracing::debug!("Skipping scraped record: {}", e);
            summary.skipped += 1;
            continue;
        }
        summary.accepted += 1;

        ingest_lead(state, &lead, &mut summary).await;
    }

    tracing::info!(
        "✓ Dataset {} ingested: {} accepted, {} skipped, {} failures",
        dataset_id,
        summary.accepted,
        summary.skipped,
        summary.failures
    );
    Ok(summary)
}

async fn ingest_lead(state: &AppState, lead: &Lead, summary: &mut IngestSummary) {
    let mut synced = false;

    if state.ghl.is_some() {
        match advance_contact(state, lead, OpportunityStage::Lead, None).await {
            Ok(_) => synced = true,
            Err(e) => {
                tracing::warn!("GoHighLevel sync failed for {}: {}", lead.name, e);
                summary.failures += 1;
            }
        }
    }

    if let Some(hubspot) = &state.hubspot {
        match hubspot.sync_lead(lead).await {
            Ok(_) => synced = true,
            Err(e) => {
                tracing::warn!("HubSpot sync failed for {}: {}", lead.name, e);
                summary.failures += 1;
            }
        }
    }

    if synced {
        summary.crm_synced += 1;
    }

    let (Some(instantly), Some(campaign_id)) =
        (&state.instantly, state.config.instantly_campaign_ids.first())
    else {
        return;
    };
    if lead.email.is_none() {
        return;
    }

    let personalization = match &state.email_generator {
        Some(generator) => {
            let outcome = generator.generate(lead, Approach::ProblemSolution).await;
            if outcome.is_fallback() {
                summary.fallback_emails += 1;
            }
            Some(outcome.into_value())
        }
        None => None,
    };

    match instantly
        .add_lead(campaign_id, lead, personalization.as_ref())
        .await
    {
        Ok(_) => summary.outreach_queued += 1,
        Err(e) => {
            tracing::warn!("Instantly enqueue failed for {}: {}", lead.name, e);
            summary.failures += 1;
        }
    }
}
