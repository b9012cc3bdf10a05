use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// ============ Leads ============

/// Where a lead entered the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    GoogleMaps,
    LinkedIn,
    InstantlyReply,
    Calendar,
    Manual,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::GoogleMaps => "google_maps",
            LeadSource::LinkedIn => "linked_in",
            LeadSource::InstantlyReply => "instantly_reply",
            LeadSource::Calendar => "calendar",
            LeadSource::Manual => "manual",
        }
    }
}

/// Industry vertical used for tagging and prompt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vertical {
    Dental,
    Legal,
    RealEstate,
    HomeServices,
    Medical,
    Agency,
    #[default]
    Other,
}

impl Vertical {
    /// Infers a vertical from a free-text category ("Cosmetic dentist", "Personal injury attorney", ...).
    ///
    /// Keywords match whole words only, so "Residential" is not dental and "Lawn care" is not legal.
    pub fn from_category(category: &str) -> Self {
        let category = category.to_lowercase();
        vertical_patterns()
            .iter()
            .find(|(_, pattern)| pattern.is_match(&category))
            .map(|(vertical, _)| *vertical)
            .unwrap_or(Vertical::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Vertical::Dental => "dental",
            Vertical::Legal => "legal",
            Vertical::RealEstate => "real_estate",
            Vertical::HomeServices => "home_services",
            Vertical::Medical => "medical",
            Vertical::Agency => "agency",
            Vertical::Other => "other",
        }
    }
}

/// Checked in order; Legal precedes Dental so "Car accident lawyer" is legal.
fn vertical_patterns() -> &'static [(Vertical, Regex)] {
    static PATTERNS: OnceLock<Vec<(Vertical, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                Vertical::Legal,
                r"\b(law|laws|lawyers?|legal|paralegal|attorneys?|solicitors?)\b",
            ),
            (
                Vertical::Dental,
                r"\b(dent(al|ist|ists|istry)|orthodont\w*|endodont\w*|periodont\w*)\b",
            ),
            (
                Vertical::RealEstate,
                r"\b(real estate|realtors?|realty|propert(y|ies)|mortgages?)\b",
            ),
            (
                Vertical::HomeServices,
                r"\b(plumb\w*|hvac|roof\w*|electric\w*|landscap\w*|lawn|clean(ing|ers?)|contractors?)\b",
            ),
            (
                Vertical::Medical,
                r"\b(clinics?|medical|doctors?|chiropract\w*|physicians?|med spa)\b",
            ),
            (Vertical::Agency, r"\b(agency|agencies|marketing|consult\w*)\b"),
        ]
        .into_iter()
        .map(|(vertical, pattern)| {
            (
                vertical,
                Regex::new(pattern).expect("vertical pattern is valid"),
            )
        })
        .collect()
    })
}

/// A prospect as it moves between scrapers, outreach and CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_source")]
    pub source: LeadSource,
    /// 0..=100, see [`score_lead`].
    #[serde(default)]
    pub quality_score: u8,
    #[serde(default)]
    pub vertical: Vertical,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_source() -> LeadSource {
    LeadSource::Manual
}

impl Lead {
    pub fn new(name: impl Into<String>, source: LeadSource) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
            company: None,
            job_title: None,
            website: None,
            linkedin_url: None,
            location: None,
            source,
            quality_score: 0,
            vertical: Vertical::Other,
            tags: Vec::new(),
        }
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("there")
    }

    pub fn last_name(&self) -> Option<String> {
        let rest: Vec<&str> = self.name.split_whitespace().skip(1).collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        }
    }

    /// Recomputes `quality_score` from the current fields.
    pub fn rescore(&mut self) {
        self.quality_score = score_lead(self);
    }

    /// CRM tags: source, vertical, plus any custom tags.
    pub fn crm_tags(&self) -> Vec<String> {
        let mut tags = vec![
            format!("source:{}", self.source.as_str()),
            format!("vertical:{}", self.vertical.as_str()),
        ];
        tags.extend(self.tags.iter().cloned());
        tags
    }
}

const DECISION_MAKER_TITLES: &[&str] = &[
    "owner", "founder", "ceo", "president", "partner", "principal", "director", "head of",
    "vp", "managing",
];

/// Scores how actionable a lead is, 0..=100.
///
/// Contactability dominates: a lead without email or phone can never exceed 50.
pub fn score_lead(lead: &Lead) -> u8 {
    let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());

    let mut score: u32 = 0;
    if present(&lead.email) {
        score += 30;
    }
    if present(&lead.phone) {
        score += 20;
    }
    if present(&lead.company) {
        score += 15;
    }
    if let Some(title) = lead.job_title.as_deref().filter(|t| !t.trim().is_empty()) {
        let title = title.to_lowercase();
        if DECISION_MAKER_TITLES.iter().any(|t| title.contains(t)) {
            score += 20;
        } else {
            score += 10;
        }
    }
    if present(&lead.website) {
        score += 10;
    }
    if present(&lead.linkedin_url) {
        score += 5;
    }

    score.min(100) as u8
}

// ============ Opportunities ============

/// CRM pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStage {
    Lead,
    Contacted,
    Replied,
    Qualified,
    Booked,
    ClosedWon,
    ClosedLost,
}

impl OpportunityStage {
    pub const ALL: [OpportunityStage; 7] = [
        OpportunityStage::Lead,
        OpportunityStage::Contacted,
        OpportunityStage::Replied,
        OpportunityStage::Qualified,
        OpportunityStage::Booked,
        OpportunityStage::ClosedWon,
        OpportunityStage::ClosedLost,
    ];

    /// Position in the funnel. Both closed stages share the final position.
    pub fn ordinal(&self) -> u8 {
        match self {
            OpportunityStage::Lead => 0,
            OpportunityStage::Contacted => 1,
            OpportunityStage::Replied => 2,
            OpportunityStage::Qualified => 3,
            OpportunityStage::Booked => 4,
            OpportunityStage::ClosedWon | OpportunityStage::ClosedLost => 5,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, OpportunityStage::ClosedWon | OpportunityStage::ClosedLost)
    }

    /// Stage moves are monotonic; closed stages are terminal.
    pub fn can_transition_to(&self, next: OpportunityStage) -> bool {
        !self.is_closed() && next.ordinal() > self.ordinal()
    }

    /// Suffix of the `GHL_STAGE_*` variable holding this stage's pipeline id.
    pub fn env_key(&self) -> &'static str {
        match self {
            OpportunityStage::Lead => "LEAD",
            OpportunityStage::Contacted => "CONTACTED",
            OpportunityStage::Replied => "REPLIED",
            OpportunityStage::Qualified => "QUALIFIED",
            OpportunityStage::Booked => "BOOKED",
            OpportunityStage::ClosedWon => "CLOSED_WON",
            OpportunityStage::ClosedLost => "CLOSED_LOST",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStage::Lead => "Lead",
            OpportunityStage::Contacted => "Contacted",
            OpportunityStage::Replied => "Replied",
            OpportunityStage::Qualified => "Qualified",
            OpportunityStage::Booked => "Booked",
            OpportunityStage::ClosedWon => "Closed Won",
            OpportunityStage::ClosedLost => "Closed Lost",
        }
    }
}

// ============ Bookings ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Rescheduled,
    Cancelled,
    NoShow,
}

/// A meeting held by the calendar provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub uid: String,
    pub title: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub attendee_email: Option<String>,
    pub attendee_name: Option<String>,
    pub attendee_phone: Option<String>,
    pub status: BookingStatus,
}

impl Booking {
    /// The attendee as a lead, for CRM updates.
    pub fn attendee_lead(&self) -> Option<Lead> {
        let email = self.attendee_email.clone()?;
        let name = self
            .attendee_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.clone());
        let mut lead = Lead::new(name, LeadSource::Calendar);
        lead.email = Some(email);
        lead.phone = self.attendee_phone.clone();
        lead.rescore();
        Some(lead)
    }
}

// ============ Email variants ============

/// Angle a cold email takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    ProblemSolution,
    SocialProof,
    Question,
}

impl Approach {
    pub const ALL: [Approach; 3] = [
        Approach::ProblemSolution,
        Approach::SocialProof,
        Approach::Question,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Approach::ProblemSolution => "problem-solution",
            Approach::SocialProof => "social-proof",
            Approach::Question => "question",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailVariant {
    pub subject: String,
    pub body: String,
    pub approach: Approach,
}
