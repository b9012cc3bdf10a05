//! Cold-email copy generation.
//!
//! Each approach gets one OpenAI call wrapped in the shared [`ResilientCaller`].
//! A reply that is not valid JSON, or that fails [`is_valid_email_variant`],
//! counts as a failed attempt just like an HTTP error. When every attempt
//! fails the lead still gets a deterministic template, returned as
//! [`Outcome::Fallback`] so callers can tell it apart from generated copy.

use crate::config::Config;
use crate::errors::AppError;
use crate::integrations::openai::OpenAiClient;
use crate::models::{Approach, EmailVariant, Lead, Vertical};
use crate::resilience::{Outcome, ResilientCaller};
use crate::validation::{
    is_valid_body, is_valid_email_variant, is_valid_subject, validate_variant_json,
    BODY_MAX_WORDS, BODY_MIN_WORDS, SUBJECT_MAX_CHARS, SUBJECT_MIN_CHARS,
};
use serde::Serialize;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 600;

/// Who the emails are signed by and what they pitch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderProfile {
    pub name: String,
    pub company: String,
    pub offer: String,
}

impl SenderProfile {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.sender_name.clone(),
            company: config.sender_company.clone(),
            offer: config.sender_offer.clone(),
        }
    }
}

impl Default for SenderProfile {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One variant per approach, each tagged generated or fallback.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedEmails {
    pub variants: Vec<Outcome<EmailVariant>>,
    pub fallback_count: usize,
}

pub struct EmailGenerator {
    openai: OpenAiClient,
    caller: ResilientCaller,
    sender: SenderProfile,
}

impl EmailGenerator {
    pub fn new(openai: OpenAiClient, caller: ResilientCaller, sender: SenderProfile) -> Self {
        Self {
            openai,
            caller,
            sender,
        }
    }

    /// Generates one variant. Never fails; see the module docs.
    pub async fn generate(&self, lead: &Lead, approach: Approach) -> Outcome<EmailVariant> {
        let (system, user) = build_prompt(lead, approach, &self.sender);
        let openai = &self.openai;
        let system = system.as_str();
        let user = user.as_str();
        let operation = format!("email generation ({})", approach.as_str());

        self.caller
            .call_or_fallback(
                &operation,
                || async move {
                    let reply = openai.chat_json(system, user, TEMPERATURE, MAX_TOKENS).await?;
                    if let Some(usage) = reply.usage {
                        tracing::debug!(
                            "✉️  {} reply used {} tokens (~${:.5})",
                            approach.as_str(),
                            usage.total_tokens,
                            usage.estimated_cost()
                        );
                    }

                    let value: serde_json::Value = serde_json::from_str(&reply.content)
                        .map_err(|e| {
                            AppError::ExternalApiError(format!("Model reply is not JSON: {}", e))
                        })?;

                    validate_variant_json(&value, approach).ok_or_else(|| {
                        AppError::ExternalApiError(
                            "Model reply failed email validation".to_string(),
                        )
                    })
                },
                || fallback_variant(lead, approach, &self.sender),
            )
            .await
    }

    /// Generates all three approaches, one after another so the rate limiter
    /// sees them in order.
    pub async fn generate_all(&self, lead: &Lead) -> GeneratedEmails {
        let mut variants = Vec::with_capacity(Approach::ALL.len());
        for approach in Approach::ALL {
            variants.push(self.generate(lead, approach).await);
        }

        let fallback_count = variants.iter().filter(|v| v.is_fallback()).count();
        if fallback_count > 0 {
            tracing::warn!(
                "⚠️  {} of {} variants for {} are fallback templates",
                fallback_count,
                variants.len(),
                lead.name
            );
        }

        GeneratedEmails {
            variants,
            fallback_count,
        }
    }
}

fn approach_guidance(approach: Approach) -> &'static str {
    match approach {
        Approach::ProblemSolution => {
            "Open with a specific, costly problem businesses like theirs face, then show how the offer removes it."
        }
        Approach::SocialProof => {
            "Lead with a short story about a similar business that got a concrete result, then connect it to them."
        }
        Approach::Question => {
            "Open with one thought-provoking question about their current process and keep the tone curious, not salesy."
        }
    }
}

/// Builds the `(system, user)` message pair for one variant.
pub fn build_prompt(lead: &Lead, approach: Approach, sender: &SenderProfile) -> (String, String) {
    let system = format!(
        "You are an expert B2B copywriter writing personalized cold emails for {company}. \
         Write like a real person: plain language, no hype, no placeholders. \
         Respond only with a JSON object of the form {{\"subject\": string, \"body\": string}}. \
         The subject must be {min_chars}-{max_chars} characters. \
         The body must be {min_words}-{max_words} words, end with a soft call to action, \
         and be signed by {name}.",
        company = sender.company,
        name = sender.name,
        min_chars = SUBJECT_MIN_CHARS,
        max_chars = SUBJECT_MAX_CHARS,
        min_words = BODY_MIN_WORDS,
        max_words = BODY_MAX_WORDS,
    );

    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".to_string());
    let user = format!(
        "Approach: {approach}\n\
         Guidance: {guidance}\n\n\
         Prospect:\n\
         - Name: {name}\n\
         - Job title: {title}\n\
         - Company: {company}\n\
         - Industry: {vertical}\n\
         - Location: {location}\n\
         - Website: {website}\n\n\
         Our offer: {offer}",
        approach = approach.as_str(),
        guidance = approach_guidance(approach),
        name = lead.name,
        title = field(&lead.job_title),
        company = field(&lead.company),
        vertical = lead.vertical.as_str().replace('_', " "),
        location = field(&lead.location),
        website = field(&lead.website),
        offer = sender.offer,
    );

    (system, user)
}

fn vertical_plural(vertical: Vertical) -> &'static str {
    match vertical {
        Vertical::Dental => "dental practices",
        Vertical::Legal => "law firms",
        Vertical::RealEstate => "real estate teams",
        Vertical::HomeServices => "home service companies",
        Vertical::Medical => "clinics",
        Vertical::Agency => "agencies",
        Vertical::Other => "local businesses",
    }
}

fn vertical_singular(vertical: Vertical) -> &'static str {
    match vertical {
        Vertical::Dental => "dental practice",
        Vertical::Legal => "law firm",
        Vertical::RealEstate => "real estate team",
        Vertical::HomeServices => "home services company",
        Vertical::Medical => "clinic",
        Vertical::Agency => "agency",
        Vertical::Other => "local business",
    }
}

struct TemplateFields<'a> {
    first_name: &'a str,
    company: &'a str,
    sender: &'a SenderProfile,
}

fn render(approach: Approach, vertical: Vertical, f: &TemplateFields<'_>) -> EmailVariant {
    let (subject, body) = match approach {
        Approach::ProblemSolution => (
            format!("{}, the leads {} never hears back from", f.first_name, f.company),
            format!(
                "Hi {first_name},\n\n\
                 Most {plural} we talk to lose leads in the gap between a form fill and the first reply. \
                 When nobody answers for an hour, the prospect has already called the next business on the list.\n\n\
                 At {sender_company} we build {offer}. For {company} that would mean every new enquiry gets a \
                 personal reply, a qualifying question and a booking link within sixty seconds, day or night, \
                 without adding anyone to the front desk.\n\n\
                 Teams like yours usually see more booked appointments in the first month and spend less time \
                 chasing cold leads.\n\n\
                 Would it be worth a fifteen minute call next week to see whether it fits how {company} works today?\n\n\
                 Best,\n{sender_name}",
                first_name = f.first_name,
                plural = vertical_plural(vertical),
                sender_company = f.sender.company,
                offer = f.sender.offer,
                company = f.company,
                sender_name = f.sender.name,
            ),
        ),
        Approach::SocialProof => (
            format!("How a {} like {} stopped missing leads", vertical_singular(vertical), f.company),
            format!(
                "Hi {first_name},\n\n\
                 A {singular} similar to {company} came to us last quarter with a familiar problem: plenty of \
                 enquiries, but too many of them went quiet before anyone on the team could follow up.\n\n\
                 We set up {offer}. Within six weeks they were answering every new lead in under a minute, \
                 their no-show rate dropped, and the front desk stopped spending afternoons returning voicemails.\n\n\
                 I think the same setup could work well for {company}, and it usually takes about two weeks to go \
                 live with no changes to your existing tools.\n\n\
                 If you are open to it, I can share the short case study and walk you through the numbers on a quick call.\n\n\
                 Cheers,\n{sender_name}\n{sender_company}",
                first_name = f.first_name,
                singular = vertical_singular(vertical),
                company = f.company,
                offer = f.sender.offer,
                sender_name = f.sender.name,
                sender_company = f.sender.company,
            ),
        ),
        Approach::Question => (
            format!("Quick question about {}", f.company),
            format!(
                "Hi {first_name},\n\n\
                 Quick question: when a new prospect reaches out to {company} after hours, how long does it take \
                 before someone replies?\n\n\
                 For most {plural} the honest answer is the next morning, and by then a good share of those people \
                 have already booked with whoever answered first.\n\n\
                 At {sender_company} we build {offer}, so every enquiry gets a helpful reply and a booking link \
                 right away while your team stays focused on the clients already in front of them.\n\n\
                 I am curious whether speed to lead is something you are already measuring, or whether it is still \
                 a bit of a blind spot.\n\n\
                 Either way, happy to share what we are seeing across similar businesses if that would be useful.\n\n\
                 Thanks,\n{sender_name}",
                first_name = f.first_name,
                company = f.company,
                plural = vertical_plural(vertical),
                sender_company = f.sender.company,
                offer = f.sender.offer,
                sender_name = f.sender.name,
            ),
        ),
    };

    EmailVariant {
        subject,
        body,
        approach,
    }
}

/// Static template for `approach`, personalized with the lead's first name
/// and company.
///
/// Always passes [`is_valid_email_variant`]: unusually long names, company
/// names or sender settings fall back to generic wording.
pub fn fallback_variant(lead: &Lead, approach: Approach, sender: &SenderProfile) -> EmailVariant {
    let company = lead
        .company
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("your team");
    let default_sender = SenderProfile::default();

    let mut variant = render(
        approach,
        lead.vertical,
        &TemplateFields {
            first_name: lead.first_name(),
            company,
            sender,
        },
    );

    if !is_valid_body(&variant.body) {
        variant.body = render(
            approach,
            lead.vertical,
            &TemplateFields {
                first_name: "there",
                company: "your team",
                sender: &default_sender,
            },
        )
        .body;
    }
    if !is_valid_subject(&variant.subject) {
        variant.subject = render(
            approach,
            lead.vertical,
            &TemplateFields {
                first_name: "Hi",
                company: "your team",
                sender: &default_sender,
            },
        )
        .subject;
    }

    debug_assert!(is_valid_email_variant(&variant));
    variant
}
