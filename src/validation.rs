/// Input and response validation
///
/// - AI email variants: subject/body bounds and apology detection
/// - Lead contact data: email format, placeholder detection, phone normalization
use crate::errors::AppError;
use crate::models::{Approach, EmailVariant, Lead};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

pub const SUBJECT_MIN_CHARS: usize = 5;
pub const SUBJECT_MAX_CHARS: usize = 70;
pub const BODY_MIN_WORDS: usize = 80;
pub const BODY_MAX_WORDS: usize = 180;

/// Openings that mean the model refused or errored instead of writing an email.
const REFUSAL_PREFIXES: &[&str] = &["sorry", "i cannot", "i'm unable", "i’m unable"];

/// Accepts an AI-generated variant only if it looks like a sendable email.
pub fn is_valid_email_variant(variant: &EmailVariant) -> bool {
    is_valid_subject(&variant.subject) && is_valid_body(&variant.body)
}

pub fn is_valid_subject(subject: &str) -> bool {
    let len = subject.trim().chars().count();
    (SUBJECT_MIN_CHARS..=SUBJECT_MAX_CHARS).contains(&len)
}

pub fn is_valid_body(body: &str) -> bool {
    let words = word_count(body);
    if !(BODY_MIN_WORDS..=BODY_MAX_WORDS).contains(&words) {
        return false;
    }

    let opening = body.trim_start().to_lowercase();
    !REFUSAL_PREFIXES.iter().any(|p| opening.starts_with(p))
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Extracts and validates `{"subject": .., "body": ..}` from a model reply.
///
/// Missing or non-string fields short-circuit to `None`.
pub fn validate_variant_json(value: &serde_json::Value, approach: Approach) -> Option<EmailVariant> {
    let subject = value.get("subject")?.as_str()?;
    let body = value.get("body")?.as_str()?;

    let variant = EmailVariant {
        subject: subject.trim().to_string(),
        body: body.trim().to_string(),
        approach,
    };

    if is_valid_email_variant(&variant) {
        Some(variant)
    } else {
        tracing::debug!(
            "Rejected {} variant: subject {} chars, body {} words",
            approach.as_str(),
            variant.subject.chars().count(),
            word_count(&variant.body)
        );
        None
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        // RFC 5322 simplified: local@domain.tld
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email regex is valid")
    })
}

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Placeholder addresses scrapers pick up from contact forms
/// - Valid domain structure
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let lower = email.to_lowercase();
    if let Some(reason) = placeholder_reason(&lower) {
        tracing::warn!("❌ Invalid email detected ({}): {}", reason, email);
        return false;
    }

    if !email_regex().is_match(email) {
        tracing::warn!("❌ Invalid email format: {}", email);
        return false;
    }

    true
}

const PLACEHOLDER_LOCAL_PARTS: &[&str] = &["test", "noreply", "no-reply", "donotreply"];
const PLACEHOLDER_DOMAINS: &[&str] = &["example.com", "yourdomain.com", "domain.com", "email.com"];
const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"];

/// Why a lowercased address looks like a form placeholder or a scraped asset name.
fn placeholder_reason(email: &str) -> Option<&'static str> {
    if ASSET_SUFFIXES.iter().any(|s| email.ends_with(s)) {
        return Some("image file name");
    }

    let (local, domain) = email.rsplit_once('@')?;
    if PLACEHOLDER_LOCAL_PARTS.contains(&local) {
        return Some("placeholder mailbox");
    }

    let on_domain = |d: &str| domain == d || domain.ends_with(&format!(".{}", d));
    if PLACEHOLDER_DOMAINS.iter().any(|d| on_domain(d)) || domain.starts_with("yourdomain.") {
        return Some("placeholder domain");
    }
    if domain == "sentry.io" || domain.ends_with(".sentry.io") || domain.starts_with("sentry.") {
        return Some("error-tracker address");
    }

    None
}

/// Normalize a phone number to E.164, assuming US numbers when no country code is given.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    if raw.trim().is_empty() || digits < 7 {
        return None;
    }

    match phonenumber::parse(Some(CountryId::US), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("✓ Valid phone: {} → {}", raw, formatted);
            Some(formatted)
        }
        Ok(_) => {
            tracing::warn!("❌ Invalid phone number: {}", raw);
            None
        }
        Err(e) => {
            tracing::warn!("❌ Failed to parse phone '{}': {:?}", raw, e);
            None
        }
    }
}

/// Cleans a lead in place: drops invalid email/phone, normalizes the phone,
/// then rejects leads that are unnamed or unreachable.
pub fn validate_lead(lead: &mut Lead) -> Result<(), AppError> {
    lead.name = lead.name.trim().to_string();
    if lead.name.is_empty() {
        return Err(AppError::BadRequest("Lead name is required".to_string()));
    }

    lead.email = lead
        .email
        .take()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| is_valid_email(e));
    lead.phone = lead.phone.take().and_then(|p| normalize_phone(&p));

    if lead.email.is_none() && lead.phone.is_none() {
        return Err(AppError::BadRequest(format!(
            "Lead '{}' has no valid email or phone",
            lead.name
        )));
    }

    lead.rescore();
    Ok(())
}
