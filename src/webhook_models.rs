use crate::models::{Booking, BookingStatus, Lead, LeadSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Apify run notification (`ACTOR.RUN.SUCCEEDED`, `ACTOR.RUN.FAILED`, ...).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApifyWebhook {
    pub event_type: String,

    #[serde(default)]
    pub resource: Option<ApifyRunResource>,

    /// Raw data for any additional fields
    #[serde(flatten)]
    pub raw: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApifyRunResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub act_id: Option<String>,
    #[serde(default)]
    pub default_dataset_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ApifyWebhook {
    pub fn succeeded(&self) -> bool {
        self.event_type == "ACTOR.RUN.SUCCEEDED"
    }

    pub fn dataset_id(&self) -> Option<&str> {
        self.resource
            .as_ref()
            .and_then(|r| r.default_dataset_id.as_deref())
    }
}

/// Instantly campaign event. Only `reply_received` is acted on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstantlyWebhook {
    #[serde(alias = "eventType", alias = "event")]
    pub event_type: String,

    #[serde(default, alias = "email", alias = "leadEmail")]
    pub lead_email: Option<String>,

    #[serde(default, alias = "campaignId", alias = "campaign")]
    pub campaign_id: Option<String>,

    #[serde(default, alias = "campaignName")]
    pub campaign_name: Option<String>,

    #[serde(default, alias = "replyTextSnippet", alias = "reply_text")]
    pub reply_text_snippet: Option<String>,

    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,

    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,

    #[serde(default, alias = "companyName")]
    pub company_name: Option<String>,
}

impl InstantlyWebhook {
    pub fn is_reply(&self) -> bool {
        self.event_type.eq_ignore_ascii_case("reply_received")
    }

    /// The replying prospect as a lead. `None` without an email.
    pub fn lead(&self) -> Option<Lead> {
        let email = self.lead_email.as_deref()?.trim().to_lowercase();
        if email.is_empty() {
            return None;
        }

        let name = match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.to_string(),
            _ => email.clone(),
        };

        let mut lead = Lead::new(name, LeadSource::InstantlyReply);
        lead.email = Some(email);
        lead.company = self.company_name.clone();
        lead.tags.push("replied".to_string());
        lead.rescore();
        Some(lead)
    }
}

/// Cal.com webhook envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcomWebhook {
    pub trigger_event: String,
    pub payload: CalcomPayload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcomPayload {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub booking_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendees: Vec<CalcomAttendee>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcomAttendee {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default, alias = "phone")]
    pub phone_number: Option<String>,
}

impl CalcomWebhook {
    pub fn status(&self) -> Option<BookingStatus> {
        match self.trigger_event.as_str() {
            "BOOKING_CREATED" => Some(BookingStatus::Confirmed),
            "BOOKING_RESCHEDULED" => Some(BookingStatus::Rescheduled),
            "BOOKING_CANCELLED" => Some(BookingStatus::Cancelled),
            "BOOKING_NO_SHOW_UPDATED" | "AFTER_HOSTS_CAL_VIDEO_NO_SHOW" => {
                Some(BookingStatus::NoShow)
            }
            _ => None,
        }
    }

    /// The booking with its first attendee. `None` for unrecognized triggers.
    pub fn booking(&self) -> Option<Booking> {
        let status = self.status()?;
        let attendee = self.payload.attendees.first();

        Some(Booking {
            uid: self
                .payload
                .uid
                .clone()
                .or_else(|| self.payload.booking_id.map(|id| id.to_string()))
                .unwrap_or_default(),
            title: self.payload.title.clone(),
            start: self.payload.start_time,
            end: self.payload.end_time,
            timezone: attendee.and_then(|a| a.time_zone.clone()),
            attendee_email: attendee.and_then(|a| a.email.clone()),
            attendee_name: attendee.and_then(|a| a.name.clone()),
            attendee_phone: attendee.and_then(|a| a.phone_number.clone()),
            status,
        })
    }
}

/// Acknowledgement returned by every webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    pub event: String,
    pub duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl WebhookResponse {
    pub fn new(status: &str, event: &str) -> Self {
        Self {
            status: status.to_string(),
            event: event.to_string(),
            duplicate: false,
            detail: None,
        }
    }

    pub fn duplicate(event: &str) -> Self {
        Self {
            duplicate: true,
            ..Self::new("duplicate", event)
        }
    }

    pub fn with_detail(mut self, detail: impl Serialize) -> Self {
        self.detail = serde_json::to_value(detail).ok();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apify_run_succeeded() {
        let hook: ApifyWebhook = serde_json::from_value(json!({
            "eventType": "ACTOR.RUN.SUCCEEDED",
            "createdAt": "2026-10-16T08:00:00.000Z",
            "resource": { "id": "run1", "actId": "act1", "defaultDatasetId": "ds1", "status": "SUCCEEDED" }
        }))
        .unwrap();

        assert!(hook.succeeded());
        assert_eq!(hook.dataset_id(), Some("ds1"));
    }

    #[test]
    fn test_instantly_reply_aliases() {
        let hook: InstantlyWebhook = serde_json::from_value(json!({
            "event_type": "reply_received",
            "lead_email": "Dana@BrightSmile.com",
            "campaign_id": "c1",
            "reply_text_snippet": "Sounds interesting, send times",
            "firstName": "Dana",
            "lastName": "Whitfield"
        }))
        .unwrap();

        assert!(hook.is_reply());
        let lead = hook.lead().unwrap();
        assert_eq!(lead.name, "Dana Whitfield");
        assert_eq!(lead.email.as_deref(), Some("dana@brightsmile.com"));
        assert_eq!(lead.source, LeadSource::InstantlyReply);
    }

    #[test]
    fn test_calcom_booking_created() {
        let hook: CalcomWebhook = serde_json::from_value(json!({
            "triggerEvent": "BOOKING_CREATED",
            "createdAt": "2026-10-16T08:00:00.000Z",
            "payload": {
                "uid": "bk_123",
                "title": "Discovery call",
                "startTime": "2026-10-20T15:00:00Z",
                "endTime": "2026-10-20T15:30:00Z",
                "attendees": [{
                    "email": "dana@brightsmile.com",
                    "name": "Dana Whitfield",
                    "timeZone": "America/Chicago"
                }]
            }
        }))
        .unwrap();

        let booking = hook.booking().unwrap();
        assert_eq!(booking.uid, "bk_123");
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.timezone.as_deref(), Some("America/Chicago"));
        assert_eq!(
            booking.attendee_lead().unwrap().source,
            LeadSource::Calendar
        );
    }

    #[test]
    fn test_calcom_unknown_trigger() {
        let hook: CalcomWebhook = serde_json::from_value(json!({
            "triggerEvent": "MEETING_ENDED",
            "payload": { "startTime": "2026-10-20T15:00:00Z" }
        }))
        .unwrap();
        assert!(hook.booking().is_none());
    }
}
