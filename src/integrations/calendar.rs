use super::api_client::{ApiClient, Auth};
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Input for creating a booking on behalf of a prospect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub name: String,
    pub email: String,
    pub start: DateTime<Utc>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalBooking {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    title: Option<String>,
    start_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookingList {
    #[serde(default)]
    bookings: Vec<CalBooking>,
}

/// Cal.com API v1 client for the discovery-call event type.
#[derive(Clone)]
pub struct CalendarClient {
    api: ApiClient,
    event_type_id: Option<i64>,
}

impl CalendarClient {
    pub fn new(base_url: &str, api_key: &str, event_type_id: Option<i64>) -> Result<Self, AppError> {
        Ok(Self {
            api: ApiClient::new(
                "Cal.com",
                base_url,
                Auth::Query {
                    param: "apiKey",
                    value: api_key.to_string(),
                },
            )?,
            event_type_id,
        })
    }

    pub async fn create_booking(&self, request: &BookingRequest) -> Result<Booking, AppError> {
        let event_type_id = self
            .event_type_id
            .ok_or_else(|| AppError::NotConfigured("CALCOM_EVENT_TYPE_ID".to_string()))?;
        if request.name.trim().is_empty() || request.email.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Booking requires attendee name and email".to_string(),
            ));
        }

        let body = json!({
            "eventTypeId": event_type_id,
            "start": request.start.to_rfc3339(),
            "timeZone": request.timezone,
            "language": "en",
            "responses": {
                "name": request.name,
                "email": request.email,
                "notes": request.notes,
            },
            "metadata": {},
        });

        let created: CalBooking = self.api.post_json("/bookings", &body).await?;
        let booking = Booking {
            uid: created
                .uid
                .or_else(|| created.id.map(|id| id.to_string()))
                .unwrap_or_default(),
            title: created.title,
            start: created.start_time,
            end: created.end_time,
            timezone: Some(request.timezone.clone()),
            attendee_email: Some(request.email.clone()),
            attendee_name: Some(request.name.clone()),
            attendee_phone: None,
            status: BookingStatus::Confirmed,
        };

        tracing::info!("✓ Booking created for {} at {}", request.email, booking.start);
        Ok(booking)
    }

    pub async fn cancel_booking(&self, booking_id: &str, reason: Option<&str>) -> Result<(), AppError> {
        let _: Value = self
            .api
            .delete_json(
                &format!("/bookings/{}/cancel", booking_id),
                &json!({ "cancellationReason": reason }),
            )
            .await?;
        tracing::info!("✓ Booking {} cancelled", booking_id);
        Ok(())
    }

    /// Accepted bookings that start after now.
    pub async fn count_upcoming_bookings(&self) -> Result<u64, AppError> {
        let list: BookingList = self.api.get_json("/bookings", &[]).await?;
        let now = Utc::now();

        let upcoming = list
            .bookings
            .iter()
            .filter(|b| b.start_time > now)
            .filter(|b| {
                b.status
                    .as_deref()
                    .map(|s| s.eq_ignore_ascii_case("accepted"))
                    .unwrap_or(true)
            })
            .count();

        Ok(upcoming as u64)
    }
}
