//! Google Calendar queries for meeting prep.

use serde::Deserialize;

use super::{get_valid_access_token, GoogleApiError};
use crate::http::{send_with_retry, RetryPolicy};

const BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
    #[serde(default)]
    attendees: Vec<RawAttendee>,
    #[serde(default)]
    hangout_link: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(default)]
    date_time: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttendee {
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    response_status: Option<String>,
    #[serde(default)]
    organizer: bool,
    #[serde(rename = "self", default)]
    is_self: bool,
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// RFC3339 start. All-day events carry the bare date.
    pub start: String,
    pub end: String,
    pub attendees: Vec<Attendee>,
    pub meet_link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Attendee {
    pub email: String,
    pub name: Option<String>,
    pub response: Option<String>,
    pub organizer: bool,
}

impl CalendarEvent {
    /// Attendees outside the user's own domain (resource rooms excluded).
    pub fn external_attendees<'a>(&'a self, user_domain: &str) -> Vec<&'a Attendee> {
        self.attendees
            .iter()
            .filter(|a| {
                !a.email.ends_with(&format!("@{}", user_domain))
                    && !a.email.contains("resource.calendar.google.com")
            })
            .collect()
    }

    /// A meeting is external when at least one attendee is outside the
    /// user's domain.
    pub fn is_external(&self, user_domain: &str) -> bool {
        !self.external_attendees(user_domain).is_empty()
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Events on the user's primary calendar for a single day, ordered by
/// start time. Cancelled events and declined invitations are dropped.
pub async fn events_for_date(
    date: chrono::NaiveDate,
) -> Result<Vec<CalendarEvent>, GoogleApiError> {
    let token = get_valid_access_token().await?;
    let time_min = format!("{}T00:00:00Z", date);
    let time_max = format!("{}T00:00:00Z", date + chrono::Duration::days(1));

    let client = reqwest::Client::new();
    let request = client
        .get(format!("{}/calendars/primary/events", BASE_URL))
        .bearer_auth(&token)
        .query(&[
            ("timeMin", time_min.as_str()),
            ("timeMax", time_max.as_str()),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
            ("maxResults", "50"),
        ]);
    let resp = send_with_retry(request, &RetryPolicy::default()).await?;
    let status = resp.status();
    if status.as_u16() == 401 {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    let parsed: EventListResponse = resp.json().await?;
    Ok(parsed
        .items
        .into_iter()
        .filter(|e| e.status.as_deref() != Some("cancelled"))
        .filter(|e| {
            // Drop events the user already declined
            !e.attendees
                .iter()
                .any(|a| a.is_self && a.response_status.as_deref() == Some("declined"))
        })
        .map(normalize_event)
        .collect())
}

fn normalize_event(raw: RawEvent) -> CalendarEvent {
    let time_of = |t: Option<EventTime>| {
        t.and_then(|t| t.date_time.or(t.date)).unwrap_or_default()
    };
    CalendarEvent {
        id: raw.id,
        title: raw.summary.unwrap_or_else(|| "(no title)".to_string()),
        description: raw.description,
        start: time_of(raw.start),
        end: time_of(raw.end),
        attendees: raw
            .attendees
            .into_iter()
            .map(|a| Attendee {
                email: a.email,
                name: a.display_name,
                response: a.response_status,
                organizer: a.organizer,
            })
            .collect(),
        meet_link: raw.hangout_link,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with_attendees(emails: &[&str]) -> CalendarEvent {
        CalendarEvent {
            id: "evt1".to_string(),
            title: "Discovery call".to_string(),
            description: None,
            start: "2026-08-29T15:00:00Z".to_string(),
            end: "2026-08-29T15:45:00Z".to_string(),
            attendees: emails
                .iter()
                .map(|e| Attendee {
                    email: e.to_string(),
                    name: None,
                    response: None,
                    organizer: false,
                })
                .collect(),
            meet_link: None,
        }
    }

    #[test]
    fn test_external_attendee_filter() {
        let event = event_with_attendees(&[
            "me@ourco.com",
            "sarah.chen@acme.com",
            "room-4@resource.calendar.google.com",
        ]);
        let external = event.external_attendees("ourco.com");
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].email, "sarah.chen@acme.com");
        assert!(event.is_external("ourco.com"));
    }

    #[test]
    fn test_internal_meeting_not_external() {
        let event = event_with_attendees(&["me@ourco.com", "colleague@ourco.com"]);
        assert!(!event.is_external("ourco.com"));
    }

    #[test]
    fn test_event_list_deserialization() {
        let json = r#"{
            "items": [
                {
                    "id": "abc123",
                    "summary": "Acme <> Discovery",
                    "start": {"dateTime": "2026-08-29T15:00:00-05:00"},
                    "end": {"dateTime": "2026-08-29T15:45:00-05:00"},
                    "attendees": [
                        {"email": "sarah.chen@acme.com", "displayName": "Sarah Chen", "responseStatus": "accepted"}
                    ],
                    "hangoutLink": "https://meet.google.com/abc-defg-hij"
                },
                {
                    "id": "def456",
                    "summary": "Cancelled sync",
                    "status": "cancelled"
                }
            ]
        }"#;
        let parsed: EventListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.items.len(), 2);
        let live: Vec<_> = parsed
            .items
            .into_iter()
            .filter(|e| e.status.as_deref() != Some("cancelled"))
            .map(normalize_event)
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].attendees[0].email, "sarah.chen@acme.com");
        assert!(live[0].meet_link.is_some());
    }

    #[test]
    fn test_all_day_event_uses_date() {
        let raw: RawEvent = serde_json::from_str(
            r#"{"id": "x", "summary": "Offsite", "start": {"date": "2026-08-29"}, "end": {"date": "2026-08-30"}}"#,
        )
        .unwrap();
        let event = normalize_event(raw);
        assert_eq!(event.start, "2026-08-29");
    }
}
