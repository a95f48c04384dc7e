//! Session-scoped client for the external calendar API.
//!
//! Unlike the mail API, the calendar backend lives at a fixed
//! per-environment base URL (staging or production); only the session
//! token travels with the request. Calendar calls additionally advertise
//! iCal support through a dedicated header.
//!
//! The external attribute fields are bitsets; the decoders here are the
//! authoritative mapping.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::CalendarEnvironment;
use crate::email::{join_url, SESSION_HEADER};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::types::SessionInfo;
use crate::widgets::WidgetBlock;
use crate::{Error, Result};

/// Header advertising that this client understands iCal payloads.
const ICAL_HEADER: &str = "X-Supports-ICal";

// ============================================================================
// BITSET DECODERS
// ============================================================================

/// Calendar-list entry attribute bits: bit 0 hidden, bit 1 selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarListAttr(pub u32);

impl CalendarListAttr {
    /// Entry is hidden from the default list view.
    pub fn is_hidden(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    /// Entry is selected for display.
    pub fn is_selected(&self) -> bool {
        self.0 & (1 << 1) != 0
    }
}

/// Calendar attribute bits: bit 0 deleted, bit 1 primary, bit 2 iCal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarAttr(pub u32);

impl CalendarAttr {
    /// Calendar has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    /// The account's primary calendar.
    pub fn is_primary(&self) -> bool {
        self.0 & (1 << 1) != 0
    }

    /// Calendar is backed by an iCal subscription.
    pub fn is_ical(&self) -> bool {
        self.0 & (1 << 2) != 0
    }
}

/// Event attribute bits.
///
/// bit 0 recurring, 1 all-day, 2 guests-may-modify, 3 guests-may-invite,
/// 4 guests-may-see-list, 5 deleted, 8 external, 9 parent-is-secondary,
/// 10 parent-event, 13 iCal, 14 appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAttr(pub u32);

impl EventAttr {
    /// Part of a recurrence series.
    pub fn is_recurring(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    /// Spans whole days rather than a time range.
    pub fn is_all_day(&self) -> bool {
        self.0 & (1 << 1) != 0
    }

    /// Guests may modify the event.
    pub fn guests_may_modify(&self) -> bool {
        self.0 & (1 << 2) != 0
    }

    /// Guests may invite others.
    pub fn guests_may_invite(&self) -> bool {
        self.0 & (1 << 3) != 0
    }

    /// Guests may see the attendee list.
    pub fn guests_may_see_list(&self) -> bool {
        self.0 & (1 << 4) != 0
    }

    /// Event has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.0 & (1 << 5) != 0
    }

    /// Organized outside this account.
    pub fn is_external(&self) -> bool {
        self.0 & (1 << 8) != 0
    }

    /// Parent calendar is a secondary calendar.
    pub fn parent_is_secondary(&self) -> bool {
        self.0 & (1 << 9) != 0
    }

    /// This is the parent of a recurrence series.
    pub fn is_parent_event(&self) -> bool {
        self.0 & (1 << 10) != 0
    }

    /// Sourced from an iCal subscription.
    pub fn is_ical(&self) -> bool {
        self.0 & (1 << 13) != 0
    }

    /// A bookable appointment slot.
    pub fn is_appointment(&self) -> bool {
        self.0 & (1 << 14) != 0
    }
}

/// Attendee attribute bits: bit 0 optional, bit 1 organizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendeeAttr(pub u32);

impl AttendeeAttr {
    /// Attendance is optional.
    pub fn is_optional(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    /// This attendee organizes the event.
    pub fn is_organizer(&self) -> bool {
        self.0 & (1 << 1) != 0
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// One attendee as the calendar API reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
    /// Attendee address
    pub email: String,

    /// Display name, when known
    #[serde(default)]
    pub name: Option<String>,

    /// Raw attribute bitset; decode via [`AttendeeAttr`]
    #[serde(default)]
    pub attr: u32,

    /// RSVP state ("accepted", "declined", "tentative", "needsAction")
    #[serde(default)]
    pub response: Option<String>,
}

impl Attendee {
    /// Decoded attribute bits.
    pub fn attr(&self) -> AttendeeAttr {
        AttendeeAttr(self.attr)
    }
}

/// One event as the calendar API reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Stable event id
    pub id: String,

    /// Owning calendar id
    #[serde(rename = "calendarId", default)]
    pub calendar_id: String,

    /// Event title
    #[serde(default)]
    pub title: String,

    /// RFC 3339 start time
    #[serde(default)]
    pub start: String,

    /// RFC 3339 end time
    #[serde(default)]
    pub end: String,

    /// Free-form location
    #[serde(default)]
    pub location: Option<String>,

    /// Video conference link, when the event has one
    #[serde(rename = "meetingLink", default)]
    pub meeting_link: Option<String>,

    /// Raw attribute bitset; decode via [`EventAttr`]
    #[serde(default)]
    pub attr: u32,

    /// Attendee list
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

impl CalendarEvent {
    /// Decoded attribute bits.
    pub fn attr(&self) -> EventAttr {
        EventAttr(self.attr)
    }

    /// The organizing attendee, when listed.
    pub fn organizer(&self) -> Option<&Attendee> {
        self.attendees.iter().find(|a| a.attr().is_organizer())
    }
}

/// A calendar with its list-entry attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    /// Stable calendar id
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Raw calendar attribute bitset; decode via [`CalendarAttr`]
    #[serde(default)]
    pub attr: u32,

    /// Raw list-entry attribute bitset; decode via [`CalendarListAttr`]
    #[serde(rename = "listAttr", default)]
    pub list_attr: u32,
}

impl Calendar {
    /// Decoded calendar attribute bits.
    pub fn attr(&self) -> CalendarAttr {
        CalendarAttr(self.attr)
    }

    /// Decoded list-entry attribute bits.
    pub fn list_attr(&self) -> CalendarListAttr {
        CalendarListAttr(self.list_attr)
    }
}

#[derive(Debug, Deserialize)]
struct EventsEnvelope {
    #[serde(default)]
    events: Vec<CalendarEvent>,
}

#[derive(Debug, Deserialize)]
struct CalendarsEnvelope {
    #[serde(default)]
    calendars: Vec<Calendar>,
}

#[derive(Debug, Deserialize)]
struct SlotsEnvelope {
    #[serde(default)]
    slots: Vec<FreeSlot>,
}

/// A free interval on the user's calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeSlot {
    /// RFC 3339 start time
    pub start: String,

    /// RFC 3339 end time
    pub end: String,
}

/// Fields for a new event.
#[derive(Debug, Clone, Serialize)]
pub struct EventDraft {
    /// Event title
    pub title: String,

    /// RFC 3339 start time
    pub start: String,

    /// RFC 3339 end time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// Attendee addresses to invite
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,

    /// Free-form location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Longer description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// CLIENT
// ============================================================================

/// Session-scoped calendar API client.
pub struct CalendarApi {
    http: reqwest::Client,
    base_url: String,
    session: String,
}

impl CalendarApi {
    /// Builds a client for the configured environment using the request's
    /// session token.
    pub fn new(session: &SessionInfo, environment: CalendarEnvironment) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: environment.base_url().trim_end_matches('/').to_string(),
            session: session.session.clone(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(join_url(&self.base_url, path))
            .header(SESSION_HEADER, &self.session)
            .header(ICAL_HEADER, "1")
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(join_url(&self.base_url, path))
            .header(SESSION_HEADER, &self.session)
            .header(ICAL_HEADER, "1")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::upstream(
                "calendar",
                format!("status {}: {}", status, body),
            ))
        }
    }

    /// Lists the user's calendars. Deleted and hidden ones are filtered
    /// out; the LLM has no use for them.
    pub async fn list_calendars(&self) -> Result<Vec<Calendar>> {
        let envelope: CalendarsEnvelope = retry_with_backoff(read_retry(), move || async move {
            let response = Self::check(self.get("/calendars").send().await?).await?;
            Ok(response.json().await?)
        })
        .await?;

        Ok(envelope
            .calendars
            .into_iter()
            .filter(|c| !c.attr().is_deleted() && !c.list_attr().is_hidden())
            .collect())
    }

    /// Fetches events in a time range (RFC 3339 bounds). Deleted events
    /// are filtered out.
    pub async fn fetch_events(&self, start: &str, end: &str) -> Result<Vec<CalendarEvent>> {
        let envelope: EventsEnvelope = retry_with_backoff(read_retry(), move || async move {
            let response = Self::check(
                self.get("/events")
                    .query(&[("start", start), ("end", end)])
                    .send()
                    .await?,
            )
            .await?;
            Ok(response.json().await?)
        })
        .await?;

        Ok(envelope
            .events
            .into_iter()
            .filter(|e| !e.attr().is_deleted())
            .collect())
    }

    /// Creates an event. Not retried: creates are not idempotent.
    pub async fn create_event(&self, draft: &EventDraft) -> Result<CalendarEvent> {
        let response = Self::check(self.post("/events").json(draft).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Responds to an invitation ("accept", "decline", "tentative").
    pub async fn respond(&self, event_id: &str, response: &str) -> Result<Value> {
        let path = format!("/events/{}/respond", event_id);
        let reply = Self::check(
            self.post(&path)
                .json(&json!({"response": response}))
                .send()
                .await?,
        )
        .await?;
        Ok(reply.json().await?)
    }

    /// Finds free slots of at least `duration_minutes` on a given day
    /// (`YYYY-MM-DD`).
    pub async fn free_slots(&self, date: &str, duration_minutes: u32) -> Result<Vec<FreeSlot>> {
        let envelope: SlotsEnvelope = retry_with_backoff(read_retry(), move || async move {
            let duration_str = duration_minutes.to_string();
            let response = Self::check(
                self.get("/availability")
                    .query(&[("date", date), ("durationMinutes", duration_str.as_str())])
                    .send()
                    .await?,
            )
            .await?;
            Ok(response.json().await?)
        })
        .await?;
        Ok(envelope.slots)
    }
}

fn read_retry() -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(2)
        .with_initial_delay(std::time::Duration::from_millis(200))
}

/// Builds a `calendar_event` widget from one event.
pub fn event_widget(event: &CalendarEvent) -> WidgetBlock {
    let attr = event.attr();
    let has_link = event
        .meeting_link
        .as_deref()
        .map(|l| !l.is_empty())
        .unwrap_or(false);

    let actions = if has_link {
        vec!["join".to_string(), "decline".to_string(), "details".to_string()]
    } else {
        vec![
            "accept".to_string(),
            "decline".to_string(),
            "details".to_string(),
        ]
    };

    WidgetBlock::new(
        "calendar_event",
        json!({
            "eventId": event.id,
            "title": event.title,
            "start": event.start,
            "end": event.end,
            "location": event.location,
            "meetingLink": event.meeting_link,
            "allDay": attr.is_all_day(),
            "recurring": attr.is_recurring(),
            "organizer": event.organizer().map(|a| a.email.clone()),
        }),
        actions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_list_attr_bits() {
        let attr = CalendarListAttr(0b11);
        assert!(attr.is_hidden());
        assert!(attr.is_selected());
        assert!(!CalendarListAttr(0).is_hidden());
    }

    #[test]
    fn test_calendar_attr_bits() {
        let attr = CalendarAttr(0b110);
        assert!(!attr.is_deleted());
        assert!(attr.is_primary());
        assert!(attr.is_ical());
    }

    #[test]
    fn test_event_attr_low_bits() {
        let attr = EventAttr(0b10_0011);
        assert!(attr.is_recurring());
        assert!(attr.is_all_day());
        assert!(!attr.guests_may_modify());
        assert!(!attr.guests_may_invite());
        assert!(!attr.guests_may_see_list());
        assert!(attr.is_deleted());
    }

    #[test]
    fn test_event_attr_high_bits() {
        let attr = EventAttr((1 << 8) | (1 << 9) | (1 << 10) | (1 << 13) | (1 << 14));
        assert!(attr.is_external());
        assert!(attr.parent_is_secondary());
        assert!(attr.is_parent_event());
        assert!(attr.is_ical());
        assert!(attr.is_appointment());
        assert!(!attr.is_recurring());
    }

    #[test]
    fn test_attendee_attr_bits() {
        let attr = AttendeeAttr(0b10);
        assert!(!attr.is_optional());
        assert!(attr.is_organizer());
    }

    #[test]
    fn test_organizer_lookup() {
        let event: CalendarEvent = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "title": "Planning",
            "attendees": [
                {"email": "guest@example.com", "attr": 0},
                {"email": "boss@example.com", "attr": 2}
            ]
        }))
        .unwrap();
        assert_eq!(event.organizer().unwrap().email, "boss@example.com");
    }

    #[test]
    fn test_event_widget_actions_depend_on_meeting_link() {
        let mut event: CalendarEvent = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "title": "Standup",
            "start": "2026-08-01T09:00:00Z",
            "end": "2026-08-01T09:15:00Z",
            "meetingLink": "https://meet.example.com/abc"
        }))
        .unwrap();

        let widget = event_widget(&event);
        assert_eq!(widget.actions, vec!["join", "decline", "details"]);
        assert_eq!(widget.data["meetingLink"], "https://meet.example.com/abc");

        event.meeting_link = None;
        let widget = event_widget(&event);
        assert_eq!(widget.actions, vec!["accept", "decline", "details"]);
    }

    #[test]
    fn test_event_draft_serialization_skips_empty() {
        let draft = EventDraft {
            title: "Coffee".to_string(),
            start: "2026-08-02T10:00:00Z".to_string(),
            end: None,
            attendees: vec![],
            location: None,
            description: None,
        };
        let raw = serde_json::to_value(&draft).unwrap();
        assert_eq!(raw["title"], "Coffee");
        assert!(raw.get("end").is_none());
        assert!(raw.get("attendees").is_none());
    }
}
