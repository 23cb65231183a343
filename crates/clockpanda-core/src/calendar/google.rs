//! Google Calendar implementation of [`CalendarFacade`].
//!
//! Talks to the Calendar v3 REST API on the user's primary calendar. Events
//! written by Clock Panda carry private extended properties that identify
//! their type, so they can be told apart from everything else on ingestion.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

use crate::error::CalendarError;
use crate::time::TimeSpan;
use crate::user::User;

use super::facade::{ensure_modifiable, CalendarFacade, NewCalendarEvent};
use super::oauth::{refresh_access_token, AccessTokenCache, OAuthClientConfig};
use super::{
    Attendee, AttendeeStatus, CalendarEvent, CalendarEventType, EventDetails, InstantCalendarEvent,
    LocalDateCalendarEvent,
};

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const PROPERTY_TYPE: &str = "clockPandaType";
const PROPERTY_PERSONAL_TASK_ID: &str = "clockPandaPersonalTaskId";
const PAGE_SIZE: &str = "250";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    #[serde(rename = "iCalUID")]
    ical_uid: Option<String>,
    recurring_event_id: Option<String>,
    transparency: Option<String>,
    organizer: Option<GooglePerson>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    #[serde(default)]
    attendees: Vec<GoogleAttendee>,
    extended_properties: Option<ExtendedProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<DateTime<FixedOffset>>,
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct GooglePerson {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttendee {
    email: Option<String>,
    response_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtendedProperties {
    #[serde(default)]
    private: HashMap<String, String>,
}

/// Connection settings for the Google Calendar API.
#[derive(Debug, Clone)]
pub struct GoogleCalendarSettings {
    pub api_base_url: String,
    pub oauth: OAuthClientConfig,
}

/// Blocking Google Calendar client. Async requests are driven on the
/// supplied runtime handle, so calls must not come from a runtime worker.
pub struct GoogleCalendarFacade {
    http: Client,
    settings: GoogleCalendarSettings,
    tokens: Arc<AccessTokenCache>,
    runtime: Handle,
}

impl GoogleCalendarFacade {
    pub fn new(settings: GoogleCalendarSettings, tokens: Arc<AccessTokenCache>, runtime: Handle) -> Self {
        Self {
            http: Client::new(),
            settings,
            tokens,
            runtime,
        }
    }

    fn access_token(&self, user: &User) -> Result<String, CalendarError> {
        let refresh = user
            .calendar_refresh_token
            .as_deref()
            .ok_or_else(|| CalendarError::NotAuthenticated {
                email: user.email.clone(),
            })?;
        self.tokens.get_or_refresh(&user.email, Utc::now(), || {
            self.runtime
                .block_on(refresh_access_token(&self.http, &self.settings.oauth, refresh))
        })
    }

    fn events_url(&self, event_id: Option<&str>) -> Result<Url, CalendarError> {
        let base = self.settings.api_base_url.trim_end_matches('/');
        let raw = match event_id {
            Some(id) => format!("{base}/calendars/primary/events/{}", urlencoding::encode(id)),
            None => format!("{base}/calendars/primary/events"),
        };
        Url::parse(&raw).map_err(|e| CalendarError::Decode(format!("invalid calendar url '{raw}': {e}")))
    }

    /// Send a request and hand back the response once its status is known good.
    fn send(&self, user: &User, request: RequestBuilder) -> Result<reqwest::Response, CalendarError> {
        let token = self.access_token(user)?;
        let response = self
            .runtime
            .block_on(async { request.bearer_auth(&token).send().await })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate(&user.email);
        }
        let message = self
            .runtime
            .block_on(response.text())
            .unwrap_or_default();
        Err(CalendarError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn send_json<T: DeserializeOwned>(&self, user: &User, request: RequestBuilder) -> Result<T, CalendarError> {
        let response = self.send(user, request)?;
        self.runtime
            .block_on(response.json::<T>())
            .map_err(|e| CalendarError::Decode(e.to_string()))
    }

    fn event_body(event: &NewCalendarEvent) -> serde_json::Value {
        let mut private = serde_json::Map::new();
        private.insert(PROPERTY_TYPE.into(), json!(event.event_type.as_marker()));
        if let Some(task_id) = &event.personal_task_id {
            private.insert(PROPERTY_PERSONAL_TASK_ID.into(), json!(task_id));
        }
        json!({
            "summary": event.title,
            "description": event.description,
            "start": { "dateTime": event.span.start.to_rfc3339() },
            "end": { "dateTime": event.span.end.to_rfc3339() },
            "transparency": "opaque",
            "extendedProperties": { "private": private },
        })
    }
}

fn attendee_status(raw: Option<&str>) -> AttendeeStatus {
    match raw {
        Some("accepted") => AttendeeStatus::Accepted,
        Some("declined") => AttendeeStatus::Declined,
        Some("tentative") => AttendeeStatus::Tentative,
        _ => AttendeeStatus::NeedsAction,
    }
}

/// Map a provider event onto the domain model. Cancelled events yield `None`.
fn into_calendar_event(user: &User, item: GoogleEvent) -> Result<Option<CalendarEvent>, CalendarError> {
    if item.status.as_deref() == Some("cancelled") {
        return Ok(None);
    }

    let private = item
        .extended_properties
        .map(|p| p.private)
        .unwrap_or_default();
    let event_type = private
        .get(PROPERTY_TYPE)
        .and_then(|m| CalendarEventType::from_marker(m))
        .unwrap_or(CalendarEventType::ExternalEvent);

    let details = EventDetails {
        id: item.id.clone(),
        title: item.summary.unwrap_or_default(),
        description: item.description,
        ical_uid: item.ical_uid,
        is_recurring: item.recurring_event_id.is_some(),
        owner: item
            .organizer
            .and_then(|o| o.email)
            .unwrap_or_else(|| user.email.clone()),
        busy: item.transparency.as_deref() != Some("transparent"),
        event_type,
        personal_task_id: private.get(PROPERTY_PERSONAL_TASK_ID).cloned(),
        attendees: item
            .attendees
            .into_iter()
            .filter_map(|a| {
                a.email.map(|email| Attendee {
                    email,
                    status: attendee_status(a.response_status.as_deref()),
                })
            })
            .collect(),
    };

    let missing = |which: &str| CalendarError::Decode(format!("event {} has no {which} time", item.id));
    let start = item.start.ok_or_else(|| missing("start"))?;
    let end = item.end.ok_or_else(|| missing("end"))?;

    let event = match (start.date_time, end.date_time, start.date, end.date) {
        (Some(start), Some(end), _, _) => CalendarEvent::Instant(InstantCalendarEvent {
            details,
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
        }),
        (None, None, Some(start_date), Some(end_date)) => CalendarEvent::LocalDate(LocalDateCalendarEvent {
            details,
            start_date,
            end_date,
        }),
        _ => {
            return Err(CalendarError::Decode(format!(
                "event {} mixes date and dateTime boundaries",
                item.id
            )))
        }
    };
    Ok(Some(event))
}

impl CalendarFacade for GoogleCalendarFacade {
    fn list_events(&self, user: &User, range: &TimeSpan) -> Result<Vec<CalendarEvent>, CalendarError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut url = self.events_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
                query
                    .append_pair("timeMin", &range.start.to_rfc3339())
                    .append_pair("timeMax", &range.end.to_rfc3339())
                    .append_pair("singleEvents", "true")
                    .append_pair("maxResults", PAGE_SIZE);
            }

            let page: EventList = self.send_json(user, self.http.get(url))?;
            pages += 1;
            for item in page.items {
                match into_calendar_event(user, item) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => warn!(email = %user.email, error = %e, "skipping undecodable calendar event"),
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(email = %user.email, pages, count = events.len(), "listed calendar events");
        Ok(events)
    }

    fn create_event(&self, user: &User, event: &NewCalendarEvent) -> Result<CalendarEvent, CalendarError> {
        let url = self.events_url(None)?;
        let created: GoogleEvent = self.send_json(user, self.http.post(url).json(&Self::event_body(event)))?;
        into_calendar_event(user, created)?
            .ok_or_else(|| CalendarError::Decode("provider returned a cancelled event on create".into()))
    }

    fn update_event(
        &self,
        user: &User,
        existing: &CalendarEvent,
        event: &NewCalendarEvent,
    ) -> Result<CalendarEvent, CalendarError> {
        ensure_modifiable(existing)?;
        let url = self.events_url(Some(existing.id()))?;
        let updated: GoogleEvent = self.send_json(user, self.http.patch(url).json(&Self::event_body(event)))?;
        into_calendar_event(user, updated)?
            .ok_or_else(|| CalendarError::Decode("provider returned a cancelled event on update".into()))
    }

    fn delete_event(&self, user: &User, event: &CalendarEvent) -> Result<(), CalendarError> {
        ensure_modifiable(event)?;
        let url = self.events_url(Some(event.id()))?;
        match self.send(user, self.http.delete(url)) {
            Ok(_) => Ok(()),
            Err(CalendarError::Api { status: 410, .. }) => Ok(()),
            Err(CalendarError::Api { status: 404, .. }) => Err(CalendarError::NotFound {
                event_id: event.id().to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}
