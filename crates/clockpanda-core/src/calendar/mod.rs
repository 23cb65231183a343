//! Calendar access: the event model, the provider boundary and its
//! Google and in-memory implementations.

pub mod event;
pub mod facade;
pub mod google;
pub mod memory;
pub mod oauth;


pub use event::{
    Attendee, AttendeeStatus, CalendarEvent, CalendarEventType, EventDetails, InstantCalendarEvent,
    LocalDateCalendarEvent,
};
pub use facade::{ensure_modifiable, CalendarFacade, NewCalendarEvent};
pub use google::{GoogleCalendarFacade, GoogleCalendarSettings, DEFAULT_API_BASE_URL, DEFAULT_TOKEN_URL};
pub use memory::{InMemoryCalendarFacade, Mutation};
pub use oauth::{AccessToken, AccessTokenCache, OAuthClientConfig};
