//! User-context block for the system prompt.
//!
//! A short prose block telling the model what time it is (and where), who
//! the user is, and a light activity snapshot. The snapshot involves a
//! cheap count query against the mail API; its failure is never
//! user-visible, the line is simply omitted.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::email::EmailApi;

/// Who the assistant is working for.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    /// Primary email address
    pub email: String,

    /// Display name, when known
    pub name: Option<String>,
}

/// Builds the optional user-context prompt section.
pub struct ContextBuilder {
    timezone: Tz,
    identity: Option<UserIdentity>,
}

impl ContextBuilder {
    /// Creates a builder for the given IANA timezone identifier.
    ///
    /// Unknown identifiers fall back to UTC with a warning; a bad timezone
    /// must not take down request handling.
    pub fn new(timezone: &str, identity: Option<UserIdentity>) -> Self {
        let timezone = timezone.parse::<Tz>().unwrap_or_else(|_| {
            log::warn!("Unknown timezone {:?}; falling back to UTC", timezone);
            Tz::UTC
        });
        Self { timezone, identity }
    }

    /// Builds the context block, querying the mail API for an activity
    /// snapshot when a session-scoped client is available.
    pub async fn build(&self, email: Option<&EmailApi>) -> String {
        let unread = match email {
            Some(api) => match api.unread_count().await {
                Ok(count) => Some(count),
                Err(e) => {
                    // A missing snapshot is not an error the user should see.
                    log::debug!("Activity snapshot unavailable: {}", e);
                    None
                }
            },
            None => None,
        };
        self.render(Utc::now(), unread)
    }

    /// Renders the block for a fixed instant. Split out for determinism in
    /// tests.
    pub fn render(&self, now: DateTime<Utc>, unread: Option<u64>) -> String {
        let local = now.with_timezone(&self.timezone);
        let mut out = format!(
            "Current date and time: {}\nTimezone: {}",
            local.format("%A, %B %-d, %Y at %-I:%M %p %Z"),
            self.timezone.name(),
        );

        if let Some(identity) = &self.identity {
            match &identity.name {
                Some(name) => out.push_str(&format!("\nUser: {} <{}>", name, identity.email)),
                None => out.push_str(&format!("\nUser: {}", identity.email)),
            }
        }

        if let Some(count) = unread {
            let noun = if count == 1 { "email" } else { "emails" };
            out.push_str(&format!("\nActivity: {} unread {} in the inbox.", count, noun));
        }

        out
    }
}
