//! Correlation tags and domain events for debounced notifications.
//!
//! Pending notification triggers are addressed by an exact [`TagSet`]. A
//! trigger matches a lookup only when it carries *every* required tag; a
//! single shared tag (e.g. the same resource) is never enough.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Tag prefix for the resource a notification is about.
pub const TAG_RESOURCE: &str = "resource";
/// Tag prefix for the delivery channel endpoint.
pub const TAG_CHANNEL: &str = "channel";
/// Tag prefix for the acting principal.
pub const TAG_ACTOR: &str = "actor";

// ---------------------------------------------------------------------------
// TagSet
// ---------------------------------------------------------------------------

/// Ordered, de-duplicated set of `prefix:value` tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tags.into_iter().map(Into::into).collect())
    }

    /// `true` when every tag in `required` is present in `self`.
    pub fn contains_all(&self, required: &TagSet) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

/// The `{resource, channel, actor}` triple that decides whether two events
/// coalesce into one notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub resource_id: String,
    pub channel: String,
    pub actor: String,
}

impl Correlation {
    pub fn new(
        resource_id: impl Into<String>,
        channel: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            channel: channel.into(),
            actor: actor.into(),
        }
    }

    pub fn tags(&self) -> TagSet {
        TagSet::new([
            format!("{TAG_RESOURCE}:{}", self.resource_id),
            format!("{TAG_CHANNEL}:{}", self.channel),
            format!("{TAG_ACTOR}:{}", self.actor),
        ])
    }

    /// Idempotency key for the trigger scheduled by the batch ending in
    /// `batch_marker`.
    ///
    /// Every field is length-prefixed, so no two distinct
    /// `(correlation, marker)` pairs share a key.
    pub fn trigger_key(&self, batch_marker: &str) -> String {
        [
            self.resource_id.as_str(),
            self.channel.as_str(),
            self.actor.as_str(),
            batch_marker,
        ]
        .iter()
        .map(|part| format!("{}:{part}", part.len()))
        .collect::<Vec<_>>()
        .join("|")
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, value) in [
            ("resourceId", &self.resource_id),
            ("channel", &self.channel),
            ("actor", &self.actor),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!("{name} is required")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NotificationEvent
// ---------------------------------------------------------------------------

/// A qualifying domain event, e.g. a document added to a data room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: uuid::Uuid,
    pub team_id: String,
    pub correlation: Correlation,
    /// Dot-separated event name, e.g. `"document.added"`.
    pub event_type: String,
    /// Entity the event is about; doubles as the batch marker.
    pub subject_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub occurred_at: Timestamp,
}
