//! Webhook event payloads
//!
//! Event and recording identifiers can exceed 2^53, so the top-level event id
//! is kept as its decimal string. The receiver overwrites it with the digits
//! taken verbatim from the wire body.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A webhook delivery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Decimal event id
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    /// `<resource>_<action>`, e.g. `todo_created`
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub recording: WebhookEventRecording,
    #[serde(default)]
    pub creator: WebhookEventPerson,
    /// Present on `*_copied` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<WebhookCopy>,
    /// Entire payload as received, including fields this model does not
    /// know about
    #[serde(skip)]
    pub raw: Value,
}

impl WebhookEvent {
    /// Resource part of the kind (`question_answer` for
    /// `question_answer_created`)
    #[must_use]
    pub fn resource_type(&self) -> &str {
        parse_event_kind(&self.kind).0
    }

    /// Action part of the kind (`created` for `question_answer_created`)
    #[must_use]
    pub fn action(&self) -> &str {
        parse_event_kind(&self.kind).1
    }
}

/// Recording the event refers to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookEventRecording {
    pub id: u64,
    pub status: String,
    pub visible_to_clients: bool,
    pub created_at: String,
    pub updated_at: String,
    pub title: String,
    pub inherits_status: bool,
    #[serde(rename = "type")]
    pub recording_type: String,
    pub url: String,
    pub app_url: String,
    pub bookmark_url: String,
    pub content: String,
    pub comments_count: u32,
    pub comments_url: String,
    pub subscription_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<WebhookEventParent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<WebhookEventBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<WebhookEventPerson>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookEventPerson {
    pub id: u64,
    pub attachable_sgid: String,
    pub name: String,
    pub email_address: String,
    pub personable_type: String,
    pub title: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub admin: bool,
    pub owner: bool,
    pub client: bool,
    pub employee: bool,
    pub time_zone: String,
    pub avatar_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<WebhookEventCompany>,
    pub can_manage_projects: bool,
    pub can_manage_people: bool,
    pub can_ping: bool,
    pub can_access_timesheet: bool,
    pub can_access_hill_charts: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookEventCompany {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookEventParent {
    pub id: u64,
    pub title: String,
    #[serde(rename = "type")]
    pub parent_type: String,
    pub url: String,
    pub app_url: String,
}

/// Bucket (project) holding the recording
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookEventBucket {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub bucket_type: String,
}

/// Destination of a copy or move
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookCopy {
    pub id: u64,
    pub url: String,
    pub app_url: String,
    pub bucket: WebhookCopyBucket,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookCopyBucket {
    pub id: u64,
}

/// Known recording types (not exhaustive)
pub mod recording_types {
    pub const CHECKIN_REPLY: &str = "Checkin::Reply";
    pub const CLOUD_FILE: &str = "CloudFile";
    pub const COMMENT: &str = "Comment";
    pub const DOCUMENT: &str = "Document";
    pub const FORWARD_REPLY: &str = "Forward::Reply";
    pub const GOOGLE_DOCUMENT: &str = "GoogleDocument";
    pub const INBOX_FORWARD: &str = "Inbox::Forward";
    pub const MESSAGE: &str = "Message";
    pub const QUESTION: &str = "Question";
    pub const QUESTION_ANSWER: &str = "Question::Answer";
    pub const SCHEDULE_ENTRY: &str = "Schedule::Entry";
    pub const TODO: &str = "Todo";
    pub const TODOLIST: &str = "Todolist";
    pub const TODOLIST_GROUP: &str = "Todolist::Group";
    pub const UPLOAD: &str = "Upload";
    pub const VAULT: &str = "Vault";
}

/// Split an event kind into `(resource, action)` at the last underscore
///
/// A kind without an underscore yields an empty action.
#[must_use]
pub fn parse_event_kind(kind: &str) -> (&str, &str) {
    match kind.rfind('_') {
        Some(idx) => (&kind[..idx], &kind[idx + 1..]),
        None => (kind, ""),
    }
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl Visitor<'_> for IdVisitor {
        type Value = String;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("an integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(format!("{v:.0}"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
