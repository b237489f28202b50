//! Domain types and models

pub mod webhook;

pub use webhook::{
    recording_types,
    parse_event_kind, WebhookCopy, WebhookEvent, WebhookEventBucket, WebhookEventCompany,
    WebhookEventParent, WebhookEventPerson, WebhookEventRecording,
};
