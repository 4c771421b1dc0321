//! Scheduled-action descriptors.
//!
//! The host's scheduler hands the transport opaque actions: an id plus a
//! JSON body naming the link and whether to fetch or post. Producing the
//! schedule is the host's concern; this module only models the descriptor.

use serde::{Deserialize, Serialize};

use crate::error::TransportResult;

/// What a scheduled action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    /// Poll the link's current fetch object.
    Fetch,
    /// Store previously enqueued content at the link's current post object.
    Post,
}

/// Parsed JSON body of a scheduled action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// The link the action targets.
    pub link_id: String,
    /// Fetch or post.
    #[serde(rename = "type")]
    pub action_type: ActionType,
}

impl ActionDescriptor {
    /// Parse a descriptor from its JSON body.
    pub fn from_json(json: &str) -> TransportResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to the JSON body form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One scheduled action as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAction {
    /// Host-assigned action id; keys enqueued content for posts.
    pub action_id: u64,
    /// JSON body (an [`ActionDescriptor`]).
    pub json: String,
}

impl TransportAction {
    /// Build an action from its parts.
    pub fn new(action_id: u64, descriptor: &ActionDescriptor) -> Self {
        Self {
            action_id,
            json: descriptor.to_json(),
        }
    }
}
