//! Protocol envelopes around a [`DomainResult`].
//!
//! The domain object goes in unchanged: as the `data` part of an A2A task
//! artifact here, or as `structuredContent` of an MCP tool result (built by
//! the MCP crate from [`encode`]). The summary text travels beside it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use salesagent_core::errors::ErrorCode;

use crate::dispatch::{DispatchOutcome, DomainResult, ErrorBody};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: String,
    pub parts: Vec<Part>,
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub state: TaskState,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parts: Vec<Part>,
}

/// A2A task. Skill calls finish synchronously, so tasks are returned in a
/// terminal state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    pub kind: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl Task {
    pub fn from_outcome(outcome: &DispatchOutcome, context_id: Option<String>) -> Self {
        match encode(outcome) {
            Ok((result, payload)) => Self {
                id: new_id(),
                context_id,
                kind: "task".to_string(),
                status: TaskStatus { state: TaskState::Completed, timestamp: Utc::now(), message: None },
                artifacts: vec![Artifact {
                    artifact_id: new_id(),
                    name: outcome.skill.clone(),
                    description: Some(result.summary()),
                    parts: vec![Part::Data { data: payload }],
                }],
            },
            Err(body) => Self::failed(body, context_id),
        }
    }

    pub fn failed(body: ErrorBody, context_id: Option<String>) -> Self {
        let text = format!("{}: {}", body.code, body.message);
        let data = serde_json::to_value(&body).unwrap_or(Value::Null);
        Self {
            id: new_id(),
            context_id,
            kind: "task".to_string(),
            status: TaskStatus {
                state: TaskState::Failed,
                timestamp: Utc::now(),
                message: Some(Message {
                    role: "agent".to_string(),
                    parts: vec![Part::Text { text }, Part::Data { data }],
                    message_id: new_id(),
                }),
            },
            artifacts: Vec::new(),
        }
    }

    pub fn domain_payload(&self) -> Option<&Value> {
        if self.status.state != TaskState::Completed {
            return None;
        }
        self.artifacts.iter().flat_map(|artifact| artifact.parts.iter()).find_map(|part| match part {
            Part::Data { data } => Some(data),
            Part::Text { .. } => None,
        })
    }
}

/// The domain result of `outcome` and its wire payload, or the error body
/// that replaces the payload.
pub fn encode(outcome: &DispatchOutcome) -> Result<(&DomainResult, Value), ErrorBody> {
    let result = match &outcome.result {
        Ok(result) => result,
        Err(error) => return Err(ErrorBody::for_error(error, &outcome.correlation_id)),
    };
    let payload = result.to_value().map_err(|error| {
        tracing::error!(
            event_name = "dispatch.encoding_failed",
            correlation_id = %outcome.correlation_id,
            skill = %outcome.skill,
            error = %error,
            "domain result could not be encoded"
        );
        ErrorBody::new(
            ErrorCode::InternalError,
            "An unexpected internal error occurred.",
            &outcome.correlation_id,
        )
    })?;
    Ok((result, payload))
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::TaskState;

    #[test]
    fn task_states_are_the_closed_a2a_set() {
        let encoded: Vec<_> = [
            TaskState::Submitted,
            TaskState::Working,
            TaskState::InputRequired,
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
        ]
        .iter()
        .map(|state| serde_json::to_value(state).expect("encode"))
        .collect();
        assert_eq!(
            encoded,
            vec![
                json!("submitted"),
                json!("working"),
                json!("input-required"),
                json!("completed"),
                json!("failed"),
                json!("canceled")
            ]
        );
        assert!(serde_json::from_value::<TaskState>(json!("rejected")).is_err());
    }
}
