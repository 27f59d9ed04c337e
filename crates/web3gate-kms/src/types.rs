//! Wire types of the MPC-KMS HTTP API.

use serde::{Deserialize, Serialize};
use web3gate_types::TransferSummary;

/// How the `data` field of a [`SignRequest`] is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataEncoding {
    Plain,
    #[default]
    Hex,
    Base64,
}

/// Body of `POST /api/v1/keys/{key_id}/sign`. `data` carries the
/// 32-byte digest in the declared encoding; the optional summary is
/// only rendered in the approval UI and never signed over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRequest {
    pub data: String,
    pub data_encoding: DataEncoding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TransferSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// Immediate result on HTTP 200: the 65-byte `r‖s‖v` signature as hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    pub signature: String,
}

/// Result on HTTP 201: the sign request needs approval and became a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreated {
    pub task_id: String,
}

/// Lifecycle states of an approval task. Terminal states are `Done`,
/// `Failed` and `Rejected`; anything the server invents later maps to
/// `Unknown` and is treated as a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    PendingApproval,
    Approved,
    Done,
    Failed,
    Rejected,
    #[serde(other)]
    Unknown,
}

/// State of an asynchronous signing task.
///
/// On `DONE` the `response` field holds the signing result. Depending
/// on the server version this is either a stringified [`SignResponse`]
/// JSON document or the bare hex signature; callers must tolerate both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// Error body the KMS returns on non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_encoding_wire_names() {
        assert_eq!(
            serde_json::to_string(&DataEncoding::Hex).unwrap(),
            "\"HEX\""
        );
        assert_eq!(
            serde_json::from_str::<DataEncoding>("\"BASE64\"").unwrap(),
            DataEncoding::Base64
        );
    }

    #[test]
    fn test_sign_request_omits_empty_options() {
        let request = SignRequest {
            data: "abcd".into(),
            data_encoding: DataEncoding::Hex,
            summary: None,
            callback_url: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["data_encoding"], "HEX");
        assert!(json.get("summary").is_none());
        assert!(json.get("callback_url").is_none());
    }

    #[test]
    fn test_task_status_parsing() {
        let task: Task =
            serde_json::from_str(r#"{"status":"PENDING_APPROVAL"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::PendingApproval);
        assert!(task.response.is_none());

        let task: Task =
            serde_json::from_str(r#"{"status":"SOMETHING_NEW","msg":"?"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Unknown);
    }
}
