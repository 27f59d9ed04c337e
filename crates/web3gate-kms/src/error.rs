//! Error taxonomy of the KMS client.

use reqwest::StatusCode;

/// Everything that can go wrong between the gateway and the KMS.
///
/// The client never retries; callers translate these into JSON-RPC
/// server errors. [`KmsError::Api`] keeps the KMS `code`/`message` pair
/// so it can travel in the error `data` field.
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("kms transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to encode sign request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("kms rejected the request: {message} (code {code})")]
    Api { code: i64, message: String },

    #[error("kms returned unexpected status {0}")]
    Status(StatusCode),

    #[error("kms signature must be 65 bytes, got {0}")]
    SignatureLength(usize),

    #[error("kms signature is not valid hex: {0}")]
    SignatureHex(#[from] hex::FromHexError),

    #[error("signing task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },

    #[error("signing task {task_id} was rejected: {reason}")]
    TaskRejected { task_id: String, reason: String },

    #[error("signing task {task_id} reported an unrecognized status")]
    UnexpectedTaskStatus { task_id: String },

    #[error("signing task {task_id} completed without a result payload")]
    MissingTaskResult { task_id: String },

    #[error("timed out waiting for signing task {task_id}")]
    TaskTimeout { task_id: String },

    #[error("sign data is not valid UTF-8, PLAIN encoding cannot carry it")]
    NonUtf8PlainData,
}
