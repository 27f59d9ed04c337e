//! The authenticated KMS HTTP client.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use reqwest::{header, Method, StatusCode};
use std::time::Duration;
use url::Url;
use web3gate_types::TransferSummary;

use crate::auth::{self, Credentials, DEFAULT_CONTENT_TYPE};
use crate::error::KmsError;
use crate::types::{DataEncoding, ErrorBody, SignRequest, SignResponse, Task, TaskCreated, TaskStatus};

/// Interval between task polls unless the caller picks another one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on how long [`KmsClient::wait_for_task_completion`]
/// keeps polling before giving up.
pub const TASK_WAIT_DEADLINE: Duration = Duration::from_secs(5 * 60);

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_MAX_IDLE: usize = 100;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// HTTP client for the MPC-KMS signing API.
///
/// One instance holds one connection pool and is shared across all
/// concurrent signing requests; cloning is cheap and keeps the pool.
#[derive(Debug, Clone)]
pub struct KmsClient {
    http: reqwest::Client,
    /// `{endpoint}/api/v1`, normalized once at construction. Per call
    /// only the key-id or task-id suffix is appended.
    api_base: String,
    credentials: Credentials,
    poll_interval: Duration,
}

impl KmsClient {
    /// Builds a client for the given endpoint base URL.
    pub fn new(endpoint: &Url, credentials: Credentials) -> Result<Self, KmsError> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()?;
        Ok(KmsClient {
            http,
            api_base: format!("{}/api/v1", endpoint.as_str().trim_end_matches('/')),
            credentials,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Overrides the interval used when a sign call falls into the
    /// approval flow.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn sign_url(&self, key_id: &str) -> String {
        format!("{}/keys/{key_id}/sign", self.api_base)
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/tasks/{task_id}", self.api_base)
    }

    /// Signs a 32-byte digest with the given key, hex data encoding and
    /// no display summary.
    pub async fn sign(&self, key_id: &str, digest: &[u8; 32]) -> Result<[u8; 65], KmsError> {
        self.sign_with_options(key_id, digest, DataEncoding::Hex, None, None)
            .await
    }

    /// Signs a 32-byte digest, choosing the data encoding and optionally
    /// attaching an approval-UI summary and a completion callback URL.
    ///
    /// A `201` answer means the key requires approval; the call then
    /// transparently polls the created task until it finishes or the
    /// polling deadline passes.
    pub async fn sign_with_options(
        &self,
        key_id: &str,
        digest: &[u8; 32],
        encoding: DataEncoding,
        summary: Option<TransferSummary>,
        callback_url: Option<String>,
    ) -> Result<[u8; 65], KmsError> {
        let data = match encoding {
            DataEncoding::Hex => hex::encode(digest),
            DataEncoding::Base64 => BASE64.encode(digest),
            DataEncoding::Plain => String::from_utf8(digest.to_vec())
                .map_err(|_| KmsError::NonUtf8PlainData)?,
        };
        let request = SignRequest {
            data,
            data_encoding: encoding,
            summary,
            callback_url,
        };
        let body = serde_json::to_vec(&request)?;
        let response = self
            .send(Method::POST, self.sign_url(key_id), body)
            .await?;
        match response.status() {
            StatusCode::OK => {
                let signed: SignResponse = response.json().await?;
                decode_signature(&signed.signature)
            }
            StatusCode::CREATED => {
                let created: TaskCreated = response.json().await?;
                tracing::info!(
                    key_id,
                    task_id = %created.task_id,
                    "sign request requires approval, polling task"
                );
                let task = self
                    .wait_for_task_completion(&created.task_id, self.poll_interval)
                    .await?;
                signature_from_task(&created.task_id, &task)
            }
            status => Err(self.decode_error(status, response).await),
        }
    }

    /// Fetches the current state of an approval task.
    pub async fn get_task_result(&self, task_id: &str) -> Result<Task, KmsError> {
        let response = self
            .send(Method::GET, self.task_url(task_id), Vec::new())
            .await?;
        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => Err(self.decode_error(status, response).await),
        }
    }

    /// Polls a task until it reaches a terminal state.
    ///
    /// Sleeps `poll_interval` between attempts; the number of attempts
    /// is capped so the total wait stays within [`TASK_WAIT_DEADLINE`].
    /// Cancellation is cooperative: dropping the future aborts the
    /// in-flight poll immediately.
    pub async fn wait_for_task_completion(
        &self,
        task_id: &str,
        poll_interval: Duration,
    ) -> Result<Task, KmsError> {
        let interval = if poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            poll_interval
        };
        let max_attempts =
            (TASK_WAIT_DEADLINE.as_millis() / interval.as_millis()).max(1) as u64;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(interval).await;
            let task = self.get_task_result(task_id).await?;
            match task.status {
                TaskStatus::PendingApproval | TaskStatus::Approved => {
                    tracing::debug!(task_id, attempt, status = ?task.status, "task not finished");
                }
                TaskStatus::Done => return Ok(task),
                TaskStatus::Failed => {
                    return Err(KmsError::TaskFailed {
                        task_id: task_id.to_string(),
                        reason: task.msg.unwrap_or_default(),
                    })
                }
                TaskStatus::Rejected => {
                    return Err(KmsError::TaskRejected {
                        task_id: task_id.to_string(),
                        reason: task.msg.unwrap_or_default(),
                    })
                }
                TaskStatus::Unknown => {
                    return Err(KmsError::UnexpectedTaskStatus {
                        task_id: task_id.to_string(),
                    })
                }
            }
        }
        Err(KmsError::TaskTimeout {
            task_id: task_id.to_string(),
        })
    }

    /// Sends one authenticated request. The HMAC headers are derived
    /// from the exact body bytes that go on the wire.
    async fn send(
        &self,
        method: Method,
        url: String,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, KmsError> {
        let content_sha256 = auth::content_sha256(&body);
        let date = auth::http_date(Utc::now());
        let canonical = auth::canonical_string(
            method.as_str(),
            &content_sha256,
            DEFAULT_CONTENT_TYPE,
            &date,
        );
        let authorization = self.credentials.authorization(&canonical);
        let response = self
            .http
            .request(method, &url)
            .header(header::AUTHORIZATION, authorization)
            .header(header::DATE, date)
            .header(header::CONTENT_TYPE, DEFAULT_CONTENT_TYPE)
            .header("Content-SHA256", content_sha256)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }

    async fn decode_error(&self, status: StatusCode, response: reqwest::Response) -> KmsError {
        match response.json::<ErrorBody>().await {
            Ok(body) => KmsError::Api {
                code: body.code,
                message: body.message,
            },
            Err(_) => KmsError::Status(status),
        }
    }
}

/// Extracts the signature out of a `DONE` task. The `response` field is
/// either a stringified [`SignResponse`] or the bare hex signature;
/// both forms are accepted.
fn signature_from_task(task_id: &str, task: &Task) -> Result<[u8; 65], KmsError> {
    let payload = task
        .response
        .as_deref()
        .ok_or_else(|| KmsError::MissingTaskResult {
            task_id: task_id.to_string(),
        })?;
    let signature_hex = match serde_json::from_str::<SignResponse>(payload) {
        Ok(embedded) => embedded.signature,
        Err(_) => payload.trim().trim_matches('"').to_string(),
    };
    decode_signature(&signature_hex)
}

fn decode_signature(signature_hex: &str) -> Result<[u8; 65], KmsError> {
    let digits = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(digits)?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| KmsError::SignatureLength(bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn client_for(server: &mockito::ServerGuard) -> KmsClient {
        let endpoint = Url::parse(&server.url()).unwrap();
        KmsClient::new(&endpoint, Credentials::new("ak-test", "sk-test")).unwrap()
    }

    fn signature_hex(raw_v: u8) -> String {
        let mut sig = Vec::new();
        sig.extend_from_slice(&[0x01; 32]);
        sig.extend_from_slice(&[0x02; 32]);
        sig.push(raw_v);
        hex::encode(sig)
    }

    #[tokio::test]
    async fn test_sign_immediate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/keys/key-1/sign")
            .match_header(
                "authorization",
                mockito::Matcher::Regex(r"^MPC-KMS ak-test:[A-Za-z0-9+/]+=*$".to_string()),
            )
            .match_header("content-type", "application/json")
            .match_header("content-sha256", mockito::Matcher::Any)
            .match_header("date", mockito::Matcher::Regex(r"GMT$".to_string()))
            .with_status(200)
            .with_body(format!(r#"{{"signature":"{}"}}"#, signature_hex(0)))
            .create_async()
            .await;

        let client = client_for(&server);
        let signature = client.sign("key-1", &[0x42; 32]).await.unwrap();
        assert_eq!(signature[0], 0x01);
        assert_eq!(signature[32], 0x02);
        assert_eq!(signature[64], 0x00);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_request_body_carries_hex_digest() {
        let mut server = mockito::Server::new_async().await;
        let digest = [0xabu8; 32];
        let mock = server
            .mock("POST", "/api/v1/keys/key-1/sign")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "data": hex::encode(digest),
                "data_encoding": "HEX",
            })))
            .with_status(200)
            .with_body(format!(r#"{{"signature":"{}"}}"#, signature_hex(1)))
            .create_async()
            .await;

        let client = client_for(&server);
        client.sign("key-1", &digest).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_with_base64_encoding() {
        let mut server = mockito::Server::new_async().await;
        let digest = [0x0fu8; 32];
        let mock = server
            .mock("POST", "/api/v1/keys/key-1/sign")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "data": BASE64.encode(digest),
                "data_encoding": "BASE64",
            })))
            .with_status(200)
            .with_body(format!(r#"{{"signature":"{}"}}"#, signature_hex(0)))
            .create_async()
            .await;

        let client = client_for(&server);
        client
            .sign_with_options("key-1", &digest, DataEncoding::Base64, None, None)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_rejects_wrong_signature_length() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/keys/key-1/sign")
            .with_status(200)
            .with_body(format!(r#"{{"signature":"{}"}}"#, hex::encode([1u8; 64])))
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.sign("key-1", &[0; 32]).await.unwrap_err();
        assert!(matches!(err, KmsError::SignatureLength(64)));
    }

    #[tokio::test]
    async fn test_sign_surfaces_kms_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/keys/key-1/sign")
            .with_status(403)
            .with_body(r#"{"code":40301,"message":"access denied"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.sign("key-1", &[0; 32]).await.unwrap_err();
        match err {
            KmsError::Api { code, message } => {
                assert_eq!(code, 40301);
                assert_eq!(message, "access denied");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sign_surfaces_raw_status_on_undecodable_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/keys/key-1/sign")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.sign("key-1", &[0; 32]).await.unwrap_err();
        assert!(matches!(err, KmsError::Status(status) if status.as_u16() == 502));
    }

    #[tokio::test]
    async fn test_async_approval_flow_polls_until_done() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/keys/key-1/sign")
            .with_status(201)
            .with_body(r#"{"task_id":"t-1"}"#)
            .create_async()
            .await;

        // Three pending polls, then DONE with an embedded SignResponse.
        let polls = Arc::new(AtomicUsize::new(0));
        let polls_seen = polls.clone();
        let done_body = serde_json::json!({
            "status": "DONE",
            "response": format!(r#"{{"signature":"{}"}}"#, signature_hex(1)),
        })
        .to_string();
        server
            .mock("GET", "/api/v1/tasks/t-1")
            .with_status(200)
            .with_body_from_request(move |_| {
                let attempt = polls_seen.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 {
                    br#"{"status":"PENDING_APPROVAL"}"#.to_vec()
                } else {
                    done_body.clone().into_bytes()
                }
            })
            .expect_at_least(4)
            .create_async()
            .await;

        let endpoint = Url::parse(&server.url()).unwrap();
        let client = KmsClient::new(&endpoint, Credentials::new("ak", "sk")).unwrap();

        // Drive the task flow directly with a short interval so the
        // test does not sit through the 5 s production default.
        let task = client
            .wait_for_task_completion("t-1", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(polls.load(Ordering::SeqCst), 4);

        let signature = signature_from_task("t-1", &task).unwrap();
        assert_eq!(signature[64], 0x01);
    }

    #[tokio::test]
    async fn test_task_failure_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/tasks/t-2")
            .with_status(200)
            .with_body(r#"{"status":"FAILED","msg":"hsm offline"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .wait_for_task_completion("t-2", Duration::from_millis(5))
            .await
            .unwrap_err();
        match err {
            KmsError::TaskFailed { task_id, reason } => {
                assert_eq!(task_id, "t-2");
                assert_eq!(reason, "hsm offline");
            }
            other => panic!("expected TaskFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_task_rejection_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/tasks/t-3")
            .with_status(200)
            .with_body(r#"{"status":"REJECTED","msg":"operator declined"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .wait_for_task_completion("t-3", Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, KmsError::TaskRejected { .. }));
    }

    #[tokio::test]
    async fn test_unknown_task_status_is_a_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/tasks/t-4")
            .with_status(200)
            .with_body(r#"{"status":"ARCHIVED"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .wait_for_task_completion("t-4", Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, KmsError::UnexpectedTaskStatus { .. }));
    }

    #[test]
    fn test_signature_from_task_accepts_bare_hex() {
        let task = Task {
            status: TaskStatus::Done,
            response: Some(signature_hex(0)),
            msg: None,
        };
        let signature = signature_from_task("t", &task).unwrap();
        assert_eq!(signature.len(), 65);
    }

    #[test]
    fn test_signature_from_task_requires_payload() {
        let task = Task {
            status: TaskStatus::Done,
            response: None,
            msg: None,
        };
        assert!(matches!(
            signature_from_task("t", &task),
            Err(KmsError::MissingTaskResult { .. })
        ));
    }

    #[test]
    fn test_decode_signature_accepts_0x_prefix() {
        let with_prefix = format!("0x{}", signature_hex(1));
        assert!(decode_signature(&with_prefix).is_ok());
    }
}
