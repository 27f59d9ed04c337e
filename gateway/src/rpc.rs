//! JSON-RPC endpoint: routing between the signer and the downstream node.
//!
//! Four methods need key material and are served locally:
//! `eth_accounts`, `eth_sign`, `eth_signTransaction` and
//! `eth_sendTransaction`. Everything else is forwarded verbatim.
//! Batches are routed element-wise; the response array preserves the
//! element order of the batch.

use alloy_primitives::B256;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{body::Bytes, Json, Router};
use serde_json::value::RawValue;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;
use web3gate_kms::KmsError;
use web3gate_signer::{KeyRegistry, SignerError};
use web3gate_types::decode::{decode_sign_params, decode_transaction};
use web3gate_types::{
    ErrorObject, RequestId, RpcCalls, RpcRequest, RpcResponse, SignedTransaction, TransferSummary,
};

use crate::downstream::{DownstreamClient, DownstreamError};

/// Shared per-process state: the key registry and the downstream client.
pub struct AppState {
    pub registry: Arc<KeyRegistry>,
    pub downstream: DownstreamClient,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(post_rpc))
        .route("/health", get(get_health))
        .route("/ready", get(get_ready))
}

/// `POST /`: the JSON-RPC 2.0 endpoint.
#[instrument(skip_all, fields(correlation_id = %uuid::Uuid::now_v7()))]
async fn post_rpc(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    match handle_rpc_body(&state, &body).await {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        // All elements were notifications: nothing to send back.
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `GET /health`: liveness, outside any auth middleware.
#[instrument(skip_all)]
async fn get_health() -> impl IntoResponse {
    Json(json!({"status": "ok", "time": chrono::Utc::now().to_rfc3339()}))
}

/// `GET /ready`: readiness; the gateway only serves after the chain-id
/// probe succeeded, so reachable means ready.
#[instrument(skip_all)]
async fn get_ready() -> impl IntoResponse {
    Json(json!({"status": "ready", "time": chrono::Utc::now().to_rfc3339()}))
}

/// Parses one request body, routes every element and marshals the
/// responses. `None` means no response body is owed.
pub(crate) async fn handle_rpc_body(state: &AppState, body: &[u8]) -> Option<String> {
    let calls = match RpcCalls::parse(body) {
        Ok(calls) => calls,
        Err(error) => {
            return serde_json::to_string(&RpcResponse::err(RequestId::Null, error)).ok();
        }
    };
    let batch = calls.is_batch();
    let mut responses = Vec::with_capacity(calls.len());
    for item in calls.into_items() {
        match item {
            Ok(request) => {
                let notification = request.is_notification();
                let response = route(state, request).await;
                if !notification {
                    responses.push(response);
                }
            }
            Err(ready_error) => responses.push(ready_error),
        }
    }
    match RpcCalls::into_body(responses, batch) {
        Ok(body) => body,
        Err(error) => {
            tracing::error!(%error, "failed to marshal responses");
            serde_json::to_string(&RpcResponse::err(
                RequestId::Null,
                ErrorObject::internal("failed to marshal responses"),
            ))
            .ok()
        }
    }
}

async fn route(state: &AppState, request: RpcRequest) -> RpcResponse {
    let id = request.response_id();
    tracing::debug!(method = %request.method, "routing rpc call");
    let result = match request.method.as_str() {
        "eth_accounts" => eth_accounts(state),
        "eth_sign" => eth_sign(state, request.params.as_deref()).await,
        "eth_signTransaction" => eth_sign_transaction(state, request.params.as_deref()).await,
        "eth_sendTransaction" => eth_send_transaction(state, request.params.as_deref()).await,
        _ => return state.downstream.forward(&request).await,
    };
    match result {
        Ok(value) => RpcResponse::ok(id, value),
        Err(error) => RpcResponse::err(id, error),
    }
}

/// `eth_accounts`: the address of the default signing key.
fn eth_accounts(state: &AppState) -> Result<Value, ErrorObject> {
    Ok(json!([hex_address(state.registry.address())]))
}

/// `eth_sign`: signs exactly 32 bytes of data with the default key.
/// Any other payload length is rejected; the gateway never signs
/// arbitrary-length messages.
async fn eth_sign(state: &AppState, params: Option<&RawValue>) -> Result<Value, ErrorObject> {
    let params = require_params(params)?;
    let (address, data) = decode_sign_params(params).map_err(ErrorObject::invalid_params)?;
    if data.len() != 32 {
        return Err(ErrorObject::invalid_params(format!(
            "data must be exactly 32 bytes, got {}",
            data.len()
        )));
    }
    if !state.registry.addresses().contains(&address) {
        return Err(ErrorObject::invalid_params(format!(
            "address {} is not managed by this gateway",
            hex_address(address)
        )));
    }
    let digest = B256::from_slice(&data);
    let signature = state.registry.sign(digest).await.map_err(signer_error)?;
    Ok(json!(format!("0x{}", hex::encode(signature))))
}

/// `eth_signTransaction`: returns the raw RLP plus the echoed fields.
async fn eth_sign_transaction(
    state: &AppState,
    params: Option<&RawValue>,
) -> Result<Value, ErrorObject> {
    let signed = sign_from_params(state, params).await?;
    Ok(json!({
        "raw": format!("0x{}", hex::encode(signed.raw())),
        "tx": signed.to_rpc_object(),
    }))
}

/// `eth_sendTransaction`: sign, then submit the raw bytes downstream
/// via `eth_sendRawTransaction` and return its result (the tx hash).
async fn eth_send_transaction(
    state: &AppState,
    params: Option<&RawValue>,
) -> Result<Value, ErrorObject> {
    let signed = sign_from_params(state, params).await?;
    let raw = format!("0x{}", hex::encode(signed.raw()));
    state
        .downstream
        .call("eth_sendRawTransaction", json!([raw]))
        .await
        .map_err(downstream_error)
}

async fn sign_from_params(
    state: &AppState,
    params: Option<&RawValue>,
) -> Result<SignedTransaction, ErrorObject> {
    let params = require_params(params)?;
    let tx = decode_transaction(params).map_err(ErrorObject::invalid_params)?;

    // The summary mirrors what will be signed: same signer address,
    // display-only either way.
    let mut annotated = tx.clone();
    annotated.set_from(state.registry.address());
    let summary = TransferSummary::for_transaction(&annotated, None);

    state
        .registry
        .default_signer()
        .sign_transaction_with_summary(&tx, Some(summary))
        .await
        .map_err(signer_error)
}

fn require_params(params: Option<&RawValue>) -> Result<&RawValue, ErrorObject> {
    params.ok_or_else(|| ErrorObject::invalid_params("missing params"))
}

fn hex_address(address: alloy_primitives::Address) -> String {
    format!("0x{}", hex::encode(address))
}

fn signer_error(error: SignerError) -> ErrorObject {
    match error {
        SignerError::Kms(KmsError::Api { code, message }) => {
            ErrorObject::server(-32000, "kms signing failed")
                .with_data(json!({"code": code, "message": message}))
        }
        SignerError::Kms(kms) => ErrorObject::server(-32000, kms.to_string()),
        SignerError::RecoveryId(_) => ErrorObject::server(-32000, error.to_string()),
        other => ErrorObject::internal(other),
    }
}

fn downstream_error(error: DownstreamError) -> ErrorObject {
    match error {
        DownstreamError::Rpc { code, message } => ErrorObject {
            code,
            message,
            data: None,
        },
        other => ErrorObject::server(-32000, "downstream unavailable")
            .with_data(Value::String(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use std::time::Duration;
    use url::Url;
    use web3gate_signer::{LocalSigner, Signer};

    const KEY_ID: &str = "key-1";

    fn state_with_downstream(server: &mockito::ServerGuard) -> AppState {
        let signer = Signer::Local(LocalSigner::random(U256::from(1u64)));
        let registry = KeyRegistry::new(KEY_ID, signer).unwrap();
        let downstream = DownstreamClient::new(
            Url::parse(&server.url()).unwrap(),
            Duration::from_secs(2),
        )
        .unwrap();
        AppState {
            registry: Arc::new(registry),
            downstream,
        }
    }

    async fn call(state: &AppState, body: Value) -> Value {
        let body = handle_rpc_body(state, body.to_string().as_bytes())
            .await
            .expect("expected a response body");
        serde_json::from_str(&body).unwrap()
    }

    #[tokio::test]
    async fn test_eth_accounts_returns_signer_address() {
        let server = mockito::Server::new_async().await;
        let state = state_with_downstream(&server);
        let response = call(
            &state,
            json!({"jsonrpc": "2.0", "method": "eth_accounts", "id": 1}),
        )
        .await;
        let expected = hex_address(state.registry.address());
        assert_eq!(response["result"], json!([expected]));
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn test_eth_sign_rejects_short_data() {
        let server = mockito::Server::new_async().await;
        let state = state_with_downstream(&server);
        let address = hex_address(state.registry.address());
        let response = call(
            &state,
            json!({
                "jsonrpc": "2.0",
                "method": "eth_sign",
                "params": [address, "0xdeadbeef"],
                "id": 2,
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["id"], 2);
    }

    #[tokio::test]
    async fn test_eth_sign_accepts_32_byte_digest() {
        let server = mockito::Server::new_async().await;
        let state = state_with_downstream(&server);
        let address = hex_address(state.registry.address());
        let digest = format!("0x{}", hex::encode([0x42u8; 32]));
        let response = call(
            &state,
            json!({
                "jsonrpc": "2.0",
                "method": "eth_sign",
                "params": [address, digest],
                "id": 3,
            }),
        )
        .await;
        let signature = response["result"].as_str().unwrap();
        // 0x + 65 bytes.
        assert_eq!(signature.len(), 2 + 130);
    }

    #[tokio::test]
    async fn test_eth_sign_rejects_foreign_address() {
        let server = mockito::Server::new_async().await;
        let state = state_with_downstream(&server);
        let digest = format!("0x{}", hex::encode([0x42u8; 32]));
        let response = call(
            &state,
            json!({
                "jsonrpc": "2.0",
                "method": "eth_sign",
                "params": ["0x1111111111111111111111111111111111111111", digest],
                "id": 4,
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_passthrough_preserves_id_and_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":7,"result":"0x10"}"#)
            .create_async()
            .await;
        let state = state_with_downstream(&server);
        let response = call(
            &state,
            json!({"jsonrpc": "2.0", "method": "eth_blockNumber", "id": 7}),
        )
        .await;
        assert_eq!(response["result"], "0x10");
        assert_eq!(response["id"], 7);
    }

    #[tokio::test]
    async fn test_eth_sign_transaction_returns_raw_and_tx() {
        let server = mockito::Server::new_async().await;
        let state = state_with_downstream(&server);
        let response = call(
            &state,
            json!({
                "jsonrpc": "2.0",
                "method": "eth_signTransaction",
                "params": [{
                    "to": "0x0987654321098765432109876543210987654321",
                    "gas": "0x5208",
                    "gasPrice": "0x4a817c800",
                    "value": "0xde0b6b3a7640000",
                    "nonce": "0x5",
                }],
                "id": 5,
            }),
        )
        .await;
        let raw = response["result"]["raw"].as_str().unwrap();
        assert!(raw.starts_with("0x"));
        let tx = &response["result"]["tx"];
        assert_eq!(tx["nonce"], "0x5");
        assert_eq!(tx["from"], hex_address(state.registry.address()));
        assert!(tx["r"].as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_eth_send_transaction_submits_raw_downstream() {
        let mut server = mockito::Server::new_async().await;
        let tx_hash = format!("0x{}", hex::encode([0xaau8; 32]));
        server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "eth_sendRawTransaction",
            })))
            .with_status(200)
            .with_body(format!(
                r#"{{"jsonrpc":"2.0","id":1,"result":"{tx_hash}"}}"#
            ))
            .create_async()
            .await;
        let state = state_with_downstream(&server);
        let response = call(
            &state,
            json!({
                "jsonrpc": "2.0",
                "method": "eth_sendTransaction",
                "params": [{
                    "to": "0x0987654321098765432109876543210987654321",
                    "gas": "0x5208",
                }],
                "id": 6,
            }),
        )
        .await;
        assert_eq!(response["result"], tx_hash);
    }

    #[tokio::test]
    async fn test_batch_mixed_outcomes_preserve_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .create_async()
            .await;
        let state = state_with_downstream(&server);
        let address = hex_address(state.registry.address());
        let body = handle_rpc_body(
            &state,
            json!([
                {"jsonrpc": "2.0", "method": "eth_blockNumber", "id": 1},
                {"jsonrpc": "2.0", "method": "eth_sign", "params": [address, "0xdead"], "id": 2},
            ])
            .to_string()
            .as_bytes(),
        )
        .await
        .unwrap();
        let responses: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"], "0x10");
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_notification_produces_no_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":null,"result":"0x10"}"#)
            .create_async()
            .await;
        let state = state_with_downstream(&server);
        let body = handle_rpc_body(
            &state,
            br#"{"jsonrpc":"2.0","method":"eth_blockNumber"}"#,
        )
        .await;
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_parse_error_yields_null_id_response() {
        let server = mockito::Server::new_async().await;
        let state = state_with_downstream(&server);
        let body = handle_rpc_body(&state, b"{oops").await.unwrap();
        let response: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_missing_params_on_intercepted_method() {
        let server = mockito::Server::new_async().await;
        let state = state_with_downstream(&server);
        let response = call(
            &state,
            json!({"jsonrpc": "2.0", "method": "eth_signTransaction", "id": 9}),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_single_request_marshals_as_object_batch_as_array() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .expect_at_least(2)
            .create_async()
            .await;
        let state = state_with_downstream(&server);

        let single = handle_rpc_body(
            &state,
            br#"{"jsonrpc":"2.0","method":"eth_blockNumber","id":1}"#,
        )
        .await
        .unwrap();
        assert!(single.starts_with('{'));

        let batch = handle_rpc_body(
            &state,
            br#"[{"jsonrpc":"2.0","method":"eth_blockNumber","id":1}]"#,
        )
        .await
        .unwrap();
        assert!(batch.starts_with('['));
    }
}
