//! Client for the downstream Ethereum execution node.
//!
//! Passthrough traffic is re-encoded (never relayed as raw client
//! bytes, so normalization from the codec sticks) and POSTed with
//! `Content-Type: application/json`. The upstream's `result`/`error`
//! lands in the outgoing response under the client's original id.

use alloy_primitives::U256;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::time::Duration;
use url::Url;
use web3gate_types::jsonrpc::VERSION;
use web3gate_types::{ErrorObject, RequestId, RpcRequest, RpcResponse};

/// Errors talking to the downstream node. Transport problems surface to
/// clients as `-32000 "downstream unavailable"`; RPC-level errors are
/// echoed as-is.
#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    #[error("downstream transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("downstream error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("downstream returned a malformed chain id: {0}")]
    InvalidChainId(String),
}

/// Outbound envelope; `params` stays raw so forwarded calls keep their
/// exact parameter bytes.
#[derive(Serialize)]
struct OutboundRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a RawValue>,
    id: &'a RequestId,
}

#[derive(Debug, Clone)]
pub struct DownstreamClient {
    http: reqwest::Client,
    url: Url,
}

impl DownstreamClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, DownstreamError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(DownstreamClient { http, url })
    }

    /// Forwards one passthrough element and wraps the answer into a
    /// response for the client. Never fails: transport problems become
    /// JSON-RPC errors with the request id preserved.
    pub async fn forward(&self, request: &RpcRequest) -> RpcResponse {
        let id = request.response_id();
        let outbound = OutboundRequest {
            jsonrpc: VERSION,
            method: &request.method,
            params: request.params.as_deref(),
            id: &id,
        };
        match self.post(&outbound).await {
            Ok(body) => wrap_upstream_body(id, body),
            Err(error) => {
                tracing::warn!(method = %request.method, %error, "downstream call failed");
                RpcResponse::err(
                    id,
                    ErrorObject::server(-32000, "downstream unavailable")
                        .with_data(Value::String(error.to_string())),
                )
            }
        }
    }

    /// Issues one internal call (gateway-originated, not client
    /// traffic) and returns the bare `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, DownstreamError> {
        let body = serde_json::json!({
            "jsonrpc": VERSION,
            "method": method,
            "params": params,
            "id": 1,
        });
        let answer = self.post(&body).await?;
        if let Some(error) = answer.get("error").filter(|e| !e.is_null()) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown downstream error")
                .to_string();
            return Err(DownstreamError::Rpc { code, message });
        }
        Ok(answer.get("result").cloned().unwrap_or(Value::Null))
    }

    /// One-shot `eth_chainId` probe run at startup; the result pins the
    /// chain id used for every signature. Startup aborts on failure —
    /// signing without a known chain id would be replay-unsafe.
    pub async fn chain_id(&self) -> Result<U256, DownstreamError> {
        let result = self.call("eth_chainId", Value::Array(Vec::new())).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| DownstreamError::InvalidChainId(result.to_string()))?;
        let digits = raw
            .strip_prefix("0x")
            .ok_or_else(|| DownstreamError::InvalidChainId(raw.to_string()))?;
        U256::from_str_radix(digits, 16)
            .map_err(|_| DownstreamError::InvalidChainId(raw.to_string()))
    }

    async fn post<T: Serialize>(&self, body: &T) -> Result<Value, DownstreamError> {
        let response = self
            .http
            .post(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        Ok(response.json().await?)
    }
}

/// Splits an upstream response body into the outgoing `result`/`error`.
fn wrap_upstream_body(id: RequestId, body: Value) -> RpcResponse {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let error = serde_json::from_value::<ErrorObject>(error.clone()).unwrap_or_else(|_| {
            ErrorObject::server(-32000, "downstream returned a malformed error")
        });
        return RpcResponse::err(id, error);
    }
    RpcResponse::ok(id, body.get("result").cloned().unwrap_or(Value::Null))
}
