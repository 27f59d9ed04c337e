//! JSON-RPC 2.0 envelope types and the batch codec.
//!
//! The gateway accepts either a single request object or a `[`-prefixed
//! batch on the same endpoint. Parsing keeps `params` as raw JSON so a
//! handler only pays for decoding the methods it intercepts; everything
//! else is re-encoded verbatim for the downstream node.
//!
//! Invalid batch elements do not poison the batch: each one yields its
//! own error response (with a `null` id when the id itself was
//! unreadable) while valid elements proceed independently.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;

/// The only protocol version this codec accepts.
pub const VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Inclusive bounds of the implementation-defined server error range.
pub const SERVER_ERROR_MIN: i64 = -32099;
pub const SERVER_ERROR_MAX: i64 = -32000;

/// A request identifier: `null`, a string, or a number.
///
/// The id is echoed back by value *and* type, so numbers are kept as
/// [`serde_json::Number`] instead of being coerced.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestId {
    Null,
    Number(serde_json::Number),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Null => write!(f, "null"),
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(RequestId::Null),
            serde_json::Value::Number(n) => Ok(RequestId::Number(n)),
            serde_json::Value::String(s) => Ok(RequestId::String(s)),
            other => Err(D::Error::custom(format!(
                "id must be a string, a number or null, got {other}"
            ))),
        }
    }
}

impl Serialize for RequestId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            RequestId::Null => serializer.serialize_unit(),
            RequestId::Number(n) => n.serialize(serializer),
            RequestId::String(s) => serializer.serialize_str(s),
        }
    }
}

/// A single JSON-RPC request element.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Box<RawValue>>,
    #[serde(default)]
    pub id: Option<RequestId>,
}

impl RpcRequest {
    /// Checks the envelope invariants: version literal and non-empty method.
    pub fn validate(&self) -> Result<(), ErrorObject> {
        if self.jsonrpc != VERSION {
            return Err(ErrorObject::invalid_request(format!(
                "unsupported JSON-RPC version {:?}",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(ErrorObject::invalid_request("method must not be empty"));
        }
        Ok(())
    }

    /// A notification carries no id (or an explicit `null`) and never
    /// produces a response.
    pub fn is_notification(&self) -> bool {
        matches!(self.id, None | Some(RequestId::Null))
    }

    /// The id to echo on the response, `null` when absent.
    pub fn response_id(&self) -> RequestId {
        self.id.clone().unwrap_or(RequestId::Null)
    }
}

/// The `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorObject {
    fn new(code: i64, message: impl Into<String>) -> Self {
        ErrorObject {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl fmt::Display) -> Self {
        Self::new(PARSE_ERROR, format!("parse error: {detail}"))
    }

    pub fn invalid_request(detail: impl fmt::Display) -> Self {
        Self::new(INVALID_REQUEST, format!("invalid request: {detail}"))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method {method} not found"))
    }

    pub fn invalid_params(detail: impl fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("invalid params: {detail}"))
    }

    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, detail.to_string())
    }

    /// Builds an implementation-defined server error. Codes outside
    /// `[-32099, -32000]` fall back to an internal error so reserved
    /// codes can never be forged by upstream payloads.
    pub fn server(code: i64, message: impl Into<String>) -> Self {
        if (SERVER_ERROR_MIN..=SERVER_ERROR_MAX).contains(&code) {
            Self::new(code, message)
        } else {
            Self::new(INTERNAL_ERROR, message)
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A single JSON-RPC response element. Exactly one of `result`/`error`
/// is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl RpcResponse {
    pub fn ok(id: RequestId, result: serde_json::Value) -> Self {
        RpcResponse {
            jsonrpc: VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: RequestId, error: ErrorObject) -> Self {
        RpcResponse {
            jsonrpc: VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Best-effort id extraction from an element that failed to decode as a
/// request, so the error response can still echo it.
#[derive(Deserialize)]
struct IdProbe {
    #[serde(default)]
    id: Option<RequestId>,
}

fn probe_id(raw: &RawValue) -> RequestId {
    serde_json::from_str::<IdProbe>(raw.get())
        .ok()
        .and_then(|p| p.id)
        .unwrap_or(RequestId::Null)
}

fn element_error(err: &serde_json::Error) -> ErrorObject {
    match err.classify() {
        serde_json::error::Category::Data => ErrorObject::invalid_request(err),
        _ => ErrorObject::parse_error(err),
    }
}

/// The parsed form of one ingress body: a single call or a batch, with
/// per-element outcomes.
#[derive(Debug)]
pub struct RpcCalls {
    items: Vec<Result<RpcRequest, RpcResponse>>,
    batch: bool,
}

impl RpcCalls {
    /// Parses a request body. A leading `[` selects batch mode; an empty
    /// batch is rejected outright. Elements that fail to decode or
    /// validate are carried as ready-made error responses.
    pub fn parse(body: &[u8]) -> Result<Self, ErrorObject> {
        let first = body
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .ok_or_else(|| ErrorObject::parse_error("empty body"))?;

        if *first == b'[' {
            let elements: Vec<&RawValue> = serde_json::from_slice(body)
                .map_err(|e| ErrorObject::parse_error(e))?;
            if elements.is_empty() {
                return Err(ErrorObject::invalid_request("empty batch"));
            }
            let items = elements.into_iter().map(Self::parse_element).collect();
            Ok(RpcCalls { items, batch: true })
        } else {
            let element: &RawValue =
                serde_json::from_slice(body).map_err(|e| ErrorObject::parse_error(e))?;
            let items = vec![Self::parse_element(element)];
            Ok(RpcCalls {
                items,
                batch: false,
            })
        }
    }

    fn parse_element(raw: &RawValue) -> Result<RpcRequest, RpcResponse> {
        match serde_json::from_str::<RpcRequest>(raw.get()) {
            Ok(request) => match request.validate() {
                Ok(()) => Ok(request),
                Err(error) => Err(RpcResponse::err(request.response_id(), error)),
            },
            Err(err) => Err(RpcResponse::err(probe_id(raw), element_error(&err))),
        }
    }

    pub fn is_batch(&self) -> bool {
        self.batch
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<Result<RpcRequest, RpcResponse>> {
        self.items
    }

    /// Marshals responses back into a body. A batch always yields an
    /// array, even with one element; a single call yields a bare object.
    /// `None` means nothing to send (all elements were notifications).
    pub fn into_body(
        responses: Vec<RpcResponse>,
        batch: bool,
    ) -> Result<Option<String>, serde_json::Error> {
        if batch {
            if responses.is_empty() {
                Ok(None)
            } else {
                serde_json::to_string(&responses).map(Some)
            }
        } else {
            responses
                .into_iter()
                .next()
                .map(|r| serde_json::to_string(&r))
                .transpose()
        }
    }
}
