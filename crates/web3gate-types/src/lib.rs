//! Shared protocol types for the web3gate signing gateway.
//!
//! This crate defines the two wire surfaces the gateway speaks:
//!
//! - [`jsonrpc`] — the JSON-RPC 2.0 envelope (single and batched calls),
//!   the response/error taxonomy, and the batch codec used by the HTTP
//!   front plane.
//! - [`transaction`] — the Ethereum typed-transaction model (Legacy,
//!   EIP-2930, EIP-1559) together with the RLP signing payloads and the
//!   raw encoding of a signed transaction.
//!
//! The [`decode`] module turns JSON-RPC transaction parameter objects
//! into typed transactions, and [`summary`] carries the human-readable
//! transfer description shown in the key-management approval UI.

pub mod decode;
pub mod jsonrpc;
pub mod summary;
pub mod transaction;

pub use jsonrpc::{ErrorObject, RequestId, RpcCalls, RpcRequest, RpcResponse};
pub use summary::TransferSummary;
pub use transaction::{AccessList, AccessListEntry, SignedTransaction, TxSignature, TypedTransaction};
