//! Client for the MPC key-management service (MPC-KMS).
//!
//! The KMS holds the ECDSA key shares; this crate only ever sends it a
//! 32-byte digest and gets back a joint 65-byte `r‖s‖v` signature. Two
//! flows exist on the wire:
//!
//! - **synchronous**: `POST .../keys/{key_id}/sign` answers `200` with
//!   the signature inline;
//! - **asynchronous**: the same call answers `201` with a task id when
//!   human approval is required, and the client polls
//!   `GET .../tasks/{task_id}` until the task reaches a terminal state.
//!
//! Every request is authenticated with an HMAC-SHA256 over a canonical
//! string of the method, body digest, content type and date — see
//! [`auth`]. This authenticates the caller; transport privacy is still
//! TLS's job.

pub mod auth;
mod client;
mod error;
pub mod types;

pub use auth::Credentials;
pub use client::{KmsClient, DEFAULT_POLL_INTERVAL, TASK_WAIT_DEADLINE};
pub use error::KmsError;
pub use types::{DataEncoding, SignRequest, SignResponse, Task, TaskCreated, TaskStatus};
