//! Transaction signing for the web3gate gateway.
//!
//! A [`Signer`] turns an unsigned [`TypedTransaction`](web3gate_types::TypedTransaction)
//! into a signed one. The production variant delegates the raw digest
//! signature to the remote MPC-KMS; a local in-process variant backs
//! tests and development setups. Both produce the same 65-byte
//! `r‖s‖v` material, which this crate folds onto the transaction with
//! the correct EIP-155 arithmetic.
//!
//! [`KeyRegistry`] holds one signer per KMS key id behind a
//! readers-writer lock, with a designated default key that cannot be
//! removed.

mod error;
mod registry;
mod signer;

pub use error::SignerError;
pub use registry::KeyRegistry;
pub use signer::{KmsSigner, LocalSigner, Signer};
