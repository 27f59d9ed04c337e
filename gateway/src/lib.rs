//! web3gate — an Ethereum JSON-RPC signing gateway.
//!
//! The gateway sits between JSON-RPC clients and an execution node. It
//! serves the handful of methods that need a private key by signing
//! through a remote MPC key-management service (`eth_accounts`,
//! `eth_sign`, `eth_signTransaction`, `eth_sendTransaction`) and
//! forwards every other method unchanged downstream.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Configuration types, loading and validation |
//! | [`downstream`] | Client for the downstream execution node |
//! | [`logging`] | Tracing subscriber setup |
//! | [`rpc`] | JSON-RPC endpoint and method routing |
//! | [`run`] | Server initialization and runtime |
//! | [`shutdown`] | SIGTERM/SIGINT handling |
//!
//! # Running the Server
//!
//! ```bash
//! # Run with the default ./config.json
//! cargo run --package web3gate-gateway
//!
//! # Run with a custom config
//! cargo run --package web3gate-gateway -- --config /path/to/config.json
//! ```

pub mod config;
pub mod downstream;
pub mod logging;
pub mod rpc;
pub mod run;
pub mod shutdown;

pub use run::run;
