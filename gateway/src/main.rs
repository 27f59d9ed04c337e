//! web3gate HTTP entrypoint.
//!
//! Endpoints:
//! - `POST /` – JSON-RPC 2.0 endpoint (single requests and batches)
//! - `GET /health`, `GET /ready` – liveness probes outside any auth
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` selects the JSON configuration file
//! - `HOST`, `PORT` override the listener binding

use std::process;

use web3gate_gateway::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        process::exit(1)
    }
}
