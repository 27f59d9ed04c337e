//! Gateway bootstrap.
//!
//! Order matters here: configuration and logging first, then the
//! one-shot `eth_chainId` probe against the downstream node. Only when
//! the chain id is pinned does the KMS-backed signer get built and the
//! listener opened — signing with an unknown chain id would produce
//! replay-unsafe signatures, so a failed probe aborts startup.

use axum::http::Method;
use axum::Router;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use web3gate_kms::{Credentials, KmsClient};
use web3gate_signer::{KeyRegistry, KmsSigner, Signer};

use crate::config::Config;
use crate::downstream::DownstreamClient;
use crate::logging;
use crate::rpc::{self, AppState};
use crate::shutdown::Shutdown;

/// Builds the HTTP application: the JSON-RPC routes plus request
/// tracing and a permissive CORS layer.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(rpc::routes().with_state(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
                .allow_headers(cors::Any),
        )
}

/// Builds the key registry from configuration: the configured key id
/// becomes the default entry, additional keys register alongside it.
/// All entries share one KMS client and the pinned chain id.
pub fn build_registry(
    config: &Config,
    kms_client: Arc<KmsClient>,
    chain_id: alloy_primitives::U256,
) -> Result<KeyRegistry, Box<dyn std::error::Error>> {
    let default_signer = Signer::Kms(KmsSigner::new(
        kms_client.clone(),
        &config.kms.key_id,
        config.kms.signer_address()?,
        chain_id,
    ));
    let registry = KeyRegistry::new(&config.kms.key_id, default_signer)?;
    for key in &config.kms.additional_keys {
        let signer = Signer::Kms(KmsSigner::new(
            kms_client.clone(),
            &key.key_id,
            key.signer_address()?,
            chain_id,
        ));
        registry.add(&key.key_id, signer)?;
        tracing::info!(key_id = %key.key_id, address = %key.address, "registered signing key");
    }
    Ok(registry)
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables before anything reads the environment.
    dotenv().ok();

    let config = Config::load()?;
    logging::init(&config.log);

    let downstream_url = config.downstream.url()?;
    let downstream = DownstreamClient::new(
        downstream_url.clone(),
        config.downstream.request_timeout(),
    )?;

    let chain_id = downstream.chain_id().await?;
    tracing::info!(%chain_id, downstream = %downstream_url, "pinned chain id from downstream node");

    let kms_client = Arc::new(KmsClient::new(
        &config.kms.endpoint,
        Credentials::new(&config.kms.access_key_id, &config.kms.secret_key),
    )?);
    let registry = build_registry(&config, kms_client, chain_id)?;
    tracing::info!(
        key_id = %config.kms.key_id,
        address = %registry.address(),
        "registered default signing key"
    );

    let state = Arc::new(AppState {
        registry: Arc::new(registry),
        downstream,
    });
    let app = app(state);

    let addr = SocketAddr::new(config.http.host, config.http.port);
    tracing::info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("failed to bind to {addr}: {e}"))?;

    let shutdown = Shutdown::try_new()?;
    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    Ok(())
}
