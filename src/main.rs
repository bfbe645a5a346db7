// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use user_service::{
    api::router,
    auth::{HttpKeyFetcher, KeySetCache, TokenVerifier},
    config::{ServiceConfig, DEFAULT_LOG_FILTER, LOG_FORMAT_ENV},
    key_refresher::KeyRefresher,
    state::AppState,
    storage::Database,
};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let db = match Database::open(&config.database_path()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!(error = %e, path = %config.database_path().display(), "Failed to open database");
            return ExitCode::FAILURE;
        }
    };

    let fetcher = match HttpKeyFetcher::new(config.jwks_url.clone(), config.jwks_fetch_timeout) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!(error = %e, "Failed to build key set client");
            return ExitCode::FAILURE;
        }
    };
    let keys = Arc::new(
        KeySetCache::new(Arc::new(fetcher))
            .with_ttl(config.jwks_cache_ttl)
            .with_fetch_timeout(config.jwks_fetch_timeout),
    );
    let verifier = TokenVerifier::new(keys.clone(), config.verification_policy());

    let shutdown = CancellationToken::new();
    let refresher = tokio::spawn(
        KeyRefresher::new(keys, config.jwks_cache_ttl).run(shutdown.clone()),
    );

    let state = AppState::new(db, verifier, config.store_timeout);
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %config.bind_addr, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(
        addr = %config.bind_addr,
        jwks_url = %config.jwks_url,
        issuer = %config.issuer,
        "User service listening (docs at /docs)"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Err(e) = refresher.await {
        error!(error = %e, "Key set refresher task failed");
    }

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
