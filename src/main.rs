// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{process::ExitCode, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use clientco_api::{
    api::router,
    auth::{JwksRefresher, TokenVerifier},
    config::{AuthSettings, ServerSettings},
    logging,
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        return ExitCode::FAILURE;
    }

    let server = match ServerSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid server configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(server.log_format);

    let auth = match AuthSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid auth configuration");
            return ExitCode::FAILURE;
        }
    };

    let jwks = match auth.jwks_manager() {
        Ok(jwks) => jwks,
        Err(e) => {
            error!(error = %e, "Failed to build JWKS client");
            return ExitCode::FAILURE;
        }
    };

    // Warm the cache; requests retry on miss if the tenant is unreachable now.
    if let Err(e) = jwks.refresh().await {
        warn!(error = %e, jwks_url = %jwks.jwks_url(), "Initial JWKS fetch failed");
    }

    let shutdown = CancellationToken::new();
    if let Some(interval) = auth.refresh_interval {
        tokio::spawn(JwksRefresher::new(jwks.clone(), interval).run(shutdown.clone()));
    }

    let verifier = TokenVerifier::new(jwks, auth.verifier_config());
    let app = router(AppState::new(verifier));

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone(), shutdown.clone()));

    info!(
        issuer = %auth.issuer,
        audience = %auth.audience,
        "ClientCo API listening on {}://{} (docs at /docs)",
        if server.tls.is_some() { "https" } else { "http" },
        server.bind
    );

    let result = match &server.tls {
        Some(tls) => match RustlsConfig::from_pem_file(&tls.cert, &tls.key).await {
            Ok(config) => {
                axum_server::bind_rustls(server.bind, config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
            }
            Err(e) => {
                error!(error = %e, cert = %tls.cert.display(), "Failed to load TLS certificate");
                return ExitCode::FAILURE;
            }
        },
        None => {
            axum_server::bind(server.bind)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };

    shutdown.cancel();

    match result {
        Ok(()) => {
            info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_on_signal(handle: Handle<std::net::SocketAddr>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
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
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
