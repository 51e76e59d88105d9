// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # JWKS Refresher
//!
//! Background task that re-fetches the key set on a fixed interval so request
//! handling rarely meets a stale cache. Failures are logged and the cached set
//! stays in use; the next tick retries.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, like the server's own shutdown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::jwks::JwksManager;

/// Periodically refreshes a [`JwksManager`].
pub struct JwksRefresher {
    jwks: JwksManager,
    interval: Duration,
}

impl JwksRefresher {
    pub fn new(jwks: JwksManager, interval: Duration) -> Self {
        Self { jwks, interval }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            jwks_url = %self.jwks.jwks_url(),
            "JWKS refresher starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("JWKS refresher shutting down");
                    return;
                }
            }

            match self.jwks.refresh().await {
                Ok(()) => debug!("Scheduled JWKS refresh complete"),
                Err(e) => warn!(error = %e, "Scheduled JWKS refresh failed, keeping cached keys"),
            }
        }
    }
}
