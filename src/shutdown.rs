//! Signal-driven shutdown.
//!
//! Shutdown is expressed as a `CancellationToken` cancelled by an arbitrary
//! trigger future. Production wires the token to [`signal_received`]; tests
//! wire it to whatever completion they control.

use std::future::Future;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Resolves once the process receives SIGTERM or SIGINT.
pub async fn signal_received() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
    }
}

/// Returns a token that is cancelled when `trigger` resolves.
pub fn token_on<F>(trigger: F) -> CancellationToken
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        trigger.await;
        cancel.cancel();
    });
    token
}
