//! The connection run loop: inbound dispatch plus automatic reconnection.
//!
//! Spawned once per started connection. Dispatches inbound frames until
//! the link dies, then retries the dial indefinitely with the connection's
//! retry policy until the epoch is torn down. The lifecycle manager is a
//! passive observer; it learns about reconnect cycles only through the
//! transition hooks fired here.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::connection::HubConnection;
use crate::transport::Link;

/// Services one connection until it is stopped.
pub(crate) async fn run_loop(conn: Arc<HubConnection>, mut link: Link) {
    loop {
        let lost = dispatch_until_lost(&conn, &mut link).await;
        link.cancel.cancel();
        if !lost {
            // stop() requested teardown and already walked the state down.
            return;
        }

        debug!("link lost, entering reconnect");
        conn.clear_link().await;
        conn.fail_inflight().await;

        let new_link = match reconnect(&conn).await {
            Some(l) => l,
            None => return,
        };
        if !conn.install_link(&new_link).await {
            return;
        }
        conn.fire_reconnected();
        info!("reconnected to hub");
        link = new_link;
    }
}

/// Dispatches inbound frames. Returns `true` when the link died
/// unexpectedly, `false` when the connection was stopped.
async fn dispatch_until_lost(conn: &HubConnection, link: &mut Link) -> bool {
    loop {
        tokio::select! {
            _ = conn.cancel_token().cancelled() => return false,
            frame = link.inbound.recv() => {
                match frame {
                    Some(f) => conn.dispatch(f).await,
                    None => return true,
                }
            }
        }
    }
}

/// Reconnect loop: unlimited attempts, per-attempt jitter delay, gated on
/// the connection's cancel token at every suspension point.
async fn reconnect(conn: &HubConnection) -> Option<Link> {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        if !conn.begin_reconnect_attempt(attempt) {
            return None;
        }
        conn.fire_reconnecting();

        let delay = conn.retry().delay_for_attempt(attempt);
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );

        tokio::select! {
            _ = conn.cancel_token().cancelled() => {
                debug!("reconnect cancelled");
                return None;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match conn.dial().await {
            Ok(link) => {
                if conn.is_stopped() {
                    link.cancel.cancel();
                    return None;
                }
                return Some(link);
            }
            Err(e) => {
                warn!(attempt, error = %e, "reconnect attempt failed");
            }
        }

        if conn.is_stopped() {
            return None;
        }
    }
}
