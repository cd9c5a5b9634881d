//! ETP 1.2 keepalive: periodic Ping, close on failure.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::Session;

pub(crate) fn spawn(session: Session, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match session.ping().await {
                Ok(rtt) => {
                    tracing::debug!(session = %session.id(), rtt_ms = rtt.as_millis() as u64, "keepalive");
                }
                Err(e) => {
                    tracing::warn!(session = %session.id(), error = %e, "keepalive failed, closing");
                    session.request_close("keepalive failed", true);
                    return;
                }
            }
        }
    })
}
