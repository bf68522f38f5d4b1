// ── Change notification listener ──
//
// One LISTEN connection on the `service` and `endpoint` channels.
// Payloads are `<host>` or `<host>:<uuid>`; notifications for other hosts
// are dropped. Read timeouts are expected on quiet systems and only
// logged; any other error ends the listener and, with it, the process.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::scheduler::{Job, JobSender};

pub const SERVICE_CHANNEL: &str = "service";
pub const ENDPOINT_CHANNEL: &str = "endpoint";

/// Map a notification to the job it asks for, if it is addressed to `host`.
pub fn job_for(channel: &str, payload: &str, host: &str) -> Option<Job> {
    let (owner, id) = match payload.split_once(':') {
        Some((owner, id)) => (owner, Some(id)),
        None => (payload, None),
    };
    if owner != host {
        trace!(channel, owner, "notification for another host");
        return None;
    }

    match channel {
        SERVICE_CHANNEL => Some(Job::SyncServices),
        ENDPOINT_CHANNEL => {
            let Some(id) = id else {
                warn!(payload, "endpoint notification without endpoint id");
                return None;
            };
            match Uuid::parse_str(id) {
                Ok(id) => Some(Job::SyncEndpoint(id)),
                Err(e) => {
                    warn!(payload, error = %e, "endpoint notification with invalid id");
                    None
                }
            }
        }
        other => {
            warn!(channel = other, "notification on unexpected channel");
            None
        }
    }
}

/// Listen until cancelled, submitting a job per relevant notification.
pub async fn run(
    pool: &PgPool,
    sender: JobSender,
    host: &str,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener
        .listen_all([SERVICE_CHANNEL, ENDPOINT_CHANNEL])
        .await?;
    info!(channels = ?[SERVICE_CHANNEL, ENDPOINT_CHANNEL], "listening for change notifications");

    loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            received = tokio::time::timeout(timeout, listener.recv()) => received,
        };
        let notification = match received {
            Err(_) => {
                debug!(?timeout, "no notification received, waiting again");
                continue;
            }
            Ok(Err(e)) => {
                error!(error = %e, "notification listener failed");
                return Err(e.into());
            }
            Ok(Ok(notification)) => notification,
        };

        debug!(
            channel = notification.channel(),
            payload = notification.payload(),
            "notification received"
        );
        let Some(job) = job_for(notification.channel(), notification.payload(), host) else {
            continue;
        };
        if sender.submit(job).await.is_err() {
            debug!("scheduler stopped, listener exiting");
            return Ok(());
        }
    }
}
