//! Coupling between business mutations and the audit trail.
//!
//! A privileged mutation and its audit entry form one logical unit: the
//! mutation is not reported as complete until the entry is durably written.
//! If the write keeps failing after the mutation committed, we do NOT roll
//! the mutation back; the gap is logged for out-of-band reconciliation and
//! the caller gets a server error.

use std::time::Duration;
use tracing::{error, warn};

use crate::db::Store;

const AUDIT_WRITE_ATTEMPTS: u32 = 3;
const AUDIT_RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Append an audit entry, retrying transient failures with backoff.
pub(crate) async fn record_with_retry(
    store: &Store,
    actor_id: i64,
    action: &str,
    entity: &str,
    entity_id: i64,
    details: &str,
) -> anyhow::Result<()> {
    let mut delay = AUDIT_RETRY_BASE_DELAY;
    let mut last_err = None;

    for attempt in 1..=AUDIT_WRITE_ATTEMPTS {
        match store
            .record_audit(actor_id, action, entity, entity_id, details)
            .await
        {
            Ok(()) => return Ok(()),
            Err(err) => {
                if attempt < AUDIT_WRITE_ATTEMPTS {
                    warn!(attempt, action, "Audit write failed, retrying: {err}");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                last_err = Some(err);
            }
        }
    }

    let err = last_err.unwrap_or_else(|| anyhow::anyhow!("audit write failed"));
    error!(
        actor_id,
        action,
        entity,
        entity_id,
        "Audit write exhausted retries; the business mutation is committed \
         but unrecorded and needs reconciliation: {err}"
    );
    Err(err)
}
