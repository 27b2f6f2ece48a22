use std::time::Duration;

use crate::services::{auth::AuthService, reconciliation::ReconciliationService};

/// One sweep: drop expired sessions, then any checkout tracker whose
/// session is gone. Returns how many sessions expired.
pub async fn sweep_sessions(auth: &AuthService, reconciliation: &ReconciliationService) -> usize {
    let expired = auth.purge_expired_sessions().await;
    let live = auth.active_tokens().await;
    let dropped_trackers = reconciliation.retain_sessions(&live).await;

    if !expired.is_empty() || dropped_trackers > 0 {
        log::info!(
            "Session sweep removed {} expired sessions and {} checkout trackers",
            expired.len(),
            dropped_trackers
        );
    }
    expired.len()
}

pub async fn start_session_sweep(auth: AuthService, reconciliation: ReconciliationService, every: Duration) {
    log::info!("Sweeping expired sessions every {}s", every.as_secs());
    let mut ticker = tokio::time::interval(every);
    // the first tick fires immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        sweep_sessions(&auth, &reconciliation).await;
    }
}
