//! # broker::session
//!
//! Session token lifecycle. One `SessionManager` owns the token for the whole
//! process; refreshes are serialised behind a mutex so concurrent callers
//! never trigger duplicate logins.
//!
//! Expiry handling is two-pronged: a proactive age threshold (tokens go stale
//! after a few minutes of inactivity on some deployments) and a reactive path
//! where the quote layer calls `force_refresh` after a 401/403.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::broker::transport::BrokerTransport;
use crate::config::XtsCredentials;
use crate::error::AppError;

struct Session {
    token:     String,
    issued_at: Instant,
}

pub struct SessionManager<T: BrokerTransport> {
    transport:   std::sync::Arc<T>,
    credentials: XtsCredentials,
    max_age:     Duration,
    current:     Mutex<Option<Session>>,
}

impl<T: BrokerTransport> SessionManager<T> {
    pub fn new(
        transport: std::sync::Arc<T>,
        credentials: XtsCredentials,
        max_age_secs: u64,
    ) -> Self {
        Self {
            transport,
            credentials,
            max_age: Duration::from_secs(max_age_secs),
            current: Mutex::new(None),
        }
    }

    /// Return the cached token, logging in first if there is none or the
    /// cached one exceeded the age threshold.
    pub async fn ensure_fresh(&self) -> Result<String, AppError> {
        let mut guard = self.current.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.issued_at.elapsed() < self.max_age {
                return Ok(session.token.clone());
            }
            info!("🔁 Session token past {}s, re-authenticating", self.max_age.as_secs());
        }
        self.refresh_locked(&mut guard).await
    }

    /// Discard the cached token and log in again. Used after the broker
    /// rejects a request with 401/403 regardless of token age.
    pub async fn force_refresh(&self) -> Result<String, AppError> {
        let mut guard = self.current.lock().await;
        warn!("⚠️ Forcing session refresh after broker rejection");
        self.refresh_locked(&mut guard).await
    }

    async fn refresh_locked(
        &self,
        guard: &mut tokio::sync::MutexGuard<'_, Option<Session>>,
    ) -> Result<String, AppError> {
        match self.transport.login(&self.credentials).await {
            Ok(token) => {
                info!("✅ Broker session established");
                **guard = Some(Session { token: token.clone(), issued_at: Instant::now() });
                Ok(token)
            }
            Err(e) => {
                // A dead token must not be served to the next caller.
                **guard = None;
                Err(e)
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::broker::transport::stub::{test_creds, StubTransport};

    #[tokio::test]
    async fn token_is_cached_across_calls() {
        let transport = Arc::new(StubTransport::new(vec![]));
        let mgr = SessionManager::new(transport.clone(), test_creds(), 180);

        let a = mgr.ensure_fresh().await.unwrap();
        let b = mgr.ensure_fresh().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(transport.login_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_login() {
        let transport = Arc::new(StubTransport::new(vec![]));
        let mgr = Arc::new(SessionManager::new(transport.clone(), test_creds(), 180));

        let (m1, m2) = (mgr.clone(), mgr.clone());
        let (a, b) = tokio::join!(
            tokio::spawn(async move { m1.ensure_fresh().await.unwrap() }),
            tokio::spawn(async move { m2.ensure_fresh().await.unwrap() }),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(transport.login_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_issues_new_token() {
        let transport = Arc::new(StubTransport::new(vec![]));
        let mgr = SessionManager::new(transport.clone(), test_creds(), 180);

        let a = mgr.ensure_fresh().await.unwrap();
        let b = mgr.force_refresh().await.unwrap();
        assert_ne!(a, b);
        assert_eq!(transport.login_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_max_age_relogs_every_call() {
        let transport = Arc::new(StubTransport::new(vec![]));
        let mgr = SessionManager::new(transport.clone(), test_creds(), 0);

        mgr.ensure_fresh().await.unwrap();
        mgr.ensure_fresh().await.unwrap();
        assert_eq!(transport.login_calls.load(Ordering::SeqCst), 2);
    }
}
