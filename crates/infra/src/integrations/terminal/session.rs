//! Client-side session state for the terminal API.

use std::future::Future;
use std::time::{Duration, Instant};

use punchsync_domain::Result;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

struct SessionToken {
    token: String,
    acquired_at: Instant,
}

impl SessionToken {
    fn is_live(&self, ttl: Duration) -> bool {
        self.acquired_at.elapsed() < ttl
    }
}

/// Cached bearer token with a client-side TTL.
///
/// The platform never expires tokens server-side, so the session treats a
/// token older than `ttl` as dead. Refreshes are single-flight: all callers
/// that find the token missing queue on one login and share its result.
pub struct TerminalSession {
    token: RwLock<Option<SessionToken>>,
    refresh: Mutex<()>,
    ttl: Duration,
}

impl TerminalSession {
    pub fn new(ttl: Duration) -> Self {
        Self { token: RwLock::new(None), refresh: Mutex::new(()), ttl }
    }

    /// Current token, when a live one is cached.
    pub async fn bearer(&self) -> Option<String> {
        let guard = self.token.read().await;
        guard.as_ref().filter(|t| t.is_live(self.ttl)).map(|t| t.token.clone())
    }

    /// Return a live token, running `login` when none is cached.
    ///
    /// Concurrent callers coalesce: one acquires the refresh lock and logs
    /// in, the rest re-check the cache once the lock frees up.
    pub async fn ensure<F, Fut>(&self, login: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(token) = self.bearer().await {
            return Ok(token);
        }

        let _flight = self.refresh.lock().await;
        // The leader may have refreshed while this caller waited.
        if let Some(token) = self.bearer().await {
            return Ok(token);
        }

        debug!("terminal session absent or expired, logging in");
        let token = login().await?;
        *self.token.write().await =
            Some(SessionToken { token: token.clone(), acquired_at: Instant::now() });
        Ok(token)
    }

    /// Drop the cached token so the next call authenticates again.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_callers_share_one_login() {
        let session = Arc::new(TerminalSession::new(Duration::from_secs(60)));
        let logins = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = Arc::clone(&session);
            let logins = Arc::clone(&logins);
            handles.push(tokio::spawn(async move {
                session
                    .ensure(move || async move {
                        logins.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("token-1".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            let token = handle.await.expect("task joined").expect("token acquired");
            assert_eq!(token, "token-1");
        }
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_triggers_a_new_login() {
        let session = TerminalSession::new(Duration::ZERO);
        let logins = AtomicUsize::new(0);

        for _ in 0..2 {
            let token = session
                .ensure(|| async {
                    logins.fetch_add(1, Ordering::SeqCst);
                    Ok("token".to_string())
                })
                .await
                .expect("token acquired");
            assert_eq!(token, "token");
        }
        assert_eq!(logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn live_token_is_reused() {
        let session = TerminalSession::new(Duration::from_secs(60));
        let logins = AtomicUsize::new(0);

        for _ in 0..3 {
            session
                .ensure(|| async {
                    logins.fetch_add(1, Ordering::SeqCst);
                    Ok("token".to_string())
                })
                .await
                .expect("token acquired");
        }
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reauthentication() {
        let session = TerminalSession::new(Duration::from_secs(60));
        let logins = AtomicUsize::new(0);

        let login = |count: &AtomicUsize| {
            count.fetch_add(1, Ordering::SeqCst);
            format!("token-{}", count.load(Ordering::SeqCst))
        };

        let first = session.ensure(|| async { Ok(login(&logins)) }).await.expect("token");
        session.invalidate().await;
        let second = session.ensure(|| async { Ok(login(&logins)) }).await.expect("token");

        assert_eq!(first, "token-1");
        assert_eq!(second, "token-2");
    }

    #[tokio::test]
    async fn failed_login_leaves_the_session_empty() {
        let session = TerminalSession::new(Duration::from_secs(60));

        let result = session
            .ensure(|| async {
                Err(punchsync_domain::PunchSyncError::Auth("bad credentials".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(session.bearer().await.is_none());
    }
}
