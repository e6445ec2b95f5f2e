use crate::api::BinanceRest;
use crate::core::errors::ExchangeError;
use crate::core::kernel::rest::RestClient;
use crate::core::kernel::ws::{EventSender, SessionProvider, StreamEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::warn;

/// Default interval between listen key renewals.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30 * 60);

struct ActiveSession {
    listen_key: String,
    keepalive: JoinHandle<()>,
}

/// Authenticated user-data stream target.
///
/// Resolving starts a session (obtaining a listen key) and arms a periodic
/// keep-alive renewal task. Releasing cancels the renewal and closes the
/// session best-effort. Each resolution supersedes the previous session's
/// renewal task, so a reconnect gets a fresh listen key without leaking the
/// old schedule.
pub struct ListenKeySession<R: RestClient> {
    rest: Arc<BinanceRest<R>>,
    ws_endpoint: String,
    keepalive_interval: Duration,
    active: Mutex<Option<ActiveSession>>,
}

impl<R: RestClient + 'static> ListenKeySession<R> {
    pub fn new(rest: Arc<BinanceRest<R>>, ws_endpoint: String) -> Self {
        Self {
            rest,
            ws_endpoint,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_keepalive_interval(mut self, keepalive_interval: Duration) -> Self {
        self.keepalive_interval = keepalive_interval;
        self
    }

    /// Listen key of the current session, if one is active.
    pub fn listen_key(&self) -> Option<String> {
        lock_active(&self.active)
            .as_ref()
            .map(|session| session.listen_key.clone())
    }

    fn cancel_active(&self) -> Option<String> {
        lock_active(&self.active).take().map(|session| {
            session.keepalive.abort();
            session.listen_key
        })
    }
}

#[async_trait]
impl<R: RestClient + 'static> SessionProvider for ListenKeySession<R> {
    async fn resolve(&self, events: &EventSender) -> Result<String, ExchangeError> {
        self.cancel_active();

        let listen_key = self.rest.start_user_data_stream().await?;

        let rest = Arc::clone(&self.rest);
        let key = listen_key.clone();
        let events = events.clone();
        let period = self.keepalive_interval;
        let keepalive = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(error) = rest.keepalive_user_data_stream(&key).await {
                    // A missed renewal never tears down the subscription;
                    // the schedule continues.
                    warn!(error = %error, "listen key keep-alive failed");
                    let _ = events.send(StreamEvent::KeepAliveError(error.to_string()));
                }
            }
        });

        *lock_active(&self.active) = Some(ActiveSession {
            listen_key: listen_key.clone(),
            keepalive,
        });

        Ok(format!("{}/ws/{}", self.ws_endpoint, listen_key))
    }

    fn release(&self) {
        if let Some(listen_key) = self.cancel_active() {
            let rest = Arc::clone(&self.rest);
            tokio::spawn(async move {
                if let Err(error) = rest.close_user_data_stream(&listen_key).await {
                    warn!(error = %error, "failed to close user data stream");
                }
            });
        }
    }
}

fn lock_active<T>(mutex: &Mutex<Option<T>>) -> MutexGuard<'_, Option<T>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
