// =============================================================================
// Central Application State — Prism Chart Engine
// =============================================================================
//
// The single source of truth for the running engine: the session registry
// keyed by (symbol, interval), the runtime config, and the version counter
// the WebSocket feed watches to decide when to push fresh snapshots.
//
// Thread safety:
//   - An atomic counter for lock-free version tracking.
//   - parking_lot::RwLock around the registry.
//   - One parking_lot::Mutex per session, which is what serializes a
//     session's tick processing — sessions never share mutable state.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::market_data::{fetch_klines, run_trade_stream};
use crate::runtime_config::RuntimeConfig;
use crate::session::{MarketSession, SessionSnapshot};
use crate::types::{CandleKey, Interval, SessionState};

/// A registered session plus the task feeding it ticks.
struct SessionEntry {
    session: Arc<Mutex<MarketSession>>,
    feed: Option<JoinHandle<()>>,
}

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter. Incremented on every
    /// meaningful state mutation; the WebSocket feed uses this to detect
    /// changes and push updates.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    http: reqwest::Client,
    sessions: RwLock<HashMap<CandleKey, SessionEntry>>,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Arc::new(Self {
            state_version: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            http,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    // -------------------------------------------------------------------------
    // Version tracking
    // -------------------------------------------------------------------------

    pub fn increment_version(&self) {
        self.state_version.fetch_add(1, Ordering::Relaxed);
    }

    pub fn version(&self) -> u64 {
        self.state_version.load(Ordering::Relaxed)
    }

    // -------------------------------------------------------------------------
    // Session registry
    // -------------------------------------------------------------------------

    /// Open (or replace) the session for `(symbol, interval)`: fetch the
    /// historical seed, cold-compute indicators, then spawn the live feed.
    ///
    /// Re-subscription discards the previous session entirely — its feed task
    /// is aborted and its state dropped, never merged.
    pub async fn subscribe(self: &Arc<Self>, symbol: &str, interval: Interval) -> Result<()> {
        let config = self.runtime_config.read().clone();
        let key = CandleKey {
            symbol: symbol.to_uppercase(),
            interval,
        };

        let mut session = MarketSession::new(key.symbol.clone(), interval, &config);
        session.begin_loading();

        let seed = fetch_klines(
            &self.http,
            &config.rest_base_url,
            &key.symbol,
            interval,
            config.candle_limit,
            None,
        )
        .await
        .with_context(|| format!("historical fetch failed for {key}"))?;

        session
            .seed(seed)
            .with_context(|| format!("seed rejected for {key}"))?;

        let session = Arc::new(Mutex::new(session));
        let feed = self.spawn_feed(key.clone(), Arc::clone(&session), &config);
        self.install_session(key, session, Some(feed));
        Ok(())
    }

    /// Put a session into the registry, tearing down any previous holder of
    /// the same key.
    fn install_session(
        &self,
        key: CandleKey,
        session: Arc<Mutex<MarketSession>>,
        feed: Option<JoinHandle<()>>,
    ) {
        let previous = self
            .sessions
            .write()
            .insert(key.clone(), SessionEntry { session, feed });

        if let Some(old) = previous {
            warn!(key = %key, "replacing existing session");
            if let Some(task) = old.feed {
                task.abort();
            }
            old.session.lock().close();
        }

        info!(key = %key, "session registered");
        self.increment_version();
    }

    /// Reconnect loop around the trade stream for one session.
    fn spawn_feed(
        self: &Arc<Self>,
        key: CandleKey,
        session: Arc<Mutex<MarketSession>>,
        config: &RuntimeConfig,
    ) -> JoinHandle<()> {
        let state = Arc::clone(self);
        let ws_base = config.ws_base_url.clone();
        let retry_delay = std::time::Duration::from_secs(config.reconnect_delay_secs);

        tokio::spawn(async move {
            let bump = {
                let state = Arc::clone(&state);
                move || state.increment_version()
            };
            loop {
                if let Err(e) = run_trade_stream(&ws_base, &key.symbol, &session, &bump).await {
                    error!(key = %key, error = %e, "trade stream error");
                }
                if session.lock().state() == SessionState::Closed {
                    return;
                }
                // Keep all in-memory state; the next connect resumes the feed.
                session.lock().mark_reconnecting();
                state.increment_version();
                tokio::time::sleep(retry_delay).await;
            }
        })
    }

    /// Drop the session for `key`. Returns false when none existed.
    pub fn unsubscribe(&self, key: &CandleKey) -> bool {
        let Some(entry) = self.sessions.write().remove(key) else {
            return false;
        };
        if let Some(task) = entry.feed {
            task.abort();
        }
        entry.session.lock().close();
        info!(key = %key, "session unsubscribed");
        self.increment_version();
        true
    }

    pub fn session_keys(&self) -> Vec<CandleKey> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Copy-out snapshot for one session.
    pub fn snapshot(&self, key: &CandleKey) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read();
        sessions.get(key).map(|entry| entry.session.lock().snapshot())
    }

    /// Copy-out snapshots of every session.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read();
        sessions
            .values()
            .map(|entry| entry.session.lock().snapshot())
            .collect()
    }
}
