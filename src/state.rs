//! Shared application state for the gate handler.
//!
//! Everything here is either immutable after startup (`Config`, the method
//! whitelist, the trusted-proxy set, the upstream client) or internally
//! synchronised (the rate limiter's `DashMap`), so `AppState` is cloned per
//! request without locking.
//!
//! # Structured Concurrency
//!
//! The rate-limit sweep runs as a background task tracked by a
//! `TaskTracker` and stopped through a `CancellationToken`. Call
//! `shutdown()` after the server stops to wait for it.

use std::sync::Arc;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::middleware::{CorsPolicy, FixedWindowLimiter, TrustedProxyConfig};
use crate::upstream::UpstreamClient;
use crate::validation::AllowedMethods;

/// Shared application state for Axum handlers.
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// `None` when no provider key is configured
    pub upstream: Option<UpstreamClient>,
    /// Per-client request counters
    pub limiter: FixedWindowLimiter,
    /// JSON-RPC method whitelist
    pub allowed_methods: Arc<AllowedMethods>,
    /// Peers allowed to set `X-Forwarded-For`
    pub trusted_proxies: Arc<TrustedProxyConfig>,
    /// Origins echoed for browser callers
    pub cors: Arc<CorsPolicy>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build state from configuration and start the sweep task.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the upstream HTTP client cannot be built.
    pub fn new(config: Config) -> AppResult<Self> {
        let upstream = UpstreamClient::from_config(&config)?;
        if upstream.is_none() {
            warn!("ALCHEMY_API_KEY is not set; POST requests will be answered with 500");
        }

        let limiter = FixedWindowLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window,
            config.rate_limit_max_clients,
        );
        let allowed_methods = AllowedMethods::new(config.extra_allowed_methods.iter().cloned());
        let trusted_proxies = TrustedProxyConfig::new(&config.trusted_proxies);
        let cors = CorsPolicy::new(config.cors_origin_suffixes.clone());

        info!(
            methods = allowed_methods.count(),
            extra = config.extra_allowed_methods.len(),
            "JSON-RPC whitelist loaded"
        );

        let state = Self {
            config: Arc::new(config),
            upstream,
            limiter,
            allowed_methods: Arc::new(allowed_methods),
            trusted_proxies: Arc::new(trusted_proxies),
            cors: Arc::new(cors),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        if state.limiter.is_enabled() {
            state.spawn_sweep_task();
        }

        Ok(state)
    }

    /// Periodically evict expired rate-limit counters.
    fn spawn_sweep_task(&self) {
        let limiter = self.limiter.clone();
        let every = self.config.rate_limit_sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.sweep();
                    }
                }
            }

            debug!("Sweep task shutting down");
        });
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }
}
