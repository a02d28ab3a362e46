//! Connection Pool
//!
//! Keeps a fixed number of long-lived channels to one target, routes each
//! call to a healthy one, and replaces channels that expire or fail.

use chanpool_core::{ClientConfig, DialFailure, PoolError, TransportError};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::connection::{duration_millis, lifetime_with_jitter, ManagedConnection};
use crate::metrics::{PoolMetrics, PoolStats};
use crate::refresher::{Refresher, DEFAULT_REFRESH_INTERVAL};
use crate::selector::{RoundRobin, Selector};
use crate::tcp::TcpDialer;
use crate::transport::{Channel, DialOptions, Dialer};

/// Pool options
#[derive(Clone)]
pub struct PoolOptions {
    dial_options: DialOptions,
    pool_size: usize,
    max_lifetime: Duration,
    lifetime_jitter: Duration,
    dialer: Arc<dyn Dialer>,
    selector: Arc<dyn Selector>,
    refresh_interval: Duration,
    request_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            dial_options: DialOptions::default(),
            pool_size: chanpool_core::config::DEFAULT_POOL_SIZE,
            max_lifetime: chanpool_core::config::DEFAULT_MAX_LIFETIME,
            lifetime_jitter: chanpool_core::config::DEFAULT_LIFETIME_JITTER,
            dialer: Arc::new(TcpDialer),
            selector: Arc::new(RoundRobin::new()),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            request_timeout: None,
        }
    }
}

impl PoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options passed to the dialer on every dial.
    pub fn dial_options(mut self, dial_options: DialOptions) -> Self {
        self.dial_options = dial_options;
        self
    }

    /// Number of channels to dial. 0 means 1.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Lifetime of a channel before it is replaced. 0 means unbounded.
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Standard deviation of the spread added to each channel's lifetime.
    pub fn lifetime_jitter(mut self, jitter: Duration) -> Self {
        self.lifetime_jitter = jitter;
        self
    }

    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    pub fn selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = selector;
        self
    }

    /// Period of the background sweep.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Upper bound on each individual call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn resolve(mut self) -> Self {
        if self.pool_size == 0 {
            self.pool_size = chanpool_core::config::DEFAULT_POOL_SIZE;
        }
        if self.max_lifetime.is_zero() {
            self.max_lifetime = Duration::MAX;
        }
        self
    }
}

impl From<&ClientConfig> for PoolOptions {
    fn from(config: &ClientConfig) -> Self {
        Self::default()
            .dial_options(DialOptions::default().with_client_id(config.client_id.clone()))
            .pool_size(config.pool_size)
            .max_lifetime(config.max_lifetime)
            .lifetime_jitter(config.lifetime_jitter)
            .request_timeout(config.request_timeout)
    }
}

impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("dial_options", &self.dial_options)
            .field("pool_size", &self.pool_size)
            .field("max_lifetime", &self.max_lifetime)
            .field("lifetime_jitter", &self.lifetime_jitter)
            .field("selector", &self.selector)
            .field("refresh_interval", &self.refresh_interval)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// State shared between the pool handle and its background tasks.
pub(crate) struct PoolInner {
    target: String,
    options: PoolOptions,
    slots: RwLock<Vec<Arc<ManagedConnection>>>,
    /// Serializes sweeps
    refresh_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    last_dial_error: RwLock<Option<DialFailure>>,
    /// Closes of replaced channels, drained on shutdown
    retired: Mutex<JoinSet<()>>,
    metrics: Arc<PoolMetrics>,
}

impl PoolInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn next_expiry(&self) -> Duration {
        lifetime_with_jitter(self.options.max_lifetime, self.options.lifetime_jitter)
    }

    async fn dial(&self) -> Result<Arc<dyn Channel>, TransportError> {
        match self
            .options
            .dialer
            .dial(&self.target, &self.options.dial_options)
            .await
        {
            Ok(channel) => {
                self.metrics.record_dial_succeeded();
                debug!(addr = %self.target, channel_id = %channel.id(), "Dialed channel");
                Ok(channel)
            }
            Err(e) => {
                self.metrics.record_dial_failed();
                warn!(addr = %self.target, error = %e, "Dial failed");
                *self.last_dial_error.write() = Some(DialFailure::now(e.to_string()));
                Err(e)
            }
        }
    }

    /// Routes a call: the selected slot if healthy, else the next healthy
    /// slot after it, else the selected slot after repairing it.
    async fn pick(self: &Arc<Self>) -> Result<Arc<dyn Channel>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let (selected, alternate) = {
            let slots = self.slots.read();
            let n = slots.len();
            if n == 0 {
                warn!(addr = %self.target, "Pool has no slots");
                return Err(PoolError::NoHealthyConnection);
            }

            let index = self.options.selector.select(n);
            let selected = slots.get(index).cloned().ok_or_else(|| {
                PoolError::Internal(format!("selector returned index {index} for {n} slots"))
            })?;
            if selected.is_healthy() {
                return Ok(selected.channel());
            }

            let alternate = (1..n)
                .map(|offset| &slots[(index + offset) % n])
                .find(|conn| conn.is_healthy())
                .cloned();
            (selected, alternate)
        };

        if let Some(conn) = alternate {
            self.metrics.record_fallback();
            debug!(
                selected = selected.slot(),
                slot = conn.slot(),
                "Selected slot unhealthy, routing to next healthy slot"
            );
            return Ok(conn.channel());
        }

        self.metrics.record_sync_repair();
        debug!(slot = selected.slot(), "No healthy slot, repairing selected slot");

        // Runs detached so a caller giving up does not abort the repair
        let pool = Arc::clone(self);
        let conn = Arc::clone(&selected);
        tokio::spawn(async move { pool.refresh_slot(&conn).await })
            .await
            .map_err(|e| PoolError::Internal(format!("repair task failed: {e}")))??;

        Ok(selected.channel())
    }

    /// Redials `conn` if it still needs it once its repair lock is held.
    ///
    /// Returns true if the channel was replaced.
    async fn refresh_slot(&self, conn: &ManagedConnection) -> Result<bool, PoolError> {
        let _repair = conn.repair_lock().lock().await;
        if !conn.should_refresh() {
            return Ok(false);
        }

        let channel = self.dial().await.map_err(PoolError::refresh)?;
        let expiry = self.next_expiry();

        // Swapped under the read lock so shutdown, which takes the write lock,
        // either sees the new channel or makes us close it
        let replaced = {
            let _slots = self.slots.read();
            if self.is_closed() {
                false
            } else {
                let previous = conn.replace(Arc::clone(&channel), expiry);
                self.retire(previous);
                true
            }
        };

        if !replaced {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "Failed to close channel dialed during shutdown");
            }
            return Err(PoolError::Closed);
        }

        self.metrics.record_refresh();
        info!(
            slot = conn.slot(),
            channel_id = %channel.id(),
            expiry_ms = duration_millis(expiry),
            "Connection refreshed"
        );
        Ok(true)
    }

    fn retire(&self, channel: Arc<dyn Channel>) {
        let metrics = Arc::clone(&self.metrics);
        let mut retired = self.retired.lock();
        while retired.try_join_next().is_some() {}

        retired.spawn(async move {
            if let Err(e) = channel.close().await {
                debug!(channel_id = %channel.id(), error = %e, "Failed to close retired channel");
            }
            metrics.record_channel_closed();
        });
    }

    /// Redials every slot that should be refreshed. At most one sweep runs
    /// at a time.
    ///
    /// Returns the number of slots replaced.
    pub(crate) async fn refresh_in_background(self: &Arc<Self>) -> usize {
        let _sweep = self.refresh_lock.lock().await;
        if self.is_closed() {
            return 0;
        }

        let stale: Vec<Arc<ManagedConnection>> = self
            .slots
            .read()
            .iter()
            .filter(|conn| conn.should_refresh())
            .cloned()
            .collect();

        if stale.is_empty() {
            return 0;
        }

        debug!(count = stale.len(), "Refreshing stale connections");

        let mut repairs = JoinSet::new();
        for conn in stale {
            let pool = Arc::clone(self);
            repairs.spawn(async move { pool.refresh_slot(&conn).await });
        }

        let mut refreshed = 0;
        while let Some(result) = repairs.join_next().await {
            match result {
                Ok(Ok(true)) => refreshed += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => debug!(error = %e, "Background refresh failed, retrying next tick"),
                Err(e) => warn!(error = %e, "Refresh task failed"),
            }
        }
        refreshed
    }

    async fn shutdown(&self) {
        let slots = std::mem::take(&mut *self.slots.write());

        let closes = slots.iter().map(|conn| {
            let channel = conn.channel();
            let metrics = &self.metrics;
            async move {
                if let Err(e) = channel.close().await {
                    debug!(slot = conn.slot(), error = %e, "Failed to close channel");
                }
                metrics.record_channel_closed();
            }
        });
        join_all(closes).await;

        let mut retired = std::mem::take(&mut *self.retired.lock());
        while retired.join_next().await.is_some() {}
    }
}

/// A pool of channels to a single target.
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
    refresher: Refresher,
}

impl ConnectionPool {
    /// Dials the pool's channels concurrently and starts the background
    /// refresher.
    ///
    /// Dials that fail are left out, so the pool may hold fewer channels
    /// than requested. Fails if every dial fails.
    pub async fn new(target: impl Into<String>, options: PoolOptions) -> Result<Self, PoolError> {
        let target = target.into();
        let options = options.resolve();
        let size = options.pool_size;

        let runtime =
            Handle::try_current().map_err(|e| PoolError::scheduler_start(e.to_string()))?;

        let refresher = Refresher::new(options.refresh_interval);
        let inner = Arc::new(PoolInner {
            target,
            options,
            slots: RwLock::new(Vec::with_capacity(size)),
            refresh_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            last_dial_error: RwLock::new(None),
            retired: Mutex::new(JoinSet::new()),
            metrics: Arc::new(PoolMetrics::new()),
        });

        // Each channel is stamped when its own dial completes
        let dials = (0..size).map(|_| {
            let inner = Arc::clone(&inner);
            runtime.spawn(async move {
                let channel = inner.dial().await?;
                Ok::<_, TransportError>((channel, Instant::now(), inner.next_expiry()))
            })
        });

        let mut slots = Vec::with_capacity(size);
        for result in join_all(dials).await {
            match result {
                Ok(Ok((channel, created_at, expiry))) => {
                    let conn =
                        ManagedConnection::from_parts(slots.len(), channel, created_at, expiry);
                    slots.push(Arc::new(conn));
                }
                Ok(Err(_)) => {}
                Err(e) => warn!(error = %e, "Dial task failed"),
            }
        }

        if slots.is_empty() {
            return Err(PoolError::NoConnections {
                attempted: size,
                last_failure: inner.last_dial_error.read().clone(),
            });
        }

        let dialed = slots.len();
        *inner.slots.write() = slots;

        if let Err(e) = refresher.start(Arc::downgrade(&inner)) {
            inner.closed.store(true, Ordering::Release);
            inner.shutdown().await;
            return Err(e);
        }

        info!(
            addr = %inner.target,
            requested = size,
            dialed,
            "Connection pool ready"
        );

        Ok(Self { inner, refresher })
    }

    /// Performs a unary call with serde-encoded request and response.
    pub async fn invoke<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, PoolError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let request = serde_json::to_value(request)?;
        let response = self.invoke_raw(method, request).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Performs a unary call on a healthy channel.
    ///
    /// The request timeout, if set, bounds only the call itself, not any
    /// repair that precedes it.
    pub async fn invoke_raw(&self, method: &str, request: Value) -> Result<Value, PoolError> {
        let channel = self.inner.pick().await?;
        self.inner.metrics.record_invocation();
        debug!(method, channel_id = %channel.id(), "Invoking");

        let call = channel.invoke(method, request);
        let response = match self.inner.options.request_timeout {
            Some(limit) => timeout(limit, call).await.map_err(|_| PoolError::Timeout {
                method: method.to_string(),
                timeout_ms: duration_millis(limit),
            })?,
            None => call.await,
        };

        Ok(response?)
    }

    /// Streaming calls are not supported by the pool.
    pub fn new_stream(&self, method: &str) -> Result<(), PoolError> {
        debug!(method, "Rejecting streaming call");
        Err(PoolError::unsupported("new_stream"))
    }

    /// Runs a sweep now and returns the number of slots replaced.
    pub async fn refresh_now(&self) -> Result<usize, PoolError> {
        if self.inner.is_closed() {
            return Err(PoolError::Closed);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.refresh_in_background().await })
            .await
            .map_err(|e| PoolError::Internal(format!("refresh task failed: {e}")))
    }

    /// Closes every channel and waits for the closes to finish.
    ///
    /// A second call returns [`PoolError::AlreadyClosed`].
    pub async fn close(&self) -> Result<(), PoolError> {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PoolError::AlreadyClosed);
        }

        self.refresher.stop();
        self.inner.shutdown().await;

        info!(addr = %self.inner.target, "Connection pool closed");
        Ok(())
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.inner.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Most recent failed dial, if any.
    pub fn last_dial_error(&self) -> Option<DialFailure> {
        self.inner.last_dial_error.read().clone()
    }

    /// Snapshot of the slots.
    pub fn connections(&self) -> Vec<Arc<ManagedConnection>> {
        self.inner.slots.read().clone()
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.inner.slots.read();
        let healthy = slots.iter().filter(|conn| conn.is_healthy()).count();
        self.inner.metrics.snapshot(slots.len(), healthy)
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.inner.target)
            .field("slots", &self.len())
            .field("closed", &self.is_closed())
            .field("options", &self.inner.options)
            .finish()
    }
}
