//! # Lock Manager Service
//!
//! Async façade over [`LockTable`]. Waiters park on a single `Notify` and
//! re-check the table whenever any lock is released. Guards release on drop,
//! so dropping a future that is still waiting never leaks a lock.

use crate::domain::error::{ConcurrencyError, ConcurrencyResult};
use crate::domain::resource::{LockMode, ResourceId};
use crate::domain::table::{HolderId, LockTable};
use crate::metrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// =============================================================================
// CONFIG & METRICS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Default bound on any single acquisition.
    pub acquire_timeout_ms: u64,
    /// Sessions silent for longer than this are evicted.
    pub stale_after_ms: u64,
    /// How often the sweeper runs.
    pub sweep_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 5_000,
            stale_after_ms: 30_000,
            sweep_interval_ms: 5_000,
        }
    }
}

impl LockConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct LockManager {
    config: LockConfig,
    table: Mutex<LockTable>,
    released: Notify,
    next_session: AtomicU64,
}

impl LockManager {
    pub fn new(config: LockConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            table: Mutex::new(LockTable::new()),
            released: Notify::new(),
            next_session: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Open a session. `label` shows up in logs when the session is swept.
    pub fn session(self: &Arc<Self>, label: &str) -> LockSession {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.table.lock().open_session(id, label, Instant::now());
        LockSession {
            manager: self.clone(),
            id,
        }
    }

    /// Acquire every requested lock in global order, or none.
    ///
    /// Duplicate resources collapse to the strongest requested mode. All
    /// waits share one deadline `timeout` from now.
    pub async fn acquire_all(
        self: &Arc<Self>,
        session: &LockSession,
        requests: impl IntoIterator<Item = (ResourceId, LockMode)>,
        timeout: Duration,
    ) -> ConcurrencyResult<MultiLockGuard> {
        let mut wanted: BTreeMap<ResourceId, LockMode> = BTreeMap::new();
        for (resource, mode) in requests {
            let entry = wanted.entry(resource).or_insert(mode);
            if mode > *entry {
                *entry = mode;
            }
        }

        let deadline = Instant::now() + timeout;
        let mut guards = Vec::with_capacity(wanted.len());
        for (resource, mode) in wanted {
            // On error the guards acquired so far drop here and release.
            let guard = self.acquire_until(session.id, resource, mode, deadline).await?;
            guards.push(guard);
        }
        Ok(MultiLockGuard { guards })
    }

    async fn acquire_until(
        self: &Arc<Self>,
        holder: HolderId,
        resource: ResourceId,
        mode: LockMode,
        deadline: Instant,
    ) -> ConcurrencyResult<LockGuard> {
        let started = Instant::now();
        let mut contended = false;
        let _mark = WaitMark {
            manager: self.as_ref(),
            holder,
            promoting: None,
        };

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut table = self.table.lock();
                table.heartbeat(holder, Instant::now())?;
                if table.try_grant(holder, &resource, mode)? {
                    drop(table);
                    self.record_grant(started, contended);
                    return Ok(LockGuard {
                        manager: self.clone(),
                        holder,
                        resource,
                        mode,
                    });
                }
                if table.would_deadlock(holder, &resource) {
                    drop(table);
                    metrics::record_deadlock();
                    warn!(resource = %resource, session = holder, "Deadlock suspected, aborting wait");
                    return Err(ConcurrencyError::DeadlockSuspected { resource });
                }
                table.mark_waiting(holder, &resource);
            }

            if !contended {
                contended = true;
                metrics::record_contention(resource.as_str());
                debug!(resource = %resource, ?mode, session = holder, "Lock contended, waiting");
            }

            if !self.park(notified, deadline).await {
                return Err(self.timeout_error(resource, started));
            }
        }
    }

    async fn promote_until(
        &self,
        holder: HolderId,
        resource: &ResourceId,
        deadline: Instant,
    ) -> ConcurrencyResult<()> {
        let started = Instant::now();
        let mut mark = WaitMark {
            manager: self,
            holder,
            promoting: Some(resource.clone()),
        };

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut table = self.table.lock();
                table.heartbeat(holder, Instant::now())?;
                if table.try_promote(holder, resource)? {
                    mark.promoting = None;
                    return Ok(());
                }
                if table.would_deadlock(holder, resource) {
                    drop(table);
                    metrics::record_deadlock();
                    return Err(ConcurrencyError::DeadlockSuspected {
                        resource: resource.clone(),
                    });
                }
                table.mark_waiting(holder, resource);
            }

            if !self.park(notified, deadline).await {
                return Err(self.timeout_error(resource.clone(), started));
            }
        }
    }

    /// Wait for a release signal. Wakes at least every half stale period so
    /// the waiting session keeps heartbeating. False once `deadline` passes.
    async fn park(&self, notified: Pin<&mut Notified<'_>>, deadline: Instant) -> bool {
        let keepalive = Duration::from_millis(self.config.stale_after_ms / 2).max(Duration::from_millis(1));
        let wake_at = deadline.min(Instant::now() + keepalive);
        let _ = tokio::time::timeout_at(wake_at, notified).await;
        Instant::now() < deadline
    }

    fn record_grant(&self, started: Instant, contended: bool) {
        if contended {
            metrics::record_wait(started.elapsed().as_secs_f64());
        }
    }

    fn timeout_error(&self, resource: ResourceId, started: Instant) -> ConcurrencyError {
        metrics::record_timeout();
        let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        warn!(resource = %resource, waited_ms, "Lock acquisition timed out");
        ConcurrencyError::Timeout {
            resource,
            waited_ms,
        }
    }

    fn release(&self, holder: HolderId, resource: &ResourceId) {
        let released = self.table.lock().release(holder, resource);
        if released {
            self.released.notify_waiters();
        }
    }

    /// Evict sessions that have not heartbeat within `stale_after_ms`.
    /// Returns the number of locks released.
    pub fn sweep_stale(&self) -> usize {
        let stale_after = Duration::from_millis(self.config.stale_after_ms);
        let mut released = 0;
        {
            let mut table = self.table.lock();
            for holder in table.stale_sessions(Instant::now(), stale_after) {
                let label = table.session_label(holder).unwrap_or("?").to_string();
                let count = table.evict(holder);
                if count > 0 {
                    warn!(session = holder, label = %label, locks = count, "Released stale locks");
                }
                released += count;
            }
        }
        if released > 0 {
            metrics::record_stale_released(released as u64);
            self.released.notify_waiters();
        }
        released
    }

    /// Run [`sweep_stale`](Self::sweep_stale) until `shutdown` flips.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let manager = self.clone();
        let interval = Duration::from_millis(self.config.sweep_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.sweep_stale();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Lock sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }


    /// Number of resources with at least one holder.
    pub fn locked_resources(&self) -> usize {
        self.table.lock().locked_resources()
    }
}

/// Clears a waiter's wait-for edge (and any pending promotion) however the
/// wait ends, including when the waiting future is dropped.
struct WaitMark<'a> {
    manager: &'a LockManager,
    holder: HolderId,
    promoting: Option<ResourceId>,
}

impl Drop for WaitMark<'_> {
    fn drop(&mut self) {
        let mut table = self.manager.table.lock();
        table.clear_waiting(self.holder);
        if let Some(resource) = self.promoting.take() {
            table.cancel_promotion(self.holder, &resource);
            drop(table);
            // Readers queued behind the promotion may proceed.
            self.manager.released.notify_waiters();
        }
    }
}

// =============================================================================
// SESSIONS & GUARDS
// =============================================================================

/// Identity of one lock holder.
pub struct LockSession {
    manager: Arc<LockManager>,
    id: HolderId,
}

impl LockSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Acquire one lock with the configured default timeout.
    pub async fn acquire(&self, resource: ResourceId, mode: LockMode) -> ConcurrencyResult<LockGuard> {
        let timeout = self.manager.config.acquire_timeout();
        self.acquire_within(resource, mode, timeout).await
    }

    pub async fn acquire_within(
        &self,
        resource: ResourceId,
        mode: LockMode,
        timeout: Duration,
    ) -> ConcurrencyResult<LockGuard> {
        self.manager
            .acquire_until(self.id, resource, mode, Instant::now() + timeout)
            .await
    }

    /// Acquire a set of locks in global order; all or nothing.
    pub async fn acquire_all(
        &self,
        requests: impl IntoIterator<Item = (ResourceId, LockMode)>,
        timeout: Duration,
    ) -> ConcurrencyResult<MultiLockGuard> {
        self.manager.acquire_all(self, requests, timeout).await
    }

    /// Prove liveness to the sweeper.
    pub fn heartbeat(&self) -> ConcurrencyResult<()> {
        self.manager.table.lock().heartbeat(self.id, Instant::now())
    }

    pub fn is_live(&self) -> bool {
        self.manager.table.lock().is_live(self.id)
    }
}

impl Drop for LockSession {
    fn drop(&mut self) {
        self.manager.table.lock().close_session(self.id);
    }
}

/// One held lock. Released on drop.
pub struct LockGuard {
    manager: Arc<LockManager>,
    holder: HolderId,
    resource: ResourceId,
    mode: LockMode,
}

impl LockGuard {
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Promote an Upgrade guard to Exclusive without releasing it.
    pub async fn upgrade(&mut self, timeout: Duration) -> ConcurrencyResult<()> {
        if self.mode != LockMode::Upgrade {
            return Err(ConcurrencyError::InvalidUpgrade {
                resource: self.resource.clone(),
                mode: self.mode,
            });
        }
        self.manager
            .promote_until(self.holder, &self.resource, Instant::now() + timeout)
            .await?;
        self.mode = LockMode::Exclusive;
        Ok(())
    }

    /// Whether the lock is still held (false once swept).
    pub fn is_held(&self) -> bool {
        self.manager
            .table
            .lock()
            .mode_of(self.holder, &self.resource)
            .is_some()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.manager.release(self.holder, &self.resource);
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource", &self.resource)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Locks taken together by [`LockManager::acquire_all`].
#[derive(Debug)]
pub struct MultiLockGuard {
    guards: Vec<LockGuard>,
}

impl MultiLockGuard {
    /// Whether this set grants at least `mode` on `resource`.
    pub fn covers(&self, resource: &ResourceId, mode: LockMode) -> bool {
        self.guards
            .iter()
            .any(|g| &g.resource == resource && g.mode.covers(mode))
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceId> {
        self.guards.iter().map(|g| &g.resource)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}
