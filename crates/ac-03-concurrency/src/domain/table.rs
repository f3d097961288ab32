//! Lock table: grant rules, wait-for graph and session liveness.
//!
//! Pure bookkeeping, no waiting. The service wraps it in a mutex and parks
//! callers on a `Notify` between attempts.

use super::error::{ConcurrencyError, ConcurrencyResult};
use super::resource::{LockMode, ResourceId};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

pub type HolderId = u64;

#[derive(Debug, Default)]
struct ResourceState {
    holders: HashMap<HolderId, LockMode>,
    /// Upgrade holder waiting to become exclusive.
    promoting: Option<HolderId>,
}

#[derive(Debug)]
struct SessionInfo {
    label: String,
    last_heartbeat: Instant,
}

#[derive(Debug, Default)]
pub struct LockTable {
    resources: HashMap<ResourceId, ResourceState>,
    waiting: HashMap<HolderId, ResourceId>,
    sessions: HashMap<HolderId, SessionInfo>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    pub fn open_session(&mut self, holder: HolderId, label: &str, now: Instant) {
        self.sessions.insert(
            holder,
            SessionInfo {
                label: label.to_string(),
                last_heartbeat: now,
            },
        );
    }

    pub fn heartbeat(&mut self, holder: HolderId, now: Instant) -> ConcurrencyResult<()> {
        let session = self
            .sessions
            .get_mut(&holder)
            .ok_or(ConcurrencyError::SessionExpired { session: holder })?;
        session.last_heartbeat = now;
        Ok(())
    }

    pub fn is_live(&self, holder: HolderId) -> bool {
        self.sessions.contains_key(&holder)
    }

    pub fn session_label(&self, holder: HolderId) -> Option<&str> {
        self.sessions.get(&holder).map(|s| s.label.as_str())
    }

    /// Session ended normally. Its guards release individually.
    pub fn close_session(&mut self, holder: HolderId) {
        self.sessions.remove(&holder);
        self.waiting.remove(&holder);
    }

    pub fn stale_sessions(&self, now: Instant, stale_after: Duration) -> Vec<HolderId> {
        self.sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_heartbeat) > stale_after)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop a session and every lock it holds. Returns locks released.
    pub fn evict(&mut self, holder: HolderId) -> usize {
        self.close_session(holder);
        let mut released = 0;
        self.resources.retain(|_, state| {
            if state.holders.remove(&holder).is_some() {
                released += 1;
            }
            if state.promoting == Some(holder) {
                state.promoting = None;
            }
            !state.holders.is_empty()
        });
        released
    }

    // -------------------------------------------------------------------------
    // Grants
    // -------------------------------------------------------------------------

    /// Grant `mode` on `resource` to `holder` if compatible.
    pub fn try_grant(
        &mut self,
        holder: HolderId,
        resource: &ResourceId,
        mode: LockMode,
    ) -> ConcurrencyResult<bool> {
        if !self.is_live(holder) {
            return Err(ConcurrencyError::SessionExpired { session: holder });
        }
        let state = self.resources.entry(resource.clone()).or_default();
        if state.holders.contains_key(&holder) {
            return Err(ConcurrencyError::AlreadyHeld {
                resource: resource.clone(),
            });
        }

        let compatible = match mode {
            LockMode::Shared => {
                state.promoting.is_none()
                    && !state.holders.values().any(|m| *m == LockMode::Exclusive)
            }
            LockMode::Upgrade => !state
                .holders
                .values()
                .any(|m| matches!(m, LockMode::Upgrade | LockMode::Exclusive)),
            LockMode::Exclusive => state.holders.is_empty(),
        };

        if compatible {
            state.holders.insert(holder, mode);
            self.waiting.remove(&holder);
        }
        Ok(compatible)
    }

    /// Promote an Upgrade lock to Exclusive if `holder` is the only holder.
    pub fn try_promote(&mut self, holder: HolderId, resource: &ResourceId) -> ConcurrencyResult<bool> {
        if !self.is_live(holder) {
            return Err(ConcurrencyError::SessionExpired { session: holder });
        }
        let state = self
            .resources
            .get_mut(resource)
            .ok_or(ConcurrencyError::SessionExpired { session: holder })?;
        match state.holders.get(&holder) {
            Some(LockMode::Upgrade) => {}
            Some(mode) => {
                return Err(ConcurrencyError::InvalidUpgrade {
                    resource: resource.clone(),
                    mode: *mode,
                })
            }
            None => return Err(ConcurrencyError::SessionExpired { session: holder }),
        }

        if state.holders.len() == 1 {
            state.holders.insert(holder, LockMode::Exclusive);
            state.promoting = None;
            self.waiting.remove(&holder);
            Ok(true)
        } else {
            state.promoting = Some(holder);
            Ok(false)
        }
    }

    pub fn cancel_promotion(&mut self, holder: HolderId, resource: &ResourceId) {
        if let Some(state) = self.resources.get_mut(resource) {
            if state.promoting == Some(holder) {
                state.promoting = None;
            }
        }
    }

    /// Release `holder`'s lock on `resource`. False if it held nothing there
    /// (already swept).
    pub fn release(&mut self, holder: HolderId, resource: &ResourceId) -> bool {
        let Some(state) = self.resources.get_mut(resource) else {
            return false;
        };
        let removed = state.holders.remove(&holder).is_some();
        if state.promoting == Some(holder) {
            state.promoting = None;
        }
        if state.holders.is_empty() && state.promoting.is_none() {
            self.resources.remove(resource);
        }
        removed
    }

    pub fn mode_of(&self, holder: HolderId, resource: &ResourceId) -> Option<LockMode> {
        self.resources
            .get(resource)
            .and_then(|s| s.holders.get(&holder).copied())
    }

    pub fn holder_count(&self, resource: &ResourceId) -> usize {
        self.resources.get(resource).map_or(0, |s| s.holders.len())
    }

    pub fn locked_resources(&self) -> usize {
        self.resources.len()
    }

    // -------------------------------------------------------------------------
    // Wait-for graph
    // -------------------------------------------------------------------------

    pub fn mark_waiting(&mut self, holder: HolderId, resource: &ResourceId) {
        self.waiting.insert(holder, resource.clone());
    }

    pub fn clear_waiting(&mut self, holder: HolderId) {
        self.waiting.remove(&holder);
    }

    /// Whether `holder` waiting on `resource` closes a cycle.
    ///
    /// Walks resource -> holders -> what those holders wait on. Reaching
    /// `holder` again means nobody on the path can make progress.
    pub fn would_deadlock(&self, holder: HolderId, resource: &ResourceId) -> bool {
        let mut stack = vec![resource];
        let mut visited: HashSet<&ResourceId> = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(state) = self.resources.get(current) else {
                continue;
            };
            for other in state.holders.keys() {
                if *other == holder {
                    if current != resource {
                        return true;
                    }
                    // Holding the requested resource itself (promotion).
                    continue;
                }
                if let Some(next) = self.waiting.get(other) {
                    stack.push(next);
                }
            }
        }
        false
    }
}
