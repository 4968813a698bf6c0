//! Nested delegation manager.
//!
//! Lets one action call spawn a bounded sub-orchestration. The manager owns
//! a context table shared across a delegation tree; entries carry generation
//! stamps so a time-based sweep cannot silently alias a handle a sibling
//! still holds across a suspension point — a stale handle simply stops
//! resolving.
//!
//! Resource restrictions shrink multiplicatively with depth, so deeper
//! nesting is strictly more constrained.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use kestrel_core::ids::{CallId, ExecutionId};

/// Errors from delegation attempts.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DelegationError {
    /// The requested depth exceeds the configured maximum.
    #[error("nesting depth {depth} exceeds maximum {max_depth}")]
    DepthExceeded {
        /// Requested depth.
        depth: u32,
        /// Configured ceiling.
        max_depth: u32,
    },

    /// The parent already has the maximum number of child contexts.
    #[error("parent call {parent} already has {limit} child contexts")]
    ChildLimit {
        /// Parent call id.
        parent: String,
        /// Configured per-parent ceiling.
        limit: usize,
    },
}

/// Delegation manager configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationConfig {
    /// Maximum nesting depth (a context at exactly this depth is allowed).
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Maximum child contexts under one parent call.
    #[serde(default = "default_max_children")]
    pub max_children_per_context: usize,
    /// Context retention window in milliseconds (sweep removes older ones).
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,
    /// Whether children see a snapshot of ancestor shared data.
    #[serde(default = "default_true")]
    pub cross_level_sharing: bool,
    /// Base time budget scaled per level, in milliseconds.
    #[serde(default = "default_time_budget_ms")]
    pub base_time_budget_ms: u64,
    /// Base per-round call allowance scaled per level.
    #[serde(default = "default_max_calls")]
    pub base_max_calls_per_round: usize,
    /// Base round allowance scaled per level.
    #[serde(default = "default_max_rounds")]
    pub base_max_rounds: u32,
}

const fn default_max_depth() -> u32 {
    3
}

const fn default_max_children() -> usize {
    8
}

const fn default_retention_ms() -> u64 {
    3_600_000
}

const fn default_true() -> bool {
    true
}

const fn default_time_budget_ms() -> u64 {
    120_000
}

const fn default_max_calls() -> usize {
    16
}

const fn default_max_rounds() -> u32 {
    10
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_children_per_context: default_max_children(),
            retention_ms: default_retention_ms(),
            cross_level_sharing: default_true(),
            base_time_budget_ms: default_time_budget_ms(),
            base_max_calls_per_round: default_max_calls(),
            base_max_rounds: default_max_rounds(),
        }
    }
}

/// Depth-scaled resource ceilings for a nested execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRestrictions {
    /// Wall-clock budget in milliseconds.
    pub time_budget_ms: u64,
    /// Per-round call allowance.
    pub max_calls_per_round: usize,
    /// Round allowance.
    pub max_rounds: u32,
    /// The multiplier that was applied.
    pub multiplier: f64,
}

/// Shrink factor per nesting level: `max(0.1, 1 − depth × 0.2)`.
#[must_use]
pub fn restriction_multiplier(depth: u32) -> f64 {
    (1.0 - f64::from(depth) * 0.2).max(0.1)
}

/// One nested execution context.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// Execution id of the nested loop.
    pub execution_id: ExecutionId,
    /// Call that spawned this context.
    pub call_id: CallId,
    /// Parent call, if any.
    pub parent_call_id: Option<CallId>,
    /// Round (in the parent loop) during which the context was created.
    pub parent_round: u32,
    /// Nesting depth (1 = first nested level).
    pub depth: u32,
    /// Call ids from the root down to the parent.
    pub level_path: Vec<CallId>,
    /// Snapshot of ancestor shared data at creation time (not live-linked).
    pub shared_data: serde_json::Map<String, serde_json::Value>,
    /// Data private to this context.
    pub isolated_data: serde_json::Map<String, serde_json::Value>,
    /// Depth-scaled ceilings.
    pub restrictions: ResourceRestrictions,
    /// Generation stamp; a stale stamp means the entry was swept.
    pub generation: u64,
    created_at: Instant,
}

/// Stable reference to a context entry.
///
/// `get` returns `None` once the entry is swept or replaced — callers that
/// resumed from a suspension must re-check rather than assume liveness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextHandle {
    /// Execution id of the context.
    pub execution_id: ExecutionId,
    /// Generation the handle was issued for.
    pub generation: u64,
}

/// Shared context table for a delegation tree.
pub struct DelegationManager {
    config: DelegationConfig,
    contexts: DashMap<String, ExecutionContext>,
    /// call id → execution id.
    by_call: DashMap<String, String>,
    generation: AtomicU64,
}

impl DelegationManager {
    /// Create a manager.
    #[must_use]
    pub fn new(config: DelegationConfig) -> Self {
        Self {
            config,
            contexts: DashMap::new(),
            by_call: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &DelegationConfig {
        &self.config
    }

    /// Create a nested context under `parent_call_id`.
    ///
    /// Fails when `depth` exceeds the configured maximum (`depth ==
    /// max_depth` is allowed), or when the parent already carries the
    /// maximum number of children.
    #[instrument(skip(self), fields(execution_id = %execution_id, depth))]
    pub fn create_nested_context(
        &self,
        parent_call_id: Option<&CallId>,
        parent_round: u32,
        execution_id: &ExecutionId,
        depth: u32,
        call_id: &CallId,
    ) -> Result<ContextHandle, DelegationError> {
        if depth > self.config.max_depth {
            return Err(DelegationError::DepthExceeded {
                depth,
                max_depth: self.config.max_depth,
            });
        }

        let parent_context = parent_call_id.and_then(|id| self.context_for_call(id.as_str()));

        if let Some(parent_id) = parent_call_id {
            let children = self
                .contexts
                .iter()
                .filter(|entry| {
                    entry
                        .value()
                        .parent_call_id
                        .as_ref()
                        .is_some_and(|p| p == parent_id)
                })
                .count();
            if children >= self.config.max_children_per_context {
                return Err(DelegationError::ChildLimit {
                    parent: parent_id.as_str().to_owned(),
                    limit: self.config.max_children_per_context,
                });
            }
        }

        let level_path = match (&parent_context, parent_call_id) {
            (Some(parent), _) => {
                let mut path = parent.level_path.clone();
                path.push(parent.call_id.clone());
                path
            }
            (None, Some(parent_id)) => vec![parent_id.clone()],
            (None, None) => Vec::new(),
        };

        // Copy-on-create: a snapshot, never a live link
        let shared_data = if self.config.cross_level_sharing {
            parent_context
                .as_ref()
                .map(|p| p.shared_data.clone())
                .unwrap_or_default()
        } else {
            serde_json::Map::new()
        };

        let multiplier = restriction_multiplier(depth);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let restrictions = ResourceRestrictions {
            time_budget_ms: ((self.config.base_time_budget_ms as f64) * multiplier) as u64,
            max_calls_per_round: (((self.config.base_max_calls_per_round as f64) * multiplier)
                as usize)
                .max(1),
            max_rounds: (((f64::from(self.config.base_max_rounds)) * multiplier) as u32).max(1),
            multiplier,
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let context = ExecutionContext {
            execution_id: execution_id.clone(),
            call_id: call_id.clone(),
            parent_call_id: parent_call_id.cloned(),
            parent_round,
            depth,
            level_path,
            shared_data,
            isolated_data: serde_json::Map::new(),
            restrictions,
            generation,
            created_at: Instant::now(),
        };

        let _ = self
            .contexts
            .insert(execution_id.as_str().to_owned(), context);
        let _ = self
            .by_call
            .insert(call_id.as_str().to_owned(), execution_id.as_str().to_owned());
        debug!(depth, "nested context created");

        Ok(ContextHandle {
            execution_id: execution_id.clone(),
            generation,
        })
    }

    /// Resolve a handle, if the entry is still live and unswept.
    #[must_use]
    pub fn get(&self, handle: &ContextHandle) -> Option<ExecutionContext> {
        self.contexts
            .get(handle.execution_id.as_str())
            .filter(|entry| entry.generation == handle.generation)
            .map(|entry| entry.value().clone())
    }

    /// Resolve the context spawned by a call.
    #[must_use]
    pub fn context_for_call(&self, call_id: &str) -> Option<ExecutionContext> {
        let execution_id = self.by_call.get(call_id)?.clone();
        self.contexts
            .get(&execution_id)
            .map(|entry| entry.value().clone())
    }

    /// Write a shared-data key. Returns `false` for stale handles.
    pub fn set_shared(&self, handle: &ContextHandle, key: &str, value: serde_json::Value) -> bool {
        match self.contexts.get_mut(handle.execution_id.as_str()) {
            Some(mut entry) if entry.generation == handle.generation => {
                let _ = entry.shared_data.insert(key.to_owned(), value);
                true
            }
            _ => false,
        }
    }

    /// Write an isolated-data key. Returns `false` for stale handles.
    pub fn set_isolated(
        &self,
        handle: &ContextHandle,
        key: &str,
        value: serde_json::Value,
    ) -> bool {
        match self.contexts.get_mut(handle.execution_id.as_str()) {
            Some(mut entry) if entry.generation == handle.generation => {
                let _ = entry.isolated_data.insert(key.to_owned(), value);
                true
            }
            _ => false,
        }
    }

    /// Parent call of a call's context, if any.
    #[must_use]
    pub fn parent_of(&self, call_id: &str) -> Option<CallId> {
        self.context_for_call(call_id)?.parent_call_id
    }

    /// Calls whose contexts were spawned under `call_id`.
    #[must_use]
    pub fn children_of(&self, call_id: &str) -> Vec<CallId> {
        let mut children: Vec<CallId> = self
            .contexts
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .parent_call_id
                    .as_ref()
                    .is_some_and(|p| p.as_str() == call_id)
            })
            .map(|entry| entry.value().call_id.clone())
            .collect();
        children.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        children
    }

    /// Calls sharing a parent with `call_id` (excluding itself).
    #[must_use]
    pub fn siblings_of(&self, call_id: &str) -> Vec<CallId> {
        let Some(context) = self.context_for_call(call_id) else {
            return Vec::new();
        };
        let Some(parent) = context.parent_call_id else {
            return Vec::new();
        };
        self.children_of(parent.as_str())
            .into_iter()
            .filter(|c| c.as_str() != call_id)
            .collect()
    }

    /// Remove contexts older than the retention window. Returns the number
    /// removed.
    pub fn sweep(&self) -> usize {
        let retention = Duration::from_millis(self.config.retention_ms);
        let mut expired: Vec<(String, String)> = Vec::new();
        for entry in &self.contexts {
            if entry.created_at.elapsed() >= retention {
                expired.push((
                    entry.key().clone(),
                    entry.value().call_id.as_str().to_owned(),
                ));
            }
        }
        for (execution_id, call_id) in &expired {
            let _ = self.contexts.remove(execution_id);
            let _ = self.by_call.remove(call_id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "contexts swept");
        }
        expired.len()
    }

    /// Spawn a periodic sweep task. Abort the handle on shutdown.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                let _ = ticker.tick().await;
                let _ = manager.sweep();
            }
        })
    }

    /// Number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl std::fmt::Debug for DelegationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationManager")
            .field("contexts", &self.contexts.len())
            .field("max_depth", &self.config.max_depth)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn manager() -> DelegationManager {
        DelegationManager::new(DelegationConfig::default())
    }

    fn ids(tag: &str) -> (ExecutionId, CallId) {
        (
            ExecutionId::from(format!("exec-{tag}")),
            CallId::from(format!("call-{tag}")),
        )
    }

    #[test]
    fn multiplier_shrinks_and_floors() {
        assert!((restriction_multiplier(0) - 1.0).abs() < f64::EPSILON);
        assert!((restriction_multiplier(1) - 0.8).abs() < f64::EPSILON);
        assert!((restriction_multiplier(2) - 0.6).abs() < f64::EPSILON);
        assert!((restriction_multiplier(4) - 0.2).abs() < f64::EPSILON);
        // floors at 0.1 from depth 5 onward
        assert!((restriction_multiplier(5) - 0.1).abs() < f64::EPSILON);
        assert!((restriction_multiplier(50) - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn create_within_depth_succeeds() {
        let m = manager();
        let (exec, call) = ids("a");
        let handle = m
            .create_nested_context(None, 1, &exec, 1, &call)
            .unwrap();
        assert!(m.get(&handle).is_some());
    }

    #[test]
    fn create_at_exactly_max_depth_succeeds() {
        let m = manager();
        let (exec, call) = ids("a");
        let result = m.create_nested_context(None, 1, &exec, m.config().max_depth, &call);
        assert!(result.is_ok());
    }

    #[test]
    fn create_over_max_depth_fails() {
        let m = manager();
        let (exec, call) = ids("a");
        let result = m.create_nested_context(None, 1, &exec, m.config().max_depth + 1, &call);
        assert_matches!(
            result,
            Err(DelegationError::DepthExceeded { depth: 4, max_depth: 3 })
        );
    }

    #[test]
    fn restrictions_scale_with_depth() {
        let m = manager();
        let (exec1, call1) = ids("d1");
        let (exec2, call2) = ids("d2");
        let h1 = m.create_nested_context(None, 1, &exec1, 1, &call1).unwrap();
        let h2 = m.create_nested_context(None, 1, &exec2, 2, &call2).unwrap();

        let c1 = m.get(&h1).unwrap();
        let c2 = m.get(&h2).unwrap();
        assert_eq!(c1.restrictions.time_budget_ms, 96_000); // 120s × 0.8
        assert_eq!(c2.restrictions.time_budget_ms, 72_000); // 120s × 0.6
        assert!(c2.restrictions.max_calls_per_round < c1.restrictions.max_calls_per_round);
        assert!(c1.restrictions.max_rounds >= c2.restrictions.max_rounds);
    }

    #[test]
    fn shared_data_is_snapshot_not_live() {
        let m = manager();
        let (parent_exec, parent_call) = ids("parent");
        let parent_handle = m
            .create_nested_context(None, 1, &parent_exec, 1, &parent_call)
            .unwrap();
        assert!(m.set_shared(&parent_handle, "key", serde_json::json!("v1")));

        let (child_exec, child_call) = ids("child");
        let child_handle = m
            .create_nested_context(Some(&parent_call), 2, &child_exec, 2, &child_call)
            .unwrap();

        // Child snapshotted v1
        let child = m.get(&child_handle).unwrap();
        assert_eq!(child.shared_data["key"], "v1");

        // Parent mutates after creation; the child's copy must not move
        assert!(m.set_shared(&parent_handle, "key", serde_json::json!("v2")));
        let child = m.get(&child_handle).unwrap();
        assert_eq!(child.shared_data["key"], "v1", "copy-on-create, not live");
    }

    #[test]
    fn sharing_disabled_isolates_children() {
        let m = DelegationManager::new(DelegationConfig {
            cross_level_sharing: false,
            ..Default::default()
        });
        let (parent_exec, parent_call) = ids("parent");
        let parent_handle = m
            .create_nested_context(None, 1, &parent_exec, 1, &parent_call)
            .unwrap();
        assert!(m.set_shared(&parent_handle, "key", serde_json::json!("v1")));

        let (child_exec, child_call) = ids("child");
        let child_handle = m
            .create_nested_context(Some(&parent_call), 2, &child_exec, 2, &child_call)
            .unwrap();
        let child = m.get(&child_handle).unwrap();
        assert!(child.shared_data.is_empty(), "no ancestor data visible");
    }

    #[test]
    fn isolated_data_stays_private() {
        let m = manager();
        let (parent_exec, parent_call) = ids("parent");
        let parent_handle = m
            .create_nested_context(None, 1, &parent_exec, 1, &parent_call)
            .unwrap();
        assert!(m.set_isolated(&parent_handle, "scratch", serde_json::json!(42)));

        let (child_exec, child_call) = ids("child");
        let child_handle = m
            .create_nested_context(Some(&parent_call), 2, &child_exec, 2, &child_call)
            .unwrap();
        let child = m.get(&child_handle).unwrap();
        assert!(child.shared_data.get("scratch").is_none());
        assert!(child.isolated_data.is_empty());
    }

    #[test]
    fn level_path_tracks_ancestry() {
        let m = manager();
        let (root_exec, root_call) = ids("root");
        let _ = m
            .create_nested_context(None, 1, &root_exec, 1, &root_call)
            .unwrap();

        let (mid_exec, mid_call) = ids("mid");
        let _ = m
            .create_nested_context(Some(&root_call), 1, &mid_exec, 2, &mid_call)
            .unwrap();

        let (leaf_exec, leaf_call) = ids("leaf");
        let leaf_handle = m
            .create_nested_context(Some(&mid_call), 1, &leaf_exec, 3, &leaf_call)
            .unwrap();

        let leaf = m.get(&leaf_handle).unwrap();
        assert_eq!(leaf.level_path, vec![root_call, mid_call]);
    }

    #[test]
    fn child_limit_enforced() {
        let m = DelegationManager::new(DelegationConfig {
            max_children_per_context: 2,
            ..Default::default()
        });
        let (parent_exec, parent_call) = ids("parent");
        let _ = m
            .create_nested_context(None, 1, &parent_exec, 1, &parent_call)
            .unwrap();

        for i in 0..2 {
            let (exec, call) = ids(&format!("child{i}"));
            assert!(
                m.create_nested_context(Some(&parent_call), 1, &exec, 2, &call)
                    .is_ok()
            );
        }

        let (exec, call) = ids("child-over");
        let result = m.create_nested_context(Some(&parent_call), 1, &exec, 2, &call);
        assert_matches!(result, Err(DelegationError::ChildLimit { limit: 2, .. }));
    }

    #[test]
    fn hierarchy_queries() {
        let m = manager();
        let (parent_exec, parent_call) = ids("parent");
        let _ = m
            .create_nested_context(None, 1, &parent_exec, 1, &parent_call)
            .unwrap();

        let (a_exec, a_call) = ids("a");
        let (b_exec, b_call) = ids("b");
        let _ = m
            .create_nested_context(Some(&parent_call), 1, &a_exec, 2, &a_call)
            .unwrap();
        let _ = m
            .create_nested_context(Some(&parent_call), 1, &b_exec, 2, &b_call)
            .unwrap();

        assert_eq!(m.parent_of(a_call.as_str()), Some(parent_call.clone()));
        assert_eq!(
            m.children_of(parent_call.as_str()),
            vec![a_call.clone(), b_call.clone()]
        );
        assert_eq!(m.siblings_of(a_call.as_str()), vec![b_call]);
        assert!(m.siblings_of(parent_call.as_str()).is_empty());
    }

    #[test]
    fn stale_generation_does_not_resolve() {
        let m = manager();
        let (exec, call) = ids("a");
        let handle = m.create_nested_context(None, 1, &exec, 1, &call).unwrap();

        // A second context under the same execution id bumps the generation
        let (_, call2) = ids("b");
        let newer = m.create_nested_context(None, 1, &exec, 1, &call2).unwrap();

        assert!(m.get(&handle).is_none(), "stale handle must not resolve");
        assert!(m.get(&newer).is_some());
        assert!(!m.set_shared(&handle, "k", serde_json::json!(1)));
    }

    #[test]
    fn sweep_removes_expired() {
        let m = DelegationManager::new(DelegationConfig {
            retention_ms: 0,
            ..Default::default()
        });
        let (exec, call) = ids("a");
        let handle = m.create_nested_context(None, 1, &exec, 1, &call).unwrap();
        assert_eq!(m.len(), 1);

        let removed = m.sweep();
        assert_eq!(removed, 1);
        assert!(m.is_empty());
        assert!(m.get(&handle).is_none(), "swept handle must not resolve");
        assert!(m.context_for_call(call.as_str()).is_none());
    }

    #[test]
    fn sweep_keeps_fresh_contexts() {
        let m = manager(); // 1-hour retention
        let (exec, call) = ids("a");
        let _ = m.create_nested_context(None, 1, &exec, 1, &call).unwrap();
        assert_eq!(m.sweep(), 0);
        assert_eq!(m.len(), 1);
    }

    #[tokio::test]
    async fn sweeper_task_runs() {
        let m = Arc::new(DelegationManager::new(DelegationConfig {
            retention_ms: 0,
            ..Default::default()
        }));
        let (exec, call) = ids("a");
        let _ = m.create_nested_context(None, 1, &exec, 1, &call).unwrap();

        let sweeper = m.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.abort();

        assert!(m.is_empty(), "sweeper should have removed the expired context");
    }

    #[test]
    fn config_serde_defaults() {
        let config: DelegationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.retention_ms, 3_600_000);
        assert!(config.cross_level_sharing);
    }
}
