//! Identity manager — collision-free action-call identifiers.
//!
//! Models may emit colliding or reused ids across rounds, so every requested
//! action is re-keyed to an internally unique [`CallId`] under a configured
//! strategy. Each allocation is recorded as an [`ActionRecord`] with a
//! reverse mapping from the model-supplied id, and history is capped: once
//! the ceiling is exceeded, the oldest records are evicted together with
//! their reverse-mapping entries.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::trace;

use kestrel_core::calls::{ActionCall, ActionRecord, CallStatus};
use kestrel_core::ids::CallId;
use kestrel_core::reply::RequestedAction;

/// Allocation strategy for call ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Monotonically increasing counter (`call_1`, `call_2`, …).
    #[default]
    Sequential,
    /// Random unique token (UUID v7).
    Random,
    /// Timestamp plus disambiguating counter.
    Timestamp,
    /// `depth.ordinal`, derived by walking the parent chain.
    Hierarchical,
}

/// Identity manager configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    /// Allocation strategy.
    #[serde(default)]
    pub strategy: IdStrategy,
    /// Record-history ceiling; the oldest records are evicted past it.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

const fn default_max_records() -> usize {
    1024
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            strategy: IdStrategy::Sequential,
            max_records: default_max_records(),
        }
    }
}

/// Counts of records by status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityStats {
    /// Total live records.
    pub total: usize,
    /// Records pending dispatch.
    pub pending: usize,
    /// Records currently executing.
    pub executing: usize,
    /// Completed records.
    pub completed: usize,
    /// Failed records.
    pub failed: usize,
    /// Cancelled records.
    pub cancelled: usize,
}

/// Allocates unique call ids and tracks their records.
#[derive(Debug)]
pub struct IdentityManager {
    config: IdentityConfig,
    records: HashMap<String, ActionRecord>,
    /// Reverse map: model-supplied id → internal id (last allocation wins).
    by_original: HashMap<String, CallId>,
    /// Insertion order for eviction.
    order: VecDeque<String>,
    counter: u64,
}

impl IdentityManager {
    /// Create a manager.
    #[must_use]
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
            by_original: HashMap::new(),
            order: VecDeque::new(),
            counter: 0,
        }
    }

    /// Re-key a requested action into an [`ActionCall`] with a unique id,
    /// recording it (and its parent/child link) along the way.
    pub fn allocate(
        &mut self,
        requested: &RequestedAction,
        parent: Option<&CallId>,
    ) -> ActionCall {
        self.counter += 1;
        let sequence = self.counter;
        let id = CallId::from_string(self.mint_id(parent, sequence));

        let original_id = requested.id.clone();
        if let Some(ref original) = original_id {
            let _ = self.by_original.insert(original.clone(), id.clone());
        }

        if let Some(parent_id) = parent {
            if let Some(parent_record) = self.records.get_mut(parent_id.as_str()) {
                parent_record.child_ids.push(id.clone());
            }
        }

        let record = ActionRecord {
            id: id.clone(),
            original_id: original_id.clone(),
            name: requested.name.clone(),
            arguments: requested.arguments.clone(),
            parent_id: parent.cloned(),
            child_ids: Vec::new(),
            status: CallStatus::Pending,
            created_at: chrono::Utc::now().to_rfc3339(),
            sequence,
        };
        let _ = self.records.insert(id.as_str().to_owned(), record);
        self.order.push_back(id.as_str().to_owned());
        trace!(call_id = %id, name = %requested.name, "call id allocated");

        self.evict_over_ceiling();

        ActionCall {
            id,
            name: requested.name.clone(),
            arguments: requested.arguments.clone(),
            original_id,
        }
    }

    /// Find a record by internal id **or** model-supplied original id.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<&ActionRecord> {
        if let Some(record) = self.records.get(id) {
            return Some(record);
        }
        self.by_original
            .get(id)
            .and_then(|internal| self.records.get(internal.as_str()))
    }

    /// Update a record's status. Returns `false` for unknown ids.
    pub fn set_status(&mut self, id: &CallId, status: CallStatus) -> bool {
        match self.records.get_mut(id.as_str()) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether any records are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Counts by status.
    #[must_use]
    pub fn stats(&self) -> IdentityStats {
        let mut stats = IdentityStats {
            total: self.records.len(),
            ..Default::default()
        };
        for record in self.records.values() {
            match record.status {
                CallStatus::Pending => stats.pending += 1,
                CallStatus::Executing => stats.executing += 1,
                CallStatus::Completed => stats.completed += 1,
                CallStatus::Failed => stats.failed += 1,
                CallStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    fn mint_id(&self, parent: Option<&CallId>, sequence: u64) -> String {
        let candidate = match self.config.strategy {
            IdStrategy::Sequential => format!("call_{sequence}"),
            IdStrategy::Random => uuid::Uuid::now_v7().to_string(),
            IdStrategy::Timestamp => {
                format!("call_{}_{sequence}", chrono::Utc::now().timestamp_millis())
            }
            IdStrategy::Hierarchical => self.mint_hierarchical(parent),
        };
        // Uniqueness backstop for strategies that could collide
        if self.records.contains_key(&candidate) {
            format!("{candidate}_{sequence}")
        } else {
            candidate
        }
    }

    /// `depth.ordinal`: depth = ancestors walked to the root + 1, ordinal =
    /// 1-based child index under the parent (or root count at depth 1).
    fn mint_hierarchical(&self, parent: Option<&CallId>) -> String {
        match parent {
            Some(parent_id) => {
                let mut depth = 2u32;
                let mut cursor = self.records.get(parent_id.as_str());
                while let Some(record) = cursor {
                    match &record.parent_id {
                        Some(grandparent) => {
                            depth += 1;
                            cursor = self.records.get(grandparent.as_str());
                        }
                        None => break,
                    }
                }
                let ordinal = self
                    .records
                    .get(parent_id.as_str())
                    .map_or(1, |r| r.child_ids.len() + 1);
                format!("{depth}.{ordinal}")
            }
            None => {
                let roots = self
                    .records
                    .values()
                    .filter(|r| r.parent_id.is_none())
                    .count();
                format!("1.{}", roots + 1)
            }
        }
    }

    fn evict_over_ceiling(&mut self) {
        while self.records.len() > self.config.max_records {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(record) = self.records.remove(&oldest) {
                if let Some(original) = record.original_id {
                    // Only drop the reverse entry if it still points here;
                    // a reused original id may have been re-mapped since.
                    if self
                        .by_original
                        .get(&original)
                        .is_some_and(|id| id.as_str() == oldest)
                    {
                        let _ = self.by_original.remove(&original);
                    }
                }
                trace!(call_id = %oldest, "record evicted");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
