//! In-memory reference implementation of [`ExperimentStore`].
//!
//! Backs unit and integration tests, and is the executable definition of
//! the store contract (insert-if-absent, atomic adds, archived-id write
//! rejection). A single `RwLock` over the whole state keeps cross-table
//! invariants trivially linearizable; production backends replace this
//! with uniqueness constraints and atomic increments.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::errors::StoreError;
use crate::types::{
    Assignment, Event, EventKind, Experiment, ExperimentStatus, VariantStats, WinningVariant,
};

use super::{AssignmentInsert, ExperimentStore};

#[derive(Default)]
struct Inner {
    experiments: HashMap<String, Experiment>,
    /// Keyed on (user_id, test_id). Insert-if-absent only.
    assignments: HashMap<(String, String), Assignment>,
    /// Keyed on (test_id, variant_id).
    stats: HashMap<(String, String), VariantStats>,
    /// Append-only event log.
    events: Vec<Event>,
    /// Seen event ids per test, for idempotency.
    seen_event_ids: HashMap<String, HashSet<String>>,
    /// Append-only rollout history.
    winners: Vec<WinningVariant>,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("store lock poisoned: {e}")))
    }

    /// Number of persisted events (test helper).
    pub fn event_count(&self) -> usize {
        self.inner.read().map(|i| i.events.len()).unwrap_or(0)
    }
}

/// Reject writes once the stored experiment is archived.
fn check_writable(inner: &Inner, test_id: &str) -> Result<(), StoreError> {
    match inner.experiments.get(test_id) {
        None => Err(StoreError::ExperimentNotFound(test_id.to_string())),
        Some(exp) if exp.status == ExperimentStatus::Archived => {
            Err(StoreError::Archived(test_id.to_string()))
        }
        Some(_) => Ok(()),
    }
}

impl ExperimentStore for MemoryStore {
    fn insert_experiment(&self, experiment: Experiment) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let now = experiment.start_date;
        for variant in &experiment.variants {
            let key = (experiment.id.clone(), variant.id.clone());
            inner
                .stats
                .entry(key)
                .or_insert_with(|| VariantStats::zeroed(&experiment.id, &variant.id, now));
        }
        inner.experiments.insert(experiment.id.clone(), experiment);
        Ok(())
    }

    fn experiment(&self, test_id: &str) -> Result<Option<Experiment>, StoreError> {
        Ok(self.read()?.experiments.get(test_id).cloned())
    }

    fn update_experiment(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        match inner.experiments.get(&experiment.id) {
            None => return Err(StoreError::ExperimentNotFound(experiment.id.clone())),
            Some(stored) if stored.status == ExperimentStatus::Archived => {
                return Err(StoreError::Archived(experiment.id.clone()));
            }
            Some(_) => {}
        }
        inner
            .experiments
            .insert(experiment.id.clone(), experiment.clone());
        Ok(())
    }

    fn assignment(&self, user_id: &str, test_id: &str) -> Result<Option<Assignment>, StoreError> {
        let key = (user_id.to_string(), test_id.to_string());
        Ok(self.read()?.assignments.get(&key).cloned())
    }

    fn insert_assignment_if_absent(
        &self,
        assignment: Assignment,
    ) -> Result<AssignmentInsert, StoreError> {
        let mut inner = self.write()?;
        check_writable(&inner, &assignment.test_id)?;
        let key = (assignment.user_id.clone(), assignment.test_id.clone());
        if let Some(existing) = inner.assignments.get(&key) {
            return Ok(AssignmentInsert::Existing(existing.clone()));
        }
        inner.assignments.insert(key, assignment);
        Ok(AssignmentInsert::Inserted)
    }

    fn increment_users(
        &self,
        test_id: &str,
        variant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        check_writable(&inner, test_id)?;
        let key = (test_id.to_string(), variant_id.to_string());
        let row = inner
            .stats
            .get_mut(&key)
            .ok_or_else(|| StoreError::VariantNotFound {
                test_id: test_id.to_string(),
                variant_id: variant_id.to_string(),
            })?;
        row.users += 1;
        row.updated_at = now;
        Ok(())
    }

    fn record_event(&self, event: Event) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        check_writable(&inner, &event.test_id)?;
        let already_seen = inner
            .seen_event_ids
            .get(&event.test_id)
            .is_some_and(|seen| seen.contains(&event.event_id));
        if already_seen {
            return Ok(false);
        }
        // Apply counters before marking the id as seen: if the stats row
        // is missing, nothing commits and the submission stays retryable.
        let key = (event.test_id.clone(), event.variant_id.clone());
        let amount = event.amount.unwrap_or(0.0);
        let row = inner
            .stats
            .get_mut(&key)
            .ok_or_else(|| StoreError::VariantNotFound {
                test_id: event.test_id.clone(),
                variant_id: event.variant_id.clone(),
            })?;
        match event.kind {
            EventKind::Conversion => {
                row.conversions += 1;
                row.revenue += amount;
            }
            EventKind::Revenue => row.revenue += amount,
        }
        row.updated_at = event.created_at;
        inner
            .seen_event_ids
            .entry(event.test_id.clone())
            .or_default()
            .insert(event.event_id.clone());
        inner.events.push(event);
        Ok(true)
    }

    fn apply_conversion(
        &self,
        test_id: &str,
        variant_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        check_writable(&inner, test_id)?;
        let key = (test_id.to_string(), variant_id.to_string());
        let row = inner
            .stats
            .get_mut(&key)
            .ok_or_else(|| StoreError::VariantNotFound {
                test_id: test_id.to_string(),
                variant_id: variant_id.to_string(),
            })?;
        row.conversions += 1;
        row.revenue += amount;
        row.updated_at = now;
        Ok(())
    }

    fn apply_revenue(
        &self,
        test_id: &str,
        variant_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        check_writable(&inner, test_id)?;
        let key = (test_id.to_string(), variant_id.to_string());
        let row = inner
            .stats
            .get_mut(&key)
            .ok_or_else(|| StoreError::VariantNotFound {
                test_id: test_id.to_string(),
                variant_id: variant_id.to_string(),
            })?;
        row.revenue += amount;
        row.updated_at = now;
        Ok(())
    }

    fn variant_stats(&self, test_id: &str) -> Result<Vec<VariantStats>, StoreError> {
        let inner = self.read()?;
        let experiment = inner
            .experiments
            .get(test_id)
            .ok_or_else(|| StoreError::ExperimentNotFound(test_id.to_string()))?;
        // Snapshot in stored variant order; the decision tie-break
        // depends on it.
        let mut rows = Vec::with_capacity(experiment.variants.len());
        for variant in &experiment.variants {
            let key = (test_id.to_string(), variant.id.clone());
            if let Some(row) = inner.stats.get(&key) {
                rows.push(row.clone());
            }
        }
        Ok(rows)
    }

    fn push_winning_variant(&self, winner: WinningVariant) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        check_writable(&inner, &winner.test_id)?;
        inner.winners.push(winner);
        Ok(())
    }

    fn winning_variants(&self, test_id: &str) -> Result<Vec<WinningVariant>, StoreError> {
        Ok(self
            .read()?
            .winners
            .iter()
            .filter(|w| w.test_id == test_id)
            .cloned()
            .collect())
    }
}
