//! Deterministic user-to-variant assignment.
//!
//! Buckets a user into 0..100 by hashing `user_id:test_id` with SHA-256
//! and walking the experiment's stored variant order by cumulative weight.
//! The same (user, test) pair always lands on the same variant, across
//! processes and restarts, with no coordination.
//!
//! Persistence is an insert-if-absent: under concurrent first-time calls
//! exactly one writer creates the row and owns the one-time `users`
//! counter increment; everyone else reads that row back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::logging::targets;
use crate::store::{AssignmentInsert, ExperimentStore};
use crate::types::{AssignedVariant, Assignment, ExperimentStatus, UserProfile};

/// Deterministic 0-99 bucket for a (user, test) pair.
///
/// First 4 bytes of `sha256(user_id ":" test_id)` as a big-endian u32,
/// reduced mod 100. Uniform across users and stable forever.
pub fn bucket_for(user_id: &str, test_id: &str) -> u8 {
    let digest = Sha256::digest(format!("{user_id}:{test_id}").as_bytes());
    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (head % 100) as u8
}

/// Assigns users to variants and persists the mapping.
pub struct AssignmentEngine {
    store: Arc<dyn ExperimentStore>,
}

impl AssignmentEngine {
    pub fn new(store: Arc<dyn ExperimentStore>) -> Self {
        Self { store }
    }

    /// Assign `user` to a variant of `test_id`, or return the existing
    /// assignment unchanged.
    ///
    /// Returns `Ok(None)` — never an error — when the experiment is not
    /// running, does not exist, or the user falls outside the target
    /// segments. Store unavailability is surfaced to the caller.
    pub fn assign(
        &self,
        user: &UserProfile,
        test_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AssignedVariant>> {
        // Existing assignments win over everything, including status
        // changes since the user was first bucketed.
        if let Some(existing) = self.store.assignment(&user.user_id, test_id)? {
            return Ok(Some(AssignedVariant::from(&existing)));
        }

        let Some(experiment) = self.store.experiment(test_id)? else {
            debug!(target: targets::ASSIGNMENT, test_id, "assign on unknown experiment");
            return Ok(None);
        };

        if experiment.status != ExperimentStatus::Running {
            return Ok(None);
        }

        if let Some(filter) = &experiment.target_segments {
            if !filter.matches(user, now) {
                debug!(
                    target: targets::ASSIGNMENT,
                    user_id = %user.user_id,
                    test_id,
                    "user outside target segments"
                );
                return Ok(None);
            }
        }

        let bucket = bucket_for(&user.user_id, test_id);
        let variant = experiment
            .variant_for_bucket(bucket)
            .ok_or_else(|| StoreError::Corrupt(format!("no variant covers bucket {bucket}")))?;

        let assignment = Assignment::new(
            &user.user_id,
            test_id,
            &variant.id,
            variant.config.clone(),
            now,
        );

        match self.store.insert_assignment_if_absent(assignment)? {
            AssignmentInsert::Inserted => {
                // This call created the row, so it owns the one-time
                // increment of the variant's user count.
                self.store.increment_users(test_id, &variant.id, now)?;
                debug!(
                    target: targets::ASSIGNMENT,
                    user_id = %user.user_id,
                    test_id,
                    variant_id = %variant.id,
                    bucket,
                    "assigned user to variant"
                );
                Ok(Some(AssignedVariant {
                    variant_id: variant.id.clone(),
                    config: variant.config.clone(),
                }))
            }
            AssignmentInsert::Existing(existing) => Ok(Some(AssignedVariant::from(&existing))),
        }
    }
}
