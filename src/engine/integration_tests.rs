//! Integration tests for the full experimentation pipeline.
//!
//! These cover cross-component behavior:
//! - create -> assign -> track -> decide -> rollout end to end
//! - assignment distribution over a large synthetic population
//! - client retry safety across the tracker and store
//! - archive terminality against every write path

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::store::{ExperimentStore, MemoryStore};
use crate::types::{
    EventSubmission, ExperimentDraft, ExperimentStatus, Recommendation, Tracked, UserProfile,
    Variant,
};
use crate::{ExperimentEngine, NoopNotifier};

fn new_engine() -> (ExperimentEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = ExperimentEngine::new(
        Arc::clone(&store) as Arc<dyn ExperimentStore>,
        Arc::new(NoopNotifier),
    );
    (engine, store)
}

fn draft(variants: Vec<Variant>, min_sample_size: u64, auto_rollout: bool) -> ExperimentDraft {
    ExperimentDraft {
        name: "premium_upsell".to_string(),
        hypothesis: "new copy lifts conversion".to_string(),
        variants,
        primary_metric: "conversion".to_string(),
        secondary_metrics: vec!["revenue".to_string()],
        min_sample_size,
        confidence_level: 0.95,
        duration_days: 14,
        target_segments: None,
        auto_rollout,
    }
}

fn user(id: &str) -> UserProfile {
    UserProfile::new(id, Utc::now() - Duration::days(30))
        .with_tier("free")
        .with_country("US")
}

fn rewind_start(store: &MemoryStore, test_id: &str, days: i64) {
    let mut exp = store.experiment(test_id).unwrap().unwrap();
    exp.start_date = exp.start_date - Duration::days(days);
    store.update_experiment(&exp).unwrap();
}

// =========================================================================
// End-to-end pipeline
// =========================================================================

#[tokio::test]
async fn test_full_pipeline_auto_rollout() {
    let (engine, store) = new_engine();
    let now = Utc::now();

    let exp = engine
        .create(
            draft(
                vec![
                    Variant::new("control", 50).with_config(json!({"cta": "Subscribe"})),
                    Variant::new("v1", 50).with_config(json!({"cta": "Go premium"})),
                ],
                1000,
                true,
            ),
            now,
        )
        .unwrap();

    // Enroll a population and split it by assigned variant.
    let mut control_users = Vec::new();
    let mut v1_users = Vec::new();
    for i in 0..4000 {
        let u = user(&format!("user-{i}"));
        let assigned = engine.variant_config(&u, &exp.id, now).unwrap().unwrap();
        match assigned.variant_id.as_str() {
            "control" => control_users.push(u.user_id),
            "v1" => v1_users.push(u.user_id),
            other => panic!("unexpected variant {other}"),
        }
    }
    assert!(control_users.len() >= 1000 && v1_users.len() >= 1000);

    // Control converts ~10%, v1 ~20%.
    for (i, uid) in control_users.iter().enumerate() {
        if i % 10 == 0 {
            let e = EventSubmission::conversion(format!("c-{uid}"), &exp.id, uid).with_amount(5.0);
            assert_eq!(engine.track(e, now).unwrap(), Tracked::Recorded);
        }
    }
    for (i, uid) in v1_users.iter().enumerate() {
        if i % 5 == 0 {
            let e = EventSubmission::conversion(format!("c-{uid}"), &exp.id, uid).with_amount(5.0);
            assert_eq!(engine.track(e, now).unwrap(), Tracked::Recorded);
        }
    }

    // Young test: duration gate holds even with a strong effect.
    let early = engine.check_for_winner(&exp.id, now).await.unwrap().unwrap();
    assert_eq!(early.winner, None);
    assert_eq!(early.recommendation, Recommendation::NeedMoreTime);
    assert_eq!(
        store.experiment(&exp.id).unwrap().unwrap().status,
        ExperimentStatus::Running
    );

    // A week later the winner is declared and rolled out.
    rewind_start(&store, &exp.id, 10);
    let analysis = engine.check_for_winner(&exp.id, now).await.unwrap().unwrap();
    assert_eq!(analysis.winner.as_deref(), Some("v1"));
    assert_eq!(analysis.recommendation, Recommendation::RollOutWinner);
    assert!(analysis.improvement > 50.0);

    let stored = store.experiment(&exp.id).unwrap().unwrap();
    assert_eq!(stored.status, ExperimentStatus::Completed);
    assert_eq!(stored.winner_variant_id.as_deref(), Some("v1"));

    let rollouts = store.winning_variants(&exp.id).unwrap();
    assert_eq!(rollouts.len(), 1);
    assert_eq!(rollouts[0].config, json!({"cta": "Go premium"}));

    // Completed experiment: new users get no assignment, existing users
    // keep theirs.
    let newcomer = user("late-user");
    assert!(engine
        .variant_config(&newcomer, &exp.id, now)
        .unwrap()
        .is_none());
    let existing = user(&v1_users[0]);
    assert_eq!(
        engine
            .variant_config(&existing, &exp.id, now)
            .unwrap()
            .unwrap()
            .variant_id,
        "v1"
    );
}

#[tokio::test]
async fn test_manual_rollout_leaves_experiment_running() {
    let (engine, store) = new_engine();
    let now = Utc::now();

    let exp = engine
        .create(
            draft(
                vec![Variant::new("control", 50), Variant::new("v1", 50)],
                100,
                false,
            ),
            now,
        )
        .unwrap();

    for i in 0..1000 {
        let u = user(&format!("user-{i}"));
        engine.variant_config(&u, &exp.id, now).unwrap();
    }
    let rows = store.variant_stats(&exp.id).unwrap();
    for row in &rows {
        let converts = if row.variant_id == "control" {
            row.users / 10
        } else {
            row.users / 4
        };
        for _ in 0..converts {
            store
                .apply_conversion(&exp.id, &row.variant_id, 1.0, now)
                .unwrap();
        }
    }
    rewind_start(&store, &exp.id, 10);

    let analysis = engine.check_for_winner(&exp.id, now).await.unwrap().unwrap();
    assert_eq!(analysis.winner.as_deref(), Some("v1"));

    let stored = store.experiment(&exp.id).unwrap().unwrap();
    assert_eq!(stored.status, ExperimentStatus::Running);
    assert!(store.winning_variants(&exp.id).unwrap().is_empty());
}

// =========================================================================
// Assignment distribution
// =========================================================================

#[test]
fn test_assignment_distribution_matches_weights() {
    let (engine, _store) = new_engine();
    let now = Utc::now();

    let exp = engine
        .create(
            draft(
                vec![
                    Variant::new("control", 50),
                    Variant::new("v1", 30),
                    Variant::new("v2", 20),
                ],
                1000,
                false,
            ),
            now,
        )
        .unwrap();

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut counts = std::collections::HashMap::new();
    const N: usize = 100_000;
    for _ in 0..N {
        let uid: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let assigned = engine
            .variant_config(&user(&uid), &exp.id, now)
            .unwrap()
            .unwrap();
        *counts.entry(assigned.variant_id).or_insert(0usize) += 1;
    }

    for (variant_id, weight) in [("control", 50.0), ("v1", 30.0), ("v2", 20.0)] {
        let observed_pct = *counts.get(variant_id).unwrap_or(&0) as f64 / N as f64 * 100.0;
        assert!(
            (observed_pct - weight).abs() <= 3.0,
            "{variant_id}: observed {observed_pct:.2}% vs configured {weight}%"
        );
    }
}

// =========================================================================
// Retry safety
// =========================================================================

#[test]
fn test_client_retries_do_not_double_count() {
    let (engine, store) = new_engine();
    let now = Utc::now();

    let exp = engine
        .create(
            draft(
                vec![Variant::new("control", 50), Variant::new("v1", 50)],
                100,
                false,
            ),
            now,
        )
        .unwrap();

    let u = user("u1");
    engine.variant_config(&u, &exp.id, now).unwrap().unwrap();

    let event = EventSubmission::conversion("order-789", &exp.id, "u1").with_amount(29.99);
    assert_eq!(engine.track(event.clone(), now).unwrap(), Tracked::Recorded);
    // The client retries the same submission three times.
    for _ in 0..3 {
        assert_eq!(engine.track(event.clone(), now).unwrap(), Tracked::Duplicate);
    }

    let total_conversions: u64 = store
        .variant_stats(&exp.id)
        .unwrap()
        .iter()
        .map(|r| r.conversions)
        .sum();
    let total_revenue: f64 = store
        .variant_stats(&exp.id)
        .unwrap()
        .iter()
        .map(|r| r.revenue)
        .sum();
    assert_eq!(total_conversions, 1);
    assert!((total_revenue - 29.99).abs() < 1e-9);
}

// =========================================================================
// Archive terminality
// =========================================================================

#[tokio::test]
async fn test_archive_blocks_every_write_path() {
    let (engine, _store) = new_engine();
    let now = Utc::now();

    let exp = engine
        .create(
            draft(
                vec![Variant::new("control", 50), Variant::new("v1", 50)],
                100,
                true,
            ),
            now,
        )
        .unwrap();

    let u = user("u1");
    engine.variant_config(&u, &exp.id, now).unwrap().unwrap();
    engine.archive(&exp.id).unwrap();

    // New assignments: silently none (not running).
    assert!(engine
        .variant_config(&user("u2"), &exp.id, now)
        .unwrap()
        .is_none());

    // Events: rejected by the store.
    let event = EventSubmission::conversion("e1", &exp.id, "u1");
    assert!(engine.track(event, now).is_err());

    // Winner checks: no-op.
    assert!(engine.check_for_winner(&exp.id, now).await.unwrap().is_none());

    // Status transitions: all invalid.
    assert!(engine.pause(&exp.id).is_err());
    assert!(engine.resume(&exp.id).is_err());
}
