//! Timeline reconstruction integration tests.

mod common;

use recall::db;
use recall::models::RecordItem;
use recall::services::Anchor;
use recall::{AppState, Error};

/// Insert an observation with an explicit id and epoch.
async fn seed_observation(state: &AppState, id: i64, epoch: i64, title: &str) {
    sqlx::query(
        r#"
        INSERT INTO observations (id, session_id, project, kind, title, facts, concepts,
                                  files_read, files_modified, prompt_number, tokens,
                                  created_at, created_at_epoch)
        VALUES (?, 's-1', 'demo', 'change', ?, '[]', '[]', '[]', '[]', 1, 0, ?, ?)
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(epoch)
    .execute(&state.db)
    .await
    .unwrap();
}

fn observation_ids(timeline: &recall::services::Timeline) -> Vec<i64> {
    timeline
        .entries
        .iter()
        .filter_map(|e| match e {
            RecordItem::Observation(o) => Some(o.id),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn window_around_a_known_id() {
    let state = common::test_state().await;

    let base = 1_700_000_000_000_i64;
    for i in 0..=10 {
        seed_observation(&state, 100 + i, base + i * 1000, &format!("obs {}", i)).await;
    }

    let timeline = state
        .timeline
        .reconstruct(Anchor::ObservationId(105), 2, 2, None)
        .await
        .unwrap();

    assert_eq!(observation_ids(&timeline), vec![103, 104, 105, 106, 107]);
    assert_eq!(timeline.anchor_id, Some(105));
}

#[tokio::test]
async fn window_symmetry_bounds() {
    let state = common::test_state().await;

    let base = 1_700_000_000_000_i64;
    for i in 0..=10 {
        seed_observation(&state, 100 + i, base + i * 1000, &format!("obs {}", i)).await;
    }

    let depth_before = 3;
    let depth_after = 4;
    let timeline = state
        .timeline
        .reconstruct(Anchor::ObservationId(105), depth_before, depth_after, None)
        .await
        .unwrap();

    let ids = observation_ids(&timeline);
    let before = ids.iter().filter(|id| **id <= 105).count();
    let after = ids.iter().filter(|id| **id >= 105).count();
    assert!(before <= depth_before + 1);
    assert!(after <= depth_after + 1);

    // Merged output is non-decreasing in epoch
    let epochs: Vec<i64> = timeline.entries.iter().map(|e| e.created_at_epoch()).collect();
    for pair in epochs.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[tokio::test]
async fn single_observation_window_is_not_an_error() {
    let state = common::test_state().await;

    seed_observation(&state, 1, 1_700_000_000_000, "the only one").await;

    let timeline = state
        .timeline
        .reconstruct(Anchor::ObservationId(1), 5, 5, None)
        .await
        .unwrap();

    assert_eq!(observation_ids(&timeline), vec![1]);
    assert!(timeline
        .entries
        .iter()
        .all(|e| matches!(e, RecordItem::Observation(_))));
}

#[tokio::test]
async fn missing_anchor_id_is_not_found() {
    let state = common::test_state().await;

    let err = state
        .timeline
        .reconstruct(Anchor::ObservationId(12345), 2, 2, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn window_interleaves_all_record_types() {
    let state = common::test_state().await;

    let base = 1_700_000_000_000_i64;
    for i in 0..5 {
        seed_observation(&state, 10 + i, base + i * 10_000, &format!("obs {}", i)).await;
    }

    // A prompt and a summary inside the window (between obs 11 and 13)
    sqlx::query(
        "INSERT INTO user_prompts (session_id, prompt_number, text, created_at, created_at_epoch)
         VALUES ('s-1', 1, 'please dig in', ?, ?)",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(base + 15_000)
    .execute(&state.db)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO session_summaries (session_id, project, request, files_read, files_edited,
                                        prompt_number, created_at, created_at_epoch)
         VALUES ('s-1', 'demo', 'dug in', '[]', '[]', 1, ?, ?)",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(base + 25_000)
    .execute(&state.db)
    .await
    .unwrap();

    let timeline = state
        .timeline
        .reconstruct(Anchor::ObservationId(12), 2, 2, None)
        .await
        .unwrap();

    let has_prompt = timeline
        .entries
        .iter()
        .any(|e| matches!(e, RecordItem::UserPrompt(_)));
    let has_summary = timeline
        .entries
        .iter()
        .any(|e| matches!(e, RecordItem::SessionSummary(_)));
    assert!(has_prompt);
    assert!(has_summary);

    let epochs: Vec<i64> = timeline.entries.iter().map(|e| e.created_at_epoch()).collect();
    for pair in epochs.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[tokio::test]
async fn equal_epoch_tie_break_is_deterministic() {
    let state = common::test_state().await;

    let epoch = 1_700_000_000_000_i64;
    seed_observation(&state, 1, epoch, "same instant").await;
    sqlx::query(
        "INSERT INTO user_prompts (session_id, prompt_number, text, created_at, created_at_epoch)
         VALUES ('s-1', 1, 'same instant prompt', ?, ?)",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(epoch)
    .execute(&state.db)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO session_summaries (session_id, project, request, files_read, files_edited,
                                        prompt_number, created_at, created_at_epoch)
         VALUES ('s-1', 'demo', 'same instant summary', '[]', '[]', 1, ?, ?)",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(epoch)
    .execute(&state.db)
    .await
    .unwrap();

    let timeline = state
        .timeline
        .reconstruct(Anchor::ObservationId(1), 1, 1, None)
        .await
        .unwrap();

    // Prompt, then observation, then summary
    assert_eq!(timeline.entries.len(), 3);
    assert!(matches!(timeline.entries[0], RecordItem::UserPrompt(_)));
    assert!(matches!(timeline.entries[1], RecordItem::Observation(_)));
    assert!(matches!(timeline.entries[2], RecordItem::SessionSummary(_)));
}

#[tokio::test]
async fn session_anchor_uses_latest_summary_epoch() {
    let state = common::test_state().await;

    let internal_id = db::create_session(&state.db, "s-anchored", "demo", "work").await.unwrap();

    let base = 1_700_000_000_000_i64;
    for i in 0..5 {
        seed_observation(&state, 100 + i, base + i * 1000, &format!("obs {}", i)).await;
    }

    // Pin the summary between obs 102 and 103
    sqlx::query(
        "INSERT INTO session_summaries (session_id, project, request, files_read, files_edited,
                                        prompt_number, created_at, created_at_epoch)
         VALUES ('s-anchored', 'demo', 'wrap-up', '[]', '[]', 1, ?, ?)",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(base + 2500)
    .execute(&state.db)
    .await
    .unwrap();

    let timeline = state
        .timeline
        .reconstruct(Anchor::Session(internal_id), 1, 1, None)
        .await
        .unwrap();

    // The summary epoch sits between 102 and 103; depth+1 widening on each
    // side reaches 101 and 104
    assert_eq!(observation_ids(&timeline), vec![101, 102, 103, 104]);
}

#[tokio::test]
async fn timestamp_anchor_window() {
    let state = common::test_state().await;

    let base = 1_700_000_000_000_i64;
    for i in 0..5 {
        seed_observation(&state, 100 + i, base + i * 1000, &format!("obs {}", i)).await;
    }

    let timeline = state
        .timeline
        .reconstruct(Anchor::Timestamp(base + 2000), 1, 1, None)
        .await
        .unwrap();

    assert_eq!(observation_ids(&timeline), vec![101, 102, 103]);
}

#[tokio::test]
async fn query_anchor_resolves_through_semantic_search() {
    let state = common::test_state().await;

    let obs = db::store_observation(
        &state.db,
        "s-1",
        "demo",
        recall::models::ObservationDraft {
            kind: "bugfix".to_string(),
            title: "Fixed the scheduler deadlock".to_string(),
            subtitle: None,
            facts: vec![],
            narrative: None,
            concepts: vec![],
            files_read: vec![],
            files_modified: vec![],
            tokens: 0,
        },
        1,
    )
    .await
    .unwrap();
    state.sync.sync_observation(&obs).await.unwrap();

    let timeline = state
        .timeline
        .reconstruct(
            Anchor::Query("Fixed the scheduler deadlock".to_string()),
            2,
            2,
            None,
        )
        .await
        .unwrap();

    assert_eq!(timeline.anchor_id, Some(obs.id));
    assert!(observation_ids(&timeline).contains(&obs.id));
}

#[tokio::test]
async fn query_anchor_with_vector_index_down_is_empty() {
    let state = common::degraded_state().await;

    seed_observation(&state, 1, 1_700_000_000_000, "unreachable semantically").await;

    let timeline = state
        .timeline
        .reconstruct(Anchor::Query("unreachable".to_string()), 2, 2, None)
        .await
        .unwrap();

    assert!(timeline.entries.is_empty());
    assert_eq!(timeline.anchor_id, None);
}

#[tokio::test]
async fn project_filter_scopes_the_window() {
    let state = common::test_state().await;

    let base = 1_700_000_000_000_i64;
    seed_observation(&state, 1, base, "in demo").await;
    sqlx::query(
        r#"
        INSERT INTO observations (id, session_id, project, kind, title, facts, concepts,
                                  files_read, files_modified, prompt_number, tokens,
                                  created_at, created_at_epoch)
        VALUES (2, 's-2', 'other', 'change', 'in other', '[]', '[]', '[]', '[]', 1, 0, ?, ?)
        "#,
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(base + 500)
    .execute(&state.db)
    .await
    .unwrap();

    let timeline = state
        .timeline
        .reconstruct(Anchor::ObservationId(1), 5, 5, Some("demo"))
        .await
        .unwrap();

    assert_eq!(observation_ids(&timeline), vec![1]);
}
