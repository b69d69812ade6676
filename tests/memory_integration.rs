use chrono::{Duration, Utc};
use gng_memory::llm::{Message, MessageRole};
use gng_memory::memory::{
    MemoryConfig, MemoryError, MemoryManager, MergeOutcome, Snapshot, build_messages,
    cosine_similarity, find_most_similar,
};

fn memory() -> MemoryManager {
    MemoryManager::new(MemoryConfig::default()).expect("default config is valid")
}

/// Unit vector at `cos_theta` to the x axis.
fn at_similarity(cos_theta: f32) -> [f32; 2] {
    [cos_theta, (1.0 - cos_theta * cos_theta).sqrt()]
}

#[test]
fn test_lookup_on_empty_store_is_none() {
    let memory = memory();
    assert!(find_most_similar(memory.store(), &[1.0, 0.0]).is_none());
    assert!(memory.find_match(&[1.0, 0.0]).is_none());
}

#[test]
fn test_best_match_dominates_all_nodes() {
    let mut memory = MemoryManager::new(MemoryConfig {
        similarity_threshold: 0.99,
        ..Default::default()
    })
    .unwrap();
    let vectors: [[f32; 3]; 4] = [
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.6, 0.6, 0.2],
    ];
    for (i, v) in vectors.iter().enumerate() {
        memory
            .add_to_memory(v, format!("m{i}"), MessageRole::User)
            .unwrap();
    }
    assert_eq!(memory.len(), 4);

    let query = [0.5, 0.7, 0.1];
    let best = memory.find_most_similar(&query).unwrap();
    for node in memory.store().iter() {
        assert!(best.similarity >= cosine_similarity(&query, node.centroid()));
    }
}

#[test]
fn test_self_match_is_one() {
    let mut memory = memory();
    let outcome = memory
        .add_to_memory(&[0.3, -0.4, 0.5], "x", MessageRole::User)
        .unwrap();
    let node = memory.node(outcome.node()).unwrap();
    let best = memory.find_most_similar(node.centroid()).unwrap();
    assert_eq!(best.node, outcome.node());
    assert!((best.similarity - 1.0).abs() < 1e-6);
}

#[test]
fn test_similar_message_merges() {
    let mut memory = memory();
    let first = memory
        .add_to_memory(&[1.0, 0.0], "first", MessageRole::User)
        .unwrap();
    let second = memory
        .add_to_memory(&at_similarity(0.95), "second", MessageRole::User)
        .unwrap();

    assert!(matches!(second, MergeOutcome::Merged { similarity, .. } if similarity >= 0.8));
    assert_eq!(first.node(), second.node());
    assert_eq!(memory.len(), 1);

    let node = memory.node(first.node()).unwrap();
    let contents: Vec<&str> = node.messages().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[test]
fn test_dissimilar_message_splits() {
    let mut memory = memory();
    memory
        .add_to_memory(&[1.0, 0.0], "first", MessageRole::User)
        .unwrap();
    let second = memory
        .add_to_memory(&at_similarity(0.1), "second", MessageRole::User)
        .unwrap();

    assert!(!second.is_merge());
    assert_eq!(memory.len(), 2);
    for node in memory.store().iter() {
        assert_eq!(node.message_count(), 1);
    }
}

#[test]
fn test_threshold_boundary_is_inclusive() {
    let mut memory = MemoryManager::new(MemoryConfig {
        similarity_threshold: 0.0,
        ..Default::default()
    })
    .unwrap();
    memory
        .add_to_memory(&[1.0, 0.0], "a", MessageRole::User)
        .unwrap();
    let orthogonal = memory
        .add_to_memory(&[0.0, 1.0], "b", MessageRole::User)
        .unwrap();
    assert!(orthogonal.is_merge());
}

#[test]
fn test_history_is_bounded_after_many_merges() {
    let config = MemoryConfig::default();
    let k = config.max_messages;
    let mut memory = MemoryManager::new(config).unwrap();

    let mut node = None;
    for i in 0..k + 3 {
        let outcome = memory
            .add_to_memory(&[1.0, 0.0], format!("m{i}"), MessageRole::User)
            .unwrap();
        node = Some(outcome.node());
    }

    let node = memory.node(node.unwrap()).unwrap();
    assert_eq!(node.message_count(), k);
    let contents: Vec<String> = node.messages().map(|m| m.content.clone()).collect();
    let expected: Vec<String> = (3..k + 3).map(|i| format!("m{i}")).collect();
    assert_eq!(contents, expected);
    assert_eq!(node.merge_count(), (k + 3) as u64);
}

#[test]
fn test_decay_is_monotone_and_converges() {
    let mut memory = memory();
    let t0 = Utc::now();
    let id = memory
        .add_to_memory_at(&[3.0, 4.0], "x", MessageRole::User, t0)
        .unwrap()
        .node();

    let mut previous = memory.node(id).unwrap().norm();
    for step in 1..=20 {
        memory.decay_memory_at(t0 + Duration::seconds(step * 5));
        let node = memory.node(id).expect("retirement is off by default");
        let norm = node.norm();
        assert!(norm.is_finite());
        assert!(norm >= 0.0);
        assert!(norm <= previous);
        for c in node.centroid() {
            assert!(c.is_finite());
        }
        previous = norm;
    }
    assert!(previous < 1e-3);
}

#[test]
fn test_decay_passes_compose() {
    let t0 = Utc::now();
    let mut once = memory();
    let mut many = memory();
    let a = once
        .add_to_memory_at(&[1.0, 1.0], "x", MessageRole::User, t0)
        .unwrap()
        .node();
    let b = many
        .add_to_memory_at(&[1.0, 1.0], "x", MessageRole::User, t0)
        .unwrap()
        .node();

    once.decay_memory_at(t0 + Duration::seconds(12));
    for s in [3, 6, 9, 12] {
        many.decay_memory_at(t0 + Duration::seconds(s));
    }

    let expected = 2.0_f32.sqrt() * (-1.2_f32).exp();
    assert!((once.node(a).unwrap().norm() - expected).abs() < 1e-5);
    assert!((many.node(b).unwrap().norm() - expected).abs() < 1e-5);
}

#[test]
fn test_decay_does_not_change_best_match() {
    let mut memory = MemoryManager::new(MemoryConfig {
        retire_below_norm: 0.0,
        ..Default::default()
    })
    .unwrap();
    let t0 = Utc::now();
    let old = memory
        .add_to_memory_at(&[1.0, 0.0], "old", MessageRole::User, t0)
        .unwrap()
        .node();
    memory
        .add_to_memory_at(&[0.0, 1.0], "new", MessageRole::User, t0 + Duration::seconds(60))
        .unwrap();
    memory.decay_memory_at(t0 + Duration::seconds(60));

    let best = memory.find_most_similar(&[1.0, 0.1]).unwrap();
    assert_eq!(best.node, old);
}

#[test]
fn test_build_messages_with_three_history_entries() {
    let mut memory = memory();
    let id = memory
        .add_to_memory(&[1.0, 0.0], "h1", MessageRole::User)
        .unwrap()
        .node();
    memory
        .add_to_memory(&[1.0, 0.0], "h2", MessageRole::Assistant)
        .unwrap();
    memory
        .add_to_memory(&[1.0, 0.0], "h3", MessageRole::User)
        .unwrap();

    let messages = build_messages("S", "N", memory.node(id));
    assert_eq!(
        messages,
        vec![
            Message::system("S"),
            Message::user("N"),
            Message::user("h1"),
            Message::assistant("h2"),
            Message::user("h3"),
        ]
    );
}

#[test]
fn test_invalid_vectors_are_rejected() {
    let mut memory = MemoryManager::new(MemoryConfig {
        dimension: Some(2),
        ..Default::default()
    })
    .unwrap();

    assert!(matches!(
        memory.add_to_memory(&[1.0, 0.0, 0.0], "x", MessageRole::User),
        Err(MemoryError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
    assert!(matches!(
        memory.add_to_memory(&[f32::INFINITY, 0.0], "x", MessageRole::User),
        Err(MemoryError::InvalidVector(_))
    ));
    assert!(memory.is_empty());
}

#[test]
fn test_snapshot_round_trip() -> anyhow::Result<()> {
    let mut memory = memory();
    memory.add_to_memory(&[1.0, 0.0], "gardening", MessageRole::User)?;
    memory.add_to_memory(&[0.99, 0.05], "more gardening", MessageRole::User)?;
    memory.add_to_memory(&[0.0, 1.0], "taxes", MessageRole::User)?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("memory.json");
    Snapshot::capture(&memory).save(&path)?;

    let loaded = Snapshot::load(&path)?;
    assert!(loaded.scaler.is_some());
    let mut restored = loaded.restore(MemoryConfig::default())?;

    assert_eq!(restored.store(), memory.store());

    // new ids do not collide with restored ones
    let fresh = restored.add_to_memory(&[-1.0, 0.0], "new topic", MessageRole::User)?;
    assert_eq!(restored.len(), 3);
    assert!(memory.store().iter().all(|n| n.id() != fresh.node()));
    Ok(())
}

#[test]
fn test_restore_trims_history_to_new_limit() -> anyhow::Result<()> {
    let mut memory = memory();
    for i in 0..5 {
        memory.add_to_memory(&[1.0, 0.0], format!("m{i}"), MessageRole::User)?;
    }
    let restored = Snapshot::capture(&memory).restore(MemoryConfig {
        max_messages: 2,
        ..Default::default()
    })?;
    let node = restored.store().iter().next().unwrap();
    let contents: Vec<&str> = node.messages().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m3", "m4"]);
    Ok(())
}

#[test]
fn test_default_config_keeps_nodes_across_long_idle_restore() -> anyhow::Result<()> {
    let t0 = Utc::now() - Duration::days(1);
    let mut memory = memory();
    let id = memory
        .add_to_memory_at(&[0.6, 0.8], "yesterday", MessageRole::User, t0)?
        .node();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("memory.json");
    Snapshot::capture(&memory).save(&path)?;

    let mut restored = Snapshot::load(&path)?.restore(MemoryConfig::default())?;
    let report = restored.decay_memory_at(Utc::now());
    assert!(report.retired.is_empty());
    assert_eq!(restored.len(), 1);

    let outcome = restored.add_to_memory(&[0.6, 0.8], "today", MessageRole::User)?;
    match outcome {
        MergeOutcome::Merged { node, similarity } => {
            assert_eq!(node, id);
            assert!(similarity > 0.999);
        }
        other => panic!("expected a merge, got {other:?}"),
    }
    Ok(())
}
