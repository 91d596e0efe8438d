use localrag_core::config::DistanceMetric;
use localrag_core::types::{Chunk, ChunkMeta, SearchOutcome};
use localrag_core::Error;
use localrag_vector::metric::{cosine_score, l2_score};
use localrag_vector::VectorIndex;
use tempfile::TempDir;

fn chunk(source: &str, idx: usize, v: Vec<f32>) -> Chunk {
    Chunk {
        id: format!("{source}:{idx}"),
        content: format!("{source} chunk {idx}"),
        embedding: v,
        metadata: ChunkMeta { source: source.to_string(), chunk_index: idx, start_offset: idx * 10 },
    }
}

fn sample_index(metric: DistanceMetric) -> VectorIndex {
    let index = VectorIndex::new("test-model", 3, metric).expect("index");
    index
        .add(vec![
            chunk("a.txt", 0, vec![1.0, 0.0, 0.0]),
            chunk("b.txt", 0, vec![0.0, 1.0, 0.0]),
            chunk("c.txt", 0, vec![0.7, 0.7, 0.0]),
            chunk("d.txt", 0, vec![-1.0, 0.0, 0.0]),
        ])
        .expect("add");
    index
}

#[test]
fn scores_stay_within_unit_interval() {
    for metric in [DistanceMetric::Cosine, DistanceMetric::L2 { midpoint: 1.0 }] {
        let index = sample_index(metric);
        let hits = index.search(&[0.3, -0.9, 0.2], 10, 0.0).expect("search").into_results();
        assert_eq!(hits.len(), 4);
        for h in hits {
            assert!((0.0..=1.0).contains(&h.score), "{metric:?} score {}", h.score);
        }
    }
    assert_eq!(cosine_score(&[0.0, 0.0], &[1.0, 0.0]), 0.5);
    assert!(l2_score(1000.0, 1.0) >= 0.0);
    assert!(l2_score(0.0, 1.0) > l2_score(2.0, 1.0));
}

#[test]
fn results_are_ordered_and_truncated() {
    let index = sample_index(DistanceMetric::Cosine);
    let hits = index.search(&[1.0, 0.0, 0.0], 2, 0.0).expect("search").into_results();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.metadata.source, "a.txt");
    assert_eq!(hits[1].chunk.metadata.source, "c.txt");
    assert!(hits[0].score >= hits[1].score);
}

#[test]
fn equal_scores_keep_insertion_order() {
    let index = VectorIndex::new("m", 2, DistanceMetric::Cosine).expect("index");
    index.add(vec![chunk("first", 0, vec![1.0, 0.0]), chunk("second", 0, vec![2.0, 0.0])]).expect("add");
    let hits = index.search(&[1.0, 0.0], 2, 0.0).expect("search").into_results();
    assert_eq!(hits[0].chunk.metadata.source, "first");
    assert_eq!(hits[1].chunk.metadata.source, "second");
}

#[test]
fn raising_threshold_never_adds_results() {
    let index = sample_index(DistanceMetric::Cosine);
    let q = [0.5, 0.5, 0.1];
    let mut prev = usize::MAX;
    for t in [0.0, 0.25, 0.5, 0.75, 0.9, 1.0] {
        let n = index.search(&q, 10, t).expect("search").len();
        assert!(n <= prev, "threshold {t} returned {n} > {prev}");
        prev = n;
    }
}

#[test]
fn nothing_above_threshold_is_empty_not_error() {
    let index = sample_index(DistanceMetric::Cosine);
    let outcome = index.search(&[1.0, 0.0, 0.0], 3, 1.01).expect("search");
    assert_eq!(outcome, SearchOutcome::Empty);

    let empty = VectorIndex::new("m", 3, DistanceMetric::Cosine).expect("index");
    assert!(empty.search(&[1.0, 0.0, 0.0], 3, 0.0).expect("search").is_empty());
}

#[test]
fn wrong_dimensions_and_zero_k_are_rejected() {
    let index = sample_index(DistanceMetric::Cosine);
    let err = index.add(vec![chunk("x", 0, vec![1.0, 2.0])]).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(index.len(), 4, "rejected batch leaves index untouched");
    assert!(matches!(index.search(&[1.0], 3, 0.0), Err(Error::Validation(_))));
    assert!(matches!(index.search(&[1.0, 0.0, 0.0], 0, 0.0), Err(Error::Validation(_))));
}

#[test]
fn clear_is_idempotent() {
    let index = sample_index(DistanceMetric::Cosine);
    index.clear();
    assert!(index.is_empty());
    index.clear();
    assert_eq!(index.len(), 0);
}

#[tokio::test]
async fn save_and_load_round_trip() {
    let tmp = TempDir::new().expect("tmp");
    let dir = tmp.path().join("index");
    let index = sample_index(DistanceMetric::L2 { midpoint: 1.5 });
    index.save(&dir).await.expect("save");
    assert!(dir.join("index.json").is_file());

    let loaded = VectorIndex::load(&dir).await.expect("load");
    assert_eq!(loaded.len(), 4);
    assert_eq!(loaded.model_id(), "test-model");
    assert_eq!(loaded.metric(), DistanceMetric::L2 { midpoint: 1.5 });

    let before = index.search(&[1.0, 0.0, 0.0], 4, 0.0).expect("search").into_results();
    let after = loaded.search(&[1.0, 0.0, 0.0], 4, 0.0).expect("search").into_results();
    let ids = |r: &[localrag_core::types::QueryResult]| r.iter().map(|h| h.chunk.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));
    assert_eq!(after[0].chunk.metadata.start_offset, 0);

    // Saving again overwrites instead of appending.
    loaded.save(&dir).await.expect("resave");
    assert_eq!(VectorIndex::load(&dir).await.expect("reload").len(), 4);
}

#[tokio::test]
async fn empty_index_round_trips() {
    let tmp = TempDir::new().expect("tmp");
    let index = VectorIndex::new("m", 8, DistanceMetric::Cosine).expect("index");
    index.save(tmp.path()).await.expect("save");
    let loaded = VectorIndex::load(tmp.path()).await.expect("load");
    assert!(loaded.is_empty());
    assert_eq!(loaded.dim(), 8);
}

#[tokio::test]
async fn missing_or_incompatible_index_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let err = VectorIndex::load(&tmp.path().join("missing")).await.err().expect("should fail");
    assert!(matches!(err, Error::NotFound(_)));

    let index = sample_index(DistanceMetric::Cosine);
    index.save(tmp.path()).await.expect("save");
    let err = VectorIndex::load_compatible(tmp.path(), "other-model", 3).await.err().expect("should fail");
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(VectorIndex::load_compatible(tmp.path(), "test-model", 3).await.is_ok());
}
