//! Vector store lifecycle across reopened handles.

use std::fs::OpenOptions;
use std::io::Write;

use mediavec::config::{ClassificationConfig, StoreConfig};
use mediavec::vector::{
    ClassificationError, ClassificationResult, Classifier, FileVectorStore, PrototypeVector,
    StoreError, VectorDimension, VectorRecord, mean_prototype, normalize_l2, record_size,
};
use tempfile::TempDir;

const DIM: usize = 4;

fn dimension() -> VectorDimension {
    VectorDimension::new(DIM).unwrap()
}

fn unit(id: i64, raw: [f32; DIM]) -> VectorRecord {
    VectorRecord::new(id, 1_700_000_000_000 + id, normalize_l2(&raw))
}

#[test]
fn test_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("image_index.bin");

    let mut store = FileVectorStore::new(&path, dimension());
    store
        .add(vec![
            unit(1, [1.0, 0.0, 0.0, 0.0]),
            unit(2, [0.0, 1.0, 0.0, 0.0]),
        ])
        .unwrap();
    store.add(vec![unit(3, [0.0, 0.0, 1.0, 0.0])]).unwrap();

    let expected_len = 4 + 3 * record_size(dimension()) as u64;
    assert_eq!(std::fs::metadata(&path).unwrap().len(), expected_len);

    // a fresh handle has a cold cache and must decode the file
    let mut reopened = FileVectorStore::new(&path, dimension());
    let records = reopened.get().unwrap();
    assert_eq!(
        records.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(records[2].timestamp, 1_700_000_000_003);

    let ranked = reopened
        .query(&normalize_l2(&[0.1, 0.0, 1.0, 0.0]), 2, 0.0, None)
        .unwrap();
    assert_eq!(ranked[0], 3);
}

#[test]
fn test_removal_persists_and_keeps_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("index.bin");

    let mut store = FileVectorStore::new(&path, dimension());
    store
        .add((1..=5).map(|id| unit(id, [id as f32, 1.0, 0.0, 0.0])).collect())
        .unwrap();

    assert_eq!(store.remove(&[2, 4, 42]).unwrap(), 2);

    let mut reopened = FileVectorStore::new(&path, dimension());
    let ids: Vec<i64> = reopened.get().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3, 5]);

    // appends after a rewrite extend the rewritten file
    reopened.add(vec![unit(6, [0.0, 0.0, 0.0, 1.0])]).unwrap();
    let mut again = FileVectorStore::new(&path, dimension());
    assert_eq!(again.get().unwrap().len(), 4);
}

#[test]
fn test_corrupt_header_detected_by_new_handle() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("index.bin");

    let mut store = FileVectorStore::new(&path, dimension());
    store.add(vec![unit(1, [1.0, 0.0, 0.0, 0.0])]).unwrap();

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.write_all(&50_000u32.to_le_bytes()).unwrap();
    drop(file);

    let mut reopened = FileVectorStore::new(&path, dimension());
    assert!(matches!(reopened.get(), Err(StoreError::Corrupted { .. })));
}

#[test]
fn test_store_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig {
        path: temp_dir.path().join("from_config.bin"),
        dimension: DIM,
    };

    let mut store = FileVectorStore::from_config(&config).unwrap();
    assert_eq!(store.dimension().get(), DIM);
    store.add(vec![unit(1, [1.0, 1.0, 0.0, 0.0])]).unwrap();
    assert!(config.path.exists());

    let zero = StoreConfig {
        dimension: 0,
        ..config
    };
    assert!(FileVectorStore::from_config(&zero).is_err());
}

#[test]
fn test_classify_against_prototypes_built_from_store() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = FileVectorStore::new(temp_dir.path().join("index.bin"), dimension());

    // two classes: "cats" near axis 0, "dogs" near axis 1
    store
        .add(vec![
            unit(1, [1.0, 0.1, 0.0, 0.0]),
            unit(2, [1.0, 0.0, 0.1, 0.0]),
            unit(3, [0.1, 1.0, 0.0, 0.0]),
            unit(4, [0.0, 1.0, 0.0, 0.1]),
        ])
        .unwrap();

    let cats: Vec<Vec<f32>> = store
        .get_by_ids(&[1, 2])
        .unwrap()
        .into_iter()
        .map(|r| r.vector)
        .collect();
    let dogs: Vec<Vec<f32>> = store
        .get_by_ids(&[3, 4])
        .unwrap()
        .into_iter()
        .map(|r| r.vector)
        .collect();

    let classifier = Classifier::from_config(
        vec![
            PrototypeVector::new("cats", 0, mean_prototype(&cats).unwrap()),
            PrototypeVector::new("dogs", 0, mean_prototype(&dogs).unwrap()),
        ],
        &ClassificationConfig::default(),
    );

    match classifier
        .classify(&normalize_l2(&[0.9, 0.2, 0.0, 0.0]))
        .unwrap()
    {
        ClassificationResult::Success { class_id, similarity } => {
            assert_eq!(class_id, "cats");
            assert!(similarity > 0.9);
        }
        other => panic!("expected success, got {other:?}"),
    }

    // equidistant from both prototypes
    let ambiguous = classifier
        .classify(&normalize_l2(&[1.0, 1.0, 0.0, 0.0]))
        .unwrap();
    assert_eq!(
        ambiguous,
        ClassificationResult::Failure(ClassificationError::ConfidenceMargin)
    );

    // orthogonal to both
    let unrelated = classifier.classify(&[0.0, 0.0, 0.0, 1.0]).unwrap();
    assert!(!unrelated.is_success());
}
