//! Integration tests for the store over a local directory

mod common;

use common::{p, pattern};
use std::io::Write;
use storekit::{
    Blocking, Buffer, CopyObject, Delete, Get, GetRanges, Head, List, Put, PutOptions, PutPayload,
    RangeEnds, Rename, Store, StoreError,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_multipart_round_trip_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Store::local(dir.path()).unwrap();
    let data = pattern(10_000);

    store
        .put(
            &p("nested/dir/blob.bin"),
            PutPayload::from(data.clone()),
            PutOptions::new().with_chunk_size(3000),
        )
        .await
        .unwrap();

    assert!(dir.path().join("nested/dir/blob.bin").is_file());
    let stored = store
        .get(&p("nested/dir/blob.bin"))
        .await
        .unwrap()
        .into_bytes()
        .await
        .unwrap();
    assert_eq!(&stored[..], &data[..]);

    // Part files are gone once the upload completes
    let listed = store.list(None).unwrap().collect().await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_file_payload() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.dat");
    let data = pattern(50_000);
    std::fs::write(&source, &data).unwrap();

    let root = dir.path().join("store");
    let store = Store::local(&root).unwrap();
    let payload = PutPayload::from_path(&source).await.unwrap();
    assert_eq!(payload.known_size(), Some(50_000));

    store
        .put(&p("copy.dat"), payload, PutOptions::new().with_chunk_size(16 * 1024))
        .await
        .unwrap();
    assert_eq!(store.head(&p("copy.dat")).await.unwrap().size, 50_000);
}

#[tokio::test]
async fn test_ranges_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Store::local(dir.path()).unwrap();
    let data = pattern(200_000);
    store
        .put(&p("big"), PutPayload::from(data.clone()), PutOptions::new())
        .await
        .unwrap();

    let buffers = store
        .get_ranges(
            &p("big"),
            &[150_000, 10, 70_000],
            RangeEnds::Lengths(&[100_000, 90, 5]),
        )
        .await
        .unwrap();

    assert_eq!(buffers[0].len(), 50_000);
    assert_eq!(&buffers[0][..], &data[150_000..]);
    assert_eq!(&buffers[1][..], &data[10..100]);
    assert_eq!(&buffers[2][..], &data[70_000..70_005]);
}

#[tokio::test]
async fn test_list_rename_delete_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Store::local(dir.path()).unwrap();
    for name in ["a/1", "a/2", "b/1"] {
        store
            .put(&p(name), PutPayload::from(name.to_string()), PutOptions::new())
            .await
            .unwrap();
    }

    let under_a = store.list(Some("a/")).unwrap().collect().await.unwrap();
    let names: Vec<String> = under_a.iter().map(|m| m.path.to_string()).collect();
    assert_eq!(names, vec!["a/1", "a/2"]);

    store.rename(&p("a/1"), &p("c/1"), false).await.unwrap();
    assert!(store.head(&p("a/1")).await.unwrap_err().is_not_found());

    let err = store.copy(&p("a/2"), &p("c/1"), false).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));

    store.delete(&p("c/1")).await.unwrap();
    let err = store.delete(&p("c/1")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_mode_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Store::local(dir.path()).unwrap();

    store
        .put(&p("once"), PutPayload::from("one"), PutOptions::new().create())
        .await
        .unwrap();
    let err = store
        .put(&p("once"), PutPayload::from("two"), PutOptions::new().create())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
}

#[tokio::test]
async fn test_staging_namespace_rejected() {
    let dir = TempDir::new().unwrap();
    let store = Store::local(dir.path()).unwrap();
    let reserved = p(".storekit/user.txt");

    let err = store
        .put(&reserved, PutPayload::from("hi"), PutOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig(_)));

    let err = store
        .put(
            &reserved,
            PutPayload::from(pattern(4000)),
            PutOptions::new().with_multipart(true).with_chunk_size(1000),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig(_)));

    store
        .put(&p("visible"), PutPayload::from("hi"), PutOptions::new())
        .await
        .unwrap();
    let err = store.copy(&p("visible"), &reserved, true).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig(_)));

    let listed = store.list(None).unwrap().collect().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].path, p("visible"));
}

#[tokio::test]
async fn test_deleted_prefix_is_reusable() {
    let dir = TempDir::new().unwrap();
    let store = Store::local(dir.path()).unwrap();

    store
        .put(&p("a/b"), PutPayload::from("nested"), PutOptions::new())
        .await
        .unwrap();
    store.delete(&p("a/b")).await.unwrap();
    store
        .put(&p("a"), PutPayload::from("flat"), PutOptions::new())
        .await
        .unwrap();

    store
        .put(&p("m/n/o"), PutPayload::from("deep"), PutOptions::new())
        .await
        .unwrap();
    store.rename(&p("m/n/o"), &p("o"), true).await.unwrap();
    store
        .put(&p("m"), PutPayload::from("flat"), PutOptions::new().create())
        .await
        .unwrap();

    let listed = store.list(None).unwrap().collect().await.unwrap();
    let names: Vec<String> = listed.iter().map(|m| m.path.to_string()).collect();
    assert_eq!(names, vec!["a", "m", "o"]);
}

#[test]
fn test_blocking_facade_over_disk() {
    let dir = TempDir::new().unwrap();
    let store = Blocking::new(Store::local(dir.path()).unwrap()).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&pattern(9000)).unwrap();
    let handle = file.reopen().unwrap();

    store
        .put_file(&p("from-file"), handle, PutOptions::new().with_chunk_size(4000))
        .unwrap();
    store
        .put_iter(
            &p("from-iter"),
            vec![Buffer::from(pattern(10)), Buffer::from(pattern(20))],
            PutOptions::new(),
        )
        .unwrap();

    let mut result = store.get(&p("from-file")).unwrap();
    assert_eq!(result.meta().unwrap().size, 9000);
    let total: usize = result.chunks().unwrap().map(|c| c.unwrap().len()).sum();
    assert_eq!(total, 9000);

    let ranges = store
        .get_ranges(&p("from-iter"), &[0, 25], RangeEnds::Ends(&[5, 30]))
        .unwrap();
    assert_eq!(ranges[0].len(), 5);
    assert_eq!(ranges[1].len(), 5);

    let mut pager = store.list_with_offset(None, None, Some(1)).unwrap();
    assert!(!pager.has_started());
    let first = pager.next().unwrap().unwrap();
    assert_eq!(first.len(), 1);
    assert!(pager.has_started());
    assert_eq!(pager.collect_all().unwrap().len(), 1);

    store.delete(&p("from-iter")).unwrap();
    assert!(store.head(&p("from-iter")).unwrap_err().is_not_found());
}
