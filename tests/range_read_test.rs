//! Integration tests for the range-read engine
//!
//! These tests verify coalescing, ordering, clamping and the concurrency cap
//! through an adapter that counts its calls.

mod common;

use common::{p, pattern, InstrumentedAdapter};
use std::sync::Arc;
use std::time::Duration;
use storekit::{
    ByteRange, Get, GetOptions, GetRange, GetRanges, RangeEnd, RangeEnds, Store, StoreConfig,
    StoreError,
};

async fn store_with(adapter: &InstrumentedAdapter, config: StoreConfig) -> Store {
    Store::with_config(Arc::new(adapter.clone()), config).unwrap()
}

#[tokio::test]
async fn test_nearby_ranges_share_one_fetch() {
    let adapter = InstrumentedAdapter::new();
    let data = pattern(1000);
    adapter.seed("obj", data.clone()).await;
    let store = store_with(&adapter, StoreConfig::default()).await;

    let buffers = store
        .get_ranges(&p("obj"), &[0, 150], RangeEnds::Ends(&[100, 250]))
        .await
        .unwrap();

    assert_eq!(adapter.count(|c| &c.fetch), 1);
    assert_eq!(buffers.len(), 2);
    assert_eq!(&buffers[0][..], &data[0..100]);
    assert_eq!(&buffers[1][..], &data[150..250]);

    // Both pieces are views into the same fetched buffer
    assert_eq!(buffers[1].as_ptr(), buffers[0].as_ptr().wrapping_add(150));
}

#[tokio::test]
async fn test_distant_ranges_keep_request_order() {
    let adapter = InstrumentedAdapter::new();
    let data = pattern(10_000);
    adapter.seed("obj", data.clone()).await;
    let config = StoreConfig {
        coalesce_threshold: 0,
        ..Default::default()
    };
    let store = store_with(&adapter, config).await;

    let starts = [9000, 10, 5000, 0];
    let lengths = [1000, 20, 100, 5];
    let buffers = store
        .get_ranges(&p("obj"), &starts, RangeEnds::Lengths(&lengths))
        .await
        .unwrap();

    // 0..5 and 10..30 are 5 bytes apart, so with a zero threshold 4 fetches remain
    assert_eq!(adapter.count(|c| &c.fetch), 4);
    for (i, buffer) in buffers.iter().enumerate() {
        let (s, n) = (starts[i] as usize, lengths[i] as usize);
        assert_eq!(&buffer[..], &data[s..s + n], "range {}", i);
    }
}

#[tokio::test]
async fn test_overlapping_ranges_return_independent_views() {
    let adapter = InstrumentedAdapter::new();
    let data = pattern(500);
    adapter.seed("obj", data.clone()).await;
    let store = store_with(&adapter, StoreConfig::default()).await;

    let buffers = store
        .get_ranges(&p("obj"), &[100, 0, 50], RangeEnds::Ends(&[300, 200, 60]))
        .await
        .unwrap();

    assert_eq!(adapter.count(|c| &c.fetch), 1);
    assert_eq!(&buffers[0][..], &data[100..300]);
    assert_eq!(&buffers[1][..], &data[0..200]);
    assert_eq!(&buffers[2][..], &data[50..60]);
}

#[tokio::test]
async fn test_concurrency_cap_across_calls() {
    let adapter = InstrumentedAdapter::new().with_fetch_delay(Duration::from_millis(20));
    adapter.seed("obj", pattern(100_000)).await;
    let config = StoreConfig {
        coalesce_threshold: 0,
        max_range_concurrency: 2,
        ..Default::default()
    };
    let store = store_with(&adapter, config).await;

    let starts: Vec<u64> = (0..8).map(|i| i * 10_000).collect();
    let lengths = vec![10u64; 8];

    let a = {
        let store = store.clone();
        let (starts, lengths) = (starts.clone(), lengths.clone());
        tokio::spawn(async move {
            store
                .get_ranges(&p("obj"), &starts, RangeEnds::Lengths(&lengths))
                .await
        })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .get_ranges(&p("obj"), &starts, RangeEnds::Lengths(&lengths))
                .await
        })
    };

    assert_eq!(a.await.unwrap().unwrap().len(), 8);
    assert_eq!(b.await.unwrap().unwrap().len(), 8);
    assert_eq!(adapter.count(|c| &c.fetch), 16);
    let peak = adapter.count(|c| &c.max_in_flight_fetch);
    assert!(peak <= 2, "peak in-flight fetches was {}", peak);
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_get_range_matches_content() {
    let adapter = InstrumentedAdapter::new();
    let data = pattern(1000);
    adapter.seed("obj", data.clone()).await;
    let store = store_with(&adapter, StoreConfig::default()).await;

    for (start, end) in [(0u64, 1u64), (0, 1000), (10, 20), (999, 1000), (500, 5000), (998, u64::MAX)] {
        let buffer = store
            .get_range(&p("obj"), start, RangeEnd::End(end))
            .await
            .unwrap();
        let expected_end = end.min(1000) as usize;
        assert_eq!(buffer.len(), expected_end - start as usize);
        assert_eq!(&buffer[..], &data[start as usize..expected_end]);
    }
}

#[tokio::test]
async fn test_invalid_ranges() {
    let adapter = InstrumentedAdapter::new();
    adapter.seed("obj", pattern(100)).await;
    let store = store_with(&adapter, StoreConfig::default()).await;

    // Malformed ranges never reach the backend
    let err = store
        .get_range(&p("obj"), 10, RangeEnd::End(10))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRange { .. }));
    let err = store
        .get_ranges(&p("obj"), &[0, 50], RangeEnds::Ends(&[10, 40]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRange { .. }));
    assert_eq!(adapter.count(|c| &c.fetch), 0);

    // Starting at or past the end is unsatisfiable
    let err = store
        .get_range(&p("obj"), 100, RangeEnd::Length(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRange { .. }));

    // Even when merged with a satisfiable neighbour
    let err = store
        .get_ranges(&p("obj"), &[90, 120], RangeEnds::Ends(&[100, 130]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRange { .. }));
}

#[tokio::test]
async fn test_mismatched_sequences_rejected() {
    let adapter = InstrumentedAdapter::new();
    adapter.seed("obj", pattern(100)).await;
    let store = store_with(&adapter, StoreConfig::default()).await;

    let err = store
        .get_ranges(&p("obj"), &[0, 10, 20], RangeEnds::Lengths(&[1, 2]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_empty_request_does_no_io() {
    let adapter = InstrumentedAdapter::new();
    let store = store_with(&adapter, StoreConfig::default()).await;

    let buffers = store
        .get_ranges(&p("missing"), &[], RangeEnds::Ends(&[]))
        .await
        .unwrap();
    assert!(buffers.is_empty());
    assert_eq!(adapter.count(|c| &c.fetch), 0);
}

#[tokio::test]
async fn test_suffix_and_offset_via_get() {
    let adapter = InstrumentedAdapter::new();
    let data = pattern(300);
    adapter.seed("obj", data.clone()).await;
    let store = store_with(&adapter, StoreConfig::default()).await;

    let mut whole = store
        .get_opts(&p("obj"), GetOptions::new().with_range(ByteRange::Suffix(10_000)))
        .await
        .unwrap();
    assert_eq!(whole.range().unwrap(), 0..300);
    assert_eq!(&whole.bytes().await.unwrap()[..], &data[..]);

    let mut tail = store
        .get_opts(&p("obj"), GetOptions::new().with_range(ByteRange::Suffix(7)))
        .await
        .unwrap();
    assert_eq!(&tail.bytes().await.unwrap()[..], &data[293..]);

    let mut from = store
        .get_opts(&p("obj"), GetOptions::new().with_range(ByteRange::Offset(250)))
        .await
        .unwrap();
    assert_eq!(from.range().unwrap(), 250..300);
    assert_eq!(from.bytes().await.unwrap().len(), 50);

    let err = store
        .get_opts(&p("obj"), GetOptions::new().with_range(ByteRange::Offset(300)))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRange { .. }));
}

#[tokio::test]
async fn test_missing_object() {
    let adapter = InstrumentedAdapter::new();
    let store = store_with(&adapter, StoreConfig::default()).await;

    let err = store
        .get_range(&p("nope"), 0, RangeEnd::Length(10))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
