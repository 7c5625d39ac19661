use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use nimble::{
    Batch, ColumnData, ColumnVector, Executor, FeatureSelector, FlatMapEntry,
    FlatMapLayoutPlanner, ReadParams, Reader, RowCountFlushPolicy, ScalarValues, SelectionMode,
    WriteOptions, Writer, train_file,
};
use nimble_common::MemoryPool;
use nimble_error::NimbleError;
use nimble_schema::{LogicalType, ScalarKind, SchemaNode};
use nimble_tablet::{InMemoryFile, ReadFile, Tablet};

fn int_schema() -> LogicalType {
    LogicalType::row([("v", LogicalType::scalar(ScalarKind::Int32))])
}

fn int_batch(values: Vec<i32>) -> Batch {
    Batch::from_columns(
        values.len(),
        [ColumnVector::scalar(ScalarValues::I32(values))],
    )
}

/// Thirty rows of `v = row index`, split into three stripes of ten.
fn three_stripe_file() -> Bytes {
    let pool = MemoryPool::default();
    let options =
        WriteOptions::default().with_flush_policy(Box::new(RowCountFlushPolicy::new(10)));
    let mut writer = Writer::new(&pool, &int_schema(), InMemoryFile::new(), options).unwrap();
    for start in [0, 10, 20] {
        writer.write(&int_batch((start..start + 10).collect())).unwrap();
    }
    writer.close().unwrap().into_bytes()
}

fn column_i32(batch: &Batch, index: usize) -> Vec<i32> {
    let ColumnData::Scalar(ScalarValues::I32(values)) = &batch.columns()[index].data else {
        panic!("expected i32 column");
    };
    values.clone()
}

#[test]
fn three_stripes_round_trip() {
    let bytes = three_stripe_file();
    let tablet = Tablet::open(Arc::new(bytes.clone())).unwrap();
    assert_eq!(tablet.stripe_count(), 3);
    assert_eq!(tablet.row_count(), 30);

    let pool = MemoryPool::default();
    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    let mut all = Vec::new();
    loop {
        let batch = reader.next(7).unwrap();
        if batch.row_count == 0 {
            break;
        }
        all.extend(column_i32(&batch, 0));
    }
    assert_eq!(all, (0..30).collect::<Vec<_>>());
}

// Spec scenario: after seek_to_row(15), next(10) stops at the stripe
// boundary with 5 rows; the following next(10) yields all of stripe 2.
#[test]
fn next_stops_at_stripe_boundaries() {
    let bytes = three_stripe_file();
    let pool = MemoryPool::default();
    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();

    assert_eq!(reader.seek_to_row(15).unwrap(), 15);
    let batch = reader.next(10).unwrap();
    assert_eq!(batch.row_count, 5);
    assert_eq!(column_i32(&batch, 0), (15..20).collect::<Vec<_>>());

    let batch = reader.next(10).unwrap();
    assert_eq!(batch.row_count, 10);
    assert_eq!(column_i32(&batch, 0), (20..30).collect::<Vec<_>>());
}

#[test]
fn skip_rows_returns_actual_count() {
    let bytes = three_stripe_file();
    let pool = MemoryPool::default();
    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    reader.seek_to_row(25).unwrap();
    assert_eq!(reader.skip_rows(100).unwrap(), 5);
    assert_eq!(reader.next(10).unwrap().row_count, 0);
}

#[test]
fn seek_is_stateless() {
    let bytes = three_stripe_file();
    let pool = MemoryPool::default();
    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    // Seeks land on the same row regardless of prior reader state.
    for row in [29u64, 0, 15, 7, 15, 29, 1] {
        reader.seek_to_row(row).unwrap();
        let batch = reader.next(1).unwrap();
        assert_eq!(column_i32(&batch, 0), vec![row as i32], "row {row}");
    }
}

// Spec scenario: a range covering only stripe 0's offset admits just that
// stripe; seeks clamp to its row count.
#[test]
fn range_read_admits_stripes_by_offset() {
    let bytes = three_stripe_file();
    let pool = MemoryPool::default();
    let mut reader = Reader::new(
        &pool,
        Arc::new(bytes.clone()),
        ReadParams::default().with_range(0, 1),
    )
    .unwrap();
    assert_eq!(reader.row_count(), 10);
    assert_eq!(reader.seek_to_row(20).unwrap(), 10);
    reader.seek_to_row(0).unwrap();
    let batch = reader.next(1000).unwrap();
    assert_eq!(batch.row_count, 10);
    assert_eq!(column_i32(&batch, 0), (0..10).collect::<Vec<_>>());
    assert_eq!(reader.next(1000).unwrap().row_count, 0);

    // A range holding no stripe offset reads nothing.
    let tablet = Tablet::open(Arc::new(bytes.clone())).unwrap();
    let after_first = tablet.stripe_offset(1);
    let mut empty = Reader::new(
        &pool,
        Arc::new(bytes),
        ReadParams::default().with_range(1, after_first),
    )
    .unwrap();
    assert_eq!(empty.row_count(), 0);
    assert_eq!(empty.seek_to_row(3).unwrap(), 0);
    assert_eq!(empty.next(10).unwrap().row_count, 0);
}

// Spec scenario: i8 values read as i64 sign-extend; reading them as a
// string fails with TypeMismatch.
#[test]
fn upcast_reads() {
    let pool = MemoryPool::default();
    let schema = LogicalType::row([("c", LogicalType::scalar(ScalarKind::Int8))]);
    let mut writer =
        Writer::new(&pool, &schema, InMemoryFile::new(), WriteOptions::default()).unwrap();
    let values: Vec<i8> = vec![-128, -1, 0, 1, 127];
    writer
        .write(&Batch::from_columns(
            5,
            [ColumnVector::scalar(ScalarValues::I8(values))],
        ))
        .unwrap();
    let bytes = writer.close().unwrap().into_bytes();

    let mut reader = Reader::new(
        &pool,
        Arc::new(bytes.clone()),
        ReadParams::default().with_column_type("c", ScalarKind::Int64),
    )
    .unwrap();
    let batch = reader.next(5).unwrap();
    let ColumnData::Scalar(ScalarValues::I64(widened)) = &batch.columns()[0].data else {
        panic!("expected i64 column");
    };
    assert_eq!(widened, &vec![-128i64, -1, 0, 1, 127]);

    let err = Reader::new(
        &pool,
        Arc::new(bytes),
        ReadParams::default().with_column_type("c", ScalarKind::String),
    )
    .and_then(|mut r| r.next(5));
    assert!(matches!(err, Err(NimbleError::TypeMismatch(_))));
}

#[test]
fn nullable_nested_round_trip() {
    let pool = MemoryPool::default();
    let schema = LogicalType::row([
        ("name", LogicalType::scalar(ScalarKind::String)),
        (
            "tags",
            LogicalType::Array(Box::new(LogicalType::scalar(ScalarKind::UInt16))),
        ),
        (
            "attrs",
            LogicalType::Map(
                Box::new(LogicalType::scalar(ScalarKind::String)),
                Box::new(LogicalType::scalar(ScalarKind::Float64)),
            ),
        ),
    ]);

    // Four rows; row 2 has a null array, row 3 a null map.
    let names = ColumnVector::nullable_scalar(
        ScalarValues::String(vec![
            Bytes::from_static(b"ada"),
            Bytes::from_static(b"grace"),
            Bytes::from_static(b"alan"),
        ]),
        vec![true, true, false, true],
    );
    let tags = ColumnVector {
        row_count: 4,
        nulls: Some(vec![true, true, false, true]),
        data: ColumnData::Array {
            lengths: vec![2, 0, 3],
            elements: Box::new(ColumnVector::scalar(ScalarValues::U16(vec![
                7, 9, 1, 2, 3,
            ]))),
        },
    };
    let attrs = ColumnVector {
        row_count: 4,
        nulls: Some(vec![true, true, true, false]),
        data: ColumnData::Map {
            lengths: vec![1, 2, 0],
            keys: Box::new(ColumnVector::scalar(ScalarValues::String(vec![
                Bytes::from_static(b"x"),
                Bytes::from_static(b"y"),
                Bytes::from_static(b"z"),
            ]))),
            values: Box::new(ColumnVector::scalar(ScalarValues::F64(vec![1.5, 2.5, 3.5]))),
        },
    };
    let batch = Batch::from_columns(4, [names, tags, attrs]);

    let mut writer =
        Writer::new(&pool, &schema, InMemoryFile::new(), WriteOptions::default()).unwrap();
    writer.write(&batch).unwrap();
    let bytes = writer.close().unwrap().into_bytes();

    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    let decoded = reader.next(4).unwrap();
    assert_eq!(decoded.row_count, 4);
    assert_eq!(decoded.columns(), batch.columns());
}

#[test]
fn chunked_stripes_round_trip() {
    struct ChunkEveryWrite;
    impl nimble::FlushPolicy for ChunkEveryWrite {
        fn should_flush(&mut self, _: &nimble::StripeProgress) -> nimble::FlushDecision {
            nimble::FlushDecision::Chunk
        }
    }

    let pool = MemoryPool::default();
    let options = WriteOptions::default().with_flush_policy(Box::new(ChunkEveryWrite));
    let mut writer = Writer::new(&pool, &int_schema(), InMemoryFile::new(), options).unwrap();
    for start in [0i32, 100, 200, 300] {
        writer.write(&int_batch((start..start + 50).collect())).unwrap();
    }
    let bytes = writer.close().unwrap().into_bytes();

    // One stripe, but each stream holds four chunks.
    let tablet = Tablet::open(Arc::new(bytes.clone())).unwrap();
    assert_eq!(tablet.stripe_count(), 1);
    assert_eq!(tablet.stripe_row_count(0), 200);

    let pool = MemoryPool::default();
    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    // Cross chunk boundaries mid-call.
    reader.seek_to_row(30).unwrap();
    let batch = reader.next(40).unwrap();
    assert_eq!(batch.row_count, 40);
    let expected: Vec<i32> = (30..50).chain(100..120).collect();
    assert_eq!(column_i32(&batch, 0), expected);
}

#[test]
fn metadata_round_trip() {
    let pool = MemoryPool::default();
    let options = WriteOptions::default()
        .with_metadata("writer.version", "nimble-rs-0.1")
        .with_metadata("origin", "tests");
    let mut writer = Writer::new(&pool, &int_schema(), InMemoryFile::new(), options).unwrap();
    writer.write(&int_batch(vec![1, 2, 3])).unwrap();
    let bytes = writer.close().unwrap().into_bytes();

    let reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    let metadata: HashMap<_, _> = reader.metadata().iter().cloned().collect();
    assert_eq!(metadata["writer.version"], "nimble-rs-0.1");
    assert_eq!(metadata["origin"], "tests");
}

fn flat_map_batch(rows: usize, keys: &[&str], row_offset: i64) -> Batch {
    let entries = keys
        .iter()
        .enumerate()
        .map(|(k, name)| FlatMapEntry {
            name: (*name).to_string(),
            in_map: vec![true; rows],
            values: ColumnVector::scalar(ScalarValues::I64(
                (0..rows as i64).map(|r| (row_offset + r) * 100 + k as i64).collect(),
            )),
        })
        .collect();
    Batch::from_columns(
        rows,
        [ColumnVector {
            row_count: rows,
            nulls: None,
            data: ColumnData::FlatMap { entries },
        }],
    )
}

fn flat_map_schema() -> LogicalType {
    LogicalType::row([(
        "features",
        LogicalType::Map(
            Box::new(LogicalType::scalar(ScalarKind::String)),
            Box::new(LogicalType::scalar(ScalarKind::Int64)),
        ),
    )])
}

fn flat_map_file(keys: &[&str]) -> Bytes {
    let pool = MemoryPool::default();
    let options = WriteOptions::default()
        .with_flat_map_column("features")
        .with_layout_planner(FlatMapLayoutPlanner::new(vec![(
            0,
            keys.iter().map(|k| k.to_string()).collect(),
        )]));
    let mut writer =
        Writer::new(&pool, &flat_map_schema(), InMemoryFile::new(), options).unwrap();
    writer.write(&flat_map_batch(20, keys, 0)).unwrap();
    writer.close().unwrap().into_bytes()
}

#[test]
fn flat_map_struct_read() {
    let keys: Vec<String> = (0..10).map(|k| k.to_string()).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let bytes = flat_map_file(&key_refs);

    let pool = MemoryPool::default();
    let selector = FeatureSelector {
        mode: SelectionMode::Include,
        features: vec!["1".into(), "3".into(), "5".into()],
    };
    let mut reader = Reader::new(
        &pool,
        Arc::new(bytes),
        ReadParams::default()
            .with_flat_map_as_struct("features")
            .with_feature_selector("features", selector),
    )
    .unwrap();
    let batch = reader.next(20).unwrap();
    assert_eq!(batch.row_count, 20);
    let ColumnData::Row { children } = &batch.columns()[0].data else {
        panic!("expected struct data for flat map");
    };
    assert_eq!(children.len(), 3);
    for (i, key) in [1i64, 3, 5].iter().enumerate() {
        let ColumnData::Scalar(ScalarValues::I64(values)) = &children[i].data else {
            panic!("expected i64 feature values");
        };
        let expected: Vec<i64> = (0..20).map(|r| r * 100 + key).collect();
        assert_eq!(values, &expected, "feature {key}");
    }
}

#[test]
fn flat_map_generic_map_read() {
    let bytes = flat_map_file(&["a", "b"]);
    let pool = MemoryPool::default();
    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    let batch = reader.next(20).unwrap();
    let ColumnData::Map {
        lengths,
        keys,
        values,
    } = &batch.columns()[0].data
    else {
        panic!("expected map data for flat map");
    };
    assert_eq!(lengths, &vec![2u32; 20]);
    let ColumnData::Scalar(ScalarValues::String(key_values)) = &keys.data else {
        panic!("expected string keys");
    };
    assert_eq!(key_values[0].as_ref(), b"a");
    assert_eq!(key_values[1].as_ref(), b"b");
    let ColumnData::Scalar(ScalarValues::I64(value_values)) = &values.data else {
        panic!("expected i64 values");
    };
    assert_eq!(value_values[0], 0);
    assert_eq!(value_values[1], 1);
    assert_eq!(value_values[2], 100);
}

#[test]
fn flat_map_keys_discovered_mid_stripe_backfill() {
    let pool = MemoryPool::default();
    let options = WriteOptions::default().with_flat_map_column("features");
    let mut writer =
        Writer::new(&pool, &flat_map_schema(), InMemoryFile::new(), options).unwrap();
    // Key "b" only appears from row 5 onwards.
    writer.write(&flat_map_batch(5, &["a"], 0)).unwrap();
    writer.write(&flat_map_batch(5, &["a", "b"], 5)).unwrap();
    let bytes = writer.close().unwrap().into_bytes();

    let mut reader = Reader::new(
        &pool,
        Arc::new(bytes),
        ReadParams::default().with_flat_map_as_struct("features"),
    )
    .unwrap();
    let batch = reader.next(10).unwrap();
    let ColumnData::Row { children } = &batch.columns()[0].data else {
        panic!("expected struct data");
    };
    // "b" is null for the first five rows.
    let b = &children[1];
    assert_eq!(
        b.nulls,
        Some(vec![
            false, false, false, false, false, true, true, true, true, true
        ])
    );
    let ColumnData::Scalar(ScalarValues::I64(values)) = &b.data else {
        panic!("expected i64 values");
    };
    assert_eq!(values, &vec![501, 601, 701, 801, 901]);
}

/// Wraps a byte source, recording every read range.
struct TrackingReadFile {
    inner: Bytes,
    reads: Mutex<Vec<(u64, usize)>>,
}

impl ReadFile for TrackingReadFile {
    fn size(&self) -> nimble_error::NimbleResult<u64> {
        self.inner.size()
    }

    fn read_at(&self, offset: u64, length: usize) -> nimble_error::NimbleResult<Bytes> {
        self.reads.lock().unwrap().push((offset, length));
        self.inner.read_at(offset, length)
    }
}

// Spec scenario: selecting three of ten flat-map keys must not read any
// byte range belonging to the other keys' streams.
#[test]
fn flat_map_projection_reads_only_selected_streams() {
    let keys: Vec<String> = (0..10).map(|k| k.to_string()).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let bytes = flat_map_file(&key_refs);

    // Gather the byte ranges of the unselected keys' streams.
    let tablet = Tablet::open(Arc::new(bytes.clone())).unwrap();
    let SchemaNode::Row { children, .. } = tablet.schema() else {
        panic!("expected struct root");
    };
    let SchemaNode::FlatMap {
        children: features, ..
    } = &children[0]
    else {
        panic!("expected flat map column");
    };
    let selected = ["1", "3", "5"];
    let mut forbidden: Vec<(u64, u64)> = Vec::new();
    let offsets = tablet.stream_offsets(0);
    let sizes = tablet.stream_sizes(0);
    let stripe_offset = tablet.stripe_offset(0);
    for feature in features {
        if selected.contains(&feature.name.as_str()) {
            continue;
        }
        let mut ids = vec![feature.in_map];
        feature.value.append_stream_offsets(&mut ids);
        for id in ids {
            let (offset, size) = (offsets[id as usize], sizes[id as usize]);
            if size > 0 {
                forbidden.push((
                    stripe_offset + u64::from(offset),
                    stripe_offset + u64::from(offset) + u64::from(size),
                ));
            }
        }
    }
    assert_eq!(forbidden.len(), 14, "7 unselected keys, in-map + values each");

    let tracker = Arc::new(TrackingReadFile {
        inner: bytes,
        reads: Mutex::new(Vec::new()),
    });
    let pool = MemoryPool::default();
    let mut reader = Reader::new(
        &pool,
        tracker.clone(),
        ReadParams::default()
            .with_flat_map_as_struct("features")
            .with_feature_selector(
                "features",
                FeatureSelector {
                    mode: SelectionMode::Include,
                    features: selected.iter().map(|s| s.to_string()).collect(),
                },
            ),
    )
    .unwrap();
    let batch = reader.next(20).unwrap();
    assert_eq!(batch.row_count, 20);

    let reads = tracker.reads.lock().unwrap();
    for (offset, length) in reads.iter() {
        let (start, end) = (*offset, offset + *length as u64);
        for (fstart, fend) in &forbidden {
            assert!(
                end <= *fstart || start >= *fend,
                "read [{start}, {end}) overlaps unselected stream [{fstart}, {fend})"
            );
        }
    }
}

#[test]
fn exclude_selector_drops_features() {
    let bytes = flat_map_file(&["a", "b", "c"]);
    let pool = MemoryPool::default();
    let mut reader = Reader::new(
        &pool,
        Arc::new(bytes),
        ReadParams::default()
            .with_flat_map_as_struct("features")
            .with_feature_selector(
                "features",
                FeatureSelector {
                    mode: SelectionMode::Exclude,
                    features: vec!["b".into()],
                },
            ),
    )
    .unwrap();
    let batch = reader.next(20).unwrap();
    let ColumnData::Row { children } = &batch.columns()[0].data else {
        panic!("expected struct data");
    };
    assert_eq!(children.len(), 2);
}

#[test]
fn dictionary_array_round_trip() {
    let pool = MemoryPool::default();
    let schema = LogicalType::row([(
        "tags",
        LogicalType::Array(Box::new(LogicalType::scalar(ScalarKind::UInt32))),
    )]);
    let options = WriteOptions::default().with_dictionary_array_column("tags");
    let mut writer = Writer::new(&pool, &schema, InMemoryFile::new(), options).unwrap();

    // Many consecutive repeats of the same array, then a change.
    let mut lengths = Vec::new();
    let mut elements = Vec::new();
    for row in 0..100u32 {
        let arr: Vec<u32> = if row < 60 { vec![1, 2, 3] } else { vec![9, 9] };
        lengths.push(arr.len() as u32);
        elements.extend(arr);
    }
    let column = ColumnVector {
        row_count: 100,
        nulls: None,
        data: ColumnData::Array {
            lengths: lengths.clone(),
            elements: Box::new(ColumnVector::scalar(ScalarValues::U32(elements.clone()))),
        },
    };
    writer.write(&Batch::from_columns(100, [column])).unwrap();
    let bytes = writer.close().unwrap().into_bytes();

    // Stored as offsets + lengths + deduplicated elements.
    let tablet = Tablet::open(Arc::new(bytes.clone())).unwrap();
    let SchemaNode::Row { children, .. } = tablet.schema() else {
        panic!("expected struct root");
    };
    assert!(matches!(children[0], SchemaNode::ArrayWithOffsets { .. }));

    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    // Seek into the run of repeats, then read across the change.
    reader.seek_to_row(50).unwrap();
    let batch = reader.next(20).unwrap();
    let ColumnData::Array {
        lengths: out_lengths,
        elements: out_elements,
    } = &batch.columns()[0].data
    else {
        panic!("expected array data");
    };
    assert_eq!(out_lengths, &lengths[50..70]);
    let ColumnData::Scalar(ScalarValues::U32(out_values)) = &out_elements.data else {
        panic!("expected u32 elements");
    };
    let expected: Vec<u32> = (50..70)
        .flat_map(|row| {
            if row < 60 {
                vec![1u32, 2, 3]
            } else {
                vec![9, 9]
            }
        })
        .collect();
    assert_eq!(out_values, &expected);
}

// Spec scenario: train on file A, write file B with the tree as hint; the
// captured layouts replay for streams of comparable shape.
#[test]
fn encoding_layout_capture_replay() {
    let pool = MemoryPool::default();

    // File A: runs of a few values.
    let mut writer =
        Writer::new(&pool, &int_schema(), InMemoryFile::new(), WriteOptions::default()).unwrap();
    let values_a: Vec<i32> = (0..2000).map(|i| i / 100).collect();
    writer.write(&int_batch(values_a)).unwrap();
    let bytes_a = writer.close().unwrap().into_bytes();

    let tree = train_file(Arc::new(bytes_a)).unwrap();

    // File B: same schema, comparable shape.
    let options = WriteOptions::default().with_encoding_layout_tree(tree.clone());
    let mut writer = Writer::new(&pool, &int_schema(), InMemoryFile::new(), options).unwrap();
    let values_b: Vec<i32> = (0..3000).map(|i| i / 150 + 7).collect();
    writer.write(&int_batch(values_b.clone())).unwrap();
    let bytes_b = writer.close().unwrap().into_bytes();

    // The hint is carried in B's footer, and B's values stream decodes with
    // the recorded kind.
    let tablet = Tablet::open(Arc::new(bytes_b.clone())).unwrap();
    assert_eq!(tablet.layout_tree(), Some(&tree));
    let trained_b = train_file(Arc::new(bytes_b.clone())).unwrap();
    let recorded = tree.child(0).unwrap().encoding_layout(0).unwrap();
    let replayed = trained_b.child(0).unwrap().encoding_layout(0).unwrap();
    assert_eq!(replayed.kind, recorded.kind);

    // And file B still round-trips.
    let mut reader = Reader::new(&pool, Arc::new(bytes_b), ReadParams::default()).unwrap();
    let batch = reader.next(3000).unwrap();
    assert_eq!(column_i32(&batch, 0), values_b);
}

#[test]
fn column_projection() {
    let pool = MemoryPool::default();
    let schema = LogicalType::row([
        ("a", LogicalType::scalar(ScalarKind::Int32)),
        ("b", LogicalType::scalar(ScalarKind::Int32)),
    ]);
    let mut writer =
        Writer::new(&pool, &schema, InMemoryFile::new(), WriteOptions::default()).unwrap();
    writer
        .write(&Batch::from_columns(
            3,
            [
                ColumnVector::scalar(ScalarValues::I32(vec![1, 2, 3])),
                ColumnVector::scalar(ScalarValues::I32(vec![4, 5, 6])),
            ],
        ))
        .unwrap();
    let bytes = writer.close().unwrap().into_bytes();

    let mut reader = Reader::new(
        &pool,
        Arc::new(bytes.clone()),
        ReadParams::default().with_columns(["b"]),
    )
    .unwrap();
    let batch = reader.next(3).unwrap();
    assert_eq!(batch.columns().len(), 1);
    assert_eq!(column_i32(&batch, 0), vec![4, 5, 6]);

    let missing = Reader::new(
        &pool,
        Arc::new(bytes),
        ReadParams::default().with_columns(["zzz"]),
    );
    assert!(matches!(missing, Err(NimbleError::SchemaMismatch(_))));
}

#[test]
fn parallel_encode_and_decode() {
    let pool = MemoryPool::default();
    let schema = LogicalType::row([
        ("a", LogicalType::scalar(ScalarKind::Int64)),
        ("b", LogicalType::scalar(ScalarKind::Float64)),
        ("c", LogicalType::scalar(ScalarKind::String)),
    ]);
    let options = WriteOptions::default().with_executor(Executor::parallel(4));
    let mut writer = Writer::new(&pool, &schema, InMemoryFile::new(), options).unwrap();
    let n = 500usize;
    let batch = Batch::from_columns(
        n,
        [
            ColumnVector::scalar(ScalarValues::I64((0..n as i64).collect())),
            ColumnVector::scalar(ScalarValues::F64((0..n).map(|i| i as f64 * 0.5).collect())),
            ColumnVector::scalar(ScalarValues::String(
                (0..n).map(|i| Bytes::from(format!("row-{i}"))).collect(),
            )),
        ],
    );
    writer.write(&batch).unwrap();
    let bytes = writer.close().unwrap().into_bytes();

    let mut reader = Reader::new(
        &pool,
        Arc::new(bytes),
        ReadParams::default().with_decoding_executor(Executor::parallel(4)),
    )
    .unwrap();
    let decoded = reader.next(n).unwrap();
    assert_eq!(decoded.columns(), batch.columns());
}

#[test]
fn empty_file_round_trip() {
    let pool = MemoryPool::default();
    let writer =
        Writer::new(&pool, &int_schema(), InMemoryFile::new(), WriteOptions::default()).unwrap();
    let bytes = writer.close().unwrap().into_bytes();
    let mut reader = Reader::new(&pool, Arc::new(bytes), ReadParams::default()).unwrap();
    assert_eq!(reader.row_count(), 0);
    assert_eq!(reader.next(10).unwrap().row_count, 0);
    assert_eq!(reader.skip_rows(10).unwrap(), 0);
    assert_eq!(reader.seek_to_row(5).unwrap(), 0);
}
