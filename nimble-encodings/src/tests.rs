use bytes::Bytes;
use rstest::rstest;

use crate::{
    Decoder, EncodingKind, EncodingValue, Selector, encode_nullable_values, encode_values,
};

fn round_trip<T: EncodingValue + std::fmt::Debug>(values: &[T]) -> EncodingKind {
    let encoded = encode_values(&Selector::learned(), values).unwrap();
    let mut decoder = Decoder::<T>::new(Bytes::from(encoded.bytes)).unwrap();
    assert_eq!(decoder.row_count() as usize, values.len());
    assert_eq!(decoder.kind(), encoded.layout.kind);

    // One-shot materialisation.
    let mut out = Vec::new();
    decoder.materialize(values.len(), &mut out).unwrap();
    assert_eq!(out, values);
    assert_eq!(decoder.remaining(), 0);

    // Partitioned materialisation must agree.
    decoder.reset().unwrap();
    let mut partitioned = Vec::new();
    let mut remaining = values.len();
    let mut step = 1;
    while remaining > 0 {
        let take = step.min(remaining);
        decoder.materialize(take, &mut partitioned).unwrap();
        remaining -= take;
        step = step * 2 + 1;
    }
    assert_eq!(partitioned, values);

    // skip(a) then materialize(rest) equals the tail of the sequence.
    if values.len() > 2 {
        let a = values.len() / 3;
        decoder.reset().unwrap();
        decoder.skip(a).unwrap();
        let mut tail = Vec::new();
        decoder.materialize(values.len() - a, &mut tail).unwrap();
        assert_eq!(tail, &values[a..]);
    }

    encoded.layout.kind
}

#[test]
fn trivial_integers() {
    let values: Vec<i32> = (0..200).map(|i| i * 7919 % 163 - 80).collect();
    round_trip(&values);
}

#[test]
fn trivial_floats() {
    let values: Vec<f64> = (0..100).map(|i| i as f64 * 0.37).collect();
    round_trip(&values);
}

#[test]
fn constant_selected_for_single_value() {
    let kind = round_trip(&vec![42u64; 500]);
    assert_eq!(kind, EncodingKind::Constant);
}

#[test]
fn rle_selected_for_runs() {
    let mut values = Vec::new();
    for run in 0..20i64 {
        values.extend(std::iter::repeat(run % 5).take(50));
    }
    let kind = round_trip(&values);
    assert_eq!(kind, EncodingKind::Rle);
}

#[test]
fn dictionary_selected_for_low_cardinality_strings() {
    let words = [b"alpha".as_slice(), b"beta", b"gamma", b"delta"];
    let values: Vec<Bytes> = (0..400)
        .map(|i| Bytes::from_static(words[i * 31 % 4]))
        .collect();
    let kind = round_trip(&values);
    assert_eq!(kind, EncodingKind::Dictionary);
}

#[test]
fn mainly_constant_selected_for_dominant_value() {
    let values: Vec<u32> = (0..1000)
        .map(|i| if i % 10 == 3 { i as u32 } else { 7 })
        .collect();
    let kind = round_trip(&values);
    assert_eq!(kind, EncodingKind::MainlyConstant);
}

#[test]
fn sparse_bool_selected_for_rare_trues() {
    let values: Vec<bool> = (0..500).map(|i| i % 100 == 17).collect();
    let kind = round_trip(&values);
    assert_eq!(kind, EncodingKind::SparseBool);
}

#[test]
fn sparse_bool_selected_for_rare_falses() {
    let values: Vec<bool> = (0..500).map(|i| i % 100 != 17).collect();
    let kind = round_trip(&values);
    assert_eq!(kind, EncodingKind::SparseBool);
}

#[test]
fn fixed_bit_width_selected_for_narrow_range() {
    let values: Vec<u64> = (0..512).map(|i| 1_000_000 + (i * 37) % 1000).collect();
    let kind = round_trip(&values);
    assert_eq!(kind, EncodingKind::FixedBitWidth);
}

#[test]
fn signed_narrow_range_round_trips() {
    let values: Vec<i64> = (0..256).map(|i| -100 + (i % 50)).collect();
    round_trip(&values);
}

#[test]
fn mixed_strings_round_trip() {
    let values: Vec<Bytes> = (0..300)
        .map(|i| Bytes::from(format!("value-{}", i * 17 % 291)))
        .collect();
    round_trip(&values);
}

#[test]
fn empty_sequences() {
    round_trip::<u32>(&[]);
    round_trip::<bool>(&[]);
    round_trip::<Bytes>(&[]);
}

#[rstest]
#[case::empty(0)]
#[case::one(1)]
#[case::word_boundary(64)]
#[case::odd(97)]
fn bool_lengths(#[case] n: usize) {
    let values: Vec<bool> = (0..n).map(|i| i % 3 == 0).collect();
    round_trip(&values);
}

// Encode [T,T,T,F,F,T]: run lengths [3,2,1], first value true. After
// skip(4), the next two rows are [F,T].
#[test]
fn bool_rle_scenario() {
    let values = [true, true, true, false, false, true];
    let mut bytes = Vec::new();
    let layout = crate::rle::encode(&Selector::learned(), &values, &mut bytes).unwrap();
    assert_eq!(layout.kind, EncodingKind::Rle);

    let mut decoder = Decoder::<bool>::new(Bytes::from(bytes)).unwrap();
    let mut out = Vec::new();
    decoder.materialize(6, &mut out).unwrap();
    assert_eq!(out, values);

    decoder.reset().unwrap();
    decoder.skip(4).unwrap();
    let mut tail = Vec::new();
    decoder.materialize(2, &mut tail).unwrap();
    assert_eq!(tail, [false, true]);
}

#[test]
fn bool_rle_run_lengths_are_recursive() {
    let values = [true, true, true, false, false, true];
    let (lengths, _) = crate::rle::compute_runs(&values);
    assert_eq!(lengths, vec![3, 2, 1]);
}

#[test]
fn nullable_round_trip() {
    let presence: Vec<bool> = (0..100).map(|i| i % 3 != 0).collect();
    let values: Vec<i32> = (0..100)
        .filter(|i| i % 3 != 0)
        .map(|i| (i * 11) as i32)
        .collect();
    let encoded = encode_nullable_values(&Selector::learned(), &values, &presence).unwrap();
    assert_eq!(encoded.layout.kind, EncodingKind::Nullable);

    let mut decoder = Decoder::<i32>::new(Bytes::from(encoded.bytes)).unwrap();
    assert_eq!(decoder.row_count(), 100);
    let mut out = Vec::new();
    let mut nulls = Vec::new();
    decoder.materialize_nullable(100, &mut out, &mut nulls).unwrap();
    assert_eq!(nulls, presence);
    let mut next = values.iter();
    for (value, present) in out.iter().zip(&presence) {
        if *present {
            assert_eq!(value, next.next().unwrap());
        }
    }

    // Skipping consults the presence stream for the inner skip count.
    decoder.reset().unwrap();
    decoder.skip(50).unwrap();
    let mut tail = Vec::new();
    let mut tail_nulls = Vec::new();
    decoder
        .materialize_nullable(50, &mut tail, &mut tail_nulls)
        .unwrap();
    assert_eq!(tail_nulls, &presence[50..]);
}

#[test]
fn all_present_skips_nullable_wrapper() {
    let values: Vec<u16> = (0..50).collect();
    let presence = vec![true; 50];
    let encoded = encode_nullable_values(&Selector::learned(), &values, &presence).unwrap();
    assert_ne!(encoded.layout.kind, EncodingKind::Nullable);
}

#[test]
fn exhausted_decoder_rejected() {
    let encoded = encode_values(&Selector::learned(), &[1u8, 2, 3]).unwrap();
    let mut decoder = Decoder::<u8>::new(Bytes::from(encoded.bytes)).unwrap();
    let mut out = Vec::new();
    assert!(decoder.materialize(4, &mut out).is_err());
    // A failed request leaves the position untouched.
    decoder.materialize(3, &mut out).unwrap();
    assert_eq!(out, vec![1, 2, 3]);
}

#[test]
fn type_mismatch_rejected() {
    let encoded = encode_values(&Selector::learned(), &[1u32, 2, 3]).unwrap();
    assert!(Decoder::<u64>::new(Bytes::from(encoded.bytes)).is_err());
}

#[test]
fn truncated_payload_rejected() {
    let encoded = encode_values(&Selector::learned(), &(0..100u64).collect::<Vec<_>>()).unwrap();
    let truncated = Bytes::from(encoded.bytes).slice(0..40);
    assert!(Decoder::<u64>::new(truncated).is_err());
}

#[test]
fn unknown_kind_rejected() {
    let bytes = Bytes::from(vec![99u8, 0, 0, 0, 0, 0]);
    assert!(Decoder::<u8>::new(bytes).is_err());
}

#[test]
fn replay_reproduces_recorded_kinds() {
    // Runs of a handful of values: learned selection picks RLE.
    let mut values = Vec::new();
    for run in 0..40i32 {
        values.extend(std::iter::repeat(run % 3).take(25));
    }
    let trained = encode_values(&Selector::learned(), &values).unwrap();
    assert_eq!(trained.layout.kind, EncodingKind::Rle);

    // Replaying on comparable data reproduces the whole tree.
    let mut other = Vec::new();
    for run in 0..30i32 {
        other.extend(std::iter::repeat(run % 4).take(30));
    }
    let replayed = encode_values(&Selector::replay(trained.layout.clone()), &other).unwrap();
    assert_eq!(replayed.layout.kind, trained.layout.kind);
    assert_eq!(
        replayed.layout.children.len(),
        trained.layout.children.len()
    );

    // Incompatible data falls back to the learned policy.
    let constant = vec![5i32; 100];
    let fallback = encode_values(&Selector::replay(trained.layout), &constant).unwrap();
    assert_eq!(fallback.layout.kind, EncodingKind::Constant);
}

#[test]
fn replay_constant_requires_single_value() {
    let trained = encode_values(&Selector::learned(), &vec![9u8; 10]).unwrap();
    assert_eq!(trained.layout.kind, EncodingKind::Constant);
    let varied: Vec<u8> = (0..100).map(|i| (i % 250) as u8).collect();
    let encoded = encode_values(&Selector::replay(trained.layout), &varied).unwrap();
    assert_ne!(encoded.layout.kind, EncodingKind::Constant);
}
