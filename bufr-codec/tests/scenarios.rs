//! Worked-example scenarios exercising the engine end to end.

use bufr_codec::bitio::BitReader;
use bufr_codec::coder_state::CoderState;
use bufr_codec::engine::policy::EncodePolicy;
use bufr_codec::engine::walker::walk_template;
use bufr_codec::engine::{decode_subsets, encode_subsets};
use bufr_codec::section::{read_message, write_message, SectionFrame};
use bufr_codec::{ErrorKind, Value};
use bufr_tables::standard::seed_table_set;
use bufr_tables::{DescriptorId, TableSet};

fn id(s: &str) -> DescriptorId {
    DescriptorId::from_fxxyyy(s).unwrap()
}

fn tables() -> TableSet {
    seed_table_set()
}

#[test]
fn s1_single_uncompressed_subset_two_elements() {
    let tables = tables();
    let descriptors = vec![id("001001"), id("001002")];

    // 0000010 0000100 -> 2, 4 at 7 bits each.
    let data = [0b0000010_0, 0b000100_00];
    let reader = BitReader::new(&data);

    let subsets = decode_subsets(&tables, &descriptors, false, 1, reader).unwrap();
    assert_eq!(subsets[0].children[0].values[0], Value::Int(2));
    assert_eq!(subsets[0].children[1].values[0], Value::Int(4));
}

#[test]
fn s2_associated_field_precedes_element() {
    let tables = tables();
    // `204008` opens an 8-bit associated field over the descriptors that
    // follow, `031021` carries its own significance code (0 = no meaning
    // attached, so 031021 itself gets no associated field, being class 31),
    // then `012001` reads its associated field followed by its own value.
    let descriptors = vec![id("204008"), id("031021"), id("012001")];

    // 000000 (031021=0) 11001000 (assoc=200) 000000000101 (012001 raw=5).
    let data = [0b00000011u8, 0b00100000, 0b00000001, 0b01000000];
    let subsets = decode_subsets(&tables, &descriptors, false, 1, BitReader::new(&data)).unwrap();
    let subset = &subsets[0];

    assert_eq!(subset.children[0].values[0], Value::Int(0));
    assert_eq!(subset.children[1].values[0], Value::Float(0.5));

    let assoc = bufr_codec::AttributeKind::AssociatedField;
    let attached = subset.children[1].attributes.get(&assoc).expect("associated field attached");
    assert_eq!(attached.values[0], Value::Int(200));
}

#[test]
fn s3_delayed_replication_repeats_group_by_count() {
    let tables = tables();
    // 101000: F=1, XX=01 (one descriptor repeated), YYY=000 (delayed).
    let descriptors = vec![id("101000"), id("031001"), id("008042")];

    let mut encode_state = CoderState::new(false);
    let mut policy = EncodePolicy::new();

    let source = vec![bufr_codec::DataNode::container(
        bufr_codec::NodeDescriptor::Replication(id("101000")),
        (0..3)
            .map(|_| {
                bufr_codec::DataNode::container(
                    bufr_codec::NodeDescriptor::Replication(id("101000")),
                    vec![bufr_codec::DataNode::leaf(
                        bufr_codec::NodeDescriptor::Element(id("008042")),
                        vec![Value::Int(5)],
                    )],
                )
            })
            .collect(),
    )];
    // The count element itself occupies index 0 in a real walk; build a
    // minimal matching source: [count_node, replication_node].
    let full_source = vec![
        bufr_codec::DataNode::leaf(bufr_codec::NodeDescriptor::Element(id("031001")), vec![Value::Int(3)]),
    ]
    .into_iter()
    .chain(source)
    .collect::<Vec<_>>();

    let bytes = {
        walk_template(&tables, &descriptors, &mut encode_state, &mut policy, Some(full_source.as_slice())).unwrap();
        policy.into_bytes()
    };

    let mut decode_state = CoderState::new(false);
    let mut dec_policy = bufr_codec::engine::policy::DecodePolicy::new(BitReader::new(&bytes));
    let decoded = walk_template(&tables, &descriptors, &mut decode_state, &mut dec_policy, None).unwrap();

    assert_eq!(decoded[0].values[0], Value::Int(3));
    let replication = &decoded[1];
    assert_eq!(replication.children.len(), 3);
    for child in &replication.children {
        assert_eq!(child.children[0].values[0], Value::Int(5));
    }
}

#[test]
fn s4_compressed_min_delta_fan_out() {
    let tables = tables();
    let descriptors = vec![id("001001")];

    // min=0000000 (7 bits), nbits_delta=000011 (6 bits, =3), then four
    // 3-bit deltas 001 010 011 100 -> subset values 1, 2, 3, 4.
    let data = [0b00000000u8, 0b00011001, 0b01001110, 0b00000000];
    let subsets = decode_subsets(&tables, &descriptors, true, 4, BitReader::new(&data)).unwrap();

    assert_eq!(subsets.len(), 4);
    for (i, subset) in subsets.iter().enumerate() {
        assert_eq!(subset.children[0].values[0], Value::Int(i as i64 + 1));
    }
}

#[test]
fn s5_bitmap_marker_attaches_to_selected_candidates() {
    let tables = tables();
    // Three class-0 candidates, `222000` opens a quality-info bitmap over
    // the next three `031031` bits (0,1,0 => present = [001001, 001003]),
    // then the following replication supplies one marker value per present
    // candidate (012001 x2).
    let descriptors = vec![
        id("001001"),
        id("001002"),
        id("001003"),
        id("222000"),
        id("101003"),
        id("031031"),
        id("101002"),
        id("012001"),
    ];

    let data = [0b00000010u8, 0b00001000, 0b00011010, 0, 0, 0];
    let subsets = decode_subsets(&tables, &descriptors, false, 1, BitReader::new(&data)).unwrap();
    let subset = &subsets[0];

    assert_eq!(subset.children[0].values[0], Value::Int(1));
    assert_eq!(subset.children[1].values[0], Value::Int(2));
    assert_eq!(subset.children[2].values[0], Value::Int(3));

    let q_info = bufr_codec::AttributeKind::QInfo;
    assert!(subset.children[0].attributes.contains_key(&q_info));
    assert!(!subset.children[1].attributes.contains_key(&q_info));
    assert!(subset.children[2].attributes.contains_key(&q_info));
}

#[test]
fn s6_bad_terminator_is_rejected() {
    let frame = SectionFrame {
        edition: 4,
        master_table_version: 28,
        originating_centre: 98,
        local_table_version: 0,
        n_subsets: 1,
        compressed: false,
        observed: true,
        descriptors: vec![id("001001")],
    };

    let mut bytes = write_message(&frame, &[0u8]);
    let len = bytes.len();
    bytes[len - 4..].copy_from_slice(b"7776");

    let err = read_message(&bytes).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ValidationFailed(_)));
}

#[test]
fn compression_equivalence_matches_uncompressed_decode() {
    let tables = tables();
    let descriptors = vec![id("001001")];

    let mut enc = EncodePolicy::new();
    let mut state = CoderState::new(false);
    let subset = vec![bufr_codec::DataNode::leaf(
        bufr_codec::NodeDescriptor::Element(id("001001")),
        vec![Value::Int(9)],
    )];
    walk_template(&tables, &descriptors, &mut state, &mut enc, Some(subset.as_slice())).unwrap();
    let uncompressed_bytes = enc.into_bytes();

    let decoded_uncompressed =
        decode_subsets(&tables, &descriptors, false, 1, BitReader::new(&uncompressed_bytes)).unwrap();

    let roots = vec![bufr_codec::DataNode::container(bufr_codec::NodeDescriptor::Root, subset)];
    let compressed_bytes = encode_subsets(&tables, &descriptors, true, &roots).unwrap();
    let decoded_compressed =
        decode_subsets(&tables, &descriptors, true, 1, BitReader::new(&compressed_bytes)).unwrap();

    assert_eq!(
        decoded_uncompressed[0].children[0].values[0],
        decoded_compressed[0].children[0].values[0]
    );
}
