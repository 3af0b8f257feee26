//! Bidirectional codec for WMO BUFR (FM-94) binary messages.
//!
//! [`decode`] turns a raw message into a [`Message`] of typed [`DataNode`]
//! trees, one per subset; [`encode`] turns such a tree back into bytes.
//! Both directions drive the same [`engine::walker::walk_children`] control
//! flow (§4.4), differing only in which [`engine::policy::LeafPolicy`] reads
//! or writes each leaf.

#![forbid(unsafe_code)]

pub mod bitio;
pub mod coder_state;
pub mod compile;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod query;
pub mod section;
pub mod tree;
pub mod wiring;

#[cfg(feature = "logging")]
use log::debug;

pub use descriptor::{AttributeKind, MarkerKind, NodeDescriptor};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use query::{query_path, QueryError};
pub use tree::{DataNode, Message, Value};

use bitio::BitReader;
use bufr_tables::TableSet;

/// Decode one complete BUFR message (sections 0 through 5) against the
/// given tables.
pub fn decode(bytes: &[u8], tables: &TableSet) -> Result<Message> {
    let (frame, section4_bit_offset, _total_len) = section::read_message(bytes)?;

    #[cfg(feature = "logging")]
    debug!(
        "decoding message: {} subset(s), compressed={}",
        frame.n_subsets, frame.compressed
    );

    let mut reader = BitReader::new(bytes);
    reader.seek(section4_bit_offset);

    let subsets = engine::decode_subsets(
        tables,
        &frame.descriptors,
        frame.compressed,
        frame.n_subsets,
        reader,
    )?;

    Ok(Message {
        edition: frame.edition,
        originating_centre: frame.originating_centre,
        master_table_version: frame.master_table_version,
        local_table_version: frame.local_table_version,
        compressed: frame.compressed,
        descriptors: frame.descriptors,
        subsets,
    })
}

/// Encode a [`Message`] back to its binary representation.
pub fn encode(message: &Message, tables: &TableSet) -> Result<Vec<u8>> {
    let engine_bytes = engine::encode_subsets(
        tables,
        &message.descriptors,
        message.compressed,
        &message.subsets,
    )?;

    let mut section4_payload = Vec::with_capacity(engine_bytes.len() + 1);
    section4_payload.push(0); // reserved byte
    section4_payload.extend_from_slice(&engine_bytes);

    let frame = section::SectionFrame {
        edition: message.edition,
        master_table_version: message.master_table_version,
        originating_centre: message.originating_centre,
        local_table_version: message.local_table_version,
        n_subsets: message.subsets.len() as u16,
        compressed: message.compressed,
        observed: true,
        descriptors: message.descriptors.clone(),
    };

    Ok(section::write_message(&frame, &section4_payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufr_tables::standard::seed_table_set;
    use descriptor::NodeDescriptor;
    use tree::{DataNode, Value};

    #[test]
    fn encode_then_decode_roundtrips_a_single_subset_message() {
        let tables = seed_table_set();
        let descriptor = bufr_tables::DescriptorId::from_fxxyyy("001001").unwrap();

        let subset = DataNode::container(
            NodeDescriptor::Root,
            vec![DataNode::leaf(NodeDescriptor::Element(descriptor), vec![Value::Int(42)])],
        );

        let message = Message {
            edition: 4,
            originating_centre: 98,
            master_table_version: 28,
            local_table_version: 0,
            compressed: false,
            descriptors: vec![descriptor],
            subsets: vec![subset],
        };

        let bytes = encode(&message, &tables).unwrap();
        let decoded = decode(&bytes, &tables).unwrap();

        assert_eq!(decoded.subsets.len(), 1);
        assert_eq!(decoded.subsets[0].children[0].values[0], Value::Int(42));
        assert_eq!(decoded.originating_centre, 98);
    }
}
