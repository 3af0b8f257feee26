//! The Template Processing Engine (component E) and its compressed-subset
//! realisation (component §4.3): drives [`walker::walk_template`] once per
//! subset (uncompressed) or once overall plus a per-subset replay
//! (compressed).

pub mod policy;
pub mod walker;

use crate::bitio::{is_missing_numeric, is_missing_string, BitReader, BitWriter};
use crate::coder_state::CoderState;
use crate::descriptor::NodeDescriptor;
use crate::error::Result;
use crate::tree::{DataNode, Value};
use bufr_tables::{DescriptorId, TableSet};
use policy::{value_to_numeric, value_to_raw, DecodePolicy, EncodePolicy, Hint, LeafPolicy};
use std::collections::VecDeque;
use walker::walk_template;

/// Reads leaf values in the compressed wire layout (§4.3), fanning each one
/// out into `n_subsets` values while also recording the structural
/// (non-fanned) values the same walk consumes for replication counts,
/// associated fields and `203YYY` captures.
struct CapturePolicy<'a> {
    reader: BitReader<'a>,
    n_subsets: usize,
    leaves: Vec<Vec<Value>>,
    structural: Vec<Value>,
}

impl<'a> CapturePolicy<'a> {
    fn new(reader: BitReader<'a>, n_subsets: usize) -> Self {
        Self {
            reader,
            n_subsets,
            leaves: Vec::new(),
            structural: Vec::new(),
        }
    }

    fn into_reader(self) -> BitReader<'a> {
        self.reader
    }

    fn capture_numeric(&mut self, nbits: u32, scale: i32, reference: i64) -> Result<Vec<Value>> {
        let min = self.reader.read_uint(nbits)?;
        let nbits_delta = self.reader.read_uint(6)? as u32;
        let mut values = Vec::with_capacity(self.n_subsets);

        if is_missing_numeric(min, nbits) {
            values.resize(self.n_subsets, Value::None);
        } else if nbits_delta == 0 {
            values.resize(self.n_subsets, value_to_numeric(min, nbits, scale, reference));
        } else {
            for _ in 0..self.n_subsets {
                let delta = self.reader.read_uint(nbits_delta)?;
                values.push(value_to_numeric(min + delta, nbits, scale, reference));
            }
        }

        Ok(values)
    }

    fn capture_string(&mut self, nbits: u32) -> Result<Vec<Value>> {
        let common_bytes = self.reader.read_bytes(nbits)?;
        let nbytes_delta = self.reader.read_uint(6)? as usize;
        let common = string_value(&common_bytes);
        let mut values = Vec::with_capacity(self.n_subsets);

        if nbytes_delta == 0 {
            values.resize(self.n_subsets, common);
        } else {
            for _ in 0..self.n_subsets {
                let bytes = self.reader.read_bytes(nbytes_delta as u32 * 8)?;
                values.push(string_value(&bytes));
            }
        }

        Ok(values)
    }
}

fn string_value(bytes: &[u8]) -> Value {
    if is_missing_string(bytes) {
        return Value::None;
    }

    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Value::Str(s.trim_end().to_string()),
        Err(_) => Value::Bytes(bytes.to_vec()),
    }
}

impl LeafPolicy for CapturePolicy<'_> {
    fn numeric(&mut self, nbits: u32, scale: i32, reference: i64, _hint: Hint<'_>) -> Result<Value> {
        let values = self.capture_numeric(nbits, scale, reference)?;
        let first = values.first().cloned().unwrap_or(Value::None);
        self.leaves.push(values);
        Ok(first)
    }

    fn string(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        let values = self.capture_string(nbits)?;
        let first = values.first().cloned().unwrap_or(Value::None);
        self.leaves.push(values);
        Ok(first)
    }

    fn codeflag(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        let values = self.capture_numeric(nbits, 0, 0)?;
        let first = values.first().cloned().unwrap_or(Value::None);
        self.leaves.push(values);
        Ok(first)
    }

    fn raw(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        let raw = self.reader.read_uint(nbits)?;
        let value = Value::Int(raw as i64);
        self.structural.push(value.clone());
        Ok(value)
    }

    fn signed(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        let value = Value::Int(self.reader.read_int(nbits)?);
        self.structural.push(value.clone());
        Ok(value)
    }
}

/// Replays one subset's worth of values out of a [`CapturePolicy`]'s
/// results, writing no bits and reading no stream.
struct ReplayPolicy {
    leaves: VecDeque<Vec<Value>>,
    structural: VecDeque<Value>,
    subset_index: usize,
}

impl LeafPolicy for ReplayPolicy {
    fn numeric(&mut self, _nbits: u32, _scale: i32, _reference: i64, _hint: Hint<'_>) -> Result<Value> {
        Ok(self
            .leaves
            .pop_front()
            .and_then(|v| v.get(self.subset_index).cloned())
            .unwrap_or(Value::None))
    }

    fn string(&mut self, _nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        self.numeric(0, 0, 0, None)
    }

    fn codeflag(&mut self, _nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        self.numeric(0, 0, 0, None)
    }

    fn raw(&mut self, _nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        Ok(self.structural.pop_front().unwrap_or(Value::Int(0)))
    }

    fn signed(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        self.raw(nbits, hint)
    }
}

/// Mirrors an existing subset's values back without writing bits, recording
/// the numeric/string/codeflag leaves in visitation order for compressed
/// re-encoding.
struct CollectPolicy {
    leaves: Vec<Value>,
}

impl LeafPolicy for CollectPolicy {
    fn numeric(&mut self, _nbits: u32, _scale: i32, _reference: i64, hint: Hint<'_>) -> Result<Value> {
        let v = hint.cloned().unwrap_or(Value::None);
        self.leaves.push(v.clone());
        Ok(v)
    }

    fn string(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        self.numeric(nbits, 0, 0, hint)
    }

    fn codeflag(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        self.numeric(nbits, 0, 0, hint)
    }

    fn raw(&mut self, _nbits: u32, hint: Hint<'_>) -> Result<Value> {
        Ok(hint.cloned().unwrap_or(Value::Int(0)))
    }

    fn signed(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        self.raw(nbits, hint)
    }
}

/// Writes compressed-layout leaves from a transposed `[leaf][subset]` value
/// matrix, structural (non-fanned) values from `hint` as ordinary
/// [`EncodePolicy`] would.
struct CompressedEncodePolicy {
    writer: BitWriter,
    columns: VecDeque<Vec<Value>>,
}

fn bits_needed(max: u64) -> u32 {
    if max == 0 {
        1
    } else {
        64 - max.leading_zeros()
    }
}

impl CompressedEncodePolicy {
    fn write_numeric_column(&mut self, nbits: u32, scale: i32, reference: i64) {
        let column = self.columns.pop_front().unwrap_or_default();
        let all_missing = column.iter().all(|v| matches!(v, Value::None));

        if all_missing || column.is_empty() {
            self.writer.write_missing(nbits);
            self.writer.write_uint(6, 0);
            return;
        }

        let raws: Vec<Option<u64>> = column
            .iter()
            .map(|v| match v {
                Value::None => None,
                other => Some(value_to_raw(other, scale, reference, nbits)),
            })
            .collect();

        let min = raws.iter().flatten().min().copied().unwrap_or(0);
        let max_delta = raws.iter().flatten().map(|r| r - min).max().unwrap_or(0);

        if max_delta == 0 && raws.iter().all(Option::is_some) {
            self.writer.write_uint(nbits, min);
            self.writer.write_uint(6, 0);
            return;
        }

        let missing_delta_mask: u64 = if max_delta == 0 { 1 } else { (1u64 << bits_needed(max_delta + 1)) - 1 };
        let nbits_delta = bits_needed(max_delta.max(missing_delta_mask));

        self.writer.write_uint(nbits, min);
        self.writer.write_uint(6, nbits_delta as u64);

        for raw in raws {
            match raw {
                Some(r) => self.writer.write_uint(nbits_delta, r - min),
                None => self.writer.write_missing(nbits_delta),
            }
        }
    }
}

impl LeafPolicy for CompressedEncodePolicy {
    fn numeric(&mut self, nbits: u32, scale: i32, reference: i64, _hint: Hint<'_>) -> Result<Value> {
        self.write_numeric_column(nbits, scale, reference);
        Ok(Value::None)
    }

    fn codeflag(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        self.write_numeric_column(nbits, 0, 0);
        Ok(Value::None)
    }

    fn string(&mut self, nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        let column = self.columns.pop_front().unwrap_or_default();
        let common = column.first().cloned().unwrap_or(Value::None);
        let common_bytes = value_as_bytes(&common, nbits as usize / 8);
        let all_same = column.iter().all(|v| v == &common);

        self.writer.write_bytes(&common_bytes);

        if all_same {
            self.writer.write_uint(6, 0);
            return Ok(Value::None);
        }

        let width = column
            .iter()
            .map(|v| value_as_bytes(v, nbits as usize / 8).len())
            .max()
            .unwrap_or(0);

        self.writer.write_uint(6, width as u64);

        for v in &column {
            let mut bytes = value_as_bytes(v, width);
            bytes.resize(width, b' ');
            self.writer.write_bytes(&bytes);
        }

        Ok(Value::None)
    }

    fn raw(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        match hint {
            Some(Value::Int(v)) => {
                self.writer.write_uint(nbits, *v as u64);
                Ok(Value::Int(*v))
            }
            _ => {
                self.writer.write_uint(nbits, 0);
                Ok(Value::Int(0))
            }
        }
    }

    fn signed(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        match hint {
            Some(Value::Int(v)) => {
                self.writer.write_int(nbits, *v);
                Ok(Value::Int(*v))
            }
            _ => {
                self.writer.write_int(nbits, 0);
                Ok(Value::Int(0))
            }
        }
    }
}

fn value_as_bytes(value: &Value, min_len: usize) -> Vec<u8> {
    let mut bytes = match value {
        Value::Str(s) => s.clone().into_bytes(),
        Value::Bytes(b) => b.clone(),
        _ => Vec::new(),
    };

    if bytes.len() < min_len {
        bytes.resize(min_len, b' ');
    }

    bytes
}

/// Decode every subset of section 4's payload.
pub fn decode_subsets(
    tables: &TableSet,
    descriptors: &[DescriptorId],
    compressed: bool,
    n_subsets: u16,
    reader: BitReader<'_>,
) -> Result<Vec<DataNode>> {
    let n_subsets = n_subsets as usize;

    if !compressed {
        let mut policy = DecodePolicy::new(reader);
        let mut subsets = Vec::with_capacity(n_subsets);

        for _ in 0..n_subsets {
            let mut state = CoderState::new(false);
            let children = walk_template(tables, descriptors, &mut state, &mut policy, None)?;
            subsets.push(DataNode::container(NodeDescriptor::Root, children));
        }

        Ok(subsets)
    } else {
        let mut capture = CapturePolicy::new(reader, n_subsets);
        let mut capture_state = CoderState::new(true);
        walk_template(tables, descriptors, &mut capture_state, &mut capture, None)?;

        let leaves = capture.leaves;
        let structural = capture.structural;
        let mut subsets = Vec::with_capacity(n_subsets);

        for subset_index in 0..n_subsets {
            let mut replay = ReplayPolicy {
                leaves: VecDeque::from(leaves.clone()),
                structural: VecDeque::from(structural.clone()),
                subset_index,
            };
            let mut state = CoderState::new(true);
            let children = walk_template(tables, descriptors, &mut state, &mut replay, None)?;
            subsets.push(DataNode::container(NodeDescriptor::Root, children));
        }

        Ok(subsets)
    }
}

/// Encode every subset back into section 4's payload.
pub fn encode_subsets(
    tables: &TableSet,
    descriptors: &[DescriptorId],
    compressed: bool,
    subsets: &[DataNode],
) -> Result<Vec<u8>> {
    if !compressed {
        let mut policy = EncodePolicy::new();

        for subset in subsets {
            let mut state = CoderState::new(false);
            walk_template(tables, descriptors, &mut state, &mut policy, Some(subset.children.as_slice()))?;
        }

        Ok(policy.into_bytes())
    } else {
        let mut per_subset_leaves: Vec<Vec<Value>> = Vec::with_capacity(subsets.len());

        for subset in subsets {
            let mut collect = CollectPolicy { leaves: Vec::new() };
            let mut state = CoderState::new(true);
            walk_template(tables, descriptors, &mut state, &mut collect, Some(subset.children.as_slice()))?;
            per_subset_leaves.push(collect.leaves);
        }

        let n_leaves = per_subset_leaves.first().map(Vec::len).unwrap_or(0);
        let mut columns: VecDeque<Vec<Value>> = VecDeque::with_capacity(n_leaves);

        for leaf_idx in 0..n_leaves {
            let column: Vec<Value> = per_subset_leaves
                .iter()
                .map(|leaves| leaves.get(leaf_idx).cloned().unwrap_or(Value::None))
                .collect();
            columns.push_back(column);
        }

        let mut policy = CompressedEncodePolicy {
            writer: BitWriter::new(),
            columns,
        };
        let mut state = CoderState::new(true);
        let source = subsets.first().map(|s| s.children.as_slice());
        walk_template(tables, descriptors, &mut state, &mut policy, source)?;

        policy.writer.align();
        Ok(policy.writer.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufr_tables::standard::seed_table_set;

    #[test]
    fn uncompressed_roundtrip_two_elements() {
        let tables = seed_table_set();
        let descriptors = vec![
            DescriptorId::from_fxxyyy("001001").unwrap(),
            DescriptorId::from_fxxyyy("001002").unwrap(),
        ];

        let mut enc_subset = DataNode::container(
            NodeDescriptor::Root,
            vec![
                DataNode::leaf(NodeDescriptor::Element(descriptors[0]), vec![Value::Int(5)]),
                DataNode::leaf(NodeDescriptor::Element(descriptors[1]), vec![Value::Int(12)]),
            ],
        );

        let bytes = encode_subsets(&tables, &descriptors, false, std::slice::from_mut(&mut enc_subset)).unwrap();

        let reader = BitReader::new(&bytes);
        let decoded = decode_subsets(&tables, &descriptors, false, 1, reader).unwrap();

        assert_eq!(decoded[0].children[0].values[0], Value::Int(5));
        assert_eq!(decoded[0].children[1].values[0], Value::Int(12));
    }
}
