//! Template Compilation (component H, §4.7): record the leaf actions a
//! decode performs so a later decode of the *same template* can skip
//! re-deriving each leaf's effective width/scale/reference from coder state,
//! falling back to an ordinary interpreted walk the moment a structural
//! read (a replication count or a bitmap bit) disagrees with what was
//! recorded.

use crate::bitio::BitReader;
use crate::coder_state::CoderState;
use crate::engine::policy::{Hint, LeafPolicy};
use crate::engine::walker::walk_template;
use crate::error::{Error, ErrorKind, Result};
use crate::tree::{DataNode, Value};
use bufr_tables::{DescriptorId, TableSet};

/// One leaf action as resolved the first time a template is walked.
#[derive(Debug, Clone)]
enum LeafAction {
    Numeric { nbits: u32, scale: i32, reference: i64 },
    String { nbits: u32 },
    CodeFlag { nbits: u32 },
    /// A structural read — replication count, bitmap bit, skipped-local
    /// width, or a `203YYY` new-reference capture. Its value is recorded so
    /// replay can detect divergence.
    Structural { nbits: u32, signed: bool, recorded: i64 },
}

/// The recorded trace of one template's leaf actions, in visitation order.
#[derive(Debug, Clone, Default)]
pub struct CompiledTemplate {
    actions: Vec<LeafAction>,
}

impl CompiledTemplate {
    /// Number of leaf actions recorded.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// `true` if nothing was recorded (an empty template).
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Wraps an inner policy, recording every leaf call's parameters (and, for
/// numeric/string/codeflag, the inner policy's return) into a trace.
struct RecorderPolicy<'p, P> {
    inner: &'p mut P,
    actions: Vec<LeafAction>,
}

impl<P: LeafPolicy> LeafPolicy for RecorderPolicy<'_, P> {
    fn numeric(&mut self, nbits: u32, scale: i32, reference: i64, hint: Hint<'_>) -> Result<Value> {
        let value = self.inner.numeric(nbits, scale, reference, hint)?;
        self.actions.push(LeafAction::Numeric { nbits, scale, reference });
        Ok(value)
    }

    fn string(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        let value = self.inner.string(nbits, hint)?;
        self.actions.push(LeafAction::String { nbits });
        Ok(value)
    }

    fn codeflag(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        let value = self.inner.codeflag(nbits, hint)?;
        self.actions.push(LeafAction::CodeFlag { nbits });
        Ok(value)
    }

    fn raw(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        let value = self.inner.raw(nbits, hint)?;
        let recorded = if let Value::Int(v) = value { v } else { 0 };
        self.actions.push(LeafAction::Structural { nbits, signed: false, recorded });
        Ok(value)
    }

    fn signed(&mut self, nbits: u32, hint: Hint<'_>) -> Result<Value> {
        let value = self.inner.signed(nbits, hint)?;
        let recorded = if let Value::Int(v) = value { v } else { 0 };
        self.actions.push(LeafAction::Structural { nbits, signed: true, recorded });
        Ok(value)
    }
}

/// Decode a subset while recording its leaf trace, for reuse on later
/// messages sharing the same template.
pub fn record<'a>(
    tables: &TableSet,
    descriptors: &[DescriptorId],
    state: &mut CoderState,
    reader: BitReader<'a>,
) -> Result<(Vec<DataNode>, CompiledTemplate, BitReader<'a>)> {
    use crate::engine::policy::DecodePolicy;

    let mut decode = DecodePolicy::new(reader);
    let mut recorder = RecorderPolicy { inner: &mut decode, actions: Vec::new() };
    let children = walk_template(tables, descriptors, state, &mut recorder, None)?;
    let compiled = CompiledTemplate { actions: recorder.actions };

    Ok((children, compiled, decode.into_reader()))
}

/// Replays a previously recorded trace against fresh bits: reuses the
/// recorded `nbits`/`scale`/`reference` instead of recomputing them from
/// coder state, bails with [`ErrorKind::TemplateDiverged`] the instant a
/// structural read disagrees with what was recorded.
struct TraceReplayPolicy<'a, 'r> {
    reader: &'a mut BitReader<'r>,
    actions: std::vec::IntoIter<LeafAction>,
}

impl LeafPolicy for TraceReplayPolicy<'_, '_> {
    fn numeric(&mut self, _nbits: u32, _scale: i32, _reference: i64, _hint: Hint<'_>) -> Result<Value> {
        match self.actions.next() {
            Some(LeafAction::Numeric { nbits, scale, reference }) => {
                let raw = self.reader.read_uint(nbits)?;
                Ok(crate::engine::policy::value_to_numeric(raw, nbits, scale, reference))
            }
            _ => Err(Error::new(ErrorKind::TemplateDiverged)),
        }
    }

    fn string(&mut self, _nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        match self.actions.next() {
            Some(LeafAction::String { nbits }) => {
                let bytes = self.reader.read_bytes(nbits)?;
                if crate::bitio::is_missing_string(&bytes) {
                    return Ok(Value::None);
                }
                match String::from_utf8(bytes.clone()) {
                    Ok(s) => Ok(Value::Str(s.trim_end().to_string())),
                    Err(_) => Ok(Value::Bytes(bytes)),
                }
            }
            _ => Err(Error::new(ErrorKind::TemplateDiverged)),
        }
    }

    fn codeflag(&mut self, _nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        match self.actions.next() {
            Some(LeafAction::CodeFlag { nbits }) => {
                let raw = self.reader.read_uint(nbits)?;
                if crate::bitio::is_missing_numeric(raw, nbits) {
                    Ok(Value::None)
                } else {
                    Ok(Value::Int(raw as i64))
                }
            }
            _ => Err(Error::new(ErrorKind::TemplateDiverged)),
        }
    }

    fn raw(&mut self, _nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        match self.actions.next() {
            Some(LeafAction::Structural { nbits, signed: false, recorded }) => {
                let raw = self.reader.read_uint(nbits)? as i64;
                if raw != recorded {
                    return Err(Error::new(ErrorKind::TemplateDiverged));
                }
                Ok(Value::Int(raw))
            }
            _ => Err(Error::new(ErrorKind::TemplateDiverged)),
        }
    }

    fn signed(&mut self, _nbits: u32, _hint: Hint<'_>) -> Result<Value> {
        match self.actions.next() {
            Some(LeafAction::Structural { nbits, signed: true, recorded }) => {
                let value = self.reader.read_int(nbits)?;
                if value != recorded {
                    return Err(Error::new(ErrorKind::TemplateDiverged));
                }
                Ok(Value::Int(value))
            }
            _ => Err(Error::new(ErrorKind::TemplateDiverged)),
        }
    }
}

/// Decode a subset using a compiled trace when possible, transparently
/// falling back to a fresh interpreted decode (discarding the partial
/// replay) the instant the trace diverges. Restarting from scratch on
/// divergence, rather than resuming the interpreted walk mid-template, is a
/// deliberate simplification — divergence is expected to be rare enough
/// that the fallback cost is not worth a resumable walker.
pub fn decode_with_cache<'r>(
    tables: &TableSet,
    descriptors: &[DescriptorId],
    compiled: Option<&CompiledTemplate>,
    state: &mut CoderState,
    reader: BitReader<'r>,
) -> Result<(Vec<DataNode>, CompiledTemplate, BitReader<'r>)> {
    if let Some(compiled) = compiled {
        let mut reader_copy = reader.clone();
        let mut replay = TraceReplayPolicy {
            reader: &mut reader_copy,
            actions: compiled.actions.clone().into_iter(),
        };

        let mut replay_state = state.clone();
        match walk_template(tables, descriptors, &mut replay_state, &mut replay, None) {
            Ok(children) => {
                *state = replay_state;
                return Ok((children, compiled.clone(), reader_copy));
            }
            Err(e) if e.kind == ErrorKind::TemplateDiverged => {
                // fall through to a fresh interpreted+recorded decode below
            }
            Err(e) => return Err(e),
        }
    }

    record(tables, descriptors, state, reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::policy::EncodePolicy;
    use crate::tree::DataNode;
    use bufr_tables::standard::seed_table_set;

    fn id(s: &str) -> DescriptorId {
        DescriptorId::from_fxxyyy(s).unwrap()
    }

    fn encode_one(tables: &TableSet, descriptors: &[DescriptorId], value: i64) -> Vec<u8> {
        let mut policy = EncodePolicy::new();
        let mut state = CoderState::new(false);
        let source = vec![DataNode::leaf(
            crate::descriptor::NodeDescriptor::Element(descriptors[0]),
            vec![Value::Int(value)],
        )];
        walk_template(tables, descriptors, &mut state, &mut policy, Some(source.as_slice())).unwrap();
        policy.into_bytes()
    }

    #[test]
    fn compiled_replay_matches_interpreted_decode() {
        let tables = seed_table_set();
        let descriptors = vec![id("001001")];
        let bytes = encode_one(&tables, &descriptors, 9);

        let mut state = CoderState::new(false);
        let (children, compiled, _) = record(&tables, &descriptors, &mut state, BitReader::new(&bytes)).unwrap();
        assert_eq!(children[0].values[0], Value::Int(9));
        assert!(!compiled.is_empty());

        let bytes2 = encode_one(&tables, &descriptors, 17);
        let mut state2 = CoderState::new(false);
        let (children2, _, _) =
            decode_with_cache(&tables, &descriptors, Some(&compiled), &mut state2, BitReader::new(&bytes2)).unwrap();
        assert_eq!(children2[0].values[0], Value::Int(17));
    }
}
