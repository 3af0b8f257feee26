//! The recursive descriptor walker (component E, §4.4): one control-flow
//! path shared by decode and encode, differing only in the [`LeafPolicy`]
//! passed in.

use crate::coder_state::{operator_207_bit_bump, AssocFrame, Bitmap, CoderState, MarkerMode};
use crate::descriptor::{AttributeKind, NodeDescriptor};
use crate::engine::policy::LeafPolicy;
use crate::error::{bail, Error, ErrorKind, Result};
use crate::tree::{DataNode, Value};
use crate::wiring::{apply_attachments, PendingAttachment};
use bufr_tables::{DescriptorClass, DescriptorId, ElementKind, TableSet};
use rustc_hash::FxHashMap;

#[cfg(feature = "logging")]
use log::trace;

/// Eligible for `221YYY` "data not present": classes 1-9 and 11+, per the
/// operator table. Class 0 (the element itself usually carrying the
/// override) and class 10 are excluded.
fn eligible_for_not_present(id: DescriptorId) -> bool {
    let x = id.x();
    x != 0 && x != 10
}

fn hint_value<'a>(source: Option<&'a [DataNode]>, index: usize) -> Option<&'a Value> {
    source.and_then(|s| s.get(index)).and_then(|n| n.values.first())
}

fn hint_attribute<'a>(
    source: Option<&'a [DataNode]>,
    index: usize,
    kind: AttributeKind,
) -> Option<&'a Value> {
    source
        .and_then(|s| s.get(index))
        .and_then(|n| n.attributes.get(&kind))
        .and_then(|n| n.values.first())
}

/// Apply a state-only operator's effect. `205` and inline-string operators
/// that emit nodes are handled by the caller before reaching here.
fn apply_operator(state: &mut CoderState, id: DescriptorId) {
    let y = id.y();

    match id.x() {
        1 => state.nbits_offset = if y == 0 { 0 } else { y as i32 - 128 },
        2 => state.scale_offset = if y == 0 { 0 } else { y as i32 - 128 },
        3 => {
            if y == 0 {
                state.ref_capture_width = None;
                state.new_refvals.clear();
            } else if y == 255 {
                state.ref_capture_width = None;
            } else {
                state.ref_capture_width = Some(y as u16);
            }
        }
        4 => {
            if y == 0 {
                state.assoc_field_stack.pop();
            } else {
                state.assoc_field_stack.push(AssocFrame {
                    nbits: y as u16,
                    active: true,
                });
            }
        }
        6 => state.local_skip_nbits = Some(y as u16),
        7 => state.scale_override = if y == 0 { None } else { Some(y as i32) },
        8 => state.string_override_nbits = if y == 0 { None } else { Some(y as u16 * 8) },
        21 => state.data_not_present_count = y as u32,
        22 if y == 0 => {
            state.marker_mode = MarkerMode::QInfo;
            state.pending_capture = true;
            state.capture_into_defined = false;
        }
        23 if y == 0 => {
            state.marker_mode = MarkerMode::Substitution;
            state.pending_capture = true;
            state.capture_into_defined = false;
        }
        24 if y == 0 => {
            state.marker_mode = MarkerMode::FirstOrder;
            state.pending_capture = true;
            state.capture_into_defined = false;
        }
        25 if y == 0 => {
            state.marker_mode = MarkerMode::Difference;
            state.pending_capture = true;
            state.capture_into_defined = false;
        }
        32 if y == 0 => {
            state.marker_mode = MarkerMode::Replacement;
            state.pending_capture = true;
            state.capture_into_defined = false;
        }
        35 if y == 0 => state.cancel_bitmaps(),
        36 if y == 0 => {
            state.pending_capture = true;
            state.capture_into_defined = true;
        }
        37 => {
            if y == 0 {
                if let Some(bitmap) = state.defined_bitmap.clone() {
                    state.bitmap_state.push(bitmap);
                }
            } else if y == 255 {
                state.defined_bitmap = None;
            }
        }
        _ => {}
    }
}

/// The candidates a bitmap's `0` bits select, in bit order (forward
/// definition order — see the grounding ledger for why this resolves the
/// spec's ambiguity on back-reference direction).
fn present_candidates(bitmap: &Bitmap) -> Vec<DescriptorId> {
    bitmap
        .bits
        .iter()
        .zip(bitmap.candidates.iter())
        .filter(|(bit, _)| !**bit)
        .map(|(_, id)| *id)
        .collect()
}

/// Walk a sibling list of descriptors, producing their [`DataNode`]s.
///
/// `source`, when `Some`, is the pre-existing sibling list to pull leaf
/// values from (encoding, or a compressed-subset replay); `None` means read
/// fresh values from `policy` (an ordinary decode).
pub fn walk_children<P: LeafPolicy>(
    tables: &TableSet,
    descriptors: &[DescriptorId],
    state: &mut CoderState,
    policy: &mut P,
    source: Option<&[DataNode]>,
) -> Result<Vec<DataNode>> {
    let mut out: Vec<DataNode> = Vec::with_capacity(descriptors.len());
    let mut candidate_index: FxHashMap<DescriptorId, usize> = FxHashMap::default();
    let mut pending: Vec<PendingAttachment> = Vec::new();

    let mut i = 0;
    while i < descriptors.len() {
        let id = descriptors[i];
        i += 1;

        #[cfg(feature = "logging")]
        trace!("dispatch {id}");

        match id.class() {
            DescriptorClass::Operator => {
                if id.x() == 5 {
                    let nbits = id.y() as u32 * 8;
                    let hint = hint_value(source, out.len());
                    let value = policy.string(nbits, hint)?;
                    out.push(DataNode::leaf(NodeDescriptor::Operator(id), vec![value]));
                } else {
                    if id.x() == 4 && id.y() != 0 {
                        let follows_031021 = descriptors
                            .get(i)
                            .is_some_and(|&next| next == DescriptorId::from_fxxyyy("031021").unwrap());

                        if !follows_031021 {
                            bail!(ErrorKind::UnbalancedOperator(format!(
                                "{id} must be immediately followed by 031021 (associated field significance element)"
                            )));
                        }
                    }

                    apply_operator(state, id);
                }
            }

            DescriptorClass::Element => {
                // `221YYY` takes precedence over every other operator state
                // for covered descriptors, including a pending `206YYY` local
                // skip: check it first so a not-present element is emitted
                // with zero bits read rather than consumed as a skip.
                if state.data_not_present_count > 0 && eligible_for_not_present(id) {
                    state.data_not_present_count -= 1;
                    state.local_skip_nbits = None;
                    out.push(DataNode::leaf(NodeDescriptor::Element(id), vec![Value::None]));
                    continue;
                }

                if let Some(skip_nbits) = state.local_skip_nbits.take() {
                    let hint = hint_value(source, out.len());
                    let value = policy.raw(skip_nbits as u32, hint)?;
                    out.push(DataNode::leaf(
                        NodeDescriptor::SkippedLocal(id.last_five()),
                        vec![value],
                    ));
                    continue;
                }

                let entry = tables
                    .lookup_element(id)
                    .ok_or_else(|| Error::new(ErrorKind::UnknownDescriptor(id)))?;

                let assoc = if !id.is_class_31() {
                    state
                        .assoc_field_stack
                        .last()
                        .copied()
                        .filter(|f| f.active)
                        .map(|f| f.nbits)
                } else {
                    None
                };

                let assoc_node = match assoc {
                    Some(nbits) => {
                        let hint = hint_attribute(source, out.len(), AttributeKind::AssociatedField);
                        let value = policy.raw(nbits as u32, hint)?;
                        Some(DataNode::leaf(
                            NodeDescriptor::Associated(id.last_five()),
                            vec![value],
                        ))
                    }
                    None => None,
                };

                let new_ref_node = if !id.is_class_31() {
                    if let Some(width) = state.ref_capture_width {
                        let hint = hint_attribute(source, out.len(), AttributeKind::NewReference);
                        let value = policy.signed(width as u32, hint)?;
                        if let Value::Int(v) = value {
                            state.new_refvals.insert(id, v);
                        }
                        Some(DataNode::leaf(NodeDescriptor::Element(id), vec![value]))
                    } else {
                        None
                    }
                } else {
                    None
                };

                let mut effective_nbits = state.effective_nbits(entry.nbits) as u32;
                let mut string_override_used = false;

                if entry.kind() == ElementKind::String {
                    if let Some(w) = state.string_override_nbits.take() {
                        effective_nbits = w as u32;
                        string_override_used = true;
                    }
                }
                let _ = string_override_used;

                if entry.kind() == ElementKind::Numeric {
                    if let Some(ov) = state.scale_override {
                        effective_nbits =
                            (effective_nbits as i32 + operator_207_bit_bump(ov)).max(0) as u32;
                    }
                }

                let effective_scale = state.effective_scale(entry.scale);
                let effective_reference = state.effective_reference(id, entry.reference);

                let hint = hint_value(source, out.len());
                let value = match entry.kind() {
                    ElementKind::Numeric => {
                        policy.numeric(effective_nbits, effective_scale, effective_reference, hint)?
                    }
                    ElementKind::Code | ElementKind::Flag => policy.codeflag(effective_nbits, hint)?,
                    ElementKind::String => policy.string(effective_nbits, hint)?,
                };

                let mut node = DataNode::leaf(NodeDescriptor::Element(id), vec![value]);

                if let Some(a) = assoc_node {
                    node.set_attribute(AttributeKind::AssociatedField, a);
                }
                if let Some(r) = new_ref_node {
                    node.set_attribute(AttributeKind::NewReference, r);
                }

                if !id.is_class_31() {
                    candidate_index.insert(id, out.len());
                    state.record_candidate(id);
                }

                out.push(node);
            }

            DescriptorClass::Replication => {
                let xx = id.x() as usize;

                let count: usize = if id.y() == 0 {
                    if i >= descriptors.len() {
                        bail!(ErrorKind::UnbalancedOperator(format!(
                            "delayed replication {id} has no following count element"
                        )));
                    }

                    let count_id = descriptors[i];
                    i += 1;

                    let count_entry = tables
                        .lookup_element(count_id)
                        .ok_or_else(|| Error::new(ErrorKind::UnknownDescriptor(count_id)))?;

                    let hint = hint_value(source, out.len());
                    let value = policy.raw(count_entry.nbits as u32, hint)?;
                    let n = match value {
                        Value::Int(v) => v.max(0) as usize,
                        _ => 0,
                    };

                    out.push(DataNode::leaf(NodeDescriptor::Element(count_id), vec![Value::Int(n as i64)]));

                    n
                } else {
                    id.y() as usize
                };

                if i + xx > descriptors.len() {
                    bail!(ErrorKind::UnbalancedOperator(format!(
                        "replication {id} names {xx} descriptor(s) but only {} remain",
                        descriptors.len() - i
                    )));
                }

                let group = &descriptors[i..i + xx];
                i += xx;

                let is_capture = state.pending_capture;
                let capture_into_defined = state.capture_into_defined;
                let resolving_marker = !is_capture
                    && state.marker_mode != MarkerMode::None
                    && state
                        .bitmap_state
                        .last()
                        .is_some_and(|b| b.cursor < b.present_count());

                let mut iterations = Vec::with_capacity(count);

                for j in 0..count {
                    let source_iter = source
                        .and_then(|s| s.get(out.len()))
                        .map(|n| n.children.as_slice())
                        .and_then(|c| c.get(j))
                        .map(|n| n.children.as_slice());

                    let children = walk_children(tables, group, state, policy, source_iter)?;
                    iterations.push(DataNode::container(NodeDescriptor::Replication(id), children));
                }

                if is_capture {
                    let mut bits = Vec::with_capacity(count);

                    for iter in &iterations {
                        let bit = iter
                            .children
                            .first()
                            .and_then(|n| n.values.first())
                            .map(|v| matches!(v, Value::Int(1)))
                            .unwrap_or(false);
                        bits.push(bit);
                    }

                    let n_candidates = bits.len().min(state.back_reference_candidates.len());
                    let candidates = state.back_reference_candidates
                        [state.back_reference_candidates.len() - n_candidates..]
                        .to_vec();

                    let bitmap = Bitmap {
                        bits,
                        candidates,
                        cursor: 0,
                    };

                    if capture_into_defined {
                        state.defined_bitmap = Some(bitmap);
                    } else {
                        state.bitmap_state.push(bitmap);
                    }

                    state.pending_capture = false;
                    state.capture_into_defined = false;
                } else if resolving_marker {
                    let kind = state
                        .marker_mode
                        .attribute_kind()
                        .unwrap_or(AttributeKind::Substitution);
                    let marker_kind = state.marker_mode.marker_kind();

                    let bitmap = state.bitmap_state.last().cloned().unwrap();
                    let present = present_candidates(&bitmap);
                    let start = bitmap.cursor;

                    if start + count > present.len() {
                        bail!(ErrorKind::BitmapMismatch {
                            expected: present.len() - start,
                            found: count,
                        });
                    }

                    for (j, iter) in iterations.into_iter().enumerate() {
                        let candidate_id = present[start + j];

                        if let Some(&owner_index) = candidate_index.get(&candidate_id) {
                            let value = iter
                                .children
                                .first()
                                .map(|n| n.values.first().cloned().unwrap_or(Value::None))
                                .unwrap_or(Value::None);

                            let node = match marker_kind {
                                Some(mk) => DataNode::leaf(
                                    NodeDescriptor::Marker(mk, candidate_id.last_five()),
                                    vec![value],
                                ),
                                None => DataNode::leaf(
                                    NodeDescriptor::Element(candidate_id),
                                    vec![value],
                                ),
                            };

                            pending.push(PendingAttachment {
                                owner_index,
                                kind,
                                node,
                            });
                        }
                    }

                    if let Some(top) = state.bitmap_state.last_mut() {
                        top.cursor += count;

                        if top.cursor >= top.present_count() {
                            state.bitmap_state.pop();
                            state.marker_mode = MarkerMode::None;
                        }
                    }
                } else {
                    let children: Vec<DataNode> = iterations;
                    out.push(DataNode::container(NodeDescriptor::Replication(id), children));
                }
            }

            DescriptorClass::Sequence => {
                let children_ids = tables
                    .lookup_sequence(id)
                    .ok_or_else(|| Error::new(ErrorKind::UnknownDescriptor(id)))?
                    .to_vec();

                let source_children = source
                    .and_then(|s| s.get(out.len()))
                    .map(|n| n.children.as_slice());

                let children = walk_children(tables, &children_ids, state, policy, source_children)?;
                out.push(DataNode::container(NodeDescriptor::Sequence(id), children));
            }
        }
    }

    apply_attachments(&mut out, pending);

    Ok(out)
}

/// Walk one subset's entire top-level descriptor list, then enforce the
/// invariants that only make sense once the whole subset has been walked:
/// an associated-field operator (`204YYY`) left open with no matching
/// `204000` is a fatal error (§3.4), not a silently-dropped stack entry.
/// Nested calls to [`walk_children`] (sequence and replication groups) do
/// not go through this wrapper, since an associated field legitimately
/// stays open across a container's boundary.
pub fn walk_template<P: LeafPolicy>(
    tables: &TableSet,
    descriptors: &[DescriptorId],
    state: &mut CoderState,
    policy: &mut P,
    source: Option<&[DataNode]>,
) -> Result<Vec<DataNode>> {
    let children = walk_children(tables, descriptors, state, policy, source)?;

    if !state.assoc_field_stack.is_empty() {
        bail!(ErrorKind::UnbalancedOperator(
            "204YYY opened an associated field with no matching 204000 before the subset ended"
                .into()
        ));
    }

    Ok(children)
}
