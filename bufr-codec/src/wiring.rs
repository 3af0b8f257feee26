//! Data Wiring (component G, §4.6): folding bitmap-resolved marker values
//! onto the elements they describe.
//!
//! Associated-field attachment happens inline in [`crate::engine::walker`]
//! (the field is read immediately before its owner's bits, so there is no
//! need to defer it). This module handles the one case that genuinely can't
//! be resolved until a whole bitmap's worth of marker values has been
//! walked: diverting those values onto their back-referenced candidates
//! instead of appending them as ordinary siblings.

use crate::descriptor::AttributeKind;
use crate::tree::DataNode;

/// A marker value waiting to be attached to a sibling already present in the
/// same container's child list.
pub struct PendingAttachment {
    /// Index into the container's children being built.
    pub owner_index: usize,
    /// Which attribute slot it fills.
    pub kind: AttributeKind,
    /// The marker (or associated-field) node itself.
    pub node: DataNode,
}

/// Fold all pending attachments onto their owners. Attachments whose
/// `owner_index` falls outside `children` (a back-reference that escaped the
/// current container's scope) are dropped rather than panicking — bitmaps
/// that reach into an enclosing sequence are out of scope for this engine.
pub fn apply_attachments(children: &mut [DataNode], pending: Vec<PendingAttachment>) {
    for attachment in pending {
        if let Some(owner) = children.get_mut(attachment.owner_index) {
            owner.set_attribute(attachment.kind, attachment.node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::NodeDescriptor;
    use crate::tree::Value;
    use bufr_tables::DescriptorId;

    #[test]
    fn attaches_to_existing_owner() {
        let mut children = vec![DataNode::leaf(
            NodeDescriptor::Element(DescriptorId::from_fxxyyy("012001").unwrap()),
            vec![Value::Float(290.1)],
        )];

        let marker = DataNode::leaf(
            NodeDescriptor::Marker(crate::descriptor::MarkerKind::Substitution, 12001),
            vec![Value::Float(291.0)],
        );

        apply_attachments(
            &mut children,
            vec![PendingAttachment {
                owner_index: 0,
                kind: AttributeKind::Substitution,
                node: marker,
            }],
        );

        assert!(children[0].attributes.contains_key(&AttributeKind::Substitution));
    }

    #[test]
    fn out_of_scope_attachment_is_dropped_not_panicked() {
        let mut children: Vec<DataNode> = Vec::new();
        let marker = DataNode::leaf(
            NodeDescriptor::Marker(crate::descriptor::MarkerKind::Substitution, 12001),
            vec![Value::None],
        );

        apply_attachments(
            &mut children,
            vec![PendingAttachment {
                owner_index: 5,
                kind: AttributeKind::Substitution,
                node: marker,
            }],
        );
    }
}
