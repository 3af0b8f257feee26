//! The output/input data tree (component F): ordered nodes with value slots
//! per subset.

use crate::descriptor::{AttributeKind, NodeDescriptor};
use rustc_hash::FxHashMap;

/// A single decoded (or to-be-encoded) value. `None` encodes the BUFR
/// "missing value" (all-ones pattern for the element's nbits, or all-spaces
/// for a string).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A plain or scaled integer (numeric/code/flag elements decode to this
    /// before any scale is applied by the caller).
    Int(i64),
    /// A scaled floating-point quantity (`raw * 10^-scale`).
    Float(f64),
    /// A character string.
    Str(String),
    /// Raw bytes, used for inline character fields (`205YYY`) that are not
    /// valid text.
    Bytes(Vec<u8>),
    /// The BUFR missing value.
    None,
}

impl Value {
    /// `true` for [`Value::None`].
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One visited descriptor's node in the tree (§3.2).
#[derive(Debug, Clone)]
pub struct DataNode {
    /// The node's identity (native descriptor or synthetic kind).
    pub descriptor: NodeDescriptor,
    /// One value per subset for a leaf node (uncompressed), or the single
    /// canonical value for a compressed leaf whose per-subset deltas are
    /// folded in at decode time (see [`crate::engine`] §4.3).
    pub values: Vec<Value>,
    /// Ordered children, for replication and sequence nodes. Empty for leaf
    /// nodes.
    pub children: Vec<DataNode>,
    /// Attributes wired on after decoding (§4.6).
    pub attributes: FxHashMap<AttributeKind, Box<DataNode>>,
}

impl DataNode {
    /// Construct a leaf node with the given per-subset values.
    pub fn leaf(descriptor: NodeDescriptor, values: Vec<Value>) -> Self {
        Self {
            descriptor,
            values,
            children: Vec::new(),
            attributes: FxHashMap::default(),
        }
    }

    /// Construct a container node (replication or sequence) owning `children`.
    pub fn container(descriptor: NodeDescriptor, children: Vec<DataNode>) -> Self {
        Self {
            descriptor,
            values: Vec::new(),
            children,
            attributes: FxHashMap::default(),
        }
    }

    /// `true` if this node owns children rather than values.
    pub fn is_container(&self) -> bool {
        !self.children.is_empty() || self.values.is_empty()
    }

    /// Attach (or replace) an attribute.
    pub fn set_attribute(&mut self, kind: AttributeKind, node: DataNode) {
        self.attributes.insert(kind, Box::new(node));
    }

    /// Depth-first pre-order iterator over this node and all descendants.
    pub fn iter_descendants(&self) -> DescendantIter<'_> {
        DescendantIter { stack: vec![self] }
    }
}

/// Depth-first, pre-order iterator over a [`DataNode`] subtree.
pub struct DescendantIter<'a> {
    stack: Vec<&'a DataNode>,
}

impl<'a> Iterator for DescendantIter<'a> {
    type Item = &'a DataNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        for child in node.children.iter().rev() {
            self.stack.push(child);
        }

        Some(node)
    }
}

/// The decoded (or to-be-encoded) representation of one whole message: the
/// section-framing metadata plus one root [`DataNode`] per subset.
#[derive(Debug, Clone)]
pub struct Message {
    /// BUFR edition number.
    pub edition: u8,
    /// Originating centre, from section 1.
    pub originating_centre: u16,
    /// Master table version in effect.
    pub master_table_version: u8,
    /// Local table version in effect.
    pub local_table_version: u8,
    /// Whether section 4 used columnwise compression.
    pub compressed: bool,
    /// The unexpanded descriptor list from section 3.
    pub descriptors: Vec<bufr_tables::DescriptorId>,
    /// One root node (a synthetic top-level [`DataNode::container`]) per
    /// subset, each owning the flat-order leaves of that subset wired into a
    /// hierarchical tree (§4.6).
    pub subsets: Vec<DataNode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufr_tables::DescriptorId;

    fn id(s: &str) -> DescriptorId {
        DescriptorId::from_fxxyyy(s).unwrap()
    }

    #[test]
    fn descendant_iter_is_pre_order() {
        let leaf_a = DataNode::leaf(NodeDescriptor::Element(id("001001")), vec![Value::Int(1)]);
        let leaf_b = DataNode::leaf(NodeDescriptor::Element(id("001002")), vec![Value::Int(2)]);
        let root = DataNode::container(NodeDescriptor::Sequence(id("300002")), vec![leaf_a, leaf_b]);

        let ids: Vec<_> = root.iter_descendants().map(|n| n.descriptor).collect();
        assert_eq!(
            ids,
            vec![
                NodeDescriptor::Sequence(id("300002")),
                NodeDescriptor::Element(id("001001")),
                NodeDescriptor::Element(id("001002")),
            ]
        );
    }

    #[test]
    fn missing_value() {
        assert!(Value::None.is_missing());
        assert!(!Value::Int(0).is_missing());
    }
}
