//! Typed descriptor entities, including the synthetic kinds the engine
//! introduces into the output tree (§3.1).

use bufr_tables::DescriptorId;
use core::fmt;

/// What kind of marker a bitmap-driven attribute value represents.
///
/// "prefix `T`, `F`, `D`, `R` (substitution, first-order stat, difference
/// stat, replacement/retain)" (§3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// `T`: substituted value.
    Substitution,
    /// `F`: first-order statistic.
    FirstOrderStat,
    /// `D`: difference statistic.
    Difference,
    /// `R`: replacement/retain value.
    Replacement,
}

impl MarkerKind {
    /// The single-letter wire prefix used for this marker's synthetic id.
    pub const fn prefix(self) -> char {
        match self {
            Self::Substitution => 'T',
            Self::FirstOrderStat => 'F',
            Self::Difference => 'D',
            Self::Replacement => 'R',
        }
    }
}

/// The attribute-kind keys a [`crate::tree::DataNode`]'s attribute map can
/// hold, populated by the wiring pass (§4.6).
///
/// "replace with a fixed attribute map keyed by a closed enum of attribute
/// kinds." (DESIGN NOTES §9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// The associated field pushed by `204YYY`.
    AssociatedField,
    /// A quality-info marker from the `222000` bitmap family.
    QInfo,
    /// A substitution marker (`223000`).
    Substitution,
    /// A first-order-statistics marker (`224000`).
    FirstOrder,
    /// A difference-statistics marker (`225000`).
    Difference,
    /// A replacement/retain marker (`232000`).
    Replacement,
    /// A `203YYY`-captured new reference value, kept on the owning element so
    /// encoding can replay the exact bits without re-deriving coder state.
    NewReference,
}

impl AttributeKind {
    /// The path-query keyword for this attribute kind (§4.10).
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::AssociatedField => "associated_field",
            Self::QInfo => "q_info",
            Self::Substitution => "substitution",
            Self::FirstOrder => "first_order",
            Self::Difference => "difference",
            Self::Replacement => "replacement",
            Self::NewReference => "new_reference",
        }
    }

    /// Parse a path-query attribute keyword.
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "associated_field" => Self::AssociatedField,
            "q_info" => Self::QInfo,
            "substitution" => Self::Substitution,
            "first_order" => Self::FirstOrder,
            "difference" => Self::Difference,
            "replacement" => Self::Replacement,
            "new_reference" => Self::NewReference,
            _ => return None,
        })
    }

    /// The attribute kind a given marker kind is wired under.
    pub const fn for_marker(marker: MarkerKind) -> Self {
        match marker {
            MarkerKind::Substitution => Self::Substitution,
            MarkerKind::FirstOrderStat => Self::FirstOrder,
            MarkerKind::Difference => Self::Difference,
            MarkerKind::Replacement => Self::Replacement,
        }
    }
}

/// The identity of a data node: either a native wire descriptor, or one of
/// the three synthetic kinds the engine derives for the output tree.
///
/// "The engine derives four additional descriptor kinds used only in the
/// output tree: Associated, Skipped Local, Marker[, the native four]." (§3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeDescriptor {
    /// A native element (`F=0`).
    Element(DescriptorId),
    /// A native replication (`F=1`).
    Replication(DescriptorId),
    /// A native operator (`F=2`) — only operators that emit a node (`205`,
    /// `206`) ever appear here; state-only operators never become nodes.
    Operator(DescriptorId),
    /// A native sequence (`F=3`).
    Sequence(DescriptorId),
    /// `A` + last-five: an associated field attached ahead of an element.
    Associated(u32),
    /// `S` + last-five: a local descriptor skipped by `206YYY`.
    SkippedLocal(u32),
    /// Marker prefix + last-five: a bitmap-driven attribute value.
    Marker(MarkerKind, u32),
    /// The synthetic container wrapping one subset's top-level children.
    Root,
}

impl NodeDescriptor {
    /// The underlying wire id, for the four native kinds.
    pub const fn wire_id(self) -> Option<DescriptorId> {
        match self {
            Self::Element(id) | Self::Replication(id) | Self::Operator(id) | Self::Sequence(id) => {
                Some(id)
            }
            _ => None,
        }
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(id) | Self::Replication(id) | Self::Operator(id) | Self::Sequence(id) => {
                write!(f, "{id}")
            }
            Self::Associated(n) => write!(f, "A{n:05}"),
            Self::SkippedLocal(n) => write!(f, "S{n:05}"),
            Self::Marker(kind, n) => write!(f, "{}{n:05}", kind.prefix()),
            Self::Root => write!(f, "ROOT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_prefixes() {
        let id = DescriptorId::from_fxxyyy("204008").unwrap();
        assert_eq!(NodeDescriptor::Associated(id.last_five()).to_string(), "A04008");
        assert_eq!(
            NodeDescriptor::Marker(MarkerKind::Substitution, id.last_five()).to_string(),
            "T04008"
        );
    }

    #[test]
    fn attribute_keyword_roundtrip() {
        for kind in [
            AttributeKind::AssociatedField,
            AttributeKind::QInfo,
            AttributeKind::Substitution,
            AttributeKind::FirstOrder,
            AttributeKind::Difference,
            AttributeKind::Replacement,
            AttributeKind::NewReference,
        ] {
            assert_eq!(AttributeKind::from_keyword(kind.keyword()), Some(kind));
        }
    }
}
