//! Path Query (component J, §4.10): a small interpreter over a decoded
//! [`Message`], not a query planner — each step re-filters a work-list of
//! candidate nodes.
//!
//! ```text
//! path       := step+
//! step       := '@' slice | sep descriptor_ref
//! sep        := '/' | '>' | '.'
//! descriptor_ref := id slice?
//! id         := 6 digit descriptor id, or an attribute-kind keyword after '.'
//! slice      := '[' index | range ']'
//! ```

use crate::descriptor::{AttributeKind, NodeDescriptor};
use crate::tree::{DataNode, Message};
use bufr_tables::DescriptorId;
use core::fmt;

/// Failure parsing or evaluating a path query. Kept separate from
/// [`crate::error::Error`] because a query never touches the bitstream.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The path text could not be parsed.
    Syntax(String),
    /// A slice index or range was out of bounds for the usage context.
    BadSlice(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "query syntax error: {msg}"),
            Self::BadSlice(msg) => write!(f, "bad slice: {msg}"),
        }
    }
}

impl core::error::Error for QueryError {}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slice {
    Index(i64),
    Range(i64, i64),
}

impl Slice {
    fn apply<'a, T>(self, items: &'a [T]) -> Result<Vec<&'a T>, QueryError> {
        let len = items.len() as i64;
        let norm = |i: i64| -> i64 {
            if i < 0 {
                len + i
            } else {
                i
            }
        };

        match self {
            Slice::Index(i) => {
                let idx = norm(i);
                if idx < 0 || idx >= len {
                    return Err(QueryError::BadSlice(format!("index {i} out of range (len {len})")));
                }
                Ok(vec![&items[idx as usize]])
            }
            Slice::Range(lo, hi) => {
                let lo = norm(lo).max(0) as usize;
                let hi = (norm(hi).max(0) as usize).min(items.len());
                if lo > hi {
                    return Err(QueryError::BadSlice(format!("range {lo}..{hi} is inverted")));
                }
                Ok(items[lo..hi].iter().collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Sep {
    DirectChild,
    Descendant,
    Attribute,
}

#[derive(Debug, Clone, PartialEq)]
enum StepRef {
    Descriptor(DescriptorId),
    Attribute(AttributeKind),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    SubsetSlice(Slice),
    Selector(Sep, StepRef, Option<Slice>),
}

fn parse_slice(s: &str) -> Result<Slice, QueryError> {
    let inner = s
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| QueryError::Syntax(format!("malformed slice `{s}`")))?;

    if let Some((lo, hi)) = inner.split_once("..") {
        let lo: i64 = lo
            .parse()
            .map_err(|_| QueryError::Syntax(format!("bad range start `{lo}`")))?;
        let hi: i64 = hi
            .parse()
            .map_err(|_| QueryError::Syntax(format!("bad range end `{hi}`")))?;
        Ok(Slice::Range(lo, hi))
    } else {
        let idx: i64 = inner
            .parse()
            .map_err(|_| QueryError::Syntax(format!("bad index `{inner}`")))?;
        Ok(Slice::Index(idx))
    }
}

fn split_trailing_slice(s: &str) -> (&str, Option<&str>) {
    match s.find('[') {
        Some(pos) => (&s[..pos], Some(&s[pos..])),
        None => (s, None),
    }
}

fn parse_path(path: &str) -> Result<Vec<Step>, QueryError> {
    let mut steps = Vec::new();
    let mut chars = path.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            '@' => {
                chars.next();
                let slice_start = start + 1;
                let end = path[slice_start..]
                    .find(['/', '>', '.'])
                    .map(|p| slice_start + p)
                    .unwrap_or(path.len());
                let slice = parse_slice(&path[slice_start..end])?;
                steps.push(Step::SubsetSlice(slice));

                for _ in 0..(end - start - 1) {
                    chars.next();
                }
            }
            '/' | '>' | '.' => {
                chars.next();
                let sep = match c {
                    '/' => Sep::DirectChild,
                    '>' => Sep::Descendant,
                    _ => Sep::Attribute,
                };

                let tok_start = start + 1;
                let end = path[tok_start..]
                    .find(['/', '>', '.'])
                    .map(|p| tok_start + p)
                    .unwrap_or(path.len());
                let token = &path[tok_start..end];
                let (ident, slice_text) = split_trailing_slice(token);

                let step_ref = if sep == Sep::Attribute {
                    StepRef::Attribute(
                        AttributeKind::from_keyword(ident)
                            .ok_or_else(|| QueryError::Syntax(format!("unknown attribute `{ident}`")))?,
                    )
                } else {
                    StepRef::Descriptor(
                        DescriptorId::from_fxxyyy(ident)
                            .ok_or_else(|| QueryError::Syntax(format!("bad descriptor id `{ident}`")))?,
                    )
                };

                let slice = slice_text.map(parse_slice).transpose()?;
                steps.push(Step::Selector(sep, step_ref, slice));

                for _ in 0..(end - start - 1) {
                    chars.next();
                }
            }
            _ => return Err(QueryError::Syntax(format!("unexpected character `{c}` at {start}"))),
        }
    }

    Ok(steps)
}

fn node_matches(node: &DataNode, step_ref: &StepRef) -> bool {
    match step_ref {
        StepRef::Descriptor(id) => node.descriptor.wire_id() == Some(*id),
        StepRef::Attribute(_) => false,
    }
}

fn collect_descendants<'a>(node: &'a DataNode, step_ref: &StepRef, out: &mut Vec<&'a DataNode>) {
    for child in &node.children {
        if node_matches(child, step_ref) {
            out.push(child);
        }
        collect_descendants(child, step_ref, out);
    }
}

/// Evaluate a path query against a decoded message.
pub fn query_path<'a>(message: &'a Message, path: &str) -> Result<Vec<&'a DataNode>, QueryError> {
    let steps = parse_path(path)?;

    let mut subsets: Vec<&'a DataNode> = message.subsets.iter().collect();
    let mut candidates: Vec<&'a DataNode> = Vec::new();
    let mut started = false;

    for step in &steps {
        match step {
            Step::SubsetSlice(slice) => {
                subsets = slice.apply(&subsets)?.into_iter().copied().collect();
            }
            Step::Selector(sep, step_ref, slice) => {
                let mut matched: Vec<&'a DataNode> = Vec::new();

                let bases: Vec<&'a DataNode> = if started { candidates.clone() } else { subsets.clone() };

                match sep {
                    Sep::DirectChild => {
                        for base in &bases {
                            for child in &base.children {
                                if node_matches(child, step_ref) {
                                    matched.push(child);
                                }
                            }
                        }
                    }
                    Sep::Descendant => {
                        for base in &bases {
                            collect_descendants(base, step_ref, &mut matched);
                        }
                    }
                    Sep::Attribute => {
                        if let StepRef::Attribute(kind) = step_ref {
                            for base in &bases {
                                if let Some(node) = base.attributes.get(kind) {
                                    matched.push(node);
                                }
                            }
                        }
                    }
                }

                candidates = match slice {
                    Some(s) => s.apply(&matched)?.into_iter().copied().collect(),
                    None => matched,
                };
                started = true;
            }
        }
    }

    Ok(if started { candidates } else { subsets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Value;

    fn id(s: &str) -> DescriptorId {
        DescriptorId::from_fxxyyy(s).unwrap()
    }

    fn sample_message() -> Message {
        let leaf_a = DataNode::leaf(NodeDescriptor::Element(id("001001")), vec![Value::Int(5)]);
        let leaf_b = DataNode::leaf(NodeDescriptor::Element(id("001002")), vec![Value::Int(9)]);
        let seq = DataNode::container(NodeDescriptor::Sequence(id("300002")), vec![leaf_a, leaf_b]);
        let root = DataNode::container(NodeDescriptor::Root, vec![seq]);

        Message {
            edition: 4,
            originating_centre: 0,
            master_table_version: 0,
            local_table_version: 0,
            compressed: false,
            descriptors: vec![id("300002")],
            subsets: vec![root],
        }
    }

    #[test]
    fn direct_child_selects_immediate_descriptor() {
        let msg = sample_message();
        let found = query_path(&msg, "/300002").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn descendant_reaches_nested_elements() {
        let msg = sample_message();
        let found = query_path(&msg, ">001002").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].values[0], Value::Int(9));
    }

    #[test]
    fn subset_slice_narrows_before_descriptor_steps() {
        let msg = sample_message();
        let found = query_path(&msg, "@[0]>001001").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].values[0], Value::Int(5));
    }

    #[test]
    fn unknown_descriptor_is_syntax_error() {
        let msg = sample_message();
        assert!(matches!(query_path(&msg, "/abcdef"), Err(QueryError::Syntax(_))));
    }
}
