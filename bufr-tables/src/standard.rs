//! A tiny built-in seed table.
//!
//! Ships enough WMO Table B/D entries to decode the worked examples of the
//! processing spec (S1–S6) and to serve as a sane default when no external
//! table file has been loaded. Real deployments load a full table via
//! [`crate::table_set::TableSetBuilder`] instead.

use crate::element::ElementEntry;
use crate::ids::DescriptorId;
use crate::table_set::{TableSet, TableSetBuilder};

fn id(s: &str) -> DescriptorId {
    DescriptorId::from_fxxyyy(s).unwrap_or_else(|| panic!("invalid built-in descriptor id {s}"))
}

/// Build the seed [`TableSet`].
pub fn seed_table_set() -> TableSet {
    TableSetBuilder::new()
        .element(id("001001"), ElementEntry::numeric(7, 0, 0, "WMO block number"))
        .element(id("001002"), ElementEntry::numeric(7, 0, 0, "WMO station number"))
        .element(id("001003"), ElementEntry::numeric(7, 0, 0, "WMO region number"))
        .element(id("012001"), ElementEntry::numeric(12, 1, 0, "air temperature"))
        .element(
            id("031001"),
            ElementEntry::numeric(8, 0, 0, "delayed descriptor replication factor"),
        )
        .element(
            id("031002"),
            ElementEntry::numeric(16, 0, 0, "extended delayed descriptor replication factor"),
        )
        .element(id("031021"), ElementEntry::code(6, "associated field significance"))
        .element(id("008042"), ElementEntry::numeric(6, 0, 0, "extended quality mark"))
        .element(id("008023"), ElementEntry::code(6, "first-order statistics"))
        .element(id("031031"), ElementEntry::code(1, "data present indicator"))
        .code(id("031021"), 0, "1-bit indicator of quality")
        .code(id("031031"), 0, "present")
        .code(id("031031"), 1, "not present")
        .sequence(id("300002"), vec![id("001001"), id("001002")])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_has_element_entries() {
        let set = seed_table_set();
        let entry = set.lookup_element(id("001001")).unwrap();
        assert_eq!(entry.nbits, 7);
        assert_eq!(entry.scale, 0);
        assert_eq!(entry.reference, 0);
    }

    #[test]
    fn seed_has_sequence() {
        let set = seed_table_set();
        assert_eq!(
            set.lookup_sequence(id("300002")).unwrap(),
            &[id("001001"), id("001002")]
        );
    }
}
