//! A single immutable snapshot of element/sequence/code metadata.

use crate::element::ElementEntry;
use crate::ids::DescriptorId;
use rustc_hash::FxHashMap;

/// A loaded, immutable table snapshot for one `(master_version, local_version)`
/// pair.
///
/// "Tables store is read-only after load and is safely shareable (logically
/// immutable snapshot per `(master_version, local_version)` tuple)."
/// (CONCURRENCY & RESOURCE MODEL)
#[derive(Debug, Default)]
pub struct TableSet {
    elements: FxHashMap<DescriptorId, ElementEntry>,
    sequences: FxHashMap<DescriptorId, Vec<DescriptorId>>,
    codes: FxHashMap<(DescriptorId, i64), String>,
}

impl TableSet {
    /// Table B lookup: element metadata for a `F=0` descriptor.
    pub fn lookup_element(&self, id: DescriptorId) -> Option<&ElementEntry> {
        self.elements.get(&id)
    }

    /// Table D lookup: the ordered child descriptors of a `F=3` sequence.
    pub fn lookup_sequence(&self, id: DescriptorId) -> Option<&[DescriptorId]> {
        self.sequences.get(&id).map(Vec::as_slice)
    }

    /// Table C/F lookup: the meaning text of a code or flag value.
    ///
    /// Best-effort: a miss returns `None`, not an error — unlike
    /// [`TableSet::lookup_element`] and [`TableSet::lookup_sequence`], which are
    /// load-bearing for decoding, meaning text is advisory only.
    pub fn lookup_code(&self, id: DescriptorId, value: i64) -> Option<&str> {
        let hit = self.codes.get(&(id, value)).map(String::as_str);

        #[cfg(feature = "logging")]
        if hit.is_none() {
            log::warn!("no code/flag meaning for {id} = {value}");
        }

        hit
    }
}

/// Builds a [`TableSet`] by accumulating entries, e.g. from an external table
/// file. Parsing the full WMO table corpus is an external collaborator's job;
/// this builder only owns the in-memory accumulation.
#[derive(Debug, Default)]
pub struct TableSetBuilder {
    set: TableSet,
}

impl TableSetBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a Table B entry.
    pub fn element(mut self, id: DescriptorId, entry: ElementEntry) -> Self {
        self.set.elements.insert(id, entry);
        self
    }

    /// Insert (or replace) a Table D expansion.
    pub fn sequence(mut self, id: DescriptorId, children: Vec<DescriptorId>) -> Self {
        self.set.sequences.insert(id, children);
        self
    }

    /// Insert (or replace) a code/flag meaning.
    pub fn code(mut self, id: DescriptorId, value: i64, meaning: impl Into<String>) -> Self {
        self.set.codes.insert((id, value), meaning.into());
        self
    }

    /// Parse a minimal CSV dump of Table B entries: one
    /// `fxxyyy,nbits,scale,reference,name` row per line, `#`-prefixed lines and
    /// blank lines ignored. This is intentionally tiny — a real WMO table
    /// importer is an external collaborator, out of scope for this crate.
    pub fn from_csv_reader<R: std::io::BufRead>(mut self, reader: R) -> std::io::Result<Self> {
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.splitn(5, ',');
            let (Some(id_s), Some(nbits_s), Some(scale_s), Some(reference_s), Some(name)) =
                (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
            else {
                continue;
            };

            let (Some(id), Ok(nbits), Ok(scale), Ok(reference)) = (
                DescriptorId::from_fxxyyy(id_s),
                nbits_s.parse::<u16>(),
                scale_s.parse::<i32>(),
                reference_s.parse::<i64>(),
            ) else {
                continue;
            };

            let _ = name; // display name is not retained for CSV-imported entries
            self = self.element(id, ElementEntry::numeric(nbits, scale, reference, "imported"));
        }

        Ok(self)
    }

    /// Finish building.
    pub fn build(self) -> TableSet {
        self.set
    }
}
