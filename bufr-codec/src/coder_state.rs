//! The mutable bit-level overrides active while walking a template (§3.3).
//!
//! One [`CoderState`] lives for exactly one subset's walk; it is never
//! shared across subsets or messages (§5).

use crate::descriptor::{AttributeKind, MarkerKind};
use bufr_tables::DescriptorId;
use rustc_hash::FxHashMap;

/// A pushed associated-field session (`204YYY` ... `204000`).
#[derive(Debug, Clone, Copy)]
pub struct AssocFrame {
    /// Width, in bits, of the associated field.
    pub nbits: u16,
    /// Whether this frame is currently contributing an associated field to
    /// non-class-31 elements. Always `true` for frames pushed by `204YYY`;
    /// kept explicit because the wiring pass (§4.6) reads it off a snapshot
    /// independent of the live stack.
    pub active: bool,
}

/// Which family of bitmap-driven marker the engine is currently producing,
/// set by the `222000`/`223000`/`224000`/`225000`/`232000` operator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerMode {
    /// No bitmap in progress.
    #[default]
    None,
    /// `222000`: quality-info bitmap.
    QInfo,
    /// `223000`: substitution bitmap.
    Substitution,
    /// `224000`: first-order-statistics bitmap.
    FirstOrder,
    /// `225000`: difference-statistics bitmap.
    Difference,
    /// `232000`: replacement/retain bitmap.
    Replacement,
}

impl MarkerMode {
    /// The marker kind produced while in this mode, if any.
    pub const fn marker_kind(self) -> Option<MarkerKind> {
        match self {
            Self::None | Self::QInfo => None,
            Self::Substitution => Some(MarkerKind::Substitution),
            Self::FirstOrder => Some(MarkerKind::FirstOrderStat),
            Self::Difference => Some(MarkerKind::Difference),
            Self::Replacement => Some(MarkerKind::Replacement),
        }
    }

    /// The attribute kind values produced in this mode are wired under.
    pub const fn attribute_kind(self) -> Option<AttributeKind> {
        match self {
            Self::None => None,
            Self::QInfo => Some(AttributeKind::QInfo),
            Self::Substitution => Some(AttributeKind::Substitution),
            Self::FirstOrder => Some(AttributeKind::FirstOrder),
            Self::Difference => Some(AttributeKind::Difference),
            Self::Replacement => Some(AttributeKind::Replacement),
        }
    }
}

/// A captured bitmap: which previously-emitted class-0 elements it selects,
/// and a cursor for consuming its `0` (present) entries in order.
///
/// "bit 0 = present, 1 = NOT present ... plus a cursor and a reference to the
/// set of previously emitted class-0 elements it is mapping over." (§3.3)
#[derive(Debug, Clone)]
pub struct Bitmap {
    /// One bit per candidate, in candidate emission order.
    pub bits: Vec<bool>,
    /// The candidate descriptor each bit corresponds to.
    pub candidates: Vec<DescriptorId>,
    /// How many `0` entries have been resolved so far.
    pub cursor: usize,
}

impl Bitmap {
    /// Number of `0` (present) bits — the number of marker values this
    /// bitmap expects to consume.
    pub fn present_count(&self) -> usize {
        self.bits.iter().filter(|&&b| !b).count()
    }
}

/// The mutable coder state for one subset's walk (§3.3).
#[derive(Debug, Clone, Default)]
pub struct CoderState {
    /// Added to every subsequent element's nbits; `201YYY`.
    pub nbits_offset: i32,
    /// Added to scale; `202YYY`.
    pub scale_offset: i32,
    /// Absolute scale override; `207YYY`.
    pub scale_override: Option<i32>,
    /// Whether a `203YYY` capture block is currently open (between `203YYY`
    /// and `203255`); distinct from whether `new_refvals` has entries, which
    /// persist until `203000`.
    pub ref_capture_width: Option<u16>,
    /// Collected new reference values, element id -> value.
    pub new_refvals: FxHashMap<DescriptorId, i64>,
    /// Pushed by `204YYY`, popped by `204000`.
    pub assoc_field_stack: Vec<AssocFrame>,
    /// Set by `206YYY`, consumed by the very next descriptor.
    pub local_skip_nbits: Option<u16>,
    /// Set by `208YYY`, applies to next string element.
    pub string_override_nbits: Option<u16>,
    /// Set by `221YYY`; decrements on each eligible element.
    pub data_not_present_count: u32,
    /// A stack of in-progress or captured bitmaps (`236000`/`237000` keep a
    /// defined bitmap around for reuse even after the active one resolves).
    pub bitmap_state: Vec<Bitmap>,
    /// The most recently `236000`-defined bitmap, reusable via `237000`.
    pub defined_bitmap: Option<Bitmap>,
    /// Which marker family the next class-31 bitmap will produce.
    pub marker_mode: MarkerMode,
    /// Class-0 elements emitted so far in this subset, in order, eligible as
    /// bitmap back-reference candidates. Reset by `235000`.
    pub back_reference_candidates: Vec<DescriptorId>,
    /// Whether section 4 uses columnwise compression.
    pub compression: bool,
    /// `true` once a begin-bitmap operator (or `236000`) has fired and the
    /// next class-31 run should be captured as bitmap bits rather than
    /// walked as ordinary data.
    pub pending_capture: bool,
    /// `true` if the pending capture was started by `236000` (store into
    /// [`CoderState::defined_bitmap`]) rather than a begin-`22x`/`232000`
    /// operator (store as the active bitmap under `marker_mode`).
    pub capture_into_defined: bool,
}

impl CoderState {
    /// A fresh state for a new subset, inheriting only the compression flag
    /// from section framing.
    pub fn new(compression: bool) -> Self {
        Self {
            compression,
            ..Self::default()
        }
    }

    /// Effective nbits for an element with native width `native`, honouring
    /// `201YYY`, `208YYY` (string override) and `207YYY`'s reference bump are
    /// applied by the caller, since they depend on the element's kind.
    pub fn effective_nbits(&self, native: u16) -> i32 {
        native as i32 + self.nbits_offset
    }

    /// Effective scale for an element with native scale `native`.
    pub fn effective_scale(&self, native: i32) -> i32 {
        self.scale_override.unwrap_or(native + self.scale_offset)
    }

    /// Effective reference for an element, honouring any `203YYY`-captured
    /// override.
    pub fn effective_reference(&self, id: DescriptorId, native: i64) -> i64 {
        self.new_refvals.get(&id).copied().unwrap_or(native)
    }

    /// Cancel all bitmap and marker/back-reference state (`235000`).
    pub fn cancel_bitmaps(&mut self) {
        self.bitmap_state.clear();
        self.defined_bitmap = None;
        self.marker_mode = MarkerMode::None;
        self.back_reference_candidates.clear();
    }

    /// Record a class-0 element as a future bitmap back-reference candidate.
    pub fn record_candidate(&mut self, id: DescriptorId) {
        self.back_reference_candidates.push(id);
    }
}

/// The BUFR-prescribed extra bit width `207YYY` bumps a numeric element's
/// effective width by: `⌊10·((10^YYY−1)/7)⌋ + 1`.
pub fn operator_207_bit_bump(yyy: i32) -> i32 {
    if yyy == 0 {
        return 0;
    }

    let numerator = 10f64.powi(yyy) - 1.0;
    (10.0 * (numerator / 7.0)).floor() as i32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_nbits_applies_offset() {
        let mut state = CoderState::new(false);
        state.nbits_offset = -3;
        assert_eq!(state.effective_nbits(10), 7);
    }

    #[test]
    fn effective_scale_prefers_override() {
        let mut state = CoderState::new(false);
        state.scale_offset = 2;
        assert_eq!(state.effective_scale(1), 3);
        state.scale_override = Some(9);
        assert_eq!(state.effective_scale(1), 9);
    }

    #[test]
    fn cancel_bitmaps_clears_everything() {
        let mut state = CoderState::new(false);
        state.marker_mode = MarkerMode::Substitution;
        state.back_reference_candidates.push(DescriptorId::from_fxxyyy("001001").unwrap());
        state.bitmap_state.push(Bitmap {
            bits: vec![false],
            candidates: vec![],
            cursor: 0,
        });

        state.cancel_bitmaps();

        assert!(state.bitmap_state.is_empty());
        assert!(state.back_reference_candidates.is_empty());
        assert_eq!(state.marker_mode, MarkerMode::None);
    }

    #[test]
    fn op_207_bump_matches_known_values() {
        // YYY=0 cancels (no bump); YYY=1 gives a small, nonzero bump.
        assert_eq!(operator_207_bit_bump(0), 0);
        assert!(operator_207_bit_bump(1) > 0);
    }
}
