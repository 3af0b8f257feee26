//! Section framing (component I, §4.9): parses/writes sections 0, 1, 2, 3, 5
//! and locates section 4's payload for the engine.

use crate::error::{bail, Error, ErrorKind, Result};
use bufr_tables::DescriptorId;

#[cfg(feature = "logging")]
use log::debug;

const MAGIC: &[u8; 4] = b"BUFR";
const TERMINATOR: &[u8; 4] = b"7777";

/// The metadata the engine needs before it can walk section 4's payload.
#[derive(Debug, Clone)]
pub struct SectionFrame {
    /// BUFR edition number (section 0).
    pub edition: u8,
    /// Master table version in effect (section 1).
    pub master_table_version: u8,
    /// Originating centre (section 1).
    pub originating_centre: u16,
    /// Local table version in effect (section 1).
    pub local_table_version: u8,
    /// Number of data subsets (section 3).
    pub n_subsets: u16,
    /// Whether section 4 uses columnwise compression (section 3, bit 6).
    pub compressed: bool,
    /// Whether data is observed rather than other (section 3, bit 7).
    pub observed: bool,
    /// The unexpanded descriptor list (section 3).
    pub descriptors: Vec<DescriptorId>,
}

fn read_u24(bytes: &[u8], at: usize) -> Result<usize> {
    bytes
        .get(at..at + 3)
        .map(|s| (s[0] as usize) << 16 | (s[1] as usize) << 8 | s[2] as usize)
        .ok_or_else(|| {
            Error::new(ErrorKind::MalformedHeader(format!(
                "truncated 3-byte length field at offset {at}"
            )))
        })
}

fn byte_at(bytes: &[u8], at: usize, what: &str) -> Result<u8> {
    bytes.get(at).copied().ok_or_else(|| {
        Error::new(ErrorKind::MalformedHeader(format!(
            "truncated {what} at offset {at}"
        )))
    })
}

/// Parse every section up to and including section 3, returning the frame,
/// the bit offset at which section 4's payload begins, and the message's
/// total declared length in bytes (from section 0).
pub fn read_message(bytes: &[u8]) -> Result<(SectionFrame, usize, usize)> {
    if bytes.len() < 8 || &bytes[0..4] != MAGIC {
        bail!(ErrorKind::ValidationFailed(
            "section 0 does not start with 'BUFR'".into()
        ));
    }

    let total_len = read_u24(bytes, 4)?;
    let edition = byte_at(bytes, 7, "section 0 edition byte")?;

    #[cfg(feature = "logging")]
    debug!("section 0: edition {edition}, total length {total_len}");

    if bytes.len() < total_len {
        bail!(ErrorKind::MalformedHeader(format!(
            "declared total length {total_len} exceeds buffer length {}",
            bytes.len()
        )));
    }

    let mut cursor = 8;

    let sec1_len = read_u24(bytes, cursor)?;
    let sec1_start = cursor;
    let master_table_version = byte_at(bytes, cursor + 3, "section 1 master table")?;
    let originating_centre =
        u16::from(byte_at(bytes, cursor + 4, "section 1 centre hi")?) << 8
            | u16::from(byte_at(bytes, cursor + 5, "section 1 centre lo")?);
    // Offsets beyond this point vary by edition in real BUFR; this frame
    // collects only the fields the engine and table selection need.
    let flag_byte = byte_at(bytes, cursor + 7, "section 1 optional-section flag")?;
    let has_section2 = flag_byte & 0b1000_0000 != 0;
    let local_table_version = byte_at(bytes, sec1_start + sec1_len - 1, "section 1 local table")?;

    #[cfg(feature = "logging")]
    debug!("section 1: master table v{master_table_version}, centre {originating_centre}, local table v{local_table_version}");

    cursor += sec1_len;

    if has_section2 {
        let sec2_len = read_u24(bytes, cursor)?;
        cursor += sec2_len;
    }

    let sec3_len = read_u24(bytes, cursor)?;
    let sec3_start = cursor;
    let n_subsets = u16::from(byte_at(bytes, cursor + 4, "section 3 n_subsets hi")?) << 8
        | u16::from(byte_at(bytes, cursor + 5, "section 3 n_subsets lo")?);
    let flags = byte_at(bytes, cursor + 6, "section 3 flags")?;
    let compressed = flags & 0b0100_0000 != 0;
    let observed = flags & 0b1000_0000 != 0;

    if flags & 0b0010_0000 != 0 {
        bail!(ErrorKind::ValidationFailed(
            "section 3 reserved bit 5 must be zero".into()
        ));
    }

    let descriptor_bytes_start = cursor + 7;
    let descriptor_bytes_end = sec3_start + sec3_len;
    let mut descriptors = Vec::new();
    let mut d = descriptor_bytes_start;

    while d + 1 < descriptor_bytes_end {
        let hi = byte_at(bytes, d, "section 3 descriptor hi byte")?;
        let lo = byte_at(bytes, d + 1, "section 3 descriptor lo byte")?;
        let raw = u16::from(hi) << 8 | u16::from(lo);
        descriptors.push(DescriptorId::from_u16(raw));
        d += 2;
    }

    #[cfg(feature = "logging")]
    debug!(
        "section 3: {n_subsets} subset(s), compressed={compressed}, {} descriptor(s)",
        descriptors.len()
    );

    cursor = sec3_start + sec3_len;

    let sec4_len = read_u24(bytes, cursor)?;
    let section4_bit_offset = (cursor + 4) * 8;
    cursor += sec4_len;

    if &bytes[cursor..cursor + 4.min(bytes.len() - cursor)] != TERMINATOR
        && bytes.len() >= cursor + 4
    {
        bail!(ErrorKind::ValidationFailed(
            "section 5 terminator is not '7777'".into()
        ));
    }

    let frame = SectionFrame {
        edition,
        master_table_version,
        originating_centre,
        local_table_version,
        n_subsets,
        compressed,
        observed,
        descriptors,
    };

    Ok((frame, section4_bit_offset, total_len))
}

/// Write sections 0, 1, 3, 5 around an already-encoded section 4 payload
/// (`section4_bytes`, the reserved byte plus engine output, length-prefixed
/// by the caller's [`crate::bitio::BitWriter`] already byte-aligned).
pub fn write_message(frame: &SectionFrame, section4_payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();

    // Section 1: fixed-minimum layout (no section 2, no edition-4 reserved
    // byte) sized to hold the fields this frame tracks.
    let sec1_len: usize = 18;
    let mut sec1 = Vec::with_capacity(sec1_len);
    sec1.extend_from_slice(&(sec1_len as u32).to_be_bytes()[1..]);
    sec1.push(frame.master_table_version);
    sec1.push((frame.originating_centre >> 8) as u8);
    sec1.push(frame.originating_centre as u8);
    sec1.push(0); // update sequence number
    sec1.push(0); // optional-section flag: no section 2
    sec1.push(0); // data category
    sec1.push(0); // data sub-category
    sec1.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // year/month/day/hour/minute
    sec1.push(frame.local_table_version);
    debug_assert_eq!(sec1.len(), sec1_len);

    let descriptor_bytes = frame.descriptors.len() * 2;
    let mut sec3_len = 7 + descriptor_bytes;
    if sec3_len % 2 != 0 {
        sec3_len += 1;
    }
    let mut sec3 = Vec::with_capacity(sec3_len);
    sec3.extend_from_slice(&(sec3_len as u32).to_be_bytes()[1..]);
    sec3.push(0); // reserved
    sec3.push((frame.n_subsets >> 8) as u8);
    sec3.push(frame.n_subsets as u8);
    let mut flags = 0u8;
    if frame.compressed {
        flags |= 0b0100_0000;
    }
    if frame.observed {
        flags |= 0b1000_0000;
    }
    sec3.push(flags);
    for id in &frame.descriptors {
        let raw = id.to_u16();
        sec3.push((raw >> 8) as u8);
        sec3.push(raw as u8);
    }
    if sec3.len() < sec3_len {
        sec3.push(0);
    }

    let sec4_len = 4 + section4_payload.len();
    let mut sec4 = Vec::with_capacity(sec4_len);
    sec4.extend_from_slice(&(sec4_len as u32).to_be_bytes()[1..]);
    sec4.extend_from_slice(section4_payload);

    let total_len = 8 + sec1.len() + sec3.len() + sec4.len() + 4;

    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(total_len as u32).to_be_bytes()[1..]);
    out.push(frame.edition);
    out.extend_from_slice(&sec1);
    out.extend_from_slice(&sec3);
    out.extend_from_slice(&sec4);
    out.extend_from_slice(TERMINATOR);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> SectionFrame {
        SectionFrame {
            edition: 4,
            master_table_version: 28,
            originating_centre: 98,
            local_table_version: 0,
            n_subsets: 1,
            compressed: false,
            observed: true,
            descriptors: vec![DescriptorId::from_fxxyyy("001001").unwrap()],
        }
    }

    #[test]
    fn write_then_read_roundtrips_framing() {
        let frame = sample_frame();
        let payload = [0u8, 0xFF, 0xFF];
        let bytes = write_message(&frame, &payload);

        let (parsed, sec4_bit_offset, total_len) = read_message(&bytes).unwrap();

        assert_eq!(parsed.edition, frame.edition);
        assert_eq!(parsed.master_table_version, frame.master_table_version);
        assert_eq!(parsed.originating_centre, frame.originating_centre);
        assert_eq!(parsed.n_subsets, frame.n_subsets);
        assert_eq!(parsed.compressed, frame.compressed);
        assert_eq!(parsed.descriptors, frame.descriptors);
        assert_eq!(total_len, bytes.len());
        assert_eq!(sec4_bit_offset % 8, 0);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = b"XXXX\x00\x00\x08\x04";
        assert!(read_message(bytes).is_err());
    }

    #[test]
    fn rejects_bad_terminator() {
        let frame = sample_frame();
        let mut bytes = write_message(&frame, &[0u8]);
        let len = bytes.len();
        bytes[len - 1] = b'8';
        assert!(read_message(&bytes).is_err());
    }
}
