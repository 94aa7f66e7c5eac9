//! Nucleotide sequence helpers used by ensembling and augmentation.

/// Padding base used when a shift moves sequence off the end.
pub const PAD_BASE: u8 = b'N';

/// Complement of a single base; anything unrecognised becomes `N`.
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => PAD_BASE,
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// Shift a sequence by `shift` positions, keeping its length.
///
/// Positive shifts move bases to the right (padding on the left), negative
/// shifts move them to the left (padding on the right).
pub fn shift_sequence(seq: &[u8], shift: i64) -> Vec<u8> {
    let len = seq.len();
    if shift == 0 {
        return seq.to_vec();
    }
    let magnitude = shift.unsigned_abs() as usize;
    if magnitude >= len {
        return vec![PAD_BASE; len];
    }
    let mut out = Vec::with_capacity(len);
    if shift > 0 {
        out.extend(std::iter::repeat_n(PAD_BASE, magnitude));
        out.extend_from_slice(&seq[..len - magnitude]);
    } else {
        out.extend_from_slice(&seq[magnitude..]);
        out.extend(std::iter::repeat_n(PAD_BASE, magnitude));
    }
    out
}

/// Index of a base in ACGT order, `None` for ambiguous bases.
pub fn base_index(base: u8) -> Option<usize> {
    match base.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}
