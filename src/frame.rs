//! Honda K-Line frame wire format.
//!
//! `mtype(1..3 B) | total_len(1 B) | data(0..N B) | checksum(1 B)`, the
//! same layout `original_source/eculib/honda.py`'s `format_message` and
//! `checksum8bitHonda` build, now typed instead of stitched together as a
//! raw `list`.

/// Honda's 8-bit checksum: two's complement of the byte sum, mod 256.
/// A frame is valid iff the 8-bit sum of the whole frame (data bytes plus
/// checksum byte) is zero.
pub fn checksum8bit_honda(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (((sum ^ 0xFF) + 1) & 0xFF) as u8
}

/// A built Honda K-Line frame ready to write to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub mtype_len: usize,
    pub data_len: usize,
}

impl Frame {
    /// Builds `mtype || [total_len] || data || [checksum]`.
    ///
    /// `total_len = 2 + len(mtype) + len(data)`. Invariant:
    /// `frame[len(mtype)] == total_len`.
    pub fn build(mtype: &[u8], data: &[u8]) -> Self {
        let mtype_len = mtype.len();
        let data_len = data.len();
        let total_len = 2 + mtype_len + data_len;

        let mut bytes = Vec::with_capacity(total_len + 1);
        bytes.extend_from_slice(mtype);
        bytes.push(total_len as u8);
        bytes.extend_from_slice(data);
        debug_assert_eq!(bytes[mtype_len] as usize, total_len);
        let checksum = checksum8bit_honda(&bytes);
        bytes.push(checksum);

        Self {
            bytes,
            mtype_len,
            data_len,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whole-frame checksum validity: the 8-bit sum of every byte,
    /// including the trailing checksum byte, must be zero.
    pub fn checksum_valid(&self) -> bool {
        checksum8bit_honda(&self.bytes) == 0
    }
}

/// Fixes up the checksum byte at position `cksum` in `bytes` (length
/// `nbytes`) if `cksum` is a valid in-bounds index, then reports whether
/// the (possibly fixed) buffer validates. Mirrors
/// `eculib.honda.validate_checksums`.
pub fn validate_checksums(mut bytes: Vec<u8>, cksum: isize) -> (bool, bool, Vec<u8>) {
    let nbytes = bytes.len() as isize;
    let mut fixed = false;
    if cksum >= 0 && cksum < nbytes {
        let idx = cksum as usize;
        let mut without = bytes.clone();
        without.remove(idx);
        bytes[idx] = checksum8bit_honda(&without);
        fixed = true;
    }
    let valid = checksum8bit_honda(&bytes) == 0;
    (valid, fixed, bytes)
}

/// A parsed reply frame, named rather than a bare tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub reply_mtype: Vec<u8>,
    pub reply_length: u8,
    pub reply_data: Vec<u8>,
    pub reply_data_len: i32,
}

/// The `[0x82, 0x82, op]` PGM-FI family encodes a 32-bit flash address as
/// a permutation of its middle three bytes: `[B1, B3, B2]` where
/// `location = (B0<<24)|(B1<<16)|(B2<<8)|B3`.
pub fn format_read(location: u32) -> [u8; 3] {
    let b1 = ((location >> 16) & 0xFF) as u8;
    let b2 = ((location >> 8) & 0xFF) as u8;
    let b3 = (location & 0xFF) as u8;
    [b1, b3, b2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_honda_example() {
        // spec.md §8 scenario 3
        assert_eq!(
            checksum8bit_honda(&[0x72, 0x05, 0x71, 0x00, 0x10]),
            0x68
        );
    }

    #[test]
    fn format_message_matches_spec_example() {
        // spec.md §8 scenario 2
        let frame = Frame::build(&[0x72], &[0x71, 0x00]);
        assert_eq!(frame.bytes, vec![0x72, 0x04, 0x71, 0x00, 0x79]);
    }

    #[test]
    fn build_invariants_hold_for_arbitrary_inputs() {
        for mtype_len in 1..=3usize {
            for data_len in 0..=8usize {
                let mtype: Vec<u8> = (0..mtype_len as u8).collect();
                let data: Vec<u8> = (0..data_len as u8).map(|b| b.wrapping_mul(7)).collect();
                let frame = Frame::build(&mtype, &data);
                assert_eq!(frame.bytes[mtype_len] as usize, frame.bytes.len() - 1);
                assert!(frame.checksum_valid());
            }
        }
    }

    #[test]
    fn validate_checksums_always_fixes_in_range() {
        let bytes = vec![0x72, 0x04, 0x71, 0x00, 0x00]; // wrong checksum
        for cksum in 0..bytes.len() as isize {
            let (valid, fixed, fixed_bytes) = validate_checksums(bytes.clone(), cksum);
            assert!(fixed);
            assert!(valid);
            assert_eq!(checksum8bit_honda(&fixed_bytes), 0);
        }
    }

    #[test]
    fn format_read_permutes_middle_bytes() {
        let location: u32 = 0x11223344;
        let out = format_read(location);
        assert_eq!(out, [0x22, 0x44, 0x33]);
    }
}
