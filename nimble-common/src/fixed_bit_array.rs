use bytes::Bytes;
use nimble_error::{NimbleResult, nimble_bail};

/// A packed array of unsigned integers at `bit_width` bits per value.
///
/// Values are stored LSB-first across a contiguous byte buffer; the buffer is
/// padded to an 8-byte boundary so whole-word loads never run off the end.
pub struct FixedBitArray {
    bytes: Bytes,
    bit_width: usize,
    len: usize,
}

impl FixedBitArray {
    /// Bytes needed to store `len` values at `bit_width` bits, word padded.
    pub fn buffer_len(len: usize, bit_width: usize) -> usize {
        (len * bit_width).div_ceil(8).next_multiple_of(8)
    }

    /// Pack `values` at `bit_width` bits each, appending to `out`.
    ///
    /// Bits above `bit_width` in each value must be zero.
    pub fn pack(values: &[u64], bit_width: usize, out: &mut Vec<u8>) {
        debug_assert!((1..=64).contains(&bit_width));
        let start = out.len();
        out.resize(start + Self::buffer_len(values.len(), bit_width), 0);
        let bytes = &mut out[start..];
        for (i, value) in values.iter().enumerate() {
            debug_assert!(bit_width == 64 || *value < (1u64 << bit_width));
            let mut bit_pos = i * bit_width;
            for bit in 0..bit_width {
                if value >> bit & 1 == 1 {
                    bytes[bit_pos / 8] |= 1 << (bit_pos % 8);
                }
                bit_pos += 1;
            }
        }
    }

    /// Wrap a packed buffer of `len` values.
    pub fn new(bytes: Bytes, bit_width: usize, len: usize) -> NimbleResult<Self> {
        if !(1..=64).contains(&bit_width) {
            nimble_bail!(MalformedEncoding: "fixed bit width {} out of range", bit_width);
        }
        if bytes.len() * 8 < len * bit_width {
            nimble_bail!(
                MalformedEncoding: "fixed bit buffer too small: {} bytes for {} values of {} bits",
                bytes.len(),
                len,
                bit_width
            );
        }
        Ok(Self {
            bytes,
            bit_width,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read value `i`.
    pub fn get(&self, i: usize) -> u64 {
        debug_assert!(i < self.len);
        let mut value = 0u64;
        let mut bit_pos = i * self.bit_width;
        for bit in 0..self.bit_width {
            value |= u64::from(self.bytes[bit_pos / 8] >> (bit_pos % 8) & 1) << bit;
            bit_pos += 1;
        }
        value
    }

    /// The smallest bit width able to represent `max`.
    pub fn required_bit_width(max: u64) -> usize {
        (64 - max.leading_zeros() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(7)]
    #[case(13)]
    #[case(32)]
    #[case(64)]
    fn pack_get_round_trip(#[case] bit_width: usize) {
        let mask = if bit_width == 64 {
            u64::MAX
        } else {
            (1u64 << bit_width) - 1
        };
        let values: Vec<u64> = (0..100u64).map(|i| i.wrapping_mul(0x9e3779b1) & mask).collect();
        let mut out = Vec::new();
        FixedBitArray::pack(&values, bit_width, &mut out);
        assert_eq!(out.len() % 8, 0);
        let packed = FixedBitArray::new(Bytes::from(out), bit_width, values.len()).unwrap();
        for (i, value) in values.iter().enumerate() {
            assert_eq!(packed.get(i), *value, "bit_width={bit_width} i={i}");
        }
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(255, 8)]
    #[case(256, 9)]
    #[case(u64::MAX, 64)]
    fn bit_widths(#[case] max: u64, #[case] expected: usize) {
        assert_eq!(FixedBitArray::required_bit_width(max), expected);
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(FixedBitArray::new(Bytes::from_static(&[0u8; 2]), 8, 100).is_err());
    }
}
