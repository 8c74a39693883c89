use alloc::vec;
use alloc::vec::Vec;

/// Widest field a single read or write may cover.
pub const MAX_FIELD_BITS: usize = 128;

/// Number of bytes needed to hold `bits` bits.
#[inline(always)]
pub const fn bytes_for_bits(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Allocates a zeroed buffer large enough for `bits` bits.
pub fn zeroed(bits: usize) -> Vec<u8> {
    vec![0u8; bytes_for_bits(bits)]
}

#[inline(always)]
fn low_mask(n: usize) -> u8 {
    ((1u16 << n) - 1) as u8
}

#[inline(always)]
fn check_window(buf_len: usize, bit_offset: usize, bit_length: usize) {
    assert!(
        (1..=MAX_FIELD_BITS).contains(&bit_length),
        "bit field width {} outside 1..={}",
        bit_length,
        MAX_FIELD_BITS
    );
    let end = bit_offset.saturating_add(bit_length);
    assert!(
        bytes_for_bits(end) <= buf_len,
        "bit window {}..{} exceeds buffer of {} bytes",
        bit_offset,
        end,
        buf_len
    );
}

/// Writes the low `bit_length` bits of `value` at `bit_offset`, most-significant bit first.
///
/// The window may start and end anywhere inside a byte. Bits outside the window
/// are left untouched.
///
/// # Panics
/// If `bit_length` is 0 or above [`MAX_FIELD_BITS`], or the window runs past the buffer.
pub fn write_bits(buf: &mut [u8], bit_offset: usize, bit_length: usize, value: u128) {
    check_window(buf.len(), bit_offset, bit_length);
    debug_assert!(
        bit_length == MAX_FIELD_BITS || value >> bit_length == 0,
        "value {:#x} wider than {} bits",
        value,
        bit_length
    );

    let mut pos = bit_offset;
    let mut remaining = bit_length;
    while remaining > 0 {
        let byte = pos / 8;
        let in_byte = pos % 8;
        let take = (8 - in_byte).min(remaining);
        let chunk = ((value >> (remaining - take)) as u8) & low_mask(take);
        let shift = 8 - in_byte - take;
        let mask = low_mask(take) << shift;
        buf[byte] = (buf[byte] & !mask) | (chunk << shift);
        pos += take;
        remaining -= take;
    }
}

/// Reads `bit_length` bits at `bit_offset` as an unsigned integer. Inverse of [`write_bits`].
///
/// # Panics
/// Same conditions as [`write_bits`].
pub fn read_bits(buf: &[u8], bit_offset: usize, bit_length: usize) -> u128 {
    check_window(buf.len(), bit_offset, bit_length);

    let mut acc = 0u128;
    let mut pos = bit_offset;
    let mut remaining = bit_length;
    while remaining > 0 {
        let byte = pos / 8;
        let in_byte = pos % 8;
        let take = (8 - in_byte).min(remaining);
        let shift = 8 - in_byte - take;
        let chunk = (buf[byte] >> shift) & low_mask(take);
        acc = (acc << take) | chunk as u128;
        pos += take;
        remaining -= take;
    }
    acc
}

/// Sequential writer: each [`BitWriter::put`] lands right after the previous field.
pub struct BitWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> BitWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn put(&mut self, bit_length: usize, value: u128) -> &mut Self {
        write_bits(self.buf, self.offset, bit_length, value);
        self.offset += bit_length;
        self
    }

    /// Bits written so far.
    pub fn position(&self) -> usize {
        self.offset
    }
}

/// Sequential reader mirroring [`BitWriter`].
pub struct BitReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Starts reading at an arbitrary bit position.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, offset }
    }

    pub fn take(&mut self, bit_length: usize) -> u128 {
        let v = read_bits(self.buf, self.offset, bit_length);
        self.offset += bit_length;
        v
    }

    /// Like [`BitReader::take`] but returns `None` instead of panicking past the end.
    pub fn try_take(&mut self, bit_length: usize) -> Option<u128> {
        if bit_length == 0 || bit_length > MAX_FIELD_BITS || self.remaining() < bit_length {
            return None;
        }
        Some(self.take(bit_length))
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bits left before the end of the buffer.
    pub fn remaining(&self) -> usize {
        (self.buf.len() * 8).saturating_sub(self.offset)
    }
}

#[cfg(kani)]
mod proofs {
    use super::*;

    #[kani::proof]
    #[kani::unwind(20)]
    fn prove_round_trip_within_two_words() {
        let mut buf = [0u8; 18];
        let offset: usize = kani::any();
        let len: usize = kani::any();
        kani::assume(offset < 8);
        kani::assume(len >= 1 && len <= MAX_FIELD_BITS);
        let value: u128 = kani::any();
        let value = if len == MAX_FIELD_BITS { value } else { value & ((1u128 << len) - 1) };

        write_bits(&mut buf, offset, len, value);
        assert_eq!(read_bits(&buf, offset, len), value);
    }
}
