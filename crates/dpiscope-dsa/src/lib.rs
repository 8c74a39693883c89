//! # dpiscope-dsa: Bit-Level Packing
//!
//! Big-endian bit fields over plain byte buffers. Fields are independent of
//! byte boundaries and may be up to 128 bits wide, which is what the share
//! token's revision tag needs.

#![no_std]
extern crate alloc;

pub mod bits;

pub use bits::{bytes_for_bits, read_bits, write_bits, zeroed, BitReader, BitWriter, MAX_FIELD_BITS};

static_assertions::const_assert_eq!(MAX_FIELD_BITS, u128::BITS as usize);
