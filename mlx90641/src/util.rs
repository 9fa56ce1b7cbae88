// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The word size of the camera in terms of 8-bit bytes.
pub(crate) const WORD_SIZE: usize = (u16::BITS / u8::BITS) as usize;

/// Define subtraction between members of an address enumeration, yielding the distance in words.
#[doc(hidden)]
#[macro_export]
macro_rules! address_enum_ops {
    ($typ:ident) => {
        impl ::core::ops::Sub<$typ> for $typ {
            type Output = u16;
            fn sub(self, other: $typ) -> Self::Output {
                self as u16 - other as u16
            }
        }
        impl ::core::ops::Sub<&$typ> for &$typ {
            type Output = u16;
            fn sub(self, other: &$typ) -> Self::Output {
                *self as u16 - *other as u16
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! expose_member {
    ($(#[$meta:meta])* $name:ident, $typ:ty) => {
        $(#[$meta])*
        pub fn $name(&self) -> $typ {
            self.$name
        }
    };
    ($(#[$meta:meta])* &$name:ident, $typ:ty) => {
        $(#[$meta])*
        pub fn $name(&self) -> &$typ {
            &self.$name
        }
    };
}

/// A cursor over big-endian 16-bit words.
///
/// Reading past the end panics, so callers check the length of the whole dump up front.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Words<'a>(&'a [u8]);

impl<'a> Words<'a> {
    /// Start reading `data` at a byte offset.
    pub(crate) fn new(data: &'a [u8], byte_offset: usize) -> Self {
        Self(&data[byte_offset..])
    }

    pub(crate) fn skip(&mut self, words: usize) {
        self.0 = &self.0[words * WORD_SIZE..];
    }

    pub(crate) fn next_word(&mut self) -> u16 {
        let (word, rest) = self.0.split_at(WORD_SIZE);
        self.0 = rest;
        u16::from_be_bytes([word[0], word[1]])
    }
}

/// Check if the n-th bit is set.
///
/// Bits are 0-indexed, from the LSB.
pub(crate) fn is_bit_set<B>(value: B, index: usize) -> bool
where
    B: num_traits::PrimInt + num_traits::Unsigned,
{
    (value & (B::one() << index)) > B::zero()
}

/// Interpret the lower `num_bits` of a word as a two's complement integer.
pub(crate) fn sign_extend(value: u16, num_bits: u32) -> i16 {
    let shift = u16::BITS - num_bits;
    ((value << shift) as i16) >> shift
}
