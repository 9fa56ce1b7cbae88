// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

//! MLX90641 EEPROM Hamming code
//!
//! Every EEPROM word carries eleven data bits (D0 through D10) in the low bits, and a
//! [Hamming code] in the upper five bits. It is a (15, 11) code with an extra overall parity bit
//! (a SECDED code), with all parity bits moved to the most significant bits:
//!
//! ```text
//! bit   15 14 13 12 11 10  9  8  7  6  5  4  3  2  1  0
//! role  P4 P3 P2 P1 P0 D10 D9 D8 D7 D6 D5 D4 D3 D2 D1 D0
//! ```
//!
//! P0 through P3 each cover a subset of the data bits (see `PARITY_MASKS`), and P4 covers every
//! other bit in the word. A single flipped bit anywhere in the word can be corrected, and two
//! flipped bits are detected.
//!
//! [Hamming code]: https://en.wikipedia.org/wiki/Hamming_code

use crate::error::LibraryError;
use crate::util::is_bit_set;

const DATA_MASK: u16 = 0x07FF;

/// The bit index of P0.
const PARITY_OFFSET: usize = DATA_MASK.count_ones() as usize;

/// The data bits covered by P0 through P3, then P4 (which also covers P0 through P3).
const PARITY_MASKS: [u16; 5] = [
    0b0000_0101_0101_1011,
    0b0000_0110_0110_1101,
    0b0000_0111_1000_1110,
    0b0000_0111_1111_0000,
    0b0111_1111_1111_1111,
];

fn parity(word: u16) -> u16 {
    (word.count_ones() % 2) as u16
}

/// Compute and add the Hamming code to a word
///
/// The eleven data bits are returned with the code in the upper five bits. The bits that will be
/// used for the code must be 0 when given, otherwise an error is returned.
pub fn add_checksum(word: u16) -> Result<u16, LibraryError> {
    if word & !DATA_MASK != 0 {
        return Err(LibraryError::Other(
            "Value given to add_checksum already has a checksum",
        ));
    }
    // P4 covers P0-P3, so the order matters here.
    Ok(PARITY_MASKS
        .iter()
        .enumerate()
        .fold(word, |encoded, (index, mask)| {
            encoded | parity(encoded & mask) << (PARITY_OFFSET + index)
        }))
}

/// Which of P0 through P3 cover the bit at `index` (including the parity bits themselves).
fn coverage(index: usize) -> u16 {
    PARITY_MASKS[..4]
        .iter()
        .enumerate()
        .filter(|(parity_index, mask)| {
            let mask = **mask | 1 << (PARITY_OFFSET + parity_index);
            is_bit_set(mask, index)
        })
        .fold(0, |acc, (parity_index, _)| acc | 1 << parity_index)
}

/// Validate the checksum used for the MLX90641 EEPROM, returning the data bits
///
/// One-bit errors are corrected. If uncorrectable errors are found, a [`LibraryError::Checksum`]
/// is returned with the failing value.
pub fn validate_checksum(word: u16) -> Result<u16, LibraryError> {
    let syndrome = PARITY_MASKS[..4]
        .iter()
        .enumerate()
        .fold(0u16, |acc, (index, mask)| {
            let covered = word & (mask | 1 << (PARITY_OFFSET + index));
            acc | parity(covered) << index
        });
    let overall_parity = parity(word);
    match (syndrome, overall_parity) {
        (0, 0) => Ok(word & DATA_MASK),
        // An odd number of flipped bits. Assume it's one, and find the bit with a matching
        // coverage pattern. P4 is the only bit not covered by P0-P3.
        (_, 1) => {
            let corrected = (0..u16::BITS as usize)
                .find(|index| coverage(*index) == syndrome)
                .map(|index| word ^ 1 << index)
                .ok_or(LibraryError::Checksum(word))?;
            match add_checksum(corrected & DATA_MASK) {
                Ok(encoded) if encoded == corrected => Ok(corrected & DATA_MASK),
                _ => Err(LibraryError::Checksum(word)),
            }
        }
        // Even parity with a non-zero syndrome means at least two bits flipped.
        _ => Err(LibraryError::Checksum(word)),
    }
}

#[cfg(test)]
mod test {
    use mlx90641_test_data::mlx90641_datasheet_eeprom;

    use crate::error::LibraryError;

    fn eeprom_words() -> impl Iterator<Item = u16> {
        let raw = mlx90641_datasheet_eeprom();
        (0..raw.len() / 2)
            .map(move |index| u16::from_be_bytes([raw[index * 2], raw[index * 2 + 1]]))
    }

    #[test]
    fn add_checksum() {
        assert_eq!(super::add_checksum(0x0000), Ok(0x0000));
        // Vdd_25 from the datasheet example
        assert_eq!(super::add_checksum(0x0658), Ok(0x2658));
        assert!(super::add_checksum(0x0800).is_err());
    }

    #[test]
    fn coverage_is_unique() {
        let mut seen = [false; 16];
        for index in 0..16 {
            let pattern = super::coverage(index) as usize;
            assert!(!seen[pattern], "bit {} shares a coverage pattern", index);
            seen[pattern] = true;
        }
    }

    #[test]
    fn checksum_no_errors() {
        for value in eeprom_words() {
            assert_eq!(
                super::validate_checksum(value),
                Ok(value & super::DATA_MASK),
                "{:#06X} did not pass checksum validation",
                value
            );
        }
    }

    #[test]
    fn checksum_one_error() {
        for value in eeprom_words() {
            for bit_index in 0..16 {
                let bad_value = value ^ (1 << bit_index);
                assert_eq!(
                    super::validate_checksum(bad_value),
                    Ok(value & super::DATA_MASK),
                    "Unable to correct {:#06X} to {:#06X}",
                    bad_value,
                    value
                );
            }
        }
    }

    #[test]
    fn checksum_two_errors() {
        for value in eeprom_words() {
            for bit_index1 in 0..16 {
                for bit_index2 in (bit_index1 + 1)..16 {
                    let bad_value = value ^ (1 << bit_index1) ^ (1 << bit_index2);
                    assert_eq!(
                        super::validate_checksum(bad_value),
                        Err(LibraryError::Checksum(bad_value)),
                        "{:#06X} (originally {:#06X}) passed checksum validation unexpectedly",
                        bad_value,
                        value,
                    );
                }
            }
        }
    }
}
