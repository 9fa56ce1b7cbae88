// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The size of the MLX90641 EEPROM in bytes.
///
/// 0x273F is the last address in the EEPROM, so add one to that to include it, while 0x2400 is
/// the first address. Each address contains a 16-bit value.
pub const EEPROM_LENGTH: usize = (0x2740 - 0x2400) * 2;

/// The device constants (0x2400 through 0x243F) from the datasheet's worked example.
///
/// The first 16 words are not used for calibration and are left as 0.
const MLX90641_EEPROM_HEADER: &[u8] = b"\
    \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
    \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
    \x00\x00\xb7\xe8\xd0\x16\x00\x00\x00\x00\xc2\xfd\x1a\x43\xca\x9a\
    \x51\x64\x01\x8c\x01\x8c\x01\x8c\x9c\xb1\x95\x6c\xa5\xcc\x7d\xd1\
    \x6d\x7f\x3c\xd4\x27\xb8\x19\xe6\xf1\x37\x78\x14\x26\x58\xef\x9e\
    \x91\x7f\xf0\x18\xe1\x56\x48\x17\x1c\x80\x23\x3e\xc8\x26\xcf\xfc\
    \xa0\x09\xbb\x53\xf1\x94\xfc\x00\x78\x14\xed\x22\xed\x22\xed\x22\
    \xed\x22\xed\x22\x80\xc8\xed\x22\x41\x90\xed\x22\xda\x58\xed\x22";

/// A full EEPROM image, with every pixel using the values for pixel (6, 9) in the datasheet.
pub fn mlx90641_datasheet_eeprom() -> [u8; EEPROM_LENGTH] {
    let offset_0 = b"\xf8\x49";
    let sensitivity = b"\xff\xff";
    let k_ta_with_k_v = b"\xb8\xc0";
    // This is different than the datasheet! It looks like they used the subpage 0 data, but
    // changed the last digit without recomputing the checksum.
    let offset_1 = b"\xd8\x47";
    let mut eeprom_data = [0u8; EEPROM_LENGTH];
    eeprom_data[..MLX90641_EEPROM_HEADER.len()].copy_from_slice(MLX90641_EEPROM_HEADER);
    // After the header come four per-pixel regions, in this order.
    let pixel_regions = eeprom_data[MLX90641_EEPROM_HEADER.len()..]
        .chunks_exact_mut(mlx90641::NUM_PIXELS * 2)
        .zip([offset_0, sensitivity, k_ta_with_k_v, offset_1]);
    for (region, pixel_word) in pixel_regions {
        for dest in region.chunks_exact_mut(2) {
            dest.copy_from_slice(pixel_word);
        }
    }
    eeprom_data
}
