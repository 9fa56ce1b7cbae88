// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

//! Calibration data stored in the MLX90641 EEPROM.
//!
//! The EEPROM is read once (see [`Calibration::from_i2c`]) and processed into the constants used
//! when converting raw frames into temperatures.
use core::iter;

use arrayvec::ArrayVec;
use bitvec::array::BitArray;
use bitvec::slice::BitSlice;
use embedded_hal::blocking::i2c;

// Various floating point operations are not implemented in core, so we use libm to provide them as
// needed.
#[cfg_attr(feature = "std", allow(unused_imports))]
use num_traits::Float;

use crate::address::{Address, EepromAddress};
use crate::error::{Error, LibraryError};
use crate::expose_member;
use crate::hamming::validate_checksum;
use crate::register::{Resolution, Subpage};
use crate::util::{sign_extend, Words, WORD_SIZE};
use crate::{NUM_PIXELS, WIDTH};

/// The number of corner temperatures an MLX90641 has.
pub const NUM_CORNER_TEMPERATURES: usize = 8;

/// The index of the temperature range the calibration was performed in, 0°C to 80°C.
pub const BASIC_TEMPERATURE_RANGE: usize = 2;

type FlagArray = BitArray<[usize; NUM_PIXELS / usize::BITS as usize]>;

/// The processed contents of an MLX90641 EEPROM.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    k_v_dd: i16,

    v_dd_25: i16,

    resolution: Resolution,

    k_v_ptat: f32,

    k_t_ptat: f32,

    v_ptat_25: f32,

    alpha_ptat: f32,

    gain: f32,

    k_s_ta: f32,

    corner_temperatures: [i16; NUM_CORNER_TEMPERATURES],

    k_s_to: [f32; NUM_CORNER_TEMPERATURES],

    emissivity: f32,

    alpha_pixels: [f32; NUM_PIXELS],

    alpha_cp: f32,

    offset_reference_pixels: [[i16; NUM_PIXELS]; 2],

    offset_reference_cp: i16,

    k_v_pixels: [f32; NUM_PIXELS],

    k_v_cp: f32,

    k_ta_pixels: [f32; NUM_PIXELS],

    k_ta_cp: f32,

    temperature_gradient_coefficient: f32,

    failed_pixels: FlagArray,
}

impl Calibration {
    /// Process a full EEPROM dump, starting at 0x2400.
    pub fn from_data(data: &[u8]) -> Result<Self, LibraryError> {
        if data.len() < EepromAddress::LENGTH {
            return Err(LibraryError::InvalidData(
                "EEPROM data is shorter than the MLX90641 EEPROM",
            ));
        }
        // The device constants are scattered around the first 0x40 words, but most of them are
        // packed together starting at KsTa.
        let mut reader = EepromReader::at(data, EepromAddress::KsTa);
        let k_s_ta = f32::from(reader.signed()?) / 15f32.exp2();
        let emissivity = f32::from(reader.signed()?) / 9f32.exp2();
        let gain = reader.combined()?;
        let v_dd_25 = reader.signed()? << 5;
        let k_v_dd = reader.signed()? << 5;
        let v_ptat_25 = reader.combined()?;
        // Scaled by 2^3
        let k_t_ptat = f32::from(reader.signed()?) / 8f32;
        // Scaled by 2^12
        let k_v_ptat = f32::from(reader.signed()?) / 4096f32;
        // Scaled by 2^7 (not 11, as the address map says)
        let alpha_ptat = f32::from(reader.unsigned()?) / 128f32;
        let alpha_cp = f32::from(reader.unsigned()?);
        let alpha_cp = alpha_cp / f32::from(reader.unsigned()?).exp2();
        let offset_reference_cp = reader.combined()? as i16;
        let k_ta_cp = reader.scaled_cp_constant()?;
        let k_v_cp = reader.scaled_cp_constant()?;
        let (resolution, temperature_gradient_coefficient) = reader.resolution_with_tgc()?;
        let (corner_temperatures, k_s_to) = reader.temperature_ranges()?;

        let mut calibration = Self {
            k_v_dd,
            v_dd_25,
            resolution,
            k_v_ptat,
            k_t_ptat,
            v_ptat_25: v_ptat_25.into(),
            alpha_ptat,
            gain: gain.into(),
            k_s_ta,
            corner_temperatures,
            k_s_to,
            emissivity,
            alpha_pixels: [0f32; NUM_PIXELS],
            alpha_cp,
            offset_reference_pixels: [[0i16; NUM_PIXELS]; 2],
            offset_reference_cp,
            k_v_pixels: [0f32; NUM_PIXELS],
            k_v_cp,
            k_ta_pixels: [0f32; NUM_PIXELS],
            k_ta_cp,
            temperature_gradient_coefficient,
            failed_pixels: FlagArray::default(),
        };
        calibration.load_pixels(data)?;
        Ok(calibration)
    }

    /// Dump the EEPROM from a camera and process it.
    pub fn from_i2c<I2C>(bus: &mut I2C, i2c_address: u8) -> Result<Self, Error<I2C>>
    where
        I2C: i2c::WriteRead + i2c::Write,
    {
        let mut eeprom_buf = [0u8; EepromAddress::LENGTH];
        let eeprom_base: Address = EepromAddress::Base.into();
        bus.write_read(i2c_address, &eeprom_base.as_bytes(), &mut eeprom_buf)
            .map_err(Error::I2cWriteReadError)?;
        Ok(Self::from_data(&eeprom_buf)?)
    }

    /// Fill in the per-pixel arrays and the failed pixel flags.
    fn load_pixels(&mut self, data: &[u8]) -> Result<(), LibraryError> {
        let mut reader = EepromReader::at(data, EepromAddress::OffsetCompensationScale);
        // Offset scale is the upper 6 bits. The other bits are reserved.
        let (offset_scale, _) = reader.split_6_5()?;
        let offset_scale = 2i16
            .checked_pow(offset_scale.into())
            .ok_or(LibraryError::InvalidData("Pixel offset scale is too large"))?;
        let offset_average = i16_from_i11(reader.combined()?);
        // the next two words are reserved.
        reader.skip(2);
        let k_ta = ScaledAverage::new(reader.signed()?, reader.split_6_5()?);
        let k_v = ScaledAverage::new(reader.signed()?, reader.split_6_5()?);
        let alpha_reference = reader.sensitivity_reference()?;

        let pixels = pixel_words(data, EepromAddress::PixelOffsetSubpage0Start)
            .zip(pixel_words(data, EepromAddress::PixelOffsetSubpage1Start))
            .zip(pixel_words(data, EepromAddress::PixelSensitivityStart))
            .zip(pixel_words(data, EepromAddress::PixelConstantsStart))
            .zip(alpha_reference)
            .take(NUM_PIXELS)
            .enumerate();
        for (index, ((((offset_0, offset_1), alpha), constants), alpha_reference)) in pixels {
            let (offset_0, offset_1) = (i16_from_i11(offset_0?), i16_from_i11(offset_1?));
            let alpha = alpha?;
            let (k_ta_raw, k_v_raw) = split_6_5(constants?);
            let k_ta_raw = sign_extend(k_ta_raw.into(), 6);
            let k_v_raw = sign_extend(k_v_raw.into(), 5);
            if offset_0 == 0 && offset_1 == 0 && alpha == 0 && k_ta_raw == 0 && k_v_raw == 0 {
                // Everything stays zeroed for failed pixels.
                self.failed_pixels.set(index, true);
                continue;
            }
            self.offset_reference_pixels[0][index] =
                scaled_offset(offset_average, offset_0, offset_scale)?;
            self.offset_reference_pixels[1][index] =
                scaled_offset(offset_average, offset_1, offset_scale)?;
            // alpha_EE is divided by (2^{11} - 1) = 2047
            self.alpha_pixels[index] = (f32::from(alpha) / 2047f32) * alpha_reference;
            self.k_ta_pixels[index] = k_ta.apply(k_ta_raw);
            self.k_v_pixels[index] = k_v.apply(k_v_raw);
        }
        Ok(())
    }

    expose_member!(k_v_dd, i16);
    expose_member!(v_dd_25, i16);
    expose_member!(
        /// The ADC resolution the camera was calibrated at.
        resolution,
        Resolution
    );
    expose_member!(k_v_ptat, f32);
    expose_member!(k_t_ptat, f32);
    expose_member!(v_ptat_25, f32);
    expose_member!(alpha_ptat, f32);
    expose_member!(gain, f32);
    expose_member!(k_s_ta, f32);
    expose_member!(
        /// The lower bound of each temperature range, in degrees Celsius.
        &corner_temperatures,
        [i16; NUM_CORNER_TEMPERATURES]
    );
    expose_member!(&k_s_to, [f32; NUM_CORNER_TEMPERATURES]);
    expose_member!(
        /// The emissivity programmed into the EEPROM at the factory.
        emissivity,
        f32
    );
    expose_member!(&alpha_pixels, [f32; NUM_PIXELS]);
    expose_member!(alpha_cp, f32);
    expose_member!(offset_reference_cp, i16);
    expose_member!(&k_v_pixels, [f32; NUM_PIXELS]);
    expose_member!(k_v_cp, f32);
    expose_member!(&k_ta_pixels, [f32; NUM_PIXELS]);
    expose_member!(k_ta_cp, f32);
    expose_member!(
        /// Thermal gradient compensation (TGC) coefficient, pre-scaled.
        temperature_gradient_coefficient,
        f32
    );

    /// The per-pixel offsets for a subpage.
    pub fn offset_reference_pixels(&self, subpage: Subpage) -> &[i16; NUM_PIXELS] {
        &self.offset_reference_pixels[usize::from(subpage)]
    }

    /// $K\_{s\_{T\_o}}$ for the basic temperature range.
    pub fn basic_k_s_to(&self) -> f32 {
        self.k_s_to[BASIC_TEMPERATURE_RANGE]
    }

    /// Pixels with no calibration data. The bit index is the pixel index (row-major).
    pub fn failed_pixels(&self) -> &BitSlice<usize> {
        &self.failed_pixels
    }
}

/// The shared average and scales used for the per-pixel K<sub>Ta</sub> and K<sub>V</sub>.
#[derive(Clone, Copy, Debug)]
struct ScaledAverage {
    average: f32,
    /// 2^scale_1, the divisor
    divisor: f32,
    /// 2^scale_2, the multiplier
    multiplier: f32,
}

impl ScaledAverage {
    fn new(average: i16, (scale_1, scale_2): (u8, u8)) -> Self {
        Self {
            average: average.into(),
            divisor: f32::from(scale_1).exp2(),
            multiplier: f32::from(scale_2).exp2(),
        }
    }

    fn apply(&self, raw: i16) -> f32 {
        (f32::from(raw) * self.multiplier + self.average) / self.divisor
    }
}

/// A cursor over the EEPROM dump that strips the Hamming code from each word.
struct EepromReader<'a> {
    words: Words<'a>,
}

impl<'a> EepromReader<'a> {
    fn at(data: &'a [u8], address: EepromAddress) -> Self {
        Self {
            words: Words::new(data, address.byte_offset()),
        }
    }

    fn skip(&mut self, words: usize) {
        self.words.skip(words);
    }

    /// The next word, with the Hamming code checked and stripped off.
    fn unsigned(&mut self) -> Result<u16, LibraryError> {
        validate_checksum(self.words.next_word())
    }

    fn signed(&mut self) -> Result<i16, LibraryError> {
        Ok(i16_from_i11(self.unsigned()?))
    }

    /// Two successive words combined into one.
    ///
    /// With the Hamming code in the upper five bits, each word only fits eleven bits of data. The
    /// 16-bit values are split across two words, the first holding the upper bits.
    fn combined(&mut self) -> Result<u16, LibraryError> {
        let upper = self.unsigned()?;
        let lower = self.unsigned()?;
        Ok((upper << 5) | lower)
    }

    fn split_6_5(&mut self) -> Result<(u8, u8), LibraryError> {
        Ok(split_6_5(self.unsigned()?))
    }

    /// Calculate $K\_{V\_{CP}}$ or $K\_{T\_{a\_{CP}}}$ values
    ///
    /// These two values are stored in one word in the EEPROM, with the upper five bits being the
    /// scale, and the lower six bits the (signed) unscaled value.
    fn scaled_cp_constant(&mut self) -> Result<f32, LibraryError> {
        let word = self.unsigned()?;
        let scale = f32::from((word & 0x07C0) >> 6).exp2();
        let value = sign_extend(word & 0x003F, 6);
        Ok(f32::from(value) / scale)
    }

    /// The calibrated ADC resolution and thermal gradient compensation (TGC) value.
    fn resolution_with_tgc(&mut self) -> Result<(Resolution, f32), LibraryError> {
        let word = self.unsigned()?;
        let resolution = Resolution::from_raw((word & 0x0600) >> 9)?;
        let tgc = sign_extend(word & 0x01FF, 9);
        // Scaled by 2^6
        Ok((resolution, f32::from(tgc) / 64f32))
    }

    /// Extract the corner temperatures and $K\_{s\_{T\_o}}$ values
    fn temperature_ranges(
        &mut self,
    ) -> Result<([i16; NUM_CORNER_TEMPERATURES], [f32; NUM_CORNER_TEMPERATURES]), LibraryError>
    {
        let scale = f32::from(self.unsigned()?).exp2();
        // The first five corner temperatures are fixed, the last three are read from the EEPROM.
        let mut corner_temperatures = [-40, -20, 0, 80, 120, 0, 0, 0];
        let mut k_s_to = [0f32; NUM_CORNER_TEMPERATURES];
        // The first five K_s_To values come first, then pairs of (corner temperature, K_s_To).
        for dest in k_s_to[..5].iter_mut() {
            *dest = f32::from(self.signed()?) / scale;
        }
        for index in 5..NUM_CORNER_TEMPERATURES {
            // 11-bit unsigned values always fit in an i16.
            corner_temperatures[index] = self.unsigned()? as i16;
            k_s_to[index] = f32::from(self.signed()?) / scale;
        }
        Ok((corner_temperatures, k_s_to))
    }

    /// Calculate $\alpha\_{\textit{reference}}$ for each pixel.
    ///
    /// The data is stored per pair of rows (32 pixels), as six scale values packed two to a word
    /// (6 bits then 5 bits, each offset by 20) starting at 0x2419, followed by six 11-bit
    /// $\textit{Row}\_{\textit{max}}$ values. The reference is $\textit{Row}\_{\textit{max}} /
    /// 2^{\textit{scale}}$.
    fn sensitivity_reference(&mut self) -> Result<impl Iterator<Item = f32>, LibraryError> {
        let mut scales: ArrayVec<u8, 6> = ArrayVec::new();
        for _ in 0..3 {
            let (first, second) = self.split_6_5()?;
            scales.push(first + 20);
            scales.push(second + 20);
        }
        let mut row_references = [0f32; 6];
        for (dest, scale) in row_references.iter_mut().zip(scales) {
            *dest = f32::from(self.unsigned()?) / f32::from(scale).exp2();
        }
        Ok(row_references
            .into_iter()
            .flat_map(|reference| iter::repeat(reference).take(WIDTH * 2)))
    }
}

/// Decode each word of a per-pixel region, starting at `start`.
fn pixel_words(
    data: &[u8],
    start: EepromAddress,
) -> impl Iterator<Item = Result<u16, LibraryError>> + '_ {
    data[start.byte_offset()..]
        .chunks_exact(WORD_SIZE)
        .map(|word| validate_checksum(u16::from_be_bytes([word[0], word[1]])))
}

/// `average + offset * scale`, failing if corrupt calibration data overflows an `i16`.
fn scaled_offset(average: i16, offset: i16, scale: i16) -> Result<i16, LibraryError> {
    offset
        .checked_mul(scale)
        .and_then(|scaled| scaled.checked_add(average))
        .ok_or(LibraryError::InvalidData("Pixel offset is out of range"))
}

/// Split a word into two values: the upper six bits and the lower five bits.
fn split_6_5(word: u16) -> (u8, u8) {
    let upper = (word & 0x07E0) >> 5;
    let lower = word & 0x001F;
    (upper as u8, lower as u8)
}

fn i16_from_i11(word: u16) -> i16 {
    sign_extend(word, 11)
}

#[cfg(test)]
#[allow(clippy::excessive_precision)]
pub(crate) mod test {
    use mlx90641_test_data::mlx90641_datasheet_eeprom;

    use crate::address::EepromAddress;
    use crate::error::LibraryError;
    use crate::hamming::add_checksum;
    use crate::register::{Resolution, Subpage};
    use crate::util::{Words, WORD_SIZE};
    use crate::{NUM_PIXELS, WIDTH};

    use super::{Calibration, EepromReader, NUM_CORNER_TEMPERATURES};

    // The example is testing pixel (6, 9), so (5, 8) zero-indexed
    pub(crate) const TEST_PIXEL_INDEX: usize = 5 * WIDTH + 8;

    pub(crate) fn datasheet_eeprom() -> Calibration {
        let eeprom_bytes = mlx90641_datasheet_eeprom();
        Calibration::from_data(&eeprom_bytes).expect("The EEPROM data to be parsed.")
    }

    fn reader(data: &[u8]) -> EepromReader<'_> {
        EepromReader {
            words: Words::new(data, 0),
        }
    }

    #[test]
    fn reader_unsigned() {
        // Vdd_25, alpha(6, 9), and emissivity from the datasheet
        let mut reader = reader(b"\x26\x58\xff\xff\x19\xe6");
        assert_eq!(reader.unsigned(), Ok(0x0658));
        assert_eq!(reader.unsigned(), Ok(0x07FF));
        assert_eq!(reader.unsigned(), Ok(0x01e6));
    }

    #[test]
    fn reader_signed() {
        let mut reader = reader(b"\x26\x58\x19\xe6");
        assert_eq!(reader.signed(), Ok(-424));
        assert_eq!(reader.signed(), Ok(486));
    }

    #[test]
    fn reader_combined() {
        // In order: Offset_average, gain, v_ptat_25, offset_cp.
        let mut reader =
            reader(b"\xb7\xe8\xd0\x16\xf1\x37\x78\x14\x91\x7f\xf0\x18\xcf\xfc\xa0\x09");
        assert_eq!(reader.combined(), Ok(64790));
        assert_eq!(reader.combined(), Ok(9972));
        assert_eq!(reader.combined(), Ok(12280));
        assert_eq!(reader.combined(), Ok(65417));
    }

    #[test]
    fn split_6_5() {
        assert_eq!(super::split_6_5(0x07FF), (0x3F, 0x1F));
        assert_eq!(super::split_6_5(0x0020), (1, 0));
        // Hamming bits are ignored
        assert_eq!(super::split_6_5(0xF801), (0, 1));
    }

    #[test]
    fn oversized_offset_scale() {
        let mut eeprom_bytes = mlx90641_datasheet_eeprom();
        let offset = EepromAddress::OffsetCompensationScale.byte_offset();
        // A checksum-valid scale of 2^15 doesn't fit in an i16.
        let word = add_checksum(15 << 5).unwrap();
        eeprom_bytes[offset..offset + WORD_SIZE].copy_from_slice(&word.to_be_bytes());
        assert!(matches!(
            Calibration::from_data(&eeprom_bytes),
            Err(LibraryError::InvalidData(_))
        ));
    }

    #[test]
    fn scaled_offset_overflow() {
        assert_eq!(super::scaled_offset(-424, 3, 4), Ok(-412));
        assert!(super::scaled_offset(0, 1023, 1 << 14).is_err());
        assert!(super::scaled_offset(i16::MAX, 1, 1).is_err());
    }

    #[test]
    fn short_data() {
        let eeprom_bytes = mlx90641_datasheet_eeprom();
        assert!(Calibration::from_data(&eeprom_bytes[..EepromAddress::LENGTH - 2]).is_err());
    }

    // Ordering these tests in the same order as the data sheet's worked example.
    #[test]
    fn resolution() {
        assert_eq!(datasheet_eeprom().resolution(), Resolution::Eighteen);
    }

    #[test]
    fn supply_voltage_constants() {
        let e = datasheet_eeprom();
        assert_eq!(e.k_v_dd(), -3136);
        assert_eq!(e.v_dd_25(), -13568);
    }

    #[test]
    fn ptat_constants() {
        let e = datasheet_eeprom();
        // One more digit than the datasheet (the last 4)
        assert_eq!(e.k_v_ptat(), 0.0056152344);
        assert_eq!(e.k_t_ptat(), 42.75);
        assert_eq!(e.v_ptat_25(), 12280f32);
        assert_eq!(e.alpha_ptat(), 9f32);
    }

    #[test]
    fn gain() {
        assert_eq!(datasheet_eeprom().gain(), 9972f32);
    }

    #[test]
    fn pixel_offset() {
        let e = datasheet_eeprom();
        assert_eq!(e.offset_reference_pixels(Subpage::Zero)[TEST_PIXEL_INDEX], -673);
        // At least as of revision 3 of the MLX90641 datasheet, section 11.2.2.5.3 states that
        // -746 + 71 * 2^0 = -671. It actually equals -675.
        assert_eq!(e.offset_reference_pixels(Subpage::One)[TEST_PIXEL_INDEX], -675);
    }

    #[test]
    fn k_ta_pixels() {
        // The datasheet's last digit (9) extended to "89"
        assert_eq!(datasheet_eeprom().k_ta_pixels()[TEST_PIXEL_INDEX], 0.0031013489);
    }

    #[test]
    fn k_v_pixels() {
        assert_eq!(datasheet_eeprom().k_v_pixels()[TEST_PIXEL_INDEX], 0.3251953);
    }

    #[test]
    fn emissivity() {
        // Two more digits than the datasheet (75)
        assert_eq!(datasheet_eeprom().emissivity(), 0.94921875);
    }

    #[test]
    fn compensation_pixel() {
        let e = datasheet_eeprom();
        assert_eq!(e.offset_reference_cp(), -119);
        assert_eq!(e.k_ta_cp(), 0.0023193359);
        assert_eq!(e.k_v_cp(), 0.3125);
        assert_eq!(e.alpha_cp(), 3.01952240988612E-9);
    }

    #[test]
    fn temperature_gradient_coefficient() {
        assert_eq!(datasheet_eeprom().temperature_gradient_coefficient(), 0f32);
    }

    #[test]
    fn k_s_ta() {
        assert_eq!(datasheet_eeprom().k_s_ta(), -0.002197265625);
    }

    #[test]
    fn pixel_alpha() {
        assert_eq!(
            datasheet_eeprom().alpha_pixels()[TEST_PIXEL_INDEX],
            3.45520675182343E-7
        );
    }

    #[test]
    fn k_s_to() {
        let e = datasheet_eeprom();
        // The datasheet's last digit (7) replaced by "695"
        for actual in e.k_s_to().iter() {
            assert_eq!(*actual, -0.00069999695);
        }
        assert_eq!(e.basic_k_s_to(), -0.00069999695);
    }

    #[test]
    fn corner_temperatures() {
        let ct = *datasheet_eeprom().corner_temperatures();
        let expected: [i16; NUM_CORNER_TEMPERATURES] = [-40, -20, 0, 80, 120, 200, 400, 600];
        assert_eq!(ct, expected);
    }

    fn pixel_byte_offsets(pixel: usize) -> [usize; 4] {
        let offset = pixel * WORD_SIZE;
        [
            EepromAddress::PixelOffsetSubpage0Start.byte_offset() + offset,
            EepromAddress::PixelSensitivityStart.byte_offset() + offset,
            EepromAddress::PixelConstantsStart.byte_offset() + offset,
            EepromAddress::PixelOffsetSubpage1Start.byte_offset() + offset,
        ]
    }

    #[test]
    fn no_failed_pixels() {
        assert!(!datasheet_eeprom().failed_pixels().any());
        assert_eq!(datasheet_eeprom().failed_pixels().len(), NUM_PIXELS);
    }

    #[test]
    /// *All* pixel data fields are required to be 0 for a pixel to be flagged
    fn partial_flagged_pixels() {
        for offset in pixel_byte_offsets(15) {
            let mut eeprom_bytes = mlx90641_datasheet_eeprom();
            eeprom_bytes[offset] = 0;
            eeprom_bytes[offset + 1] = 0;
            let calibration =
                Calibration::from_data(&eeprom_bytes).expect("EEPROM data should be parsed.");
            assert!(!calibration.failed_pixels().any());
        }
    }

    #[test]
    fn flagged_pixels() {
        let mut eeprom_bytes = mlx90641_datasheet_eeprom();
        for offset in pixel_byte_offsets(15) {
            eeprom_bytes[offset] = 0;
            eeprom_bytes[offset + 1] = 0;
        }
        let calibration =
            Calibration::from_data(&eeprom_bytes).expect("EEPROM data should be parsed.");
        let mut flagged = calibration.failed_pixels().iter_ones();
        assert_eq!(flagged.next(), Some(15));
        assert_eq!(flagged.next(), None);
        assert_eq!(calibration.alpha_pixels()[15], 0f32);
    }
}
