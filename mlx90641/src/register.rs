// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The MLX90641 configuration and status registers.
//!
//! Each register is a single 16-bit word. The types here unpack the documented fields, and pack
//! them back up again for writing. Reserved bits are left as 0 when packing, so any write should
//! start from a value read off of the camera.
use core::convert::TryFrom;
use core::time::Duration;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::address::Address;
use crate::error::LibraryError;
use crate::util::is_bit_set;

/// Trait for common register functionality.
pub trait Register: Into<[u8; 2]> + From<[u8; 2]> + Copy {
    /// A bit mask of which bits can be modified by the controller.
    ///
    /// When changing register values on the camera, the current value should be read, then
    /// bitwise-ANDed with the complement of this mask, then bitwise-ORd with the new value. This
    /// preserves the values of any reserved bits in the registers.
    const WRITE_MASK: [u8; 2];

    /// The address of this register in the camera's memory map.
    const ADDRESS: Address;
}

/// The status register (0x8000).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusRegister {
    /// The subpage which was last updated by the camera. Read-only.
    pub(crate) last_updated_subpage: Subpage,

    /// Set by the camera when there is new data available in RAM, and only reset by the
    /// controller.
    pub(crate) new_data: bool,

    /// Whether data in RAM can be overwritten.
    pub(crate) overwrite_enabled: bool,

    /// Start a measurement. The camera clears this once the measurement is done.
    pub(crate) start_measurement: bool,
}

impl StatusRegister {
    pub fn last_updated_subpage(&self) -> Subpage {
        self.last_updated_subpage
    }

    pub fn new_data(&self) -> bool {
        self.new_data
    }

    /// Clear the new data flag, telling the camera the controller has read the current frame.
    pub fn reset_new_data(&mut self) {
        self.new_data = false;
    }

    pub fn overwrite_enabled(&self) -> bool {
        self.overwrite_enabled
    }

    pub fn set_overwrite_enabled(&mut self, enabled: bool) {
        self.overwrite_enabled = enabled;
    }

    pub fn start_measurement(&self) -> bool {
        self.start_measurement
    }

    pub fn set_start_measurement(&mut self) {
        self.start_measurement = true;
    }
}

impl Register for StatusRegister {
    // The three least significant bits are read-only.
    const WRITE_MASK: [u8; 2] = [0x00, 0x38];

    const ADDRESS: Address = Address::new(0x8000);
}

impl From<[u8; 2]> for StatusRegister {
    fn from(bytes: [u8; 2]) -> Self {
        let raw = u16::from_be_bytes(bytes);
        // Only bit 0 is the subpage, bits 1 and 2 are reserved.
        let last_updated_subpage = if is_bit_set(raw, 0) {
            Subpage::One
        } else {
            Subpage::Zero
        };
        Self {
            last_updated_subpage,
            new_data: is_bit_set(raw, 3),
            overwrite_enabled: is_bit_set(raw, 4),
            start_measurement: is_bit_set(raw, 5),
        }
    }
}

impl From<StatusRegister> for [u8; 2] {
    fn from(status: StatusRegister) -> Self {
        let subpage: usize = status.last_updated_subpage.into();
        let raw = subpage as u16
            | (status.new_data as u16) << 3
            | (status.overwrite_enabled as u16) << 4
            | (status.start_measurement as u16) << 5;
        raw.to_be_bytes()
    }
}

/// The control register (0x800D).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ControlRegister {
    /// Measure both subpages. The default is enabled.
    pub(crate) use_subpages: bool,

    /// Only take a measurement when signalled. Dropped from recent datasheets, default disabled.
    pub(crate) step_mode: bool,

    /// Only copy measurements into RAM when the status register's overwrite flag is set.
    pub(crate) data_hold: bool,

    /// Keep measuring `subpage` instead of alternating. The default is disabled.
    pub(crate) subpage_repeat: bool,

    /// The subpage measured when `subpage_repeat` is enabled.
    pub(crate) subpage: Subpage,

    pub(crate) frame_rate: FrameRate,

    pub(crate) resolution: Resolution,

    /// The MLX90641 only documents the interleaved pattern.
    pub(crate) access_pattern: AccessPattern,
}

impl ControlRegister {
    pub fn use_subpages(&self) -> bool {
        self.use_subpages
    }

    pub fn set_use_subpages(&mut self, value: bool) {
        self.use_subpages = value;
    }

    pub fn step_mode(&self) -> bool {
        self.step_mode
    }

    pub fn data_hold(&self) -> bool {
        self.data_hold
    }

    pub fn set_data_hold(&mut self, value: bool) {
        self.data_hold = value;
    }

    pub fn subpage_repeat(&self) -> bool {
        self.subpage_repeat
    }

    pub fn set_subpage_repeat(&mut self, value: bool) {
        self.subpage_repeat = value;
    }

    pub fn subpage(&self) -> Subpage {
        self.subpage
    }

    pub fn set_subpage(&mut self, value: Subpage) {
        self.subpage = value;
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn set_frame_rate(&mut self, value: FrameRate) {
        self.frame_rate = value;
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, value: Resolution) {
        self.resolution = value;
    }

    pub fn access_pattern(&self) -> AccessPattern {
        self.access_pattern
    }
}

/// The power-on defaults documented in the datasheet.
impl Default for ControlRegister {
    fn default() -> Self {
        Self {
            use_subpages: true,
            step_mode: false,
            data_hold: false,
            subpage_repeat: false,
            subpage: Subpage::Zero,
            frame_rate: FrameRate::default(),
            resolution: Resolution::default(),
            access_pattern: AccessPattern::Interleave,
        }
    }
}

impl Register for ControlRegister {
    // *Technically* it's 0x1FFD, but bit 1 is documented to always be 0
    const WRITE_MASK: [u8; 2] = [0x1F, 0xFF];

    const ADDRESS: Address = Address::new(0x800D);
}

impl From<[u8; 2]> for ControlRegister {
    fn from(bytes: [u8; 2]) -> Self {
        let raw = u16::from_be_bytes(bytes);
        let subpage = if is_bit_set(raw, 4) {
            Subpage::One
        } else {
            Subpage::Zero
        };
        let access_pattern = if is_bit_set(raw, 12) {
            AccessPattern::Chess
        } else {
            AccessPattern::Interleave
        };
        Self {
            use_subpages: is_bit_set(raw, 0),
            step_mode: is_bit_set(raw, 1),
            data_hold: is_bit_set(raw, 2),
            subpage_repeat: is_bit_set(raw, 3),
            subpage,
            frame_rate: FrameRate::from_bits(raw >> 7),
            resolution: Resolution::from_bits(raw >> 10),
            access_pattern,
        }
    }
}

impl From<ControlRegister> for [u8; 2] {
    fn from(register: ControlRegister) -> Self {
        let subpage: usize = register.subpage.into();
        let access_pattern: u8 = register.access_pattern.into();
        let raw = register.use_subpages as u16
            | (register.step_mode as u16) << 1
            | (register.data_hold as u16) << 2
            | (register.subpage_repeat as u16) << 3
            | (subpage as u16) << 4
            | register.frame_rate.as_raw() << 7
            | register.resolution.as_raw() << 10
            | (access_pattern as u16) << 12;
        raw.to_be_bytes()
    }
}

/// The I²C configuration register (0x800F).
///
/// The camera stores two of these flags as "disable" bits; they're flipped here so `true` always
/// means enabled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct I2cRegister {
    /// Fast Mode+ (FM+). Defaults to enabled.
    pub(crate) fast_mode_plus: bool,

    /// Halve the I²C threshold level. Defaults to disabled.
    pub(crate) i2c_threshold_halved: bool,

    /// The SDA current limiter. Defaults to enabled.
    pub(crate) sda_current_limiter: bool,
}

impl I2cRegister {
    pub fn fast_mode_plus(&self) -> bool {
        self.fast_mode_plus
    }

    pub fn i2c_threshold_halved(&self) -> bool {
        self.i2c_threshold_halved
    }

    pub fn sda_current_limiter(&self) -> bool {
        self.sda_current_limiter
    }
}

impl Default for I2cRegister {
    fn default() -> Self {
        Self {
            fast_mode_plus: true,
            i2c_threshold_halved: false,
            sda_current_limiter: true,
        }
    }
}

impl Register for I2cRegister {
    // Bit 3 is "reserved" at 0 but not documented as always 0, so leave it out of the mask.
    const WRITE_MASK: [u8; 2] = [0x00, 0x07];

    const ADDRESS: Address = Address::new(0x800F);
}

impl From<[u8; 2]> for I2cRegister {
    fn from(bytes: [u8; 2]) -> Self {
        let raw = u16::from_be_bytes(bytes);
        Self {
            fast_mode_plus: !is_bit_set(raw, 0),
            i2c_threshold_halved: is_bit_set(raw, 1),
            sda_current_limiter: !is_bit_set(raw, 2),
        }
    }
}

impl From<I2cRegister> for [u8; 2] {
    fn from(register: I2cRegister) -> Self {
        let raw = (!register.fast_mode_plus) as u16
            | (register.i2c_threshold_halved as u16) << 1
            | (!register.sda_current_limiter as u16) << 2;
        raw.to_be_bytes()
    }
}

/// Identify which subpage to access.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(usize)]
pub enum Subpage {
    Zero = 0,
    One = 1,
}

/// The refresh rates supported by the camera.
///
/// Before using the higher refresh rates, ensure your I²C bus is fast enough. Roughly:
///
/// * 100kHz: [4Hz][FrameRate::Four]
/// * 400kHz: [16Hz][FrameRate::Sixteen]
/// * 1MHz: [64Hz][FrameRate::SixtyFour] (barely, [32Hz][FrameRate::ThirtyTwo] is safer)
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum FrameRate {
    /// 0.5 Hz, one frame every two seconds.
    Half,
    One,
    /// 2Hz, the power-on default.
    Two,
    Four,
    Eight,
    Sixteen,
    ThirtyTwo,
    SixtyFour,
}

impl FrameRate {
    /// Every frame rate, slowest first.
    pub const ALL: [FrameRate; 8] = [
        Self::Half,
        Self::One,
        Self::Two,
        Self::Four,
        Self::Eight,
        Self::Sixteen,
        Self::ThirtyTwo,
        Self::SixtyFour,
    ];

    /// Decode the lowest three bits of `raw`.
    pub(crate) fn from_bits(raw: u16) -> Self {
        Self::ALL[(raw & 0x7) as usize]
    }

    /// Map a frame rate variant into the representation used by the camera.
    pub(crate) fn as_raw(&self) -> u16 {
        *self as u16
    }

    /// Time between two frames (one subpage each).
    pub fn frame_period(&self) -> Duration {
        // 0.5Hz is 2000ms, and every step up halves it.
        Duration::from_millis(2000 >> self.as_raw())
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::Two
    }
}

impl TryFrom<f32> for FrameRate {
    type Error = LibraryError;

    /// Only exact matches are accepted.
    /// ```
    /// # use core::convert::TryFrom;
    /// # use mlx90641::FrameRate;
    /// assert_eq!(FrameRate::try_from(0.5), Ok(FrameRate::Half));
    /// assert!(FrameRate::try_from(0.50001).is_err());
    /// ```
    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|rate| f32::from(*rate) == value)
            .ok_or(LibraryError::InvalidData(
                "The given number does not match a valid frame rate",
            ))
    }
}

impl From<FrameRate> for f32 {
    fn from(frame_rate: FrameRate) -> Self {
        match frame_rate {
            FrameRate::Half => 0.5,
            FrameRate::One => 1f32,
            FrameRate::Two => 2f32,
            FrameRate::Four => 4f32,
            FrameRate::Eight => 8f32,
            FrameRate::Sixteen => 16f32,
            FrameRate::ThirtyTwo => 32f32,
            FrameRate::SixtyFour => 64f32,
        }
    }
}

/// The resolution of the internal [ADC][adc].
///
/// [adc]: https://en.wikipedia.org/wiki/Analog-to-digital_converter
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Resolution {
    Sixteen,
    Seventeen,
    /// 18-bit, the power-on default.
    Eighteen,
    Nineteen,
}

impl Resolution {
    /// Decode the lowest two bits of `raw`.
    pub(crate) fn from_bits(raw: u16) -> Self {
        match raw & 0x3 {
            0 => Self::Sixteen,
            1 => Self::Seventeen,
            2 => Self::Eighteen,
            _ => Self::Nineteen,
        }
    }

    /// Attempt to create a `Resolution` from a raw value from the camera.
    pub(crate) fn from_raw(raw_value: u16) -> Result<Self, LibraryError> {
        if raw_value > 3 {
            Err(LibraryError::InvalidData(
                "Invalid raw resolution value given",
            ))
        } else {
            Ok(Self::from_bits(raw_value))
        }
    }

    pub(crate) fn as_raw(&self) -> u16 {
        *self as u16
    }

    /// The correction factor for data measured at `self` by a camera calibrated at `calibrated`.
    pub fn correction_from(&self, calibrated: Resolution) -> f32 {
        let exponent = calibrated.as_raw() as i32 - self.as_raw() as i32;
        // Only four possible results, no need for a float power function.
        match exponent {
            e if e >= 0 => (1u32 << e) as f32,
            e => 1f32 / (1u32 << -e) as f32,
        }
    }
}

impl From<Resolution> for u8 {
    fn from(resolution: Resolution) -> Self {
        16 + resolution.as_raw() as u8
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Eighteen
    }
}

/// The pixel access pattern used by a camera.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AccessPattern {
    /// Pixels alternate between subpages like a chess board. Mentioned in the MLX90641 register
    /// map, but nowhere else.
    Chess = 1,

    /// Rows are grouped by subpage. The MLX90641 default.
    Interleave = 0,
}

#[cfg(test)]
mod test {
    use core::convert::TryFrom;
    use core::time::Duration;

    use super::*;

    /// Unpack `$raw`, check one field, then make sure packing gives back the same word.
    macro_rules! check_field {
        ($register:ty, $raw:literal, $field:ident, $expected:expr) => {
            let raw: u16 = $raw;
            let unpacked = <$register>::from(raw.to_be_bytes());
            assert_eq!(unpacked.$field, $expected, "{:#06X}", raw);
            let packed: [u8; 2] = unpacked.into();
            assert_eq!(u16::from_be_bytes(packed), raw);
        };
    }

    #[test]
    fn status_register_ignores_reserved_bits() {
        let all_on = StatusRegister::from([0xFF, 0xF8]);
        let masked_on = StatusRegister::from(StatusRegister::WRITE_MASK);
        assert_eq!(all_on, masked_on);
    }

    #[test]
    fn status_register_fields() {
        check_field!(StatusRegister, 0x0001, last_updated_subpage, Subpage::One);
        check_field!(StatusRegister, 0x0000, last_updated_subpage, Subpage::Zero);
        check_field!(StatusRegister, 0x0008, new_data, true);
        check_field!(StatusRegister, 0x0010, overwrite_enabled, true);
        check_field!(StatusRegister, 0x0020, start_measurement, true);
    }

    #[test]
    fn status_register_reset_new_data() {
        let mut status = StatusRegister::from([0x00, 0x09]);
        assert!(status.new_data());
        assert_eq!(status.last_updated_subpage(), Subpage::One);
        status.reset_new_data();
        assert_eq!(<[u8; 2]>::from(status), [0x00, 0x01]);
    }

    #[test]
    fn control_register_ignores_reserved_bits() {
        let all_on = ControlRegister::from([0xFF, 0xFF]);
        let masked_on = ControlRegister::from(ControlRegister::WRITE_MASK);
        assert_eq!(all_on, masked_on);
    }

    #[test]
    fn control_register_flags() {
        check_field!(ControlRegister, 0x0001, use_subpages, true);
        check_field!(ControlRegister, 0x0002, step_mode, true);
        check_field!(ControlRegister, 0x0004, data_hold, true);
        check_field!(ControlRegister, 0x0008, subpage_repeat, true);
        check_field!(ControlRegister, 0x0010, subpage, Subpage::One);
        check_field!(ControlRegister, 0x1000, access_pattern, AccessPattern::Chess);
        check_field!(ControlRegister, 0x0000, access_pattern, AccessPattern::Interleave);
    }

    #[test]
    fn control_register_frame_rate() {
        for (index, rate) in FrameRate::ALL.iter().enumerate() {
            let raw = (index as u16) << 7;
            let register = ControlRegister::from(raw.to_be_bytes());
            assert_eq!(register.frame_rate(), *rate);
            assert_eq!(u16::from_be_bytes(register.into()), raw);
        }
    }

    #[test]
    fn control_register_resolution() {
        check_field!(ControlRegister, 0x0000, resolution, Resolution::Sixteen);
        check_field!(ControlRegister, 0x0400, resolution, Resolution::Seventeen);
        check_field!(ControlRegister, 0x0800, resolution, Resolution::Eighteen);
        check_field!(ControlRegister, 0x0C00, resolution, Resolution::Nineteen);
    }

    #[test]
    fn control_register_default() {
        // Subpages enabled, 2Hz, 18-bit
        let packed: [u8; 2] = ControlRegister::default().into();
        assert_eq!(packed, [0x09, 0x01]);
        assert_eq!(ControlRegister::from([0x09, 0x01]), ControlRegister::default());
    }

    #[test]
    fn i2c_register_fields() {
        check_field!(I2cRegister, 0x0000, fast_mode_plus, true);
        check_field!(I2cRegister, 0x0001, fast_mode_plus, false);
        check_field!(I2cRegister, 0x0002, i2c_threshold_halved, true);
        check_field!(I2cRegister, 0x0000, sda_current_limiter, true);
        check_field!(I2cRegister, 0x0004, sda_current_limiter, false);
        assert_eq!(I2cRegister::from([0, 0]), I2cRegister::default());
    }

    #[test]
    fn frame_rate_from_f32() {
        for rate in FrameRate::ALL {
            assert_eq!(FrameRate::try_from(f32::from(rate)), Ok(rate));
        }
        assert!(FrameRate::try_from(3f32).is_err());
        assert!(FrameRate::try_from(0.5000001f32).is_err());
    }

    #[test]
    fn frame_rate_period() {
        assert_eq!(FrameRate::Half.frame_period(), Duration::from_millis(2000));
        assert_eq!(FrameRate::Two.frame_period(), Duration::from_millis(500));
        assert_eq!(FrameRate::SixtyFour.frame_period(), Duration::from_millis(15));
    }

    #[test]
    fn resolution_from_raw() {
        assert_eq!(Resolution::from_raw(0), Ok(Resolution::Sixteen));
        assert_eq!(Resolution::from_raw(3), Ok(Resolution::Nineteen));
        assert!(Resolution::from_raw(4).is_err());
        assert_eq!(u8::from(Resolution::Seventeen), 17);
    }

    #[test]
    fn resolution_correction() {
        let resolutions = [
            (Resolution::Sixteen, 4.0),
            (Resolution::Seventeen, 2.0),
            (Resolution::Eighteen, 1.0),
            (Resolution::Nineteen, 0.5),
        ];
        for (current, expected) in resolutions {
            assert_eq!(current.correction_from(Resolution::Eighteen), expected);
        }
    }

    #[test]
    fn defaults() {
        assert_eq!(FrameRate::default(), FrameRate::Two);
        assert_eq!(Resolution::default(), Resolution::Eighteen);
    }
}
