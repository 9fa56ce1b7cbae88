// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Conversion of raw frames into temperatures.
//!
//! The steps follow the MLX90641 datasheet: supply voltage and ambient temperature first, then the
//! per-pixel IR compensation, then object temperatures in the basic temperature range.
use embedded_hal::blocking::i2c;

// Various floating point operations are not implemented in core, so we use libm to provide them as
// needed.
#[cfg_attr(feature = "std", allow(unused_imports))]
use num_traits::Float;

use crate::address::{Address, RamAddress};
use crate::eeprom::Calibration;
use crate::register::{Resolution, Subpage};

/// Constant needed a few times for the final pixel temperature calculations.
const KELVINS_TO_CELSIUS: f32 = 273.15;

/// The supply voltage the camera was calibrated at.
pub const V_DD_0: f32 = 3.3;

/// The reference ambient temperature for the temperature coefficients.
const T_A_0: f32 = 25f32;

/// How much warmer the sensor runs than its surroundings, in degrees Celsius.
///
/// Used for the reflected temperature when none is given.
pub const SELF_HEATING: f32 = 5f32;

fn delta_v(calibration: &Calibration, v_dd_pixel: i16) -> f32 {
    f32::from(v_dd_pixel - calibration.v_dd_25()) / f32::from(calibration.k_v_dd())
}

fn v_dd(resolution_correction: f32, delta_v: f32) -> f32 {
    delta_v * resolution_correction + V_DD_0
}

fn v_ptat_art(calibration: &Calibration, t_a_ptat: i16, t_a_v_be: i16) -> f32 {
    let t_a_ptat = f32::from(t_a_ptat);
    let denominator = t_a_ptat * calibration.alpha_ptat() + f32::from(t_a_v_be);
    t_a_ptat / denominator * 18f32.exp2()
}

fn ambient_temperature(calibration: &Calibration, v_ptat_art: f32, delta_v: f32) -> f32 {
    let numerator =
        (v_ptat_art / (1f32 + calibration.k_v_ptat() * delta_v)) - calibration.v_ptat_25();
    numerator / calibration.k_t_ptat() + T_A_0
}

/// The non-pixel values from RAM needed for each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RamData {
    t_a_v_be: i16,
    t_a_ptat: i16,
    v_dd_pixel: i16,
    gain: i16,
    compensation_pixel: i16,
}

impl RamData {
    /// Read a value from the camera's RAM.
    ///
    /// All values in RAM are signed 16-bit integers, so this function also converts the raw values
    /// into `i16`.
    fn read_ram_value<I2C>(
        bus: &mut I2C,
        i2c_address: u8,
        ram_address: RamAddress,
    ) -> Result<i16, I2C::Error>
    where
        I2C: i2c::WriteRead,
    {
        let address: Address = ram_address.into();
        let mut scratch = [0u8; 2];
        bus.write_read(i2c_address, &address.as_bytes(), &mut scratch)?;
        Ok(i16::from_be_bytes(scratch))
    }

    /// Read the non-pixel data for a subpage over I²C.
    pub fn from_i2c<I2C>(
        bus: &mut I2C,
        i2c_address: u8,
        subpage: Subpage,
    ) -> Result<Self, I2C::Error>
    where
        I2C: i2c::WriteRead,
    {
        let mut read = |address| Self::read_ram_value(bus, i2c_address, address);
        Ok(Self {
            t_a_v_be: read(RamAddress::AmbientTemperatureVoltageBe)?,
            t_a_ptat: read(RamAddress::AmbientTemperatureVoltage)?,
            v_dd_pixel: read(RamAddress::PixelSupplyVoltage)?,
            gain: read(RamAddress::Gain)?,
            compensation_pixel: read(RamAddress::compensation_pixel(subpage))?,
        })
    }
}

/// Values that're common to all pixels when calculating raw IR values.
#[derive(Debug, PartialEq)]
struct CommonIrData {
    gain: f32,
    v_dd: f32,
    emissivity: f32,
    t_a: f32,
}

impl CommonIrData {
    fn new(
        resolution_correction: f32,
        emissivity: f32,
        calibration: &Calibration,
        ram: &RamData,
    ) -> Self {
        let delta_v = delta_v(calibration, ram.v_dd_pixel);
        // Labelled V_PTAT in the formulas, but T_a_PTAT in the memory map.
        let v_ptat_art = v_ptat_art(calibration, ram.t_a_ptat, ram.t_a_v_be);
        Self {
            gain: calibration.gain() / f32::from(ram.gain),
            v_dd: v_dd(resolution_correction, delta_v),
            emissivity,
            t_a: ambient_temperature(calibration, v_ptat_art, delta_v),
        }
    }
}

/// The per-pixel calculations to get a raw measurement of infrared radiation.
fn per_pixel_v_ir(
    pixel_data: i16,
    common: &CommonIrData,
    reference_offset: i16,
    k_v: f32,
    k_ta: f32,
) -> f32 {
    let pixel_gain = f32::from(pixel_data) * common.gain;
    let pixel_offset = pixel_gain
        - f32::from(reference_offset)
            * (1f32 + k_ta * (common.t_a - T_A_0))
            * (1f32 + k_v * (common.v_dd - V_DD_0));
    pixel_offset / common.emissivity
}

/// T<sub>a_r</sub>, the ambient and reflected temperatures (in K<sup>4</sup>) corrected for
/// emissivity.
fn t_ar(t_a: f32, t_r: f32, emissivity: f32) -> f32 {
    let t_a_k4 = (t_a + KELVINS_TO_CELSIUS).powi(4);
    let t_r_k4 = (t_r + KELVINS_TO_CELSIUS).powi(4);
    t_r_k4 - ((t_r_k4 - t_a_k4) / emissivity)
}

/// The per-pixel calculations to go from a raw measurement to a temperature.
fn per_pixel_temperature(v_ir: f32, alpha: f32, t_ar: f32, k_s_to: f32) -> f32 {
    let s_x = k_s_to * (alpha.powi(3) * v_ir + alpha.powi(4) * t_ar).powf(0.25);
    let t_o_root = (v_ir / (alpha * (1f32 - k_s_to * KELVINS_TO_CELSIUS) + s_x) + t_ar).powf(0.25);
    t_o_root - KELVINS_TO_CELSIUS
}

/// Convert the raw pixel data for a frame into temperatures in degrees Celsius.
///
/// `pixel_data` is the big-endian pixel data for the full frame (in row-major order), and
/// `destination` must have room for every pixel. If `reflected_temperature` is `None`, the ambient
/// temperature minus [`SELF_HEATING`] is used. Pixels marked as failed in the EEPROM are set to
/// NaN. The ambient temperature is returned.
#[allow(clippy::too_many_arguments)]
pub fn raw_pixels_to_temperatures(
    calibration: &Calibration,
    emissivity: f32,
    reflected_temperature: Option<f32>,
    resolution_correction: f32,
    pixel_data: &[u8],
    ram: RamData,
    subpage: Subpage,
    destination: &mut [f32],
) -> f32 {
    // Knock out the values common to all pixels first.
    let common = CommonIrData::new(resolution_correction, emissivity, calibration, &ram);
    let tgc = calibration.temperature_gradient_coefficient();
    let compensation_pixel_offset = tgc
        * per_pixel_v_ir(
            ram.compensation_pixel,
            &common,
            calibration.offset_reference_cp(),
            calibration.k_v_cp(),
            calibration.k_ta_cp(),
        );
    let alpha_compensation_pixel = tgc * calibration.alpha_cp();
    // This factor is shared by all pixels.
    let alpha_coefficient = 1f32 + calibration.k_s_ta() * (common.t_a - T_A_0);
    let k_s_to = calibration.basic_k_s_to();
    let t_r = reflected_temperature.unwrap_or(common.t_a - SELF_HEATING);
    let t_ar = t_ar(common.t_a, t_r, emissivity);
    let failed_pixels = calibration.failed_pixels();
    destination
        .iter_mut()
        .zip(pixel_data.chunks_exact(2))
        .zip(calibration.offset_reference_pixels(subpage))
        .zip(calibration.k_v_pixels())
        .zip(calibration.k_ta_pixels())
        .zip(calibration.alpha_pixels())
        .zip(failed_pixels.iter().by_vals())
        .for_each(
            |((((((output, pixel_slice), reference_offset), k_v), k_ta), alpha), failed)| {
                if failed {
                    *output = f32::NAN;
                    return;
                }
                let pixel_data = i16::from_be_bytes([pixel_slice[0], pixel_slice[1]]);
                let v_ir = per_pixel_v_ir(pixel_data, &common, *reference_offset, *k_v, *k_ta)
                    - compensation_pixel_offset;
                let compensated_alpha = (alpha - alpha_compensation_pixel) * alpha_coefficient;
                *output = per_pixel_temperature(v_ir, compensated_alpha, t_ar, k_s_to);
            },
        );
    common.t_a
}

/// The correction factor for a camera running at a different resolution than it was calibrated
/// at.
pub fn resolution_correction(calibration: &Calibration, current: Resolution) -> f32 {
    current.correction_from(calibration.resolution())
}
