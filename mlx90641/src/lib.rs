// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! A pure-Rust library for accessing the Melexis MLX90641 thermal camera over I²C.
//!
//! The MLX90641 has a large amount of calibration data that must be pre-processed before use, and
//! the output data also requires a somewhat complex process to turn it into temperature data.
//! This crate has two levels of API, a high-level API ([`Mlx90641`]) that handles the calibration
//! data and raw data processing for you, and a low-level API if you need to go beyond what the
//! high-level API can do for you.
//!
//! This library uses the [`embedded-hal`][embedded-hal] I²C traits, meaning you should be able to
//! use this library on other platforms, as long as there's an `embedded-hal` I²C implementation
//! available. This library is also `no_std` compatible.
//!
//! [embedded-hal]: https://docs.rs/embedded-hal/*/embedded_hal/blocking/i2c/index.html
//!
//! # High-Level API
//! ```no_run
//! use std::thread::sleep;
//! use linux_embedded_hal::I2cdev;
//! use mlx90641::Mlx90641;
//!
//! let i2c_bus = I2cdev::new("/dev/i2c-1").expect("/dev/i2c-1 needs to be an I2C controller");
//! // Default address for the camera is 0x33
//! let mut camera = Mlx90641::new(i2c_bus, 0x33)?;
//! // A buffer for storing the temperature "image"
//! let mut temperatures = vec![0f32; camera.height() * camera.width()];
//! camera.generate_image_if_ready(&mut temperatures)?;
//! sleep(camera.frame_rate()?.frame_period());
//! camera.generate_image_if_ready(&mut temperatures)?;
//! # Ok::<(), mlx90641::Error<I2cdev>>(())
//! ```
//! The camera is on I²C bus #1 (`/dev/i2c-1`) at the default address (`0x33`). The calibration
//! data is loaded from the camera's EEPROM and kept in a [`Calibration`] within `camera`.
//!
//! # Low-Level API
//! Calibration data can also be loaded from a byte dump of the EEPROM with
//! [`Calibration::from_data`], then given to [`Mlx90641::new_with_calibration`]. The [`register`],
//! [`calculations`] and [`address`] modules expose the pieces the driver is built from.
//!
//! # Subpages
//! Each frame, one [subpage][Subpage] of data is updated. Unlike the MLX90640, each subpage on the
//! MLX90641 covers *all* of the pixels, so every frame is a complete image.

#![no_std]
#![allow(clippy::float_cmp)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("Either the 'std' or 'libm' feature must be enabled.");

pub mod address;
pub mod calculations;
#[doc(hidden)]
pub mod driver;
pub mod eeprom;
#[doc(hidden)]
pub mod error;
pub mod hamming;
pub mod register;
mod util;

/// The height of the image, in pixels.
pub const HEIGHT: usize = 12;

/// The width of the image, in pixels.
pub const WIDTH: usize = 16;

/// The total number of pixels in the image.
pub const NUM_PIXELS: usize = HEIGHT * WIDTH;

pub use address::{Address, EepromAddress, RamAddress};
#[doc(inline)]
pub use driver::Mlx90641;
pub use eeprom::Calibration;
#[doc(inline)]
pub use error::{Error, LibraryError};
pub use register::*;
