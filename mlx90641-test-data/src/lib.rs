// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Shared test fixtures for the MLX90641 driver and its users: the EEPROM contents from the
//! datasheet's worked example, and a mock I²C bus that behaves like a camera.
mod eeprom_data;
mod i2c_mock;

pub use eeprom_data::{mlx90641_datasheet_eeprom, EEPROM_LENGTH};
pub use i2c_mock::{
    mock_mlx90641_at_address, I2cOperation, MockCameraBus, MockError, DATASHEET_PIXEL,
    MLX90641_RAM_LENGTH,
};
