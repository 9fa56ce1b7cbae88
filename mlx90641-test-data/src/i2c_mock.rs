// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::collections::VecDeque;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::blocking::i2c;
use mlx90641::RamAddress;

use crate::eeprom_data::{mlx90641_datasheet_eeprom, EEPROM_LENGTH};

/// The number of bytes the MLX90641 has of RAM.
///
/// The MLX90641 has its RAM from 0x0400 through 0x05BF, representing 192 pixels duplicated across
/// two subpages along with 64 other addresses (half of which are reserved).
pub const MLX90641_RAM_LENGTH: usize = (0x05C0 - 0x0400) * 2;

/// The raw pixel value from the datasheet's worked example.
pub const DATASHEET_PIXEL: [u8; 2] = [0x03, 0xcc];

const STATUS_REGISTER_ADDRESS: u16 = 0x8000;

// The lowest 6 bits are documented. Bits 0-2 are read-only, but the driver writes back what it
// read so they never change.
const STATUS_REGISTER_WRITE_MASK: u16 = 0x003F;

const CONTROL_REGISTER_ADDRESS: u16 = 0x800D;

// Only the top three bits of the control register are reserved.
const CONTROL_REGISTER_WRITE_MASK: u16 = 0x1FFF;

const I2C_CONFIG_REGISTER_ADDRESS: u16 = 0x800F;

// Only the last four bits of the I2C config register are documented.
const I2C_CONFIG_REGISTER_WRITE_MASK: u16 = 0x000F;

const RECENT_OPERATIONS_QUEUE_LENGTH: usize = 32;

const ROM_RANGE: RangeInclusive<u16> = 0x0000..=0x03FF;
const RAM_RANGE: RangeInclusive<u16> = 0x0400..=0x05BF;
const EEPROM_RANGE: RangeInclusive<u16> = 0x2400..=0x273F;
const REGISTER_RANGE: RangeInclusive<u16> = 0x8000..=0x8016;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockError {
    /// The given address shouldn't be accessed.
    IllegalAccess(u16),

    /// The given address should not be written to.
    IllegalWriteAddress(u16),

    /// The given value would change reserved bits at the given location.
    IllegalWriteValue(u16, u16),

    /// The given address isn't valid for the camera.
    UnknownMemoryAddress(u16),

    /// An unknown I2C address was given.
    UnknownI2cAddress(u8),

    /// The requested operation is not allowed.
    ///
    /// This covers things situations such as:
    /// * A write-read transaction writing more than just an address.
    /// * A write-read transaction with a 0-length read (which causes the camera to reject the next
    ///   operation).
    /// * Reads that aren't a full number of words (each word is two bytes).
    IllegalOperation,

    /// A failure injected with [`MockCameraBus::fail_next_operations`].
    Injected,
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockError::IllegalAccess(address) => write!(f, "illegal access at {:#06X}", address),
            MockError::IllegalWriteAddress(address) => {
                write!(f, "illegal write at {:#06X}", address)
            }
            MockError::IllegalWriteValue(address, value) => {
                write!(f, "illegal value {:#06X} for {:#06X}", value, address)
            }
            MockError::UnknownMemoryAddress(address) => {
                write!(f, "unknown memory address {:#06X}", address)
            }
            MockError::UnknownI2cAddress(address) => {
                write!(f, "no device at I2C address {:#04X}", address)
            }
            MockError::IllegalOperation => f.write_str("illegal I2C operation"),
            MockError::Injected => f.write_str("injected bus failure"),
        }
    }
}

impl std::error::Error for MockError {}

/// An operation performed on the mock bus. The address is the camera memory address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum I2cOperation {
    Write { address: u16, length: usize },
    Read { address: u16, length: usize },
}

#[derive(Debug)]
struct CameraState {
    eeprom: [u8; EEPROM_LENGTH],
    ram: [u8; MLX90641_RAM_LENGTH],
    status_register: u16,
    control_register: u16,
    i2c_config_register: u16,
    recent_operations: VecDeque<I2cOperation>,
    injected_failures: usize,
}

impl CameraState {
    fn read(&self, address: u16, out: &mut [u8]) -> Result<(), MockError> {
        // The cameras have a word size of 16 bits, so every read should be a multiple of two
        // bytes.
        if out.len() % 2 != 0 {
            return Err(MockError::IllegalOperation);
        }
        let last_address = address + (out.len() / 2) as u16 - 1;
        let (range, memory): (RangeInclusive<u16>, &[u8]) = if RAM_RANGE.contains(&address) {
            (RAM_RANGE, &self.ram)
        } else if EEPROM_RANGE.contains(&address) {
            (EEPROM_RANGE, &self.eeprom)
        } else if REGISTER_RANGE.contains(&address) {
            // The registers are non-contiguous, so only 1 word can be read at a time.
            if out.len() != 2 {
                return Err(MockError::IllegalAccess(last_address));
            }
            let value = match address {
                STATUS_REGISTER_ADDRESS => self.status_register,
                CONTROL_REGISTER_ADDRESS => self.control_register,
                I2C_CONFIG_REGISTER_ADDRESS => self.i2c_config_register,
                _ => return Err(MockError::IllegalAccess(address)),
            };
            out.copy_from_slice(&value.to_be_bytes());
            return Ok(());
        } else if ROM_RANGE.contains(&address) {
            return Err(MockError::IllegalAccess(address));
        } else {
            return Err(MockError::UnknownMemoryAddress(address));
        };
        if !range.contains(&last_address) {
            return Err(MockError::IllegalAccess(last_address));
        }
        let start = (address - range.start()) as usize * 2;
        out.copy_from_slice(&memory[start..(start + out.len())]);
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), MockError> {
        // Only single register writes are supported; RAM is only written by the camera, and the
        // EEPROM is left alone.
        if !REGISTER_RANGE.contains(&address) {
            return Err(MockError::IllegalWriteAddress(address));
        }
        if data.len() != 2 {
            return Err(MockError::IllegalOperation);
        }
        let new_value = u16::from_be_bytes([data[0], data[1]]);
        let (register, mask) = match address {
            STATUS_REGISTER_ADDRESS => (&mut self.status_register, STATUS_REGISTER_WRITE_MASK),
            CONTROL_REGISTER_ADDRESS => (&mut self.control_register, CONTROL_REGISTER_WRITE_MASK),
            I2C_CONFIG_REGISTER_ADDRESS => (
                &mut self.i2c_config_register,
                I2C_CONFIG_REGISTER_WRITE_MASK,
            ),
            _ => return Err(MockError::IllegalWriteAddress(address)),
        };
        if (new_value & !mask) != (*register & !mask) {
            return Err(MockError::IllegalWriteValue(address, new_value));
        }
        *register = new_value;
        // Starting a measurement finishes it immediately.
        if address == STATUS_REGISTER_ADDRESS && new_value & 0x0020 != 0 {
            self.status_register = (self.status_register & !0x0020) | 0x0008;
        }
        Ok(())
    }

    fn record(&mut self, operation: I2cOperation) {
        self.recent_operations.push_back(operation);
        while self.recent_operations.len() > RECENT_OPERATIONS_QUEUE_LENGTH {
            self.recent_operations.pop_front();
        }
    }

    fn take_injected_failure(&mut self) -> bool {
        if self.injected_failures > 0 {
            self.injected_failures -= 1;
            true
        } else {
            false
        }
    }
}

/// A mock MLX90641 on an I²C bus.
///
/// Clones share the same camera, so a test can keep a handle to the camera while the driver owns
/// the bus.
#[derive(Clone, Debug)]
pub struct MockCameraBus {
    i2c_address: u8,
    state: Arc<Mutex<CameraState>>,
}

impl MockCameraBus {
    fn state(&self) -> MutexGuard<'_, CameraState> {
        // A panic while holding the lock already failed the test.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace all pixel data in RAM and the status register.
    ///
    /// This simulates a new frame of data being made available. The "new data available" flag is
    /// not set explicitly; the given status register value is used as-is.
    pub fn update_frame(&self, pixel_data: &[u8], status_register: [u8; 2]) {
        let mut state = self.state();
        let pixel_length = pixel_data.len().min(pixel_ram_length());
        state.ram[..pixel_length].copy_from_slice(&pixel_data[..pixel_length]);
        state.status_register = u16::from_be_bytes(status_register);
    }

    /// Fill every pixel (in both subpages) with the same raw value.
    pub fn fill_pixels(&self, raw_value: [u8; 2]) {
        let mut state = self.state();
        for pixel in state.ram[..pixel_ram_length()].chunks_exact_mut(2) {
            pixel.copy_from_slice(&raw_value);
        }
    }

    /// Set the "new data available" flag in the status register to a new value
    pub fn set_data_available(&self, available: bool) {
        let mut state = self.state();
        if available {
            state.status_register |= 0x0008;
        } else {
            state.status_register &= !0x0008;
        }
    }

    pub fn data_available(&self) -> bool {
        self.state().status_register & 0x0008 != 0
    }

    pub fn control_register(&self) -> [u8; 2] {
        self.state().control_register.to_be_bytes()
    }

    /// Make the next `count` bus operations fail with [`MockError::Injected`].
    pub fn fail_next_operations(&self, count: usize) {
        self.state().injected_failures = count;
    }

    /// The most recent operations, oldest first.
    pub fn recent_operations(&self) -> Vec<I2cOperation> {
        self.state().recent_operations.iter().copied().collect()
    }

    pub fn clear_recent_operations(&self) {
        self.state().recent_operations.clear()
    }

    fn check_i2c_address(&self, i2c_address: u8) -> Result<(), MockError> {
        if i2c_address == self.i2c_address {
            Ok(())
        } else {
            Err(MockError::UnknownI2cAddress(i2c_address))
        }
    }
}

fn pixel_ram_length() -> usize {
    (RamAddress::AmbientTemperatureVoltageBe as usize - RamAddress::Base as usize) * 2
}

fn extract_address(bytes: &[u8]) -> Result<u16, MockError> {
    match bytes {
        [high, low, ..] => Ok(u16::from_be_bytes([*high, *low])),
        _ => Err(MockError::IllegalOperation),
    }
}

impl i2c::Write for MockCameraBus {
    type Error = MockError;

    fn write(&mut self, i2c_address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.check_i2c_address(i2c_address)?;
        let address = extract_address(bytes)?;
        let payload = &bytes[2..];
        let mut state = self.state();
        if state.take_injected_failure() {
            return Err(MockError::Injected);
        }
        state.write(address, payload)?;
        state.record(I2cOperation::Write {
            address,
            length: payload.len(),
        });
        Ok(())
    }
}

impl i2c::WriteRead for MockCameraBus {
    type Error = MockError;

    fn write_read(
        &mut self,
        i2c_address: u8,
        write_buffer: &[u8],
        out_buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.check_i2c_address(i2c_address)?;
        // Write-reads should only be writing the address
        if write_buffer.len() != 2 || out_buffer.is_empty() {
            return Err(MockError::IllegalOperation);
        }
        let address = extract_address(write_buffer)?;
        let mut state = self.state();
        if state.take_injected_failure() {
            return Err(MockError::Injected);
        }
        state.record(I2cOperation::Read {
            address,
            length: out_buffer.len(),
        });
        state.read(address, out_buffer)
    }
}

/// A mock camera with the calibration and RAM values from the datasheet's worked example.
///
/// Every pixel has the raw value of pixel (6, 9). Subpage 0 is marked as having new data.
pub fn mock_mlx90641_at_address(i2c_address: u8) -> MockCameraBus {
    let mut ram = [0u8; MLX90641_RAM_LENGTH];
    for pixel in ram[..pixel_ram_length()].chunks_exact_mut(2) {
        pixel.copy_from_slice(&DATASHEET_PIXEL);
    }
    // The worked example only gives one compensation pixel value, so it's used for both.
    let values: [(RamAddress, [u8; 2]); 6] = [
        (RamAddress::AmbientTemperatureVoltageBe, [0x4c, 0x54]),
        (RamAddress::CompensationPixelZero, [0xff, 0x97]),
        (RamAddress::Gain, [0x26, 0x06]),
        (RamAddress::AmbientTemperatureVoltage, [0x06, 0xd8]),
        (RamAddress::CompensationPixelOne, [0xff, 0x97]),
        (RamAddress::PixelSupplyVoltage, [0xcb, 0x8a]),
    ];
    for (address, value) in values {
        let offset = (address - RamAddress::Base) as usize * 2;
        ram[offset..(offset + 2)].copy_from_slice(&value);
    }
    MockCameraBus {
        i2c_address,
        state: Arc::new(Mutex::new(CameraState {
            eeprom: mlx90641_datasheet_eeprom(),
            ram,
            // Subpage 0 with new data
            status_register: 0x0008,
            // Power-on default: subpages enabled, 2Hz, 18-bit
            control_register: 0x0901,
            i2c_config_register: 0x0000,
            recent_operations: VecDeque::new(),
            injected_failures: 0,
        })),
    }
}
