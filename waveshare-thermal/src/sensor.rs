// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The `mlx90641-ir-sensor` model.
//!
//! A background thread keeps reading frames from the camera into a shared buffer, and readings
//! are computed from the most recent frame.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use embedded_hal::blocking::i2c;
use linux_embedded_hal::I2cdev;
use mlx90641::{FrameRate, Mlx90641, NUM_PIXELS, WIDTH};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::ComponentConfig;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::resource::{Dependencies, Model, ModelFamily, Readings, Resource, Sensor, SensorReading};

pub const MODEL_NAME: &str = "mlx90641-ir-sensor";

/// Minimum time between two frame reads.
pub const CACHE_DURATION: Duration = Duration::from_millis(1);

/// Consecutive read failures before backing off for longer.
pub const MAX_RETRIES: u32 = 3;

/// Delay after a failed read.
pub const BASE_DELAY: Duration = Duration::from_millis(50);

/// Used when no refresh rate, or an invalid one, is configured.
pub const DEFAULT_FRAME_RATE: FrameRate = FrameRate::Four;

pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";

pub const DEFAULT_I2C_ADDRESS: u8 = 0x33;

pub const MIN_TEMP_CELSIUS: &str = "min_temp_celsius";
pub const MAX_TEMP_CELSIUS: &str = "max_temp_celsius";
pub const MIN_TEMP_FAHRENHEIT: &str = "min_temp_fahrenheit";
pub const MAX_TEMP_FAHRENHEIT: &str = "max_temp_fahrenheit";
pub const ALL_TEMPERATURES_CELSIUS: &str = "all_temperatures_celsius";
pub const ALL_TEMPERATURES_FAHRENHEIT: &str = "all_temperatures_fahrenheit";
pub const ALL_TEMPERATURES_FAHRENHEIT_MIRRORED: &str = "all_temperatures_fahrenheit_mirrored";

pub fn model() -> Model {
    Model::new(ModelFamily::waveshare_thermal(), MODEL_NAME)
}

fn default_i2c_bus() -> PathBuf {
    PathBuf::from(DEFAULT_I2C_BUS)
}

fn default_i2c_address() -> u8 {
    DEFAULT_I2C_ADDRESS
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SensorAttributes {
    #[serde(default)]
    pub refresh_rate_hz: Option<f64>,
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: PathBuf,
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,
}

impl Default for SensorAttributes {
    fn default() -> Self {
        Self {
            refresh_rate_hz: None,
            i2c_bus: default_i2c_bus(),
            i2c_address: default_i2c_address(),
        }
    }
}

impl SensorAttributes {
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let attributes: Self = config.attributes()?;
        if !(1..=0x7F).contains(&attributes.i2c_address) {
            return Err(Error::configuration(format!(
                "{:#04X} is not a valid 7-bit I2C address",
                attributes.i2c_address
            )));
        }
        Ok(attributes)
    }

    /// The configured frame rate, falling back to [`DEFAULT_FRAME_RATE`].
    pub fn frame_rate(&self) -> FrameRate {
        match self.refresh_rate_hz {
            None => DEFAULT_FRAME_RATE,
            Some(hz) => FrameRate::try_from(hz as f32).unwrap_or_else(|_| {
                warn!(refresh_rate_hz = hz, "Invalid refresh rate, using 4Hz");
                DEFAULT_FRAME_RATE
            }),
        }
    }
}

/// Check a sensor configuration. Sensors have no dependencies.
pub fn validate_config(config: &ComponentConfig) -> Result<Vec<String>> {
    SensorAttributes::from_config(config)?;
    Ok(Vec::new())
}

/// Something that produces temperature frames.
pub trait FrameSource: Send {
    fn set_frame_rate(&mut self, frame_rate: FrameRate) -> Result<()>;

    /// Copy a new frame into `destination` if one is ready, returning whether one was.
    fn read_frame(&mut self, destination: &mut [f32]) -> Result<bool>;
}

impl<I2C> FrameSource for Mlx90641<I2C>
where
    I2C: i2c::WriteRead + i2c::Write + Send,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    <I2C as i2c::Write>::Error: fmt::Debug,
{
    fn set_frame_rate(&mut self, frame_rate: FrameRate) -> Result<()> {
        Mlx90641::set_frame_rate(self, frame_rate).map_err(Error::driver)
    }

    fn read_frame(&mut self, destination: &mut [f32]) -> Result<bool> {
        self.generate_image_if_ready(destination)
            .map_err(Error::driver)
    }
}

/// Opens a camera on an I²C bus.
pub trait I2cProvider: Send + Sync {
    fn open(&self, bus: &Path, address: u8) -> Result<Box<dyn FrameSource>>;
}

/// Linux `i2c-dev` buses.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinuxI2c;

impl I2cProvider for LinuxI2c {
    fn open(&self, bus: &Path, address: u8) -> Result<Box<dyn FrameSource>> {
        let device = I2cdev::new(bus).map_err(|err| Error::Driver {
            message: format!("Unable to open {}: {}", bus.display(), err),
        })?;
        let camera = Mlx90641::new(device, address).map_err(Error::driver)?;
        Ok(Box::new(camera))
    }
}

/// The most recent frame from the reader thread.
#[derive(Clone, Copy, Debug)]
struct LatestFrame {
    temperatures: [f32; NUM_PIXELS],
    captured_at: Option<Instant>,
}

impl Default for LatestFrame {
    fn default() -> Self {
        Self {
            temperatures: [0f32; NUM_PIXELS],
            captured_at: None,
        }
    }
}

type SharedFrame = Arc<Mutex<LatestFrame>>;

/// A running reader thread. Dropping it stops the thread.
struct FrameReader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameReader {
    fn spawn(name: &str, source: Box<dyn FrameSource>, latest: SharedFrame) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("{}-reader", name))
            .spawn(move || read_frames(source, &thread_stop, &latest))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Frame reader thread panicked");
            }
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read frames until `stop` is set, retrying failed reads.
fn read_frames(mut source: Box<dyn FrameSource>, stop: &AtomicBool, latest: &Mutex<LatestFrame>) {
    let mut buffer = [0f32; NUM_PIXELS];
    let mut retry_count = 0;
    let mut last_reading: Option<Instant> = None;
    while !stop.load(Ordering::Relaxed) {
        if last_reading.map_or(false, |at| at.elapsed() < CACHE_DURATION) {
            thread::sleep(CACHE_DURATION);
            continue;
        }
        let start = Instant::now();
        match source.read_frame(&mut buffer) {
            Ok(true) => {
                debug!(
                    elapsed_ms = start.elapsed().as_secs_f32() * 1000f32,
                    "Frame read successful"
                );
                retry_count = 0;
                let now = Instant::now();
                let mut frame = latest.lock().unwrap_or_else(PoisonError::into_inner);
                frame.temperatures = buffer;
                frame.captured_at = Some(now);
                last_reading = Some(now);
            }
            Ok(false) => thread::sleep(CACHE_DURATION),
            Err(err) => {
                retry_count += 1;
                error!(error = %err, retry = retry_count, "Frame read failed");
                if retry_count >= MAX_RETRIES {
                    error!("Max retries exceeded, waiting longer");
                    thread::sleep(BASE_DELAY * 2);
                    retry_count = 0;
                } else {
                    thread::sleep(BASE_DELAY);
                }
            }
        }
    }
    debug!("Frame reader stopped");
}

pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9f32 / 5f32 + 32f32
}

/// Compute the readings for a frame.
///
/// Frames are row-major. The mirrored list has every row reversed.
pub fn frame_readings(frame: &[f32]) -> Readings {
    let fahrenheit: Vec<f32> = frame.iter().copied().map(celsius_to_fahrenheit).collect();
    let mirrored: Vec<f32> = fahrenheit
        .chunks(WIDTH)
        .flat_map(|row| row.iter().rev().copied())
        .collect();
    // f32::min and f32::max skip NaN
    let min = |values: &[f32]| values.iter().copied().fold(f32::NAN, f32::min);
    let max = |values: &[f32]| values.iter().copied().fold(f32::NAN, f32::max);

    let mut readings = Readings::new();
    let mut insert = |key: &str, reading| {
        readings.insert(key.to_string(), reading);
    };
    insert(MIN_TEMP_CELSIUS, SensorReading::Number(min(frame)));
    insert(MAX_TEMP_CELSIUS, SensorReading::Number(max(frame)));
    insert(MIN_TEMP_FAHRENHEIT, SensorReading::Number(min(fahrenheit.as_slice())));
    insert(MAX_TEMP_FAHRENHEIT, SensorReading::Number(max(fahrenheit.as_slice())));
    insert(ALL_TEMPERATURES_CELSIUS, SensorReading::List(frame.to_vec()));
    insert(ALL_TEMPERATURES_FAHRENHEIT, SensorReading::List(fahrenheit));
    insert(
        ALL_TEMPERATURES_FAHRENHEIT_MIRRORED,
        SensorReading::List(mirrored),
    );
    readings
}

pub struct Mlx90641Sensor {
    name: String,
    platform: Platform,
    provider: Arc<dyn I2cProvider>,
    latest: SharedFrame,
    reader: Mutex<Option<FrameReader>>,
}

impl Mlx90641Sensor {
    /// Create a sensor and start reading frames.
    pub fn new(
        config: &ComponentConfig,
        platform: Platform,
        provider: Arc<dyn I2cProvider>,
    ) -> Result<Self> {
        let sensor = Self {
            name: config.name.clone(),
            platform,
            provider,
            latest: SharedFrame::default(),
            reader: Mutex::new(None),
        };
        sensor.reconfigure(config, &Dependencies::new())?;
        Ok(sensor)
    }

    /// The latest frame, and when it was captured. All zeros before the first frame.
    pub fn latest_frame(&self) -> ([f32; NUM_PIXELS], Option<Instant>) {
        let frame = *self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        (frame.temperatures, frame.captured_at)
    }

    fn stop_reader(&self) {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut running) = reader.take() {
            running.stop();
        }
    }
}

impl fmt::Debug for Mlx90641Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mlx90641Sensor")
            .field("name", &self.name)
            .field("platform", &self.platform)
            .finish()
    }
}

impl Resource for Mlx90641Sensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn reconfigure(&self, config: &ComponentConfig, _dependencies: &Dependencies) -> Result<()> {
        let attributes = SensorAttributes::from_config(config)?;
        if self.platform.i2c_devices()?.is_empty() {
            return Err(Error::I2cNotEnabled);
        }
        // The reader owns the bus, so it has to let go first.
        self.stop_reader();
        let mut source = self
            .provider
            .open(&attributes.i2c_bus, attributes.i2c_address)?;
        let frame_rate = attributes.frame_rate();
        source.set_frame_rate(frame_rate)?;
        let reader = FrameReader::spawn(&self.name, source, Arc::clone(&self.latest))?;
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);
        info!(
            name = %self.name,
            bus = %attributes.i2c_bus.display(),
            address = attributes.i2c_address,
            frame_rate = f32::from(frame_rate),
            "Sensor configured"
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        info!(name = %self.name, "Closing sensor");
        self.stop_reader();
        Ok(())
    }
}

impl Sensor for Mlx90641Sensor {
    fn readings(&self) -> Result<Readings> {
        let (frame, _) = self.latest_frame();
        Ok(frame_readings(&frame))
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use float_cmp::assert_approx_eq;
    use mlx90641::{FrameRate, Mlx90641, NUM_PIXELS, WIDTH};
    use mlx90641_test_data::{mock_mlx90641_at_address, MockCameraBus};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::logging::init_test_logging;
    use crate::platform::test::create_file;
    use crate::resource::Api;

    struct MockProvider(MockCameraBus);

    impl I2cProvider for MockProvider {
        fn open(&self, _bus: &Path, address: u8) -> Result<Box<dyn FrameSource>> {
            let camera = Mlx90641::new(self.0.clone(), address).map_err(Error::driver)?;
            Ok(Box::new(camera))
        }
    }

    /// Fails a few times, then returns a constant frame.
    struct FlakySource {
        failures: usize,
        attempts: Arc<AtomicUsize>,
    }

    impl FrameSource for FlakySource {
        fn set_frame_rate(&mut self, _frame_rate: FrameRate) -> Result<()> {
            Ok(())
        }

        fn read_frame(&mut self, destination: &mut [f32]) -> Result<bool> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(Error::driver("injected failure"));
            }
            destination.iter_mut().for_each(|t| *t = 21.5);
            Ok(true)
        }
    }

    fn sensor_config(attributes: serde_json::Value) -> ComponentConfig {
        ComponentConfig::new("thermal", Api::Sensor, model()).with_attributes(attributes)
    }

    fn platform_with_i2c() -> (TempDir, Platform) {
        let root = tempfile::tempdir().unwrap();
        create_file(root.path(), "dev/i2c-1", "");
        let platform = Platform::new(root.path());
        (root, platform)
    }

    fn wait_for_frame(sensor: &Mlx90641Sensor) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sensor.latest_frame().1.is_none() {
            assert!(Instant::now() < deadline, "No frame was read");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn attribute_defaults() {
        let attributes = SensorAttributes::from_config(&sensor_config(json!({}))).unwrap();
        assert_eq!(attributes, SensorAttributes::default());
        assert_eq!(attributes.frame_rate(), FrameRate::Four);
        assert_eq!(attributes.i2c_bus, Path::new("/dev/i2c-1"));
        assert_eq!(attributes.i2c_address, 0x33);
    }

    #[test]
    fn refresh_rates() {
        for (hz, expected) in [
            (0.5, FrameRate::Half),
            (1.0, FrameRate::One),
            (8.0, FrameRate::Eight),
            (64.0, FrameRate::SixtyFour),
            // Invalid rates fall back to 4Hz
            (3.0, FrameRate::Four),
            (0.0, FrameRate::Four),
        ] {
            let config = sensor_config(json!({ "refresh_rate_hz": hz }));
            let attributes = SensorAttributes::from_config(&config).unwrap();
            assert_eq!(attributes.frame_rate(), expected, "{}Hz", hz);
        }
    }

    #[test]
    fn invalid_addresses() {
        for address in [json!(0), json!(0x80), json!(300), json!("0x33")] {
            let config = sensor_config(json!({ "i2c_address": address }));
            assert!(validate_config(&config).is_err(), "{} accepted", address);
        }
        assert_eq!(
            validate_config(&sensor_config(json!({ "i2c_address": 0x28 }))).unwrap(),
            Vec::<String>::new()
        );
    }

    #[test]
    fn readings_layout() {
        let frame: Vec<f32> = (0..NUM_PIXELS).map(|index| index as f32).collect();
        let readings = frame_readings(&frame);
        assert_eq!(readings[MIN_TEMP_CELSIUS], SensorReading::Number(0.0));
        assert_eq!(
            readings[MAX_TEMP_CELSIUS],
            SensorReading::Number((NUM_PIXELS - 1) as f32)
        );
        assert_eq!(readings[MIN_TEMP_FAHRENHEIT], SensorReading::Number(32.0));
        let fahrenheit = readings[ALL_TEMPERATURES_FAHRENHEIT].as_list().unwrap();
        assert_approx_eq!(f32, fahrenheit[5], 41.0);
        let mirrored = readings[ALL_TEMPERATURES_FAHRENHEIT_MIRRORED]
            .as_list()
            .unwrap();
        assert_eq!(mirrored.len(), NUM_PIXELS);
        // First row, reversed
        assert_eq!(mirrored[0], fahrenheit[WIDTH - 1]);
        assert_eq!(mirrored[WIDTH - 1], fahrenheit[0]);
        // Second row, reversed
        assert_eq!(mirrored[WIDTH], fahrenheit[2 * WIDTH - 1]);
        assert_eq!(readings.len(), 7);
    }

    #[test]
    fn readings_skip_nan() {
        let mut frame = [25.0f32; NUM_PIXELS];
        frame[3] = f32::NAN;
        frame[4] = 30.0;
        let readings = frame_readings(&frame);
        assert_eq!(readings[MIN_TEMP_CELSIUS].as_number(), Some(25.0));
        assert_eq!(readings[MAX_TEMP_CELSIUS].as_number(), Some(30.0));
    }

    #[test]
    fn i2c_required() {
        let root = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider(mock_mlx90641_at_address(0x33)));
        let err = Mlx90641Sensor::new(
            &sensor_config(json!({})),
            Platform::new(root.path()),
            provider,
        )
        .unwrap_err();
        assert!(matches!(err, Error::I2cNotEnabled));
    }

    #[test]
    fn reads_from_camera() {
        init_test_logging();
        let (_root, platform) = platform_with_i2c();
        let mock = mock_mlx90641_at_address(0x33);
        let provider = Arc::new(MockProvider(mock.clone()));
        let sensor = Mlx90641Sensor::new(&sensor_config(json!({})), platform, provider).unwrap();
        // 4Hz in the control register
        assert_eq!(mock.control_register(), [0x09, 0x81]);

        wait_for_frame(&sensor);
        let readings = sensor.readings().unwrap();
        let celsius = readings[ALL_TEMPERATURES_CELSIUS].as_list().unwrap();
        assert_eq!(celsius.len(), NUM_PIXELS);
        // The worked example pixel from the datasheet
        assert_approx_eq!(f32, celsius[88], 80.198, epsilon = 0.05);
        sensor.close().unwrap();
    }

    #[test]
    fn zeros_before_first_frame() {
        let (_root, platform) = platform_with_i2c();
        let mock = mock_mlx90641_at_address(0x33);
        mock.set_data_available(false);
        let provider = Arc::new(MockProvider(mock));
        let sensor = Mlx90641Sensor::new(&sensor_config(json!({})), platform, provider).unwrap();
        let readings = sensor.readings().unwrap();
        assert_eq!(readings[MAX_TEMP_CELSIUS].as_number(), Some(0.0));
        sensor.close().unwrap();
    }

    #[test]
    fn reconfigure_restarts_reader() {
        let (_root, platform) = platform_with_i2c();
        let mock = mock_mlx90641_at_address(0x42);
        let provider = Arc::new(MockProvider(mock.clone()));
        let config = sensor_config(json!({ "i2c_address": 0x42 }));
        let sensor = Mlx90641Sensor::new(&config, platform, provider).unwrap();
        let config = sensor_config(json!({ "i2c_address": 0x42, "refresh_rate_hz": 16 }));
        sensor.reconfigure(&config, &Dependencies::new()).unwrap();
        assert_eq!(mock.control_register(), [0x0A, 0x81]);
        // Closing twice is fine
        sensor.close().unwrap();
        sensor.close().unwrap();
    }

    #[test]
    fn reader_retries() {
        init_test_logging();
        let attempts = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            failures: MAX_RETRIES as usize + 1,
            attempts: Arc::clone(&attempts),
        };
        let latest: SharedFrame = Arc::new(Mutex::new(LatestFrame::default()));
        let reader = FrameReader::spawn("flaky", Box::new(source), Arc::clone(&latest)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while latest.lock().unwrap().captured_at.is_none() {
            assert!(Instant::now() < deadline, "The reader never recovered");
            thread::sleep(Duration::from_millis(5));
        }
        drop(reader);
        assert!(attempts.load(Ordering::SeqCst) >= MAX_RETRIES as usize + 2);
        assert_eq!(latest.lock().unwrap().temperatures[0], 21.5);
    }

    #[test]
    fn reader_backs_off_after_max_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            failures: MAX_RETRIES as usize + 1,
            attempts: Arc::clone(&attempts),
        };
        let latest: SharedFrame = Arc::new(Mutex::new(LatestFrame::default()));
        let started = Instant::now();
        let reader = FrameReader::spawn("backoff", Box::new(source), Arc::clone(&latest)).unwrap();
        let deadline = started + Duration::from_secs(5);
        let captured_at = loop {
            if let Some(captured_at) = latest.lock().unwrap().captured_at {
                break captured_at;
            }
            assert!(Instant::now() < deadline, "The reader never recovered");
            thread::sleep(Duration::from_millis(5));
        };
        drop(reader);
        // Two short delays, the long one once the retries run out, then one more short delay.
        let expected = BASE_DELAY * (MAX_RETRIES - 1) + BASE_DELAY * 2 + BASE_DELAY;
        assert!(
            captured_at.duration_since(started) >= expected,
            "Recovered after {:?}",
            captured_at.duration_since(started)
        );
    }

    #[test]
    fn reader_waits_out_cache_duration() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            failures: 0,
            attempts: Arc::clone(&attempts),
        };
        let latest: SharedFrame = Arc::new(Mutex::new(LatestFrame::default()));
        let started = Instant::now();
        let reader = FrameReader::spawn("cached", Box::new(source), latest).unwrap();
        thread::sleep(Duration::from_millis(50));
        drop(reader);
        let window = started.elapsed();
        let reads = attempts.load(Ordering::SeqCst);
        assert!(reads > 0);
        // At most one read per cache period.
        let limit = (window.as_secs_f64() / CACHE_DURATION.as_secs_f64()) as usize + 1;
        assert!(reads <= limit, "{} reads in {:?}", reads, window);
    }
}
