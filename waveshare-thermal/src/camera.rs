// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The `mlx90641-ir-camera` model, a heatmap view of an `mlx90641-ir-sensor`.
//!
//! The images are meant for people to look at, not for training models.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ComponentConfig;
use crate::error::{Error, Result};
use crate::heatmap::{self, ImageFormat, Palette, IMAGE_HEIGHT, IMAGE_WIDTH};
use crate::resource::{
    Camera, Dependencies, Image, Model, ModelFamily, Properties, Resource, Sensor,
    SensorReading,
};
use crate::sensor::{
    ALL_TEMPERATURES_CELSIUS, ALL_TEMPERATURES_FAHRENHEIT_MIRRORED, CACHE_DURATION,
};

pub const MODEL_NAME: &str = "mlx90641-ir-camera";

pub fn model() -> Model {
    Model::new(ModelFamily::waveshare_thermal(), MODEL_NAME)
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CameraAttributes {
    /// The name of the `mlx90641-ir-sensor` to read from.
    #[serde(default)]
    pub sensor: String,
    /// Use the horizontally mirrored frame.
    #[serde(default)]
    pub flipped: bool,
}

impl CameraAttributes {
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let attributes: Self = config.attributes()?;
        if attributes.sensor.is_empty() {
            return Err(Error::MissingSensorAttribute);
        }
        Ok(attributes)
    }
}

/// Check a camera configuration, returning the sensor it depends on.
pub fn validate_config(config: &ComponentConfig) -> Result<Vec<String>> {
    Ok(vec![CameraAttributes::from_config(config)?.sensor])
}

struct CachedImage {
    captured_at: Instant,
    image: Image,
}

struct CameraState {
    sensor: Arc<dyn Sensor>,
    flipped: bool,
    cache: HashMap<ImageFormat, CachedImage>,
}

impl CameraState {
    fn new(config: &ComponentConfig, dependencies: &Dependencies) -> Result<Self> {
        let attributes = CameraAttributes::from_config(config)?;
        Ok(Self {
            sensor: dependencies.sensor(&attributes.sensor)?,
            flipped: attributes.flipped,
            cache: HashMap::new(),
        })
    }

    fn frame(&self) -> Result<Vec<f32>> {
        // The mirrored frame is only provided in Fahrenheit. It doesn't matter after
        // normalization.
        let key = if self.flipped {
            ALL_TEMPERATURES_FAHRENHEIT_MIRRORED
        } else {
            ALL_TEMPERATURES_CELSIUS
        };
        let mut readings = self.sensor.readings()?;
        match readings.remove(key) {
            Some(SensorReading::List(frame)) => Ok(frame),
            _ => Err(Error::Driver {
                message: format!("{} is missing from the sensor readings", key),
            }),
        }
    }
}

pub struct Mlx90641Camera {
    name: String,
    palette: Palette,
    state: Mutex<CameraState>,
}

impl Mlx90641Camera {
    pub fn new(config: &ComponentConfig, dependencies: &Dependencies) -> Result<Self> {
        let camera = Self {
            name: config.name.clone(),
            palette: Palette::heatmap(),
            state: Mutex::new(CameraState::new(config, dependencies)?),
        };
        info!(name = %camera.name, "Camera configured");
        Ok(camera)
    }
}

impl fmt::Debug for Mlx90641Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mlx90641Camera")
            .field("name", &self.name)
            .finish()
    }
}

impl Resource for Mlx90641Camera {
    fn name(&self) -> &str {
        &self.name
    }

    fn reconfigure(&self, config: &ComponentConfig, dependencies: &Dependencies) -> Result<()> {
        let state = CameraState::new(config, dependencies)?;
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        info!(name = %self.name, "Camera reconfigured");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache
            .clear();
        Ok(())
    }
}

impl Camera for Mlx90641Camera {
    fn image(&self, mime_type: &str) -> Result<Image> {
        let format = ImageFormat::from_mime(mime_type);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = state.cache.get(&format) {
            if cached.captured_at.elapsed() < CACHE_DURATION {
                debug!(mime_type = format.mime_type(), "Using cached image");
                return Ok(cached.image.clone());
            }
        }
        let captured_at = Instant::now();
        let image = heatmap::thermal_image(&state.frame()?, &self.palette, format)?;
        state.cache.insert(
            format,
            CachedImage {
                captured_at,
                image: image.clone(),
            },
        );
        Ok(image)
    }

    fn properties(&self) -> Properties {
        Properties {
            supports_pcd: false,
            width_px: IMAGE_WIDTH,
            height_px: IMAGE_HEIGHT,
            intrinsic_parameters: Vec::new(),
            distortion_parameters: Vec::new(),
        }
    }
}
