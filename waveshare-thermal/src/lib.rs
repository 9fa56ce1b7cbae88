// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! MLX90641 thermal sensor and heatmap camera components.
//!
//! Two models are provided under the `rand:waveshare-thermal` family:
//!
//! * `mlx90641-ir-sensor` reads frames from the camera in the background and reports the
//!   temperatures (see [`sensor`]).
//! * `mlx90641-ir-camera` renders a sensor's frames as a false-color image (see [`camera`]).
//!
//! [`platform`] covers getting a Raspberry Pi ready to talk to the camera over I²C.

use std::sync::Arc;

pub mod camera;
pub mod cli;
pub mod config;
pub mod error;
pub mod heatmap;
pub mod logging;
pub mod platform;
pub mod resource;
pub mod sensor;

pub use config::{ComponentConfig, ModuleConfig};
pub use error::{Error, Result};
pub use platform::Platform;
pub use resource::{Api, Camera, Model, Module, Registry, Resource, ResourceHandle, Sensor};

/// A registry with both models, opening cameras through `provider`.
pub fn registry(platform: Platform, provider: Arc<dyn sensor::I2cProvider>) -> Registry {
    let mut registry = Registry::new();
    registry.register(
        sensor::model(),
        Api::Sensor,
        sensor::validate_config,
        move |config, _dependencies| {
            let sensor = sensor::Mlx90641Sensor::new(
                config,
                platform.clone(),
                Arc::clone(&provider),
            )?;
            Ok(ResourceHandle::Sensor(Arc::new(sensor)))
        },
    );
    registry.register(
        camera::model(),
        Api::Camera,
        camera::validate_config,
        |config, dependencies| {
            let camera = camera::Mlx90641Camera::new(config, dependencies)?;
            Ok(ResourceHandle::Camera(Arc::new(camera)))
        },
    );
    registry
}
