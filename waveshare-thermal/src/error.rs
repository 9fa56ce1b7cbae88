// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

use std::fmt;
use std::path::PathBuf;

/// Errors raised by the thermal components and provisioning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("i2c not enabled on your device, we tried enabling it through modprobe please ssh into your pi and enable it through sudo raspi-config")]
    I2cNotEnabled,

    #[error("An mlx90641-ir-sensor attribute is required for an mlx90641-ir-camera.")]
    MissingSensorAttribute,

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceExists(String),

    #[error("Dependency {0} is not a sensor")]
    NotASensor(String),

    #[error("{name} is still used by {dependent}")]
    ResourceInUse { name: String, dependent: String },

    #[error("Dependency cycle involving: {0}")]
    DependencyCycle(String),

    #[error("Expected {expected} temperatures, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("Sensor error: {message}")]
    Driver { message: String },

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Required tool {0} is not installed")]
    MissingTool(String),

    #[error("Command {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("IO error on {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("Image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap an error from the camera driver.
    ///
    /// The driver's error type is generic over the I²C bus, so only the message is kept.
    pub fn driver(error: impl fmt::Display) -> Self {
        Self::Driver {
            message: error.to_string(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// Attach a path to an IO error.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
