// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Component configuration, as handed over by the robot host.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::resource::{Api, Model};

/// The configuration for one component.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ComponentConfig {
    pub name: String,
    pub api: Api,
    pub model: Model,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Explicit dependencies, in addition to those implied by the attributes.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>, api: Api, model: Model) -> Self {
        Self {
            name: name.into(),
            api,
            model,
            attributes: Map::new(),
            depends_on: Vec::new(),
        }
    }

    /// Replace the attributes. Anything but a JSON object clears them.
    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    /// Deserialize the attributes into a typed struct.
    pub fn attributes<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.attributes.clone())).map_err(|err| {
            Error::configuration(format!("Invalid attributes for {}: {}", self.name, err))
        })
    }
}

/// A set of components to run together.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ModuleConfig {
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

impl ModuleConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| Error::file(path, err))?;
        Self::from_json(&contents)
    }
}
