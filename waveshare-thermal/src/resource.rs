// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! The component contract shared with the robot host.
//!
//! Components are identified by a [`Model`] (`namespace:family:name`) and implement one [`Api`].
//! A [`Registry`] knows how to validate and construct each model, and a [`Module`] owns the live
//! resources built from [`ComponentConfig`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::ComponentConfig;
use crate::error::{Error, Result};

/// The namespace all of this module's models live under.
pub const NAMESPACE: &str = "rand";

/// The model family for this module.
pub const FAMILY: &str = "waveshare-thermal";

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModelFamily {
    namespace: String,
    family: String,
}

impl ModelFamily {
    pub fn new(namespace: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            family: family.into(),
        }
    }

    /// `rand:waveshare-thermal`
    pub fn waveshare_thermal() -> Self {
        Self::new(NAMESPACE, FAMILY)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.family)
    }
}

/// A fully qualified model name, like `rand:waveshare-thermal:mlx90641-ir-sensor`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Model {
    family: ModelFamily,
    name: String,
}

impl Model {
    pub fn new(family: ModelFamily, name: impl Into<String>) -> Self {
        Self {
            family,
            name: name.into(),
        }
    }

    pub fn family(&self) -> &ModelFamily {
        &self.family
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.name)
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [namespace, family, name]
                if !namespace.is_empty() && !family.is_empty() && !name.is_empty() =>
            {
                Ok(Self::new(ModelFamily::new(*namespace, *family), *name))
            }
            _ => Err(Error::configuration(format!(
                "{:?} is not a model name of the form namespace:family:name",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Model {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Model> for String {
    fn from(model: Model) -> Self {
        model.to_string()
    }
}

/// The host APIs this module implements.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Api {
    Sensor,
    Camera,
}

impl Api {
    pub fn as_str(&self) -> &'static str {
        match self {
            Api::Sensor => "rdk:component:sensor",
            Api::Camera => "rdk:component:camera",
        }
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Api {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [Api::Sensor, Api::Camera]
            .into_iter()
            .find(|api| api.as_str() == s)
            .ok_or_else(|| Error::configuration(format!("Unsupported API {:?}", s)))
    }
}

impl TryFrom<String> for Api {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Api> for String {
    fn from(api: Api) -> Self {
        api.as_str().to_string()
    }
}

/// A single sensor reading value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorReading {
    Number(f32),
    List(Vec<f32>),
}

impl SensorReading {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            SensorReading::Number(value) => Some(*value),
            SensorReading::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[f32]> {
        match self {
            SensorReading::Number(_) => None,
            SensorReading::List(values) => Some(values),
        }
    }
}

pub type Readings = BTreeMap<String, SensorReading>;

/// An encoded image and the MIME type of its encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NamedImage {
    pub name: String,
    pub image: Image,
}

/// Static camera properties reported to the host.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Properties {
    pub supports_pcd: bool,
    pub width_px: u32,
    pub height_px: u32,
    pub intrinsic_parameters: Vec<f64>,
    pub distortion_parameters: Vec<f64>,
}

pub trait Resource: Send + Sync {
    fn name(&self) -> &str;

    /// Apply a new configuration in place.
    fn reconfigure(&self, config: &ComponentConfig, dependencies: &Dependencies) -> Result<()>;

    /// Release any hardware and background work held by the resource.
    fn close(&self) -> Result<()>;
}

pub trait Sensor: Resource {
    fn readings(&self) -> Result<Readings>;
}

pub trait Camera: Resource {
    /// Capture an image, encoded as close to `mime_type` as the camera supports.
    ///
    /// The returned [`Image::mime_type`] always describes the actual encoding.
    fn image(&self, mime_type: &str) -> Result<Image>;

    fn images(&self) -> Result<Vec<NamedImage>> {
        Err(Error::Unsupported("images"))
    }

    fn point_cloud(&self) -> Result<Image> {
        Err(Error::Unsupported("point_cloud"))
    }

    fn properties(&self) -> Properties;
}

/// A live resource of either API.
#[derive(Clone)]
pub enum ResourceHandle {
    Sensor(Arc<dyn Sensor>),
    Camera(Arc<dyn Camera>),
}

impl ResourceHandle {
    pub fn api(&self) -> Api {
        match self {
            ResourceHandle::Sensor(_) => Api::Sensor,
            ResourceHandle::Camera(_) => Api::Camera,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceHandle::Sensor(sensor) => sensor.name(),
            ResourceHandle::Camera(camera) => camera.name(),
        }
    }

    fn reconfigure(&self, config: &ComponentConfig, dependencies: &Dependencies) -> Result<()> {
        match self {
            ResourceHandle::Sensor(sensor) => sensor.reconfigure(config, dependencies),
            ResourceHandle::Camera(camera) => camera.reconfigure(config, dependencies),
        }
    }

    fn close(&self) -> Result<()> {
        match self {
            ResourceHandle::Sensor(sensor) => sensor.close(),
            ResourceHandle::Camera(camera) => camera.close(),
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("api", &self.api())
            .field("name", &self.name())
            .finish()
    }
}

/// The resolved dependencies handed to a resource when it is built or reconfigured.
#[derive(Clone, Debug, Default)]
pub struct Dependencies(BTreeMap<String, ResourceHandle>);

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ResourceHandle) {
        self.0.insert(handle.name().to_string(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&ResourceHandle> {
        self.0.get(name)
    }

    /// Look up a dependency that must be a sensor.
    pub fn sensor(&self, name: &str) -> Result<Arc<dyn Sensor>> {
        match self.0.get(name) {
            Some(ResourceHandle::Sensor(sensor)) => Ok(Arc::clone(sensor)),
            Some(ResourceHandle::Camera(_)) => Err(Error::NotASensor(name.to_string())),
            None => Err(Error::ResourceNotFound(name.to_string())),
        }
    }
}

/// Checks a configuration, returning the names of the resources it implicitly depends on.
pub type Validator = fn(&ComponentConfig) -> Result<Vec<String>>;

pub type Constructor =
    Box<dyn Fn(&ComponentConfig, &Dependencies) -> Result<ResourceHandle> + Send + Sync>;

struct Registration {
    api: Api,
    validate: Validator,
    construct: Constructor,
}

/// The models this module can build.
#[derive(Default)]
pub struct Registry {
    models: BTreeMap<Model, Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, model: Model, api: Api, validate: Validator, construct: F)
    where
        F: Fn(&ComponentConfig, &Dependencies) -> Result<ResourceHandle> + Send + Sync + 'static,
    {
        debug!(%model, %api, "Registering model");
        self.models.insert(
            model,
            Registration {
                api,
                validate,
                construct: Box::new(construct),
            },
        );
    }

    /// Every registered model with the API it implements.
    pub fn models(&self) -> impl Iterator<Item = (&Model, Api)> + '_ {
        self.models
            .iter()
            .map(|(model, registration)| (model, registration.api))
    }

    fn registration(&self, config: &ComponentConfig) -> Result<&Registration> {
        let registration = self
            .models
            .get(&config.model)
            .ok_or_else(|| Error::UnknownModel(config.model.to_string()))?;
        if registration.api != config.api {
            return Err(Error::configuration(format!(
                "{} implements {}, but {} is configured as {}",
                config.model, registration.api, config.name, config.api
            )));
        }
        Ok(registration)
    }

    /// Validate a configuration and return its implicit dependencies.
    pub fn validate(&self, config: &ComponentConfig) -> Result<Vec<String>> {
        (self.registration(config)?.validate)(config)
    }

    /// Every dependency of a configuration, explicit ones included, without duplicates.
    pub fn dependencies_of(&self, config: &ComponentConfig) -> Result<Vec<String>> {
        let mut names = self.validate(config)?;
        names.extend(config.depends_on.iter().cloned());
        let mut seen = BTreeSet::new();
        names.retain(|name| seen.insert(name.clone()));
        Ok(names)
    }

    pub fn construct(
        &self,
        config: &ComponentConfig,
        dependencies: &Dependencies,
    ) -> Result<ResourceHandle> {
        (self.registration(config)?.construct)(config, dependencies)
    }
}

/// Order configurations so every resource comes after its dependencies.
///
/// `existing` names resources that are already running, and can be depended on without being in
/// `configs`.
pub fn creation_order<'a>(
    registry: &Registry,
    configs: &'a [ComponentConfig],
    existing: &[&str],
) -> Result<Vec<&'a ComponentConfig>> {
    let mut pending: Vec<(&ComponentConfig, Vec<String>)> = configs
        .iter()
        .map(|config| Ok((config, registry.dependencies_of(config)?)))
        .collect::<Result<_>>()?;
    let configured: BTreeSet<&str> = configs.iter().map(|config| config.name.as_str()).collect();
    for (config, dependencies) in &pending {
        if let Some(missing) = dependencies
            .iter()
            .find(|name| !configured.contains(name.as_str()) && !existing.contains(&name.as_str()))
        {
            return Err(Error::configuration(format!(
                "{} depends on {}, which is not configured",
                config.name, missing
            )));
        }
    }

    let mut ready: BTreeSet<&str> = existing.iter().copied().collect();
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let (next, blocked): (Vec<_>, Vec<_>) = pending.into_iter().partition(|(_, deps)| {
            deps.iter().all(|name| ready.contains(name.as_str()))
        });
        if next.is_empty() {
            let names: Vec<&str> = blocked
                .iter()
                .map(|(config, _)| config.name.as_str())
                .collect();
            return Err(Error::DependencyCycle(names.join(", ")));
        }
        for (config, _) in next {
            ready.insert(config.name.as_str());
            ordered.push(config);
        }
        pending = blocked;
    }
    Ok(ordered)
}

/// Owns the live resources, in creation order.
pub struct Module {
    registry: Registry,
    resources: Vec<ResourceHandle>,
    /// The dependency names of each live resource.
    dependencies: BTreeMap<String, Vec<String>>,
}

impl Module {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            resources: Vec::new(),
            dependencies: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceHandle> + '_ {
        self.resources.iter()
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceHandle> {
        self.resources.iter().find(|handle| handle.name() == name)
    }

    pub fn sensor(&self, name: &str) -> Result<Arc<dyn Sensor>> {
        match self.resource(name) {
            Some(ResourceHandle::Sensor(sensor)) => Ok(Arc::clone(sensor)),
            Some(ResourceHandle::Camera(_)) => Err(Error::NotASensor(name.to_string())),
            None => Err(Error::ResourceNotFound(name.to_string())),
        }
    }

    pub fn camera(&self, name: &str) -> Result<Arc<dyn Camera>> {
        match self.resource(name) {
            Some(ResourceHandle::Camera(camera)) => Ok(Arc::clone(camera)),
            Some(ResourceHandle::Sensor(_)) => Err(Error::configuration(format!(
                "{} is not a camera",
                name
            ))),
            None => Err(Error::ResourceNotFound(name.to_string())),
        }
    }

    fn resolve_dependencies(
        &self,
        config: &ComponentConfig,
    ) -> Result<(Dependencies, Vec<String>)> {
        let names = self.registry.dependencies_of(config)?;
        let mut dependencies = Dependencies::new();
        for name in &names {
            match self.resource(name) {
                Some(handle @ ResourceHandle::Sensor(_)) => dependencies.insert(handle.clone()),
                Some(ResourceHandle::Camera(_)) => return Err(Error::NotASensor(name.clone())),
                None => return Err(Error::ResourceNotFound(name.clone())),
            }
        }
        Ok((dependencies, names))
    }

    /// The first live resource that depends on `name`.
    fn dependent_of(&self, name: &str) -> Option<&str> {
        self.dependencies
            .iter()
            .find(|(_, dependencies)| dependencies.iter().any(|dependency| dependency == name))
            .map(|(dependent, _)| dependent.as_str())
    }

    /// Validate, resolve dependencies for, and build a new resource.
    pub fn add_resource(&mut self, config: &ComponentConfig) -> Result<ResourceHandle> {
        if self.resource(&config.name).is_some() {
            return Err(Error::ResourceExists(config.name.clone()));
        }
        let (dependencies, names) = self.resolve_dependencies(config)?;
        let handle = self.registry.construct(config, &dependencies)?;
        info!(name = %config.name, model = %config.model, "Added resource");
        self.resources.push(handle.clone());
        self.dependencies.insert(config.name.clone(), names);
        Ok(handle)
    }

    /// Add several resources, creating dependencies first.
    pub fn add_resources(&mut self, configs: &[ComponentConfig]) -> Result<()> {
        let existing: Vec<&str> = self.resources.iter().map(ResourceHandle::name).collect();
        let ordered = creation_order(&self.registry, configs, &existing)?;
        for config in ordered {
            self.add_resource(config)?;
        }
        Ok(())
    }

    pub fn reconfigure_resource(&mut self, config: &ComponentConfig) -> Result<()> {
        let handle = self
            .resource(&config.name)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound(config.name.clone()))?;
        // Validation also rejects a model change for an existing resource.
        if handle.api() != config.api {
            return Err(Error::configuration(format!(
                "{} cannot change from {} to {}",
                config.name,
                handle.api(),
                config.api
            )));
        }
        let (dependencies, names) = self.resolve_dependencies(config)?;
        handle.reconfigure(config, &dependencies)?;
        self.dependencies.insert(config.name.clone(), names);
        info!(name = %config.name, "Reconfigured resource");
        Ok(())
    }

    /// Close and remove a resource. Resources that others depend on have to be removed last.
    pub fn remove_resource(&mut self, name: &str) -> Result<()> {
        let index = self
            .resources
            .iter()
            .position(|handle| handle.name() == name)
            .ok_or_else(|| Error::ResourceNotFound(name.to_string()))?;
        if let Some(dependent) = self.dependent_of(name) {
            return Err(Error::ResourceInUse {
                name: name.to_string(),
                dependent: dependent.to_string(),
            });
        }
        let handle = self.resources.remove(index);
        self.dependencies.remove(name);
        handle.close()?;
        info!(name, "Removed resource");
        Ok(())
    }

    /// Close every resource, newest first.
    ///
    /// Every resource is closed even if some fail; the first error is returned.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        self.dependencies.clear();
        while let Some(handle) = self.resources.pop() {
            if let Err(err) = handle.close() {
                error!(name = handle.name(), error = %err, "Failed to close resource");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
