// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Host checks and I²C enablement.
//!
//! Every path is resolved against a configurable root, and commands go through a
//! [`CommandRunner`], so provisioning can run against a scratch directory.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Where the board model string can be found.
const MODEL_PATHS: &[&str] = &[
    "/proc/device-tree/model",
    "/sys/firmware/devicetree/base/model",
];

/// Newer Raspberry Pi OS releases moved the boot partition to /boot/firmware.
const BOOT_CONFIG_PATHS: &[&str] = &["/boot/firmware/config.txt", "/boot/config.txt"];

/// Tools that must be installed before I²C can be enabled.
const REQUIRED_TOOLS: &[&str] = &["modprobe"];

const SUPPORTED_MODEL: &str = "Raspberry Pi";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner: Send + Sync {
    /// Find a program on the search path.
    fn find(&self, program: &str) -> Option<PathBuf>;

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runs real commands, searching `PATH`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCommands;

impl CommandRunner for SystemCommands {
    fn find(&self, program: &str) -> Option<PathBuf> {
        let search_path = env::var_os("PATH")?;
        env::split_paths(&search_path)
            .map(|directory| directory.join(program))
            .find(|candidate| candidate.is_file())
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(program, ?args, "Running command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| Error::Command {
                command: program.to_string(),
                message: err.to_string(),
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// How I²C ended up enabled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum I2cStatus {
    AlreadyEnabled,
    /// `modprobe i2c-dev` created the device nodes.
    ModuleLoaded,
    /// `raspi-config` enabled I²C, which may only take effect after a reboot.
    RebootRequired,
}

impl fmt::Display for I2cStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            I2cStatus::AlreadyEnabled => "I2C is enabled",
            I2cStatus::ModuleLoaded => "I2C enabled by loading i2c-dev",
            I2cStatus::RebootRequired => {
                "I2C enabled through raspi-config, a reboot may be required"
            }
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootConfig {
    pub path: PathBuf,
    /// Whether `dtparam=i2c_arm=on` is set.
    pub i2c_arm_enabled: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionReport {
    pub model: String,
    pub i2c: I2cStatus,
    pub boot_config: Option<BootConfig>,
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Platform: {}", self.model)?;
        writeln!(f, "{}", self.i2c)?;
        match &self.boot_config {
            Some(config) if config.i2c_arm_enabled => {
                write!(f, "dtparam=i2c_arm=on is set in {}", config.path.display())
            }
            Some(config) => write!(f, "dtparam=i2c_arm=on is not set in {}", config.path.display()),
            None => write!(f, "No boot config found"),
        }
    }
}

#[derive(Clone)]
pub struct Platform {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").field("root", &self.root).finish()
    }
}

impl Platform {
    /// A platform rooted at `root` that runs real commands.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_runner(root, Arc::new(SystemCommands))
    }

    pub fn with_runner(root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            root: root.into(),
            runner,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an absolute host path under the root.
    pub fn path(&self, absolute: impl AsRef<Path>) -> PathBuf {
        let absolute = absolute.as_ref();
        self.root
            .join(absolute.strip_prefix("/").unwrap_or(absolute))
    }

    /// The I²C device nodes (`/dev/i2c-*`), sorted.
    pub fn i2c_devices(&self) -> Result<Vec<PathBuf>> {
        let dev = self.path("/dev");
        let entries = match fs::read_dir(&dev) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::file(dev, err)),
        };
        let mut devices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| Error::file(&dev, err))?;
            if entry.file_name().to_string_lossy().starts_with("i2c-") {
                devices.push(entry.path());
            }
        }
        devices.sort();
        Ok(devices)
    }

    /// The board model reported by the device tree, if there is one.
    pub fn model(&self) -> Result<Option<String>> {
        for model_path in MODEL_PATHS {
            let path = self.path(model_path);
            match fs::read_to_string(&path) {
                Ok(model) => return Ok(Some(model.trim_end_matches('\0').trim().to_string())),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(Error::file(path, err)),
            }
        }
        Ok(None)
    }

    /// Fail unless this is a Raspberry Pi, returning the full model name.
    pub fn check_raspberry_pi(&self) -> Result<String> {
        match self.model()? {
            Some(model) if model.contains(SUPPORTED_MODEL) => Ok(model),
            Some(model) => Err(Error::platform(format!(
                "This module only supports a {}, but this is a {}",
                SUPPORTED_MODEL, model
            ))),
            None => Err(Error::platform(format!(
                "This module only supports a {}, and no device tree model was found",
                SUPPORTED_MODEL
            ))),
        }
    }

    pub fn check_tools(&self) -> Result<()> {
        for tool in REQUIRED_TOOLS {
            let path = self
                .runner
                .find(tool)
                .ok_or_else(|| Error::MissingTool(tool.to_string()))?;
            debug!(tool, path = %path.display(), "Found required tool");
        }
        Ok(())
    }

    /// Make sure I²C device nodes exist, loading the kernel module or asking `raspi-config`.
    pub fn enable_i2c(&self) -> Result<I2cStatus> {
        if !self.i2c_devices()?.is_empty() {
            return Ok(I2cStatus::AlreadyEnabled);
        }

        let output = self.runner.run("modprobe", &["i2c-dev"])?;
        if !output.success {
            warn!(stderr = %output.stderr.trim(), "modprobe i2c-dev failed");
        }
        if !self.i2c_devices()?.is_empty() {
            info!("Loaded the i2c-dev kernel module");
            return Ok(I2cStatus::ModuleLoaded);
        }

        if self.runner.find("raspi-config").is_none() {
            return Err(Error::I2cNotEnabled);
        }
        self.raspi_config_enable_i2c()?;
        Ok(I2cStatus::RebootRequired)
    }

    /// Enable I²C through `raspi-config`, which also sets the device tree parameter.
    fn raspi_config_enable_i2c(&self) -> Result<()> {
        let output = self.runner.run("raspi-config", &["nonint", "do_i2c", "0"])?;
        if !output.success {
            return Err(Error::Command {
                command: "raspi-config nonint do_i2c 0".to_string(),
                message: output.stderr.trim().to_string(),
            });
        }
        warn!("Enabled I2C with raspi-config, a reboot may be required");
        Ok(())
    }

    /// Find the boot config, and check if it enables the ARM I²C bus.
    pub fn boot_config(&self) -> Result<Option<BootConfig>> {
        for config_path in BOOT_CONFIG_PATHS {
            let path = self.path(config_path);
            match fs::read_to_string(&path) {
                Ok(contents) => {
                    return Ok(Some(BootConfig {
                        path,
                        i2c_arm_enabled: i2c_arm_enabled(&contents),
                    }))
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(Error::file(path, err)),
            }
        }
        Ok(None)
    }

    /// Run every provisioning step, stopping at the first failure.
    pub fn provision(&self) -> Result<ProvisionReport> {
        let model = self.check_raspberry_pi()?;
        info!(%model, "Detected platform");
        self.check_tools()?;
        let mut i2c = self.enable_i2c()?;
        let mut boot_config = self.boot_config()?;
        // Device nodes from modprobe don't survive a reboot without the device tree parameter.
        let missing_parameter = match &boot_config {
            Some(config) if !config.i2c_arm_enabled && i2c != I2cStatus::RebootRequired => {
                Some(config.path.clone())
            }
            _ => None,
        };
        if let Some(path) = missing_parameter {
            warn!(path = %path.display(), "dtparam=i2c_arm=on is not set");
            if self.runner.find("raspi-config").is_none() {
                return Err(Error::platform(format!(
                    "dtparam=i2c_arm=on is not set in {}, and raspi-config is not installed to \
                     set it",
                    path.display()
                )));
            }
            self.raspi_config_enable_i2c()?;
            i2c = I2cStatus::RebootRequired;
            boot_config = self.boot_config()?;
        }
        Ok(ProvisionReport {
            model,
            i2c,
            boot_config,
        })
    }
}

/// Check a config.txt for an uncommented `dtparam=i2c_arm=on`, possibly among other parameters.
fn i2c_arm_enabled(contents: &str) -> bool {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.strip_prefix("dtparam="))
        .flat_map(|params| params.split(','))
        .any(|param| param.trim() == "i2c_arm=on")
}
