// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Command line interface for preparing a board and exercising the components.
//!
//! With no subcommand the binary acts as the module entry point: it provisions the board, then
//! starts the module with the host's arguments.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::ModuleConfig;
use crate::heatmap::ImageFormat;
use crate::platform::Platform;
use crate::resource::{creation_order, Api, Module};
use crate::sensor::{I2cProvider, LinuxI2c};

#[derive(Debug, Parser)]
#[command(name = "waveshare-thermal")]
#[command(about = "MLX90641 thermal sensor and heatmap camera components")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Filesystem root to inspect, for working on a mounted SD card image
    #[arg(long, global = true, env = "WAVESHARE_THERMAL_ROOT", default_value = "/")]
    pub root: PathBuf,
}

/// Options for running as the module entry point.
#[derive(Args, Clone, Debug, Default, PartialEq)]
pub struct RunArgs {
    /// Components to start once the board is provisioned
    #[arg(long, short = 'c', env = "WAVESHARE_THERMAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Arguments from the host, such as the module socket path
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Commands {
    /// Provision the board, then start the module (the default)
    Run(RunArgs),

    /// Check the board and enable I²C
    Setup,

    /// List the models this module provides
    Models,

    /// Check a module configuration without touching any hardware
    Validate {
        #[arg(long, short = 'c', env = "WAVESHARE_THERMAL_CONFIG")]
        config: PathBuf,
    },

    /// Start the configured components, print sensor readings and save camera images
    Capture {
        #[arg(long, short = 'c', env = "WAVESHARE_THERMAL_CONFIG")]
        config: PathBuf,

        /// Directory the images are written to
        #[arg(long, short = 'o', default_value = ".")]
        output: PathBuf,

        /// How many captures to take
        #[arg(long, short = 'n', default_value_t = 1)]
        count: u32,

        /// Delay between captures, in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,

        #[arg(long, default_value = "image/jpeg")]
        mime_type: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run, defaulting to [`Commands::Run`].
    pub fn into_command(self) -> Commands {
        self.command.unwrap_or(Commands::Run(self.run))
    }

    pub fn run(self) -> Result<()> {
        let platform = Platform::new(&self.root);
        match self.into_command() {
            Commands::Run(args) => serve(platform, Arc::new(LinuxI2c), &args, io::stdin().lock()),
            Commands::Setup => setup(&platform),
            Commands::Models => models(platform),
            Commands::Validate { config } => validate(platform, &config),
            Commands::Capture {
                config,
                output,
                count,
                interval_ms,
                mime_type,
            } => capture(
                platform,
                &config,
                &output,
                count,
                Duration::from_millis(interval_ms),
                &mime_type,
            ),
        }
    }
}

/// Provision the board and start the module, holding its resources until `host` closes.
///
/// Provisioning stops at the first failure, before anything touches the sensor.
pub fn serve(
    platform: Platform,
    provider: Arc<dyn I2cProvider>,
    args: &RunArgs,
    mut host: impl Read,
) -> Result<()> {
    let report = platform.provision().context("Provisioning failed")?;
    info!(model = %report.model, i2c = %report.i2c, "Provisioned");
    info!(args = ?args.args, "Starting module");
    let mut module = Module::new(crate::registry(platform, provider));
    if let Some(path) = &args.config {
        let started = ModuleConfig::from_file(path)
            .and_then(|config| module.add_resources(&config.components));
        if let Err(err) = started {
            module.close()?;
            return Err(err.into());
        }
    }
    // The host stops the module by closing stdin.
    let result = io::copy(&mut host, &mut io::sink()).context("Lost the connection to the host");
    info!("Stopping module");
    module.close()?;
    result.map(|_| ())
}

fn setup(platform: &Platform) -> Result<()> {
    let report = platform.provision()?;
    println!("{}", report);
    Ok(())
}

fn models(platform: Platform) -> Result<()> {
    let registry = crate::registry(platform, Arc::new(LinuxI2c));
    for (model, api) in registry.models() {
        println!("{} ({})", model, api);
    }
    Ok(())
}

fn validate(platform: Platform, path: &Path) -> Result<()> {
    let config = ModuleConfig::from_file(path)?;
    let registry = crate::registry(platform, Arc::new(LinuxI2c));
    let ordered = creation_order(&registry, &config.components, &[])
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    for component in ordered {
        println!("{} {} ({})", component.name, component.model, component.api);
    }
    Ok(())
}

fn capture(
    platform: Platform,
    path: &Path,
    output: &Path,
    count: u32,
    interval: Duration,
    mime_type: &str,
) -> Result<()> {
    let config = ModuleConfig::from_file(path)?;
    fs::create_dir_all(output)
        .with_context(|| format!("Unable to create {}", output.display()))?;
    let mut module = Module::new(crate::registry(platform, Arc::new(LinuxI2c)));
    module.add_resources(&config.components)?;
    // Give the readers a chance at a first frame.
    thread::sleep(interval);
    let result = capture_from(&module, output, count, interval, mime_type);
    module.close()?;
    result
}

fn capture_from(
    module: &Module,
    output: &Path,
    count: u32,
    interval: Duration,
    mime_type: &str,
) -> Result<()> {
    let extension = ImageFormat::from_mime(mime_type).extension();
    for index in 0..count {
        if index > 0 {
            thread::sleep(interval);
        }
        for resource in module.resources() {
            match resource.api() {
                Api::Sensor => {
                    let readings = module.sensor(resource.name())?.readings()?;
                    println!("{}", serde_json::to_string(&readings)?);
                }
                Api::Camera => {
                    let image = module.camera(resource.name())?.image(mime_type)?;
                    let path = output.join(format!("{}-{}.{}", resource.name(), index, extension));
                    fs::write(&path, &image.data)
                        .with_context(|| format!("Unable to write {}", path.display()))?;
                    info!(path = %path.display(), mime_type = %image.mime_type, "Saved image");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use clap::Parser;
    use mlx90641::Mlx90641;
    use mlx90641_test_data::{mock_mlx90641_at_address, MockCameraBus};

    use super::{serve, Cli, Commands, RunArgs};
    use crate::error::{Error, Result};
    use crate::platform::test::{create_file, FakeRunner};
    use crate::platform::{CommandRunner, Platform};
    use crate::sensor::{FrameSource, I2cProvider};

    struct MockProvider(MockCameraBus);

    impl I2cProvider for MockProvider {
        fn open(&self, _bus: &Path, address: u8) -> Result<Box<dyn FrameSource>> {
            let camera = Mlx90641::new(self.0.clone(), address).map_err(Error::driver)?;
            Ok(Box::new(camera))
        }
    }

    fn run_args(cli: Cli) -> RunArgs {
        match cli.into_command() {
            Commands::Run(args) => args,
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn host_arguments_run_module() {
        let cli = Cli::try_parse_from(["waveshare-thermal", "/tmp/viam-module.sock"]).unwrap();
        assert_eq!(run_args(cli).args, vec!["/tmp/viam-module.sock".to_string()]);

        let cli = Cli::try_parse_from(["waveshare-thermal"]).unwrap();
        assert!(run_args(cli).args.is_empty());
    }

    #[test]
    fn explicit_run_forwards_everything() {
        let cli = Cli::try_parse_from([
            "waveshare-thermal",
            "run",
            "--config",
            "module.json",
            "/tmp/viam-module.sock",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let args = run_args(cli);
        assert_eq!(args.config, Some(PathBuf::from("module.json")));
        assert_eq!(
            args.args,
            vec![
                "/tmp/viam-module.sock".to_string(),
                "--log-level".to_string(),
                "debug".to_string()
            ]
        );
    }

    #[test]
    fn subcommands_win_over_host_arguments() {
        let cli = Cli::try_parse_from(["waveshare-thermal", "models"]).unwrap();
        assert_eq!(cli.into_command(), Commands::Models);
    }

    fn raspberry_pi() -> (tempfile::TempDir, Arc<FakeRunner>, Platform) {
        let root = tempfile::tempdir().unwrap();
        create_file(root.path(), "proc/device-tree/model", "Raspberry Pi 4 Model B\0");
        create_file(root.path(), "dev/i2c-1", "");
        create_file(root.path(), "boot/firmware/config.txt", "dtparam=i2c_arm=on\n");
        let runner = Arc::new(FakeRunner::new(root.path(), &["modprobe"]));
        let platform =
            Platform::with_runner(root.path(), Arc::clone(&runner) as Arc<dyn CommandRunner>);
        (root, runner, platform)
    }

    #[test]
    fn serve_starts_configured_components() {
        let (root, _runner, platform) = raspberry_pi();
        create_file(
            root.path(),
            "module.json",
            r#"{"components": [{
                "name": "thermal",
                "api": "rdk:component:sensor",
                "model": "rand:waveshare-thermal:mlx90641-ir-sensor"
            }]}"#,
        );
        let mock = mock_mlx90641_at_address(0x33);
        let args = RunArgs {
            config: Some(root.path().join("module.json")),
            args: vec!["/tmp/viam-module.sock".to_string()],
        };
        serve(platform, Arc::new(MockProvider(mock.clone())), &args, &b""[..]).unwrap();
        // The sensor set the default 4Hz refresh rate.
        assert_eq!(mock.control_register(), [0x09, 0x81]);
    }

    #[test]
    fn serve_stops_when_provisioning_fails() {
        let root = tempfile::tempdir().unwrap();
        create_file(root.path(), "proc/device-tree/model", "Pine64 RockPro64");
        let runner = Arc::new(FakeRunner::new(root.path(), &["modprobe"]));
        let platform = Platform::with_runner(root.path(), runner as Arc<dyn CommandRunner>);
        let mock = mock_mlx90641_at_address(0x33);
        let args = RunArgs {
            config: Some(root.path().join("missing.json")),
            args: Vec::new(),
        };
        let err = serve(platform, Arc::new(MockProvider(mock.clone())), &args, &b""[..])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Platform { .. })
        ));
        // The camera was never configured.
        assert_eq!(mock.control_register(), [0x09, 0x01]);
    }


    #[test]
    fn parse_capture() {
        let cli = Cli::try_parse_from([
            "waveshare-thermal",
            "--log-level",
            "debug",
            "capture",
            "--config",
            "module.json",
            "--count",
            "3",
            "--mime-type",
            "image/png",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.into_command() {
            Commands::Capture {
                config,
                output,
                count,
                interval_ms,
                mime_type,
            } => {
                assert_eq!(config, PathBuf::from("module.json"));
                assert_eq!(output, PathBuf::from("."));
                assert_eq!(count, 3);
                assert_eq!(interval_ms, 500);
                assert_eq!(mime_type, "image/png");
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_root() {
        let cli = Cli::try_parse_from(["waveshare-thermal", "setup", "--root", "/mnt/sd"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("/mnt/sd"));
        assert_eq!(cli.into_command(), Commands::Setup);
    }

    #[test]
    fn validate_needs_config() {
        // Skip if the environment already provides one.
        if std::env::var_os("WAVESHARE_THERMAL_CONFIG").is_none() {
            assert!(Cli::try_parse_from(["waveshare-thermal", "validate"]).is_err());
        }
    }
}
