// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Build helpers, run with `cargo xtask`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flate2::write::GzEncoder;
use flate2::Compression;

const BINARY: &str = "waveshare-thermal";

/// Workspace members whose sources ship with the module.
const MEMBERS: &[&str] = &["mlx90641", "mlx90641-test-data", "waveshare-thermal", "xtask"];

#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the module and bundle it into a tarball
    Package {
        /// Target triple to cross compile for
        #[arg(long)]
        target: Option<String>,

        /// Package an existing build
        #[arg(long)]
        no_build: bool,

        #[arg(long, short = 'o', default_value = "module.tar.gz")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Package {
            target,
            no_build,
            output,
        } => package(target.as_deref(), no_build, &output),
    }
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("Could not find project root from xtask manifest")
}

fn package(target: Option<&str>, no_build: bool, output: &Path) -> Result<()> {
    let root = project_root()?;
    if !no_build {
        build(&root, target)?;
    }
    let mut binary = root.join("target");
    if let Some(target) = target {
        binary.push(target);
    }
    binary.push("release");
    binary.push(BINARY);
    let output = if output.is_absolute() {
        output.to_path_buf()
    } else {
        root.join(output)
    };
    write_archive(&root, &binary, &output)?;
    println!("Packaged {}", output.display());
    Ok(())
}

fn build(root: &Path, target: Option<&str>) -> Result<()> {
    let mut command = Command::new(env!("CARGO"));
    command
        .current_dir(root)
        .args(["build", "--release", "-p", BINARY]);
    if let Some(target) = target {
        command.args(["--target", target]);
    }
    let status = command.status().context("Failed to execute cargo build")?;
    if !status.success() {
        bail!(
            "Build exited with non-zero status: {}",
            status.code().unwrap_or(-1)
        );
    }
    Ok(())
}

/// Bundle the binary, the module metadata and the sources into a gzipped tarball.
fn write_archive(root: &Path, binary: &Path, output: &Path) -> Result<()> {
    let meta = root.join("meta.json");
    if !meta.is_file() {
        bail!("{} is missing", meta.display());
    }
    if !binary.is_file() {
        bail!("{} has not been built", binary.display());
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let file =
        File::create(output).with_context(|| format!("Unable to create {}", output.display()))?;
    let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    archive.append_path_with_name(&meta, "meta.json")?;
    archive.append_path_with_name(binary, BINARY)?;
    archive.append_path_with_name(root.join("Cargo.toml"), "Cargo.toml")?;
    let lock = root.join("Cargo.lock");
    if lock.is_file() {
        archive.append_path_with_name(&lock, "Cargo.lock")?;
    }
    for member in MEMBERS {
        let member_root = root.join(member);
        if !member_root.is_dir() {
            continue;
        }
        let manifest = Path::new(member).join("Cargo.toml");
        archive.append_path_with_name(root.join(&manifest), &manifest)?;
        for directory in ["src", "benches"] {
            let source = member_root.join(directory);
            if source.is_dir() {
                archive.append_dir_all(Path::new(member).join(directory), &source)?;
            }
        }
    }
    archive.into_inner()?.finish()?;
    Ok(())
}
