// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the namefs FUSE driver.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the namefs FUSE driver.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use namefs::config::{MountConfig, DEFAULT_SERVER};
use namefs::port::inproc::InProcessPort;
use namefs::port::tcp::TcpCallPort;
use namefs::SERVICE_PORT;

#[derive(Debug, Parser)]
#[command(
    author = "Lukas Bower",
    version,
    about = "Mount a remote naming service as a local filesystem"
)]
struct Cli {
    /// Naming-service host.
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Naming-service TCP port.
    #[arg(long, default_value_t = SERVICE_PORT)]
    port: u16,

    /// File permission bits, octal. Only the owner class is consulted.
    #[arg(long, value_name = "OCTAL", default_value = "644", value_parser = parse_mode)]
    file_mode: u32,

    /// Directory permission bits, octal.
    #[arg(long, value_name = "OCTAL", default_value = "755", value_parser = parse_mode)]
    directory_mode: u32,

    /// Error log file, truncated at mount time.
    #[arg(long, value_name = "FILE")]
    error_log: Option<PathBuf>,

    /// Serve an in-process namespace instead of contacting a server.
    #[arg(long, default_value_t = false)]
    mock: bool,

    /// Mount point directory.
    #[arg(value_name = "DIR")]
    mountpoint: PathBuf,
}

fn parse_mode(value: &str) -> Result<u32, String> {
    let digits = value.strip_prefix("0o").unwrap_or(value);
    u32::from_str_radix(digits, 8).map_err(|err| format!("invalid octal mode '{value}': {err}"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = MountConfig::new(
        cli.server,
        cli.port,
        cli.file_mode,
        cli.directory_mode,
        cli.error_log,
    );
    if cli.mock {
        run(config, InProcessPort::new(), &cli.mountpoint)
    } else {
        let port = TcpCallPort::new(&config.server, config.port);
        run(config, port, &cli.mountpoint)
    }
}

#[cfg(feature = "fuse")]
fn run<P: namefs::port::RemoteCallPort + 'static>(
    config: MountConfig,
    port: P,
    mountpoint: &Path,
) -> Result<()> {
    let log = namefs::errlog::ErrorLog::new(config.error_log.clone());
    let adapter = namefs::adapter::Adapter::new(&config, port, log);
    namefs::mount::mount(adapter, mountpoint)
}

#[cfg(not(feature = "fuse"))]
fn run<P: namefs::port::RemoteCallPort + 'static>(
    _config: MountConfig,
    _port: P,
    _mountpoint: &Path,
) -> Result<()> {
    Err(anyhow::anyhow!(
        "fuse support disabled; rebuild namefs with --features fuse"
    ))
}
