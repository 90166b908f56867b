use clap::{Args, Subcommand};
use std::path::PathBuf;

use framechan_channel::{Channel, ChannelConfig};

use crate::exit::{channel_error, CliError, CliResult, USAGE};
use crate::logging::LogLevel;
use crate::output::OutputFormat;

pub mod doctor;
pub mod envinfo;
pub mod listen;
pub mod resolve;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single frame.
    Send(SendArgs),
    /// Connect and print received frames.
    Listen(ListenArgs),
    /// Show where the service socket is looked up.
    Resolve(ResolveArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat, log_level: LogLevel) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format, log_level),
        Command::Listen(args) => listen::run(args, format, log_level),
        Command::Resolve(args) => resolve::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

/// Which socket to connect to.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Socket path to connect to, bypassing resolution.
    #[arg(long, conflicts_with_all = ["runtime_name", "fallback_name"])]
    pub path: Option<PathBuf>,
    /// Socket name under the runtime directory ($XDG_RUNTIME_DIR or /tmp).
    #[arg(long)]
    pub runtime_name: Option<String>,
    /// Socket name under the user data directory. Defaults to --runtime-name.
    #[arg(long)]
    pub fallback_name: Option<String>,
}

impl TargetArgs {
    /// Runtime and fallback names for resolution, if no explicit path was given.
    pub fn names(&self) -> CliResult<(&str, &str)> {
        let runtime = self.runtime_name.as_deref().ok_or_else(|| {
            CliError::new(USAGE, "either --path or --runtime-name is required")
        })?;
        let fallback = self.fallback_name.as_deref().unwrap_or(runtime);
        Ok((runtime, fallback))
    }
}

/// Create a channel and connect it to the target. Returns the socket used.
pub fn open_channel(target: &TargetArgs, config: ChannelConfig) -> CliResult<(Channel, PathBuf)> {
    let channel = Channel::new(config).map_err(|err| channel_error("socket setup failed", err))?;

    let path = match &target.path {
        Some(path) => {
            channel
                .connect_path(path)
                .map_err(|err| channel_error("connect failed", err))?;
            path.clone()
        }
        None => {
            let (runtime, fallback) = target.names()?;
            channel
                .connect(runtime, fallback)
                .map_err(|err| channel_error("connect failed", err))?
        }
    };

    tracing::debug!(path = %path.display(), "connected");
    Ok((channel, path))
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Socket name under the runtime directory.
    #[arg(long)]
    pub runtime_name: String,
    /// Socket name under the user data directory. Defaults to --runtime-name.
    #[arg(long)]
    pub fallback_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}
