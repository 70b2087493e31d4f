//! vellum-probe: print the formats a backend negotiates.
//!
//! ```text
//! vellum-probe [--backend software|wgpu] [--config vellum.json]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{error, info};
use vellum_render::{Backend, PixelFormat, SoftwareBackend, WgpuBackend};
use vellum_runtime::{RuntimeConfig, Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    /// In-memory backend with a 32-bit framebuffer
    Software,
    /// First wgpu adapter, headless
    Wgpu,
}

#[derive(Debug, Parser)]
#[command(name = "vellum-probe", about = "Print the formats a graphics backend negotiates")]
struct Cli {
    #[arg(long, value_enum, default_value = "software")]
    backend: BackendArg,
    /// JSON runtime configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

fn open_backend(kind: BackendArg) -> Option<Box<dyn Backend>> {
    match kind {
        BackendArg::Software => Some(Box::new(SoftwareBackend::new(PixelFormat::XRGB8888))),
        BackendArg::Wgpu => match pollster::block_on(WgpuBackend::new_headless()) {
            Ok(backend) => Some(Box::new(backend)),
            Err(e) => {
                error!("No GPU backend: {e}");
                None
            }
        },
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match RuntimeConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => RuntimeConfig::default(),
    };

    let Some(backend) = open_backend(cli.backend) else {
        return ExitCode::FAILURE;
    };
    let session = match Session::open(backend, config) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to open device: {e}");
            return ExitCode::FAILURE;
        }
    };
    let device = session.device();
    info!("Device kinds: {:?}", device.backend().device_kinds());
    println!("backend: {}", device.backend().name());
    println!("{}", device.formats());
    session.close();
    ExitCode::SUCCESS
}

// ===================================================================
// Tests
// ===================================================================
