//! Ember Viewer
//!
//! Draws a compute-shader background and a triangle into a fixed 800x600
//! window, with a debug overlay for switching and tuning the background.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--shaders <DIR>`: Directory with the compiled `.spv` shaders (default: shaders)
//! - `--fps <N>`: Cap the frame rate
//! - `--no-vsync`: Present without waiting for vertical blank
//! - `-h, --help`: Print help message
//!
//! ## Shaders
//!
//! The GLSL sources live in `shaders/` and are loaded as SPIR-V at startup.
//! Compile them next to the sources before running:
//!
//! ```bash
//! for s in shaders/*.comp shaders/*.vert shaders/*.frag; do glslc "$s" -o "$s.spv"; done
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod overlay;

use ember_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn main() -> anyhow::Result<()> {
    // Check for help flag before starting the app
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(config_from_args(std::env::args().skip(1)))
}

/// Build the app configuration from command line arguments.
///
/// Unknown arguments and unparsable values are ignored.
fn config_from_args(args: impl IntoIterator<Item = String>) -> AppConfig {
    let mut config = AppConfig::new("Ember Viewer")
        .with_size(WIDTH, HEIGHT)
        .with_resizable(false);

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--shaders" => {
                if let Some(dir) = args.next() {
                    config = config.with_shader_dir(dir);
                }
            }
            "--fps" => {
                if let Some(fps) = args.next().and_then(|v| v.parse().ok()) {
                    config = config.with_target_fps(fps);
                }
            }
            "--no-vsync" => config = config.with_vsync(false),
            _ => {}
        }
    }

    config
}

fn print_help() {
    eprintln!(
        "Ember Viewer

USAGE:
    cargo run -p ember-viewer -- [OPTIONS]

OPTIONS:
    --shaders <DIR>         Directory with compiled .spv shaders (default: shaders)
    --fps <N>               Cap the frame rate
    --no-vsync              Present without waiting for vertical blank
    -h, --help              Print this help message

CONTROLS:
    The \"background\" window selects the background effect and edits its
    four parameter vectors.

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn defaults_to_fixed_window() {
        let config = config_from_args(Vec::new());
        assert_eq!((config.width, config.height), (WIDTH, HEIGHT));
        assert!(!config.resizable);
        assert!(config.vsync);
    }

    #[test]
    fn parses_options() {
        let config = config_from_args(args(&["--shaders", "out/spv", "--fps", "60", "--no-vsync"]));
        assert_eq!(config.shader_dir, PathBuf::from("out/spv"));
        assert_eq!(config.target_fps, Some(60));
        assert!(!config.vsync);
    }

    #[test]
    fn ignores_bad_values() {
        let config = config_from_args(args(&["--fps", "fast", "--bogus"]));
        assert_eq!(config.target_fps, None);
    }
}
