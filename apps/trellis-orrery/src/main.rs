//! Trellis Orrery
//!
//! A sun with orbiting planets and moons, drawn as textured discs into a
//! Trellis canvas. Shader sources live in `shaders/`, next to the SPIR-V
//! the binary embeds.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p trellis-orrery -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--msaa <N>`: Requested sample count (default: 1)
//! - `--depth`: Add a depth-stencil attachment
//! - `--flip`: Flip the viewport so +Y points up
//! - `--frames <N>`: Requested frames in flight (default: 2)
//! - `--present <MODE>`: `fifo`, `mailbox` or `immediate` (default: fifo)
//! - `--no-blocking`: Don't idle the queue before every frame
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod disc;
mod scene;

use anyhow::{bail, Context as _};
use ash::vk;
use trellis_app::{run_app, sample_count_from_u32, AppConfig, CanvasConfig};

use crate::app::Orrery;

const WIDTH: u32 = 1024;
const HEIGHT: u32 = 768;
const TARGET_FPS: u32 = 120;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Check for help flag before starting the app
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let canvas = parse_canvas_args(&args)?;

    run_app::<Orrery>(
        AppConfig::new("Trellis Orrery")
            .with_size(WIDTH, HEIGHT)
            .with_target_fps(TARGET_FPS)
            .with_canvas(canvas),
    )
}

/// Build the canvas configuration from command line arguments.
fn parse_canvas_args(args: &[String]) -> anyhow::Result<CanvasConfig> {
    let mut config = CanvasConfig::default();
    let mut args = args.iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--msaa" => {
                let samples: u32 = value(&mut args, arg)?;
                let samples = sample_count_from_u32(samples)
                    .with_context(|| format!("{samples} is not a sample count"))?;
                config = config.with_msaa(samples);
            }
            "--depth" => config = config.with_depth_stencil(true),
            "--flip" => config = config.with_flip_viewport(true),
            "--frames" => {
                let frames: u32 = value(&mut args, arg)?;
                config = config.with_frames_in_flight(frames);
            }
            "--present" => {
                let mode: String = value(&mut args, arg)?;
                config = config.with_present_mode(parse_present_mode(&mode)?);
            }
            "--no-blocking" => config = config.with_blocking(false),
            other => bail!("Unknown argument: {other} (see --help)"),
        }
    }

    Ok(config)
}

fn value<'a, T>(args: &mut impl Iterator<Item = &'a String>, flag: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = args
        .next()
        .with_context(|| format!("{flag} needs a value"))?;
    raw.parse()
        .with_context(|| format!("Invalid value for {flag}: {raw}"))
}

fn parse_present_mode(mode: &str) -> anyhow::Result<vk::PresentModeKHR> {
    match mode {
        "fifo" => Ok(vk::PresentModeKHR::FIFO),
        "mailbox" => Ok(vk::PresentModeKHR::MAILBOX),
        "immediate" => Ok(vk::PresentModeKHR::IMMEDIATE),
        other => bail!("Unknown present mode: {other}"),
    }
}

fn print_help() {
    eprintln!(
        "Trellis Orrery

USAGE:
    cargo run -p trellis-orrery -- [OPTIONS]

CANVAS OPTIONS:
    --msaa <N>          Requested sample count, negotiated down to what the
                        device supports (default: 1)
    --depth             Add a depth-stencil attachment
    --flip              Flip the viewport so +Y points up
    --frames <N>        Requested frames in flight; the swapchain image count
                        wins once the canvas exists (default: 2)
    --present <MODE>    fifo, mailbox or immediate (default: fifo)
    --no-blocking       Don't idle the queue before every frame

OTHER:
    -h, --help          Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_arguments_give_defaults() {
        assert_eq!(parse_canvas_args(&[]).unwrap(), CanvasConfig::default());
    }

    #[test]
    fn every_flag_is_applied() {
        let config = parse_canvas_args(&args(&[
            "--msaa",
            "4",
            "--depth",
            "--flip",
            "--frames",
            "3",
            "--present",
            "mailbox",
            "--no-blocking",
        ]))
        .unwrap();

        assert_eq!(config.msaa_samples, vk::SampleCountFlags::TYPE_4);
        assert!(config.want_depth_stencil);
        assert!(config.flip_viewport);
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
        assert!(!config.blocking);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse_canvas_args(&args(&["--msaa"])).is_err());
        assert!(parse_canvas_args(&args(&["--msaa", "lots"])).is_err());
        assert!(parse_canvas_args(&args(&["--msaa", "3"])).is_err());
        assert!(parse_canvas_args(&args(&["--present", "vsync"])).is_err());
        assert!(parse_canvas_args(&args(&["--fullscreen"])).is_err());
    }
}
