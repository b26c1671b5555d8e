//! Umbra scene viewer
//!
//! Controls:
//!   Left drag: orbit
//!   Right drag: pan
//!   Scroll: zoom
//!   V: toggle shadow map view
//!   C: print camera
//!   R: reset camera
//!   S: reload shaders
//!   D: disco mode
//!   Tab: toggle status line
//!   Escape: exit

mod app;
mod application;

use anyhow::Context;
use app::{App, ViewerOptions};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use umbra_render::config::{DEFAULT_MAX_SHADOWED_LIGHTS, DEFAULT_SHADOW_MAP_SIZE};
use umbra_render::RenderConfig;
use winit::event_loop::EventLoop;

#[derive(Parser, Debug)]
#[command(name = "umbra", version, about = "Interactive shadow-mapped scene viewer")]
struct Cli {
    /// Scene file (.json or .obj)
    scene: PathBuf,

    /// Shader directory, overriding the one named by the scene
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 600)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Upper bound on spot lights that cast shadows
    #[arg(long, default_value_t = DEFAULT_MAX_SHADOWED_LIGHTS)]
    max_shadowed_lights: usize,

    /// Shadow map resolution in texels
    #[arg(long, default_value_t = DEFAULT_SHADOW_MAP_SIZE)]
    shadow_map_size: u32,

    /// Keep running when a shader fails to build at startup
    #[arg(long)]
    no_abort_on_init_failure: bool,

    /// Log filter, e.g. `debug` or `umbra_render=trace`; RUST_LOG is used when unset
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = &cli.log_level {
        logger.parse_filters(filter);
    }
    logger.init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    log::info!("Loading scene {}", cli.scene.display());
    let scene = umbra_core::loader::load(&cli.scene)
        .with_context(|| format!("Failed to load {}", cli.scene.display()))?;
    let scene_name = cli
        .scene
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scene".to_string());

    let mut config = RenderConfig::new()
        .with_max_shadowed_lights(cli.max_shadowed_lights)
        .with_shadow_map_size(cli.shadow_map_size)
        .with_abort_on_init_failure(!cli.no_abort_on_init_failure);
    if let Some(dir) = cli.shader_dir {
        config = config.with_shader_dir(dir);
    }

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(ViewerOptions {
        scene,
        scene_name,
        config,
        width: cli.width,
        height: cli.height,
    });
    event_loop.run_app(&mut app).context("Event loop error")?;

    match app.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["umbra", "scene.json"]).unwrap();
        assert_eq!(cli.width, 600);
        assert_eq!(cli.height, 600);
        assert_eq!(cli.max_shadowed_lights, DEFAULT_MAX_SHADOWED_LIGHTS);
        assert!(!cli.no_abort_on_init_failure);
        assert!(cli.shader_dir.is_none());
    }

    #[test]
    fn cli_overrides() {
        let cli = Cli::try_parse_from([
            "umbra",
            "demo.json",
            "--shader-dir",
            "my/shaders",
            "--max-shadowed-lights",
            "2",
            "--shadow-map-size",
            "512",
            "--no-abort-on-init-failure",
        ])
        .unwrap();
        assert_eq!(cli.shader_dir, Some(PathBuf::from("my/shaders")));
        assert_eq!(cli.max_shadowed_lights, 2);
        assert_eq!(cli.shadow_map_size, 512);
        assert!(cli.no_abort_on_init_failure);
    }

    #[test]
    fn scene_argument_is_required() {
        assert!(Cli::try_parse_from(["umbra"]).is_err());
    }
}
