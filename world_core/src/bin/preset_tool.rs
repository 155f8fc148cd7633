use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::*;
use clap::{Parser, Subcommand};
use preset_schema::{GenerationParameters, InclusionFlags};
use tracing::{error, info};

use world_core::components::{MapMarker, Settlement, WorldFeature};
use world_core::resources::WorldGrid;
use world_core::{
    capture_preset, load_preset_config_from_env, referenced_ideologies, BiomeRenderer,
    CaptureOptions, PresetConfig, PresetSession, PresetStore, PreviewController, PreviewPoll,
    PreviewRenderer, WorldGenerator,
};

const PREVIEW_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect, capture and apply world presets")]
struct Cli {
    /// Overrides the configured presets directory
    #[arg(long, global = true)]
    presets_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored presets
    List,
    /// Print a preset's sections
    Show { name: String },
    /// Delete a stored preset
    Delete { name: String },
    /// Generate a world and store selected sections of it as a preset
    Capture {
        #[arg(long)]
        name: String,
        #[arg(long)]
        seed: String,
        #[arg(long)]
        subdivisions: Option<u8>,
        /// Comma separated sections, e.g. `terrain,bases,markers` or `all`
        #[arg(long, default_value = "all")]
        flags: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Generate a world, optionally applying a stored preset
    Generate {
        #[arg(long)]
        seed: String,
        #[arg(long)]
        subdivisions: Option<u8>,
        #[arg(long)]
        preset: Option<String>,
    },
    /// Render the preview pipeline for a seed into a PNG
    Preview {
        #[arg(long)]
        seed: String,
        #[arg(long)]
        subdivisions: Option<u8>,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let (config, _metadata) = load_preset_config_from_env();
    let config = match cli.presets_dir {
        Some(dir) => Arc::new(PresetConfig::clone(&config).with_presets_dir(dir)),
        None => config,
    };

    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(target: "world_presets::tool", %message, "preset_tool.failed");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn params_for(config: &PresetConfig, seed: String, subdivisions: Option<u8>) -> GenerationParameters {
    let mut params = config.default_generation().clone();
    params.seed = seed;
    if let Some(subdivisions) = subdivisions {
        params.subdivisions = subdivisions;
    }
    params
}

fn run(command: Command, config: Arc<PresetConfig>) -> Result<(), String> {
    let mut store = PresetStore::from_config(&config);
    match command {
        Command::List => {
            let presets = store.list();
            if presets.is_empty() {
                println!("no presets in {}", store.root().display());
            }
            for preset in presets {
                println!(
                    "{:<24} {:?} thumbnail={} flavor={} ideologies={}  {}",
                    preset.name,
                    preset.flags,
                    preset.has_thumbnail,
                    preset.has_flavor_image,
                    preset.ideology_count,
                    preset.description
                );
            }
        }
        Command::Show { name } => {
            let snapshot = store.get(&name).map_err(|err| err.to_string())?;
            let sections = &snapshot.sections;
            println!("{} - {}", snapshot.name, snapshot.description);
            println!("flags: {:?}", sections.flags);
            if let Some(terrain) = &sections.terrain {
                match &terrain.grid {
                    Some(grid) => println!("terrain: full grid, {} tiles", grid.tile_count()),
                    None => println!(
                        "terrain: {} pollution overrides",
                        terrain.pollution_overrides.len()
                    ),
                }
            }
            println!("settlements: {}", sections.settlements.len());
            println!("map markers: {}", sections.map_markers.len());
            println!("world features: {}", sections.world_features.len());
            println!("faction overrides: {}", sections.faction_overrides.len());
            println!("ideology files: {}", sections.ideology_files.len());
            println!("storykeeper entries: {}", sections.storykeeper.len());
            if let Some(tech_level) = sections.tech_level {
                println!("tech level: {tech_level:?}");
            }
            if let Some(params) = &sections.generation_parameters {
                println!(
                    "generation: seed={} subdivisions={} rivers={}",
                    params.seed, params.subdivisions, params.river_density
                );
            }
        }
        Command::Delete { name } => {
            store.delete(&name).map_err(|err| err.to_string())?;
            println!("deleted {name}");
        }
        Command::Capture {
            name,
            seed,
            subdivisions,
            flags,
            description,
        } => {
            let flags = InclusionFlags::from_names(&flags)
                .ok_or_else(|| format!("unknown section in {flags:?}"))?;
            let generator = WorldGenerator::new(Arc::clone(&config));
            let world = generator
                .generate_plain(params_for(&config, seed, subdivisions))
                .map_err(|err| err.to_string())?;
            let session = PresetSession::new();
            let snapshot =
                capture_preset(&world, &session, name, description, &CaptureOptions::new(flags));
            let ideologies = referenced_ideologies(&world, &snapshot.sections);
            let thumbnail = BiomeRenderer::default()
                .render(&world)
                .encode_png()
                .map_err(|err| err.to_string())?;
            let metadata = store
                .save(&snapshot, Some(&thumbnail), None, &ideologies)
                .map_err(|err| err.to_string())?;
            info!(
                target: "world_presets::tool",
                preset = %metadata.name,
                "preset_tool.captured"
            );
            println!("saved {} ({:?})", metadata.name, metadata.flags);
        }
        Command::Generate {
            seed,
            subdivisions,
            preset,
        } => {
            let mut session = PresetSession::new();
            session.set_pending_preset(store.resolve_selection(preset.as_deref()));
            let generator = WorldGenerator::new(Arc::clone(&config));
            let mut generated = generator
                .generate(params_for(&config, seed, subdivisions), &mut session, &store)
                .map_err(|err| err.to_string())?;
            print_summary(&mut generated.world);
            match generated.report {
                Some(report) => {
                    println!("applied: {:?}", report.applied);
                    for diagnostic in &report.diagnostics {
                        println!("  skipped [{:?}] {}", diagnostic.section, diagnostic.error);
                    }
                }
                None => println!("no preset applied"),
            }
        }
        Command::Preview {
            seed,
            subdivisions,
            out,
        } => {
            let mut controller = PreviewController::new(Arc::clone(&config));
            controller.start_preview(params_for(&config, seed, subdivisions));
            if !controller.wait_idle(PREVIEW_TIMEOUT) {
                return Err("preview did not finish in time".to_string());
            }
            let PreviewPoll::Ready(bitmap) = controller.poll_preview() else {
                return Err("preview produced no image".to_string());
            };
            let png = bitmap.encode_png().map_err(|err| err.to_string())?;
            std::fs::write(&out, png).map_err(|err| format!("{}: {err}", out.display()))?;
            println!("wrote {}x{} preview to {}", bitmap.width, bitmap.height, out.display());
        }
    }
    Ok(())
}

fn print_summary(world: &mut World) {
    let tiles = world
        .get_resource::<WorldGrid>()
        .map_or(0, WorldGrid::tile_count);
    let settlements = world.query::<&Settlement>().iter(world).count();
    let markers = world.query::<&MapMarker>().iter(world).count();
    let features = world.query::<&WorldFeature>().iter(world).count();
    println!("tiles: {tiles}");
    println!("settlements: {settlements}");
    println!("map markers: {markers}");
    println!("world features: {features}");
}
