//! Ordered world generation pipeline.
//!
//! Each step is named and draws from its own RNG stream seeded from the
//! world seed and the step name, so filtering steps out (as the preview does)
//! never shifts the randomness the remaining steps see.

use std::time::Instant;

use bevy::prelude::*;
use preset_schema::{GenerationParameters, SchemaError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::{
    hashing::step_seed,
    heightfield, hydrology, populate,
    resources::{GenerationTuning, WorldGrid},
};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation step `{step}` requires resource {resource}")]
    MissingResource {
        step: &'static str,
        resource: &'static str,
    },
    #[error("invalid generation parameters: {0}")]
    InvalidParameters(#[from] SchemaError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationStepKind {
    Tiles,
    Terrain,
    Lakes,
    Rivers,
    AncientSites,
    AncientRoads,
    Factions,
    Ideologies,
    Settlements,
    FactionRoads,
    Features,
}

impl GenerationStepKind {
    pub const ALL: [GenerationStepKind; 11] = [
        GenerationStepKind::Tiles,
        GenerationStepKind::Terrain,
        GenerationStepKind::Lakes,
        GenerationStepKind::Rivers,
        GenerationStepKind::AncientSites,
        GenerationStepKind::AncientRoads,
        GenerationStepKind::Factions,
        GenerationStepKind::Ideologies,
        GenerationStepKind::Settlements,
        GenerationStepKind::FactionRoads,
        GenerationStepKind::Features,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GenerationStepKind::Tiles => "tiles",
            GenerationStepKind::Terrain => "terrain",
            GenerationStepKind::Lakes => "lakes",
            GenerationStepKind::Rivers => "rivers",
            GenerationStepKind::AncientSites => "ancient_sites",
            GenerationStepKind::AncientRoads => "ancient_roads",
            GenerationStepKind::Factions => "factions",
            GenerationStepKind::Ideologies => "ideologies",
            GenerationStepKind::Settlements => "settlements",
            GenerationStepKind::FactionRoads => "faction_roads",
            GenerationStepKind::Features => "features",
        }
    }

    /// Steps that affect what the preview bitmap shows.
    pub fn in_preview(self) -> bool {
        !matches!(
            self,
            GenerationStepKind::Factions
                | GenerationStepKind::Ideologies
                | GenerationStepKind::Settlements
                | GenerationStepKind::Features
        )
    }

    fn run(self, world: &mut World, rng: &mut ChaCha8Rng) -> Result<(), GenerationError> {
        match self {
            GenerationStepKind::Tiles => generate_tiles(world),
            GenerationStepKind::Terrain => heightfield::generate_terrain(world, rng),
            GenerationStepKind::Lakes => hydrology::generate_lakes(world, rng),
            GenerationStepKind::Rivers => hydrology::generate_rivers(world, rng),
            GenerationStepKind::AncientSites => populate::place_ancient_sites(world, rng),
            GenerationStepKind::AncientRoads => populate::lay_ancient_roads(world, rng),
            GenerationStepKind::Factions => {
                populate::spawn_factions(world);
                Ok(())
            }
            GenerationStepKind::Ideologies => {
                populate::generate_ideologies(world, rng);
                Ok(())
            }
            GenerationStepKind::Settlements => populate::place_settlements(world, rng),
            GenerationStepKind::FactionRoads => populate::lay_faction_roads(world, rng),
            GenerationStepKind::Features => populate::label_regions(world, rng),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineRun {
    Completed,
    /// Stopped before running step index `completed`.
    Interrupted { completed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPipeline {
    steps: Vec<GenerationStepKind>,
}

impl Default for GenerationPipeline {
    fn default() -> Self {
        Self::full()
    }
}

impl GenerationPipeline {
    pub fn full() -> Self {
        Self {
            steps: GenerationStepKind::ALL.to_vec(),
        }
    }

    pub fn preview() -> Self {
        Self::filtered(GenerationStepKind::in_preview)
    }

    pub fn filtered(keep: impl Fn(GenerationStepKind) -> bool) -> Self {
        Self {
            steps: GenerationStepKind::ALL
                .into_iter()
                .filter(|step| keep(*step))
                .collect(),
        }
    }

    pub fn steps(&self) -> &[GenerationStepKind] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(&self, world: &mut World) -> Result<(), GenerationError> {
        self.run_until(world, |_, _| true).map(|_| ())
    }

    /// Runs the steps in order, asking `proceed` before each one. `proceed`
    /// receives the number of steps already completed and the next step.
    pub fn run_until(
        &self,
        world: &mut World,
        mut proceed: impl FnMut(usize, GenerationStepKind) -> bool,
    ) -> Result<PipelineRun, GenerationError> {
        let params = tuning(world);
        params.validate()?;
        if !world.contains_resource::<GenerationTuning>() {
            world.insert_resource(GenerationTuning(params.clone()));
        }

        for (index, step) in self.steps.iter().copied().enumerate() {
            if !proceed(index, step) {
                tracing::debug!(
                    target: "world_presets::mapgen",
                    step = step.name(),
                    completed = index,
                    "mapgen.pipeline=interrupted"
                );
                return Ok(PipelineRun::Interrupted { completed: index });
            }
            let started = Instant::now();
            let mut rng = ChaCha8Rng::seed_from_u64(step_seed(&params.seed, step.name()));
            step.run(world, &mut rng)?;
            tracing::trace!(
                target: "world_presets::mapgen",
                step = step.name(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "mapgen.step_completed"
            );
        }
        Ok(PipelineRun::Completed)
    }
}

pub(crate) fn tuning(world: &World) -> GenerationParameters {
    world
        .get_resource::<GenerationTuning>()
        .map(|tuning| tuning.0.clone())
        .unwrap_or_default()
}

pub(crate) fn grid_mut<'w>(
    world: &'w mut World,
    step: &'static str,
) -> Result<Mut<'w, WorldGrid>, GenerationError> {
    world
        .get_resource_mut::<WorldGrid>()
        .ok_or(GenerationError::MissingResource {
            step,
            resource: "WorldGrid",
        })
}

fn generate_tiles(world: &mut World) -> Result<(), GenerationError> {
    let dimensions = tuning(world).dimensions();
    tracing::debug!(
        target: "world_presets::mapgen",
        width = dimensions.width,
        height = dimensions.height,
        "mapgen.tiles=allocated"
    );
    world.insert_resource(WorldGrid::new(dimensions));
    Ok(())
}
