//! New-game world construction: resources, pending preset parameters,
//! the full pipeline, then the preset's remaining sections.

use std::sync::Arc;

use bevy::prelude::*;
use preset_schema::GenerationParameters;

use crate::{
    config::PresetConfig,
    generation::{GenerationError, GenerationPipeline},
    resources::{
        FactionDefs, FeatureIdAllocator, GenerationTuning, IdeologyRegistry, StorykeeperRoster,
        WorldTechLevel,
    },
    restore::{apply_generation_parameters, restore_snapshot, IdeologySource, RestoreReport},
    session::PresetSession,
};

pub struct GeneratedWorld {
    pub world: World,
    /// `None` when no preset was pending.
    pub report: Option<RestoreReport>,
}

#[derive(Debug, Clone)]
pub struct WorldGenerator {
    pipeline: GenerationPipeline,
    config: Arc<PresetConfig>,
}

impl WorldGenerator {
    pub fn new(config: Arc<PresetConfig>) -> Self {
        Self {
            pipeline: GenerationPipeline::full(),
            config,
        }
    }

    pub fn with_pipeline(mut self, pipeline: GenerationPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn config(&self) -> &Arc<PresetConfig> {
        &self.config
    }

    pub fn pipeline(&self) -> &GenerationPipeline {
        &self.pipeline
    }

    /// An empty world holding the resources every pipeline step expects.
    pub fn seed_world(&self, params: GenerationParameters) -> World {
        let mut world = World::new();
        world.insert_resource(FactionDefs(self.config.faction_defs().to_vec()));
        world.init_resource::<IdeologyRegistry>();
        world.init_resource::<StorykeeperRoster>();
        world.init_resource::<WorldTechLevel>();
        world.init_resource::<FeatureIdAllocator>();
        world.insert_resource(GenerationTuning(params));
        world
    }

    /// Generates a new world, consuming the session's pending preset.
    ///
    /// Preset generation parameters replace `params` before any step runs;
    /// every other section is restored after the pipeline finishes.
    pub fn generate(
        &self,
        params: GenerationParameters,
        session: &mut PresetSession,
        ideologies: &dyn IdeologySource,
    ) -> Result<GeneratedWorld, GenerationError> {
        session.on_new_game();
        let preset = session.take_pending_preset();
        let mut world = self.seed_world(params);
        if let Some(preset) = &preset {
            apply_generation_parameters(&mut world, &preset.sections);
        }

        self.pipeline.run(&mut world)?;

        let report = preset
            .as_ref()
            .map(|preset| restore_snapshot(&mut world, session, Some(preset), ideologies));
        tracing::info!(
            target: "world_presets::mapgen",
            seed = %world.resource::<GenerationTuning>().0.seed,
            preset = preset.as_ref().map(|p| p.name.as_str()),
            entities = world.entities().len(),
            "mapgen.world_generated"
        );
        Ok(GeneratedWorld { world, report })
    }

    /// Generates without consulting any preset.
    pub fn generate_plain(&self, params: GenerationParameters) -> Result<World, GenerationError> {
        let mut world = self.seed_world(params);
        self.pipeline.run(&mut world)?;
        Ok(world)
    }
}
