//! Background preview generation.
//!
//! The controller lives on the main thread and is ticked once per frame. A
//! preview run generates a throwaway world on a worker thread using the
//! preview subset of the pipeline; the main thread adopts the finished world
//! only long enough to render it.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Weak,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use bevy::prelude::*;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use preset_schema::GenerationParameters;

use crate::{
    config::PresetConfig,
    generation::{GenerationError, GenerationPipeline, PipelineRun},
    render::{BiomeRenderer, PreviewBitmap, PreviewRenderer},
    worldgen::WorldGenerator,
};

const JOIN_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    Idle,
    Running,
    /// The current run was told to stop; its result will be discarded.
    Cancelling,
    /// A bitmap was adopted this frame.
    Completed,
}

/// Shared stop flag checked by the worker before every step.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum WorkerOutcome {
    Completed(Box<World>),
    Cancelled,
    Failed(GenerationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewPoll {
    /// A newly adopted bitmap; reported once.
    Ready(PreviewBitmap),
    /// Fraction of preview steps completed.
    InProgress(f32),
    None,
}

struct WorkerHandle {
    params: GenerationParameters,
    token: CancellationToken,
    completed_steps: Arc<AtomicUsize>,
    outcome: Receiver<WorkerOutcome>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(target: "world_presets::preview", "preview.worker_panicked");
            }
        }
    }
}

fn spawn_worker(
    generator: WorldGenerator,
    pipeline: GenerationPipeline,
    params: GenerationParameters,
    context: Weak<()>,
) -> WorkerHandle {
    let token = CancellationToken::new();
    let completed_steps = Arc::new(AtomicUsize::new(0));
    let (sender, outcome) = bounded(1);

    let worker_token = token.clone();
    let worker_steps = Arc::clone(&completed_steps);
    let worker_params = params.clone();
    let thread = thread::Builder::new()
        .name("preset-preview".to_string())
        .spawn(move || {
            run_worker(
                &generator,
                &pipeline,
                worker_params,
                &worker_token,
                &context,
                &worker_steps,
                &sender,
            )
        });
    let thread = match thread {
        Ok(thread) => Some(thread),
        Err(err) => {
            tracing::warn!(
                target: "world_presets::preview",
                error = %err,
                "preview.spawn_failed"
            );
            None
        }
    };
    WorkerHandle {
        params,
        token,
        completed_steps,
        outcome,
        thread,
    }
}

fn run_worker(
    generator: &WorldGenerator,
    pipeline: &GenerationPipeline,
    params: GenerationParameters,
    token: &CancellationToken,
    context: &Weak<()>,
    completed_steps: &AtomicUsize,
    sender: &Sender<WorkerOutcome>,
) {
    let mut world = generator.seed_world(params);
    let run = pipeline.run_until(&mut world, |completed, _| {
        completed_steps.store(completed, Ordering::SeqCst);
        !token.is_cancelled() && context.strong_count() > 0
    });
    let outcome = match run {
        Ok(PipelineRun::Completed) => {
            completed_steps.store(pipeline.len(), Ordering::SeqCst);
            WorkerOutcome::Completed(Box::new(world))
        }
        Ok(PipelineRun::Interrupted { .. }) => WorkerOutcome::Cancelled,
        Err(err) => WorkerOutcome::Failed(err),
    };
    // The controller may be gone; nobody is listening then.
    let _ = sender.send(outcome);
}

pub struct PreviewController {
    config: Arc<PresetConfig>,
    generator: WorldGenerator,
    pipeline: GenerationPipeline,
    renderer: Box<dyn PreviewRenderer>,
    context: Arc<()>,
    state: PreviewState,
    worker: Option<WorkerHandle>,
    queued: Option<GenerationParameters>,
    edited: Option<GenerationParameters>,
    last_previewed: Option<GenerationParameters>,
    debounce: Option<u32>,
    regenerate_requested: bool,
    bitmap: Option<PreviewBitmap>,
    fresh: bool,
}

impl PreviewController {
    pub fn new(config: Arc<PresetConfig>) -> Self {
        Self::with_renderer(config, Box::new(BiomeRenderer::default()))
    }

    pub fn with_renderer(config: Arc<PresetConfig>, renderer: Box<dyn PreviewRenderer>) -> Self {
        Self {
            generator: WorldGenerator::new(Arc::clone(&config)),
            config,
            pipeline: GenerationPipeline::preview(),
            renderer,
            context: Arc::new(()),
            state: PreviewState::Idle,
            worker: None,
            queued: None,
            edited: None,
            last_previewed: None,
            debounce: None,
            regenerate_requested: false,
            bitmap: None,
            fresh: false,
        }
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    /// Fraction of preview steps the current worker has finished.
    pub fn progress(&self) -> f32 {
        match &self.worker {
            Some(worker) if !self.pipeline.is_empty() => {
                worker.completed_steps.load(Ordering::SeqCst) as f32 / self.pipeline.len() as f32
            }
            _ => 0.0,
        }
    }

    /// Last adopted preview, kept until a newer one renders successfully.
    pub fn bitmap(&self) -> Option<&PreviewBitmap> {
        self.bitmap.as_ref()
    }

    pub fn last_previewed(&self) -> Option<&GenerationParameters> {
        self.last_previewed.as_ref()
    }

    /// Parameters the preview is currently heading towards.
    fn target(&self) -> Option<&GenerationParameters> {
        self.queued
            .as_ref()
            .or(self.worker.as_ref().map(|worker| &worker.params))
            .or(self.last_previewed.as_ref())
    }

    /// Feeds the parameters currently shown in the editor. Call once per
    /// frame; edits are debounced, resolution changes are not.
    pub fn observe(&mut self, params: &GenerationParameters) {
        if self.edited.as_ref() == Some(params) {
            return;
        }
        self.edited = Some(params.clone());
        let resized = self
            .target()
            .is_some_and(|target| target.subdivisions != params.subdivisions);
        if resized {
            self.debounce = None;
            self.start_preview(params.clone());
        } else {
            self.debounce = Some(self.config.preview_debounce_frames());
        }
    }

    pub fn request_regenerate(&mut self) {
        self.regenerate_requested = true;
    }

    /// Starts a run for `params`. A run already in flight is cancelled and
    /// the new one starts once its thread has finished.
    pub fn start_preview(&mut self, params: GenerationParameters) {
        match &self.worker {
            Some(worker) => {
                worker.token.cancel();
                self.state = PreviewState::Cancelling;
                self.queued = Some(params);
                tracing::debug!(target: "world_presets::preview", "preview.run=replaced");
            }
            None => self.spawn(params),
        }
    }

    pub fn cancel_preview(&mut self) {
        self.queued = None;
        self.debounce = None;
        self.regenerate_requested = false;
        match &self.worker {
            Some(worker) => {
                worker.token.cancel();
                self.state = PreviewState::Cancelling;
                tracing::debug!(target: "world_presets::preview", "preview.run=cancelling");
            }
            None => self.state = PreviewState::Idle,
        }
    }

    fn spawn(&mut self, params: GenerationParameters) {
        tracing::debug!(
            target: "world_presets::preview",
            seed = %params.seed,
            subdivisions = params.subdivisions,
            "preview.run=started"
        );
        self.worker = Some(spawn_worker(
            self.generator.clone(),
            self.pipeline.clone(),
            params,
            Arc::downgrade(&self.context),
        ));
        self.state = PreviewState::Running;
    }

    /// Advances debounce, collects worker results and starts queued runs.
    pub fn tick(&mut self) {
        if self.state == PreviewState::Completed {
            self.state = PreviewState::Idle;
        }

        if let Some(frames) = self.debounce {
            if frames <= 1 {
                self.debounce = None;
                let changed = match (&self.edited, self.target()) {
                    (Some(edited), Some(target)) => edited != target,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if changed {
                    if let Some(params) = self.edited.clone() {
                        self.start_preview(params);
                    }
                }
            } else {
                self.debounce = Some(frames - 1);
            }
        }

        if std::mem::take(&mut self.regenerate_requested) {
            let params = self
                .edited
                .clone()
                .or_else(|| self.last_previewed.clone())
                .unwrap_or_else(|| self.config.default_generation().clone());
            self.start_preview(params);
        }

        self.collect_worker();

        if self.worker.is_none() {
            if let Some(params) = self.queued.take() {
                self.spawn(params);
            }
        }
    }

    fn collect_worker(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        let outcome = match worker.outcome.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) if !worker.is_finished() => return,
            Err(TryRecvError::Empty) => match worker.outcome.try_recv() {
                Ok(outcome) => outcome,
                Err(_) => WorkerOutcome::Cancelled,
            },
            Err(TryRecvError::Disconnected) => WorkerOutcome::Cancelled,
        };
        worker.join();
        let Some(worker) = self.worker.take() else {
            return;
        };
        let cancelling = self.state == PreviewState::Cancelling;
        self.state = PreviewState::Idle;

        match outcome {
            WorkerOutcome::Completed(world) if !cancelling => {
                self.last_previewed = Some(worker.params);
                if self.adopt(&world) {
                    self.state = PreviewState::Completed;
                }
            }
            WorkerOutcome::Completed(_) | WorkerOutcome::Cancelled => {
                tracing::debug!(target: "world_presets::preview", "preview.run=discarded");
            }
            WorkerOutcome::Failed(err) => {
                tracing::warn!(
                    target: "world_presets::preview",
                    error = %err,
                    "preview.run=failed"
                );
            }
        }
    }

    /// Renders the finished world, retrying a black render a few times.
    fn adopt(&mut self, world: &World) -> bool {
        let attempts = self.config.render_retry_limit() + 1;
        for attempt in 0..attempts {
            let bitmap = self.renderer.render(world);
            if !bitmap.center_is_black() {
                self.bitmap = Some(bitmap);
                self.fresh = true;
                tracing::debug!(
                    target: "world_presets::preview",
                    attempt,
                    "preview.run=adopted"
                );
                return true;
            }
        }
        tracing::warn!(
            target: "world_presets::preview",
            attempts,
            "preview.render=black"
        );
        false
    }

    pub fn poll_preview(&mut self) -> PreviewPoll {
        if self.fresh {
            if let Some(bitmap) = &self.bitmap {
                self.fresh = false;
                return PreviewPoll::Ready(bitmap.clone());
            }
        }
        match self.state {
            PreviewState::Running | PreviewState::Cancelling => {
                PreviewPoll::InProgress(self.progress())
            }
            PreviewState::Idle | PreviewState::Completed => PreviewPoll::None,
        }
    }

    /// Ticks until no run is active or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.tick();
            if self.worker.is_none() && self.queued.is_none() && self.debounce.is_none() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
    }
}

impl Drop for PreviewController {
    fn drop(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        worker.token.cancel();
        let deadline = Instant::now() + self.config.shutdown_grace();
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL);
        }
        if worker.is_finished() {
            worker.join();
        } else {
            // The worker only owns its throwaway world.
            tracing::warn!(
                target: "world_presets::preview",
                grace_ms = self.config.shutdown_grace().as_millis() as u64,
                "preview.worker_detached"
            );
        }
    }
}
