//! The per-tick simulation stages.
//!
//! [`StepPipeline`] is a two-state machine. In [`StepState::Steady`] a tick
//! runs decay over the grid, then move and deposit over the agents. In
//! [`StepState::ResetPending`] those stages are skipped: the grid is cleared
//! and every agent is re-seeded inside the current bounds, after which the
//! pipeline is steady again.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::{slots, Binding, ComputeDevice, KernelSet, KernelStage};
use crate::dispatch::Dispatcher;
use crate::error::SimulationError;
use crate::resources::Buffers;
use crate::uniforms::KernelArgs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepState {
    Steady,
    ResetPending,
}

/// What a call to [`StepPipeline::run`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Ran decay, move and deposit.
    Stepped,
    /// Cleared the grid and re-seeded the agents.
    Reset,
}

pub struct StepPipeline {
    state: StepState,
    rng: StdRng,
}

impl StepPipeline {
    /// Starts reset-pending: freshly allocated buffers hold garbage.
    pub fn new() -> Self {
        Self {
            state: StepState::ResetPending,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic randomize seeds.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.reseed(seed);
        self
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// Run a reset on the next tick instead of a step.
    pub fn request_reset(&mut self) {
        if self.state != StepState::ResetPending {
            log::info!("simulation reset requested");
        }
        self.state = StepState::ResetPending;
    }

    pub fn run<D: ComputeDevice>(
        &mut self,
        dispatcher: &mut Dispatcher,
        device: &mut D,
        kernels: &KernelSet<D::Kernel>,
        buffers: &Buffers<'_, D::Buffer>,
    ) -> Result<StepOutcome, SimulationError> {
        match self.state {
            StepState::Steady => {
                self.step(dispatcher, device, kernels, buffers)?;
                Ok(StepOutcome::Stepped)
            }
            StepState::ResetPending => {
                self.reset(dispatcher, device, kernels, buffers)?;
                self.state = StepState::Steady;
                Ok(StepOutcome::Reset)
            }
        }
    }

    fn step<D: ComputeDevice>(
        &mut self,
        dispatcher: &mut Dispatcher,
        device: &mut D,
        kernels: &KernelSet<D::Kernel>,
        buffers: &Buffers<'_, D::Buffer>,
    ) -> Result<(), SimulationError> {
        let n = buffers.grid_resolution;
        let agents = [buffers.agent_count, 1, 1];
        let none = KernelArgs::new();

        dispatcher.dispatch(
            device,
            kernels,
            KernelStage::Decay,
            [n, n, n],
            &[
                Binding::uniform(slots::PARAMS, buffers.params),
                Binding::read_write(slots::TRAIL_GRID, buffers.trail_grid),
            ],
            &none,
        )?;
        dispatcher.dispatch(
            device,
            kernels,
            KernelStage::Move,
            agents,
            &[
                Binding::uniform(slots::PARAMS, buffers.params),
                Binding::read_write(slots::AGENTS, buffers.agents),
                Binding::read(slots::TRAIL_GRID, buffers.trail_grid),
            ],
            &none,
        )?;
        dispatcher.dispatch(
            device,
            kernels,
            KernelStage::Deposit,
            agents,
            &[
                Binding::uniform(slots::PARAMS, buffers.params),
                Binding::read(slots::AGENTS, buffers.agents),
                Binding::read_write(slots::TRAIL_GRID, buffers.trail_grid),
            ],
            &none,
        )?;
        Ok(())
    }

    fn reset<D: ComputeDevice>(
        &mut self,
        dispatcher: &mut Dispatcher,
        device: &mut D,
        kernels: &KernelSet<D::Kernel>,
        buffers: &Buffers<'_, D::Buffer>,
    ) -> Result<(), SimulationError> {
        let n = buffers.grid_resolution;
        dispatcher.dispatch(
            device,
            kernels,
            KernelStage::ClearGrid,
            [n, n, n],
            &[
                Binding::uniform(slots::PARAMS, buffers.params),
                Binding::read_write(slots::TRAIL_GRID, buffers.trail_grid),
            ],
            &KernelArgs::new(),
        )?;

        let seed: i32 = self.rng.gen_range(0..i32::MAX);
        dispatcher.dispatch(
            device,
            kernels,
            KernelStage::Randomize,
            [buffers.agent_count, 1, 1],
            &[
                Binding::uniform(slots::PARAMS, buffers.params),
                Binding::read_write(slots::AGENTS, buffers.agents),
            ],
            &KernelArgs::new().with(seed),
        )?;
        log::info!(
            "reset {} agents in a {}^3 grid",
            buffers.agent_count,
            buffers.grid_resolution
        );
        Ok(())
    }
}

impl Default for StepPipeline {
    fn default() -> Self {
        Self::new()
    }
}
