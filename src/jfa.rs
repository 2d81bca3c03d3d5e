//! Jump-flood distance field.
//!
//! Each tick the trail grid is reduced into a seed field (init pass) and then
//! propagated with halving step sizes, ping-ponging between two buffers. The
//! pair is an explicit two-slot array with a `current` index: a step always
//! reads `fields[current]` and writes `fields[1 - current]`, then flips the
//! index, so the read and write bindings can never name the same buffer.

use crate::device::{slots, Binding, ComputeDevice, KernelSet, KernelStage};
use crate::dispatch::Dispatcher;
use crate::error::SimulationError;
use crate::resources::Buffers;
use crate::uniforms::KernelArgs;

/// Step sizes for a reduced grid of side `n`.
///
/// Starts at the largest power of two strictly below `n` and halves down to 1
/// inclusive. A grid of side 1 or less needs no steps.
pub fn step_schedule(n: u32) -> Vec<u32> {
    if n <= 1 {
        return Vec::new();
    }
    let mut step = 1u32;
    while step.checked_mul(2).is_some_and(|next| next < n) {
        step *= 2;
    }
    let mut steps = Vec::new();
    while step >= 1 {
        steps.push(step);
        step /= 2;
    }
    steps
}

/// Ping-pong state for the distance-field buffers.
#[derive(Debug, Default)]
pub struct DistanceFieldPipeline {
    current: usize,
    steps_last_run: usize,
}

impl DistanceFieldPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot (0 = A, 1 = B) holding the most recently completed field.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of step dispatches issued by the last [`run`](Self::run).
    pub fn steps_last_run(&self) -> usize {
        self.steps_last_run
    }

    /// Seed buffer A from the trail grid, then run the full step schedule.
    pub fn run<D: ComputeDevice>(
        &mut self,
        dispatcher: &mut Dispatcher,
        device: &mut D,
        kernels: &KernelSet<D::Kernel>,
        buffers: &Buffers<'_, D::Buffer>,
    ) -> Result<(), SimulationError> {
        let m = buffers.field_resolution;

        self.current = 0;
        dispatcher.dispatch(
            device,
            kernels,
            KernelStage::JfaInit,
            [m, m, m],
            &[
                Binding::uniform(slots::PARAMS, buffers.params),
                Binding::read(slots::TRAIL_GRID, buffers.trail_grid),
                Binding::read_write(slots::FIELD_WRITE, buffers.fields[0]),
            ],
            &KernelArgs::new(),
        )?;

        let schedule = step_schedule(m);
        for &step in &schedule {
            let read = self.current;
            let write = 1 - read;
            dispatcher.dispatch(
                device,
                kernels,
                KernelStage::JfaStep,
                [m, m, m],
                &[
                    Binding::uniform(slots::PARAMS, buffers.params),
                    Binding::read(slots::FIELD_READ, buffers.fields[read]),
                    Binding::read_write(slots::FIELD_WRITE, buffers.fields[write]),
                ],
                &KernelArgs::new().with(step as i32),
            )?;
            self.current = write;
        }

        self.steps_last_run = schedule.len();
        log::debug!(
            "distance field {}^3: {} jump-flood steps, result in buffer {}",
            m,
            schedule.len(),
            if self.current == 0 { 'A' } else { 'B' }
        );
        Ok(())
    }
}
