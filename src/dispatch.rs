//! Validated compute dispatch.
//!
//! Every kernel invocation in the core goes through [`Dispatcher::dispatch`]:
//! the requested problem size is turned into workgroup counts by ceiling
//! division over the kernel's declared local size, checked against the device
//! limits, issued, and followed by a memory barrier so the next stage observes
//! every write.

use crate::device::{Binding, ComputeDevice, DeviceBuffer, DeviceLimits, KernelSet, KernelStage};
use crate::error::{DeviceLimit, DispatchError};
use crate::uniforms::KernelArgs;

/// Number of workgroups of size `local` needed to cover `items` invocations.
pub fn workgroup_count(items: u32, local: u32) -> u32 {
    items.div_ceil(local)
}

/// Issues validated dispatches against one device's limits.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    limits: DeviceLimits,
    issued: u64,
}

impl Dispatcher {
    pub fn new(limits: DeviceLimits) -> Self {
        Self { limits, issued: 0 }
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Total dispatches issued so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Workgroup counts for `items` over a kernel with `local_size`, or the
    /// first violated precondition.
    pub fn plan(
        &self,
        stage: KernelStage,
        local_size: [u32; 3],
        items: [u32; 3],
    ) -> Result<[u32; 3], DispatchError> {
        if items.iter().any(|&n| n < 1) {
            return Err(DispatchError::InvalidDispatchSize { stage, items });
        }
        if local_size.iter().any(|&n| n == 0) {
            return Err(DispatchError::InvalidKernel { stage });
        }

        let mut groups = [0u32; 3];
        for axis in 0..3 {
            groups[axis] = workgroup_count(items[axis], local_size[axis]);
        }

        for axis in 0..3 {
            if groups[axis] > self.limits.max_workgroup_count[axis] {
                return Err(DispatchError::DeviceLimitExceeded {
                    stage,
                    limit: DeviceLimit::WorkgroupCount,
                    axis,
                    requested: groups[axis],
                    max: self.limits.max_workgroup_count[axis],
                });
            }
        }
        for axis in 0..3 {
            if local_size[axis] > self.limits.max_workgroup_size[axis] {
                return Err(DispatchError::DeviceLimitExceeded {
                    stage,
                    limit: DeviceLimit::WorkgroupSize,
                    axis,
                    requested: local_size[axis],
                    max: self.limits.max_workgroup_size[axis],
                });
            }
        }

        Ok(groups)
    }

    /// Validate and issue one dispatch, then insert a memory barrier.
    pub fn dispatch<D: ComputeDevice>(
        &mut self,
        device: &mut D,
        kernels: &KernelSet<D::Kernel>,
        stage: KernelStage,
        items: [u32; 3],
        bindings: &[Binding<'_, D::Buffer>],
        args: &KernelArgs,
    ) -> Result<(), DispatchError> {
        if items.iter().any(|&n| n < 1) {
            return Err(DispatchError::InvalidDispatchSize { stage, items });
        }
        let kernel = kernels
            .get(stage)
            .ok_or(DispatchError::InvalidKernel { stage })?;
        check_aliasing(stage, bindings)?;
        let size = args.to_bytes().len();
        if size > KernelArgs::MAX_BYTES {
            return Err(DispatchError::ArgumentsTooLarge {
                stage,
                size,
                max: KernelArgs::MAX_BYTES,
            });
        }

        let local_size = device.workgroup_size(kernel);
        let groups = self.plan(stage, local_size, items)?;

        log::trace!(
            "dispatch {}: items {:?} local {:?} groups {:?}",
            stage,
            items,
            local_size,
            groups
        );
        device.dispatch(kernel, bindings, args, groups);
        device.memory_barrier();
        self.issued += 1;
        Ok(())
    }
}

/// A buffer may appear in several slots only if none of them writes it.
fn check_aliasing<B: DeviceBuffer>(
    stage: KernelStage,
    bindings: &[Binding<'_, B>],
) -> Result<(), DispatchError> {
    for (i, a) in bindings.iter().enumerate() {
        for b in &bindings[i + 1..] {
            if a.buffer.id() == b.buffer.id() && (a.access.is_writable() || b.access.is_writable()) {
                return Err(DispatchError::AliasedBinding {
                    stage,
                    first: a.slot,
                    second: b.slot,
                });
            }
        }
    }
    Ok(())
}
