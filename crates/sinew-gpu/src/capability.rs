//! Kernel capability probing and dispatch.
//!
//! [`KernelManager`] decides once, at initialization, whether the parallel
//! path is usable. The decision is permanent: a failed probe is never
//! retried, and callers route every later step through the CPU path.

use sinew_telemetry::{Diagnostics, EventKind, Severity};
use sinew_types::SinewResult;

use crate::backend::{ComputeBackend, DispatchRequest};
use crate::buffers::BufferTriple;
use crate::kernel::{group_count, DistanceParams, KernelHandle, KernelSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    NotProbed,
    Available(KernelHandle),
    Unavailable,
}

/// Result of [`KernelManager::dispatch_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The dispatch was enqueued.
    Submitted { groups: u32 },
    /// Nothing was enqueued: kernel unavailable, buffers missing, or no work.
    Skipped,
}

/// Owns the kernel probe result and issues dispatches.
pub struct KernelManager {
    source: KernelSource,
    workgroup_size: u32,
    state: ProbeState,
    /// Number of compile requests sent to a backend. Never exceeds 1.
    compile_requests: u32,
}

impl KernelManager {
    pub fn new(source: KernelSource, workgroup_size: u32) -> Self {
        Self {
            source,
            workgroup_size,
            state: ProbeState::NotProbed,
            compile_requests: 0,
        }
    }

    /// Probes whether the kernel compiles on `backend`.
    ///
    /// Blocks until the backend reports. Idempotent: after the first call
    /// the cached answer is returned without recompiling, whether the
    /// probe succeeded or not.
    pub fn initialize(
        &mut self,
        backend: &mut dyn ComputeBackend,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        match self.state {
            ProbeState::Available(_) => return true,
            ProbeState::Unavailable => return false,
            ProbeState::NotProbed => {}
        }

        self.compile_requests += 1;
        let result = backend.compile_kernel(&self.source, self.workgroup_size);
        let available = match result {
            Ok(handle) => {
                self.state = ProbeState::Available(handle);
                true
            }
            Err(e) => {
                self.state = ProbeState::Unavailable;
                let source = self.source.describe();
                diagnostics.emit_once("kernel_unavailable", Severity::Error, || {
                    EventKind::KernelUnavailable {
                        reason: format!("{e} (source: {source})"),
                    }
                });
                false
            }
        };

        diagnostics.info(EventKind::CapabilityProbed {
            backend: backend.name().to_string(),
            available,
        });
        available
    }

    /// Returns true if the probe succeeded.
    #[inline]
    pub fn is_available(&self) -> bool {
        matches!(self.state, ProbeState::Available(_))
    }

    /// Returns true once [`initialize`](Self::initialize) has run.
    #[inline]
    pub fn is_probed(&self) -> bool {
        self.state != ProbeState::NotProbed
    }

    /// Number of compile requests issued so far.
    #[inline]
    pub fn compile_requests(&self) -> u32 {
        self.compile_requests
    }

    #[inline]
    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// Workgroups needed to cover `constraint_count` constraints.
    #[inline]
    pub fn group_count(&self, constraint_count: u32) -> u32 {
        group_count(constraint_count, self.workgroup_size)
    }

    /// Issues one parallel invocation over `params.constraint_count`
    /// constraints.
    ///
    /// A no-op when the kernel is unavailable or `buffers` is `None`; that
    /// case is logged once as a warning and is not an error. Backend
    /// failures are returned to the caller.
    pub fn dispatch_step(
        &self,
        backend: &mut dyn ComputeBackend,
        buffers: Option<&BufferTriple>,
        params: DistanceParams,
        diagnostics: &mut Diagnostics,
    ) -> SinewResult<DispatchOutcome> {
        let (kernel, buffers) = match (self.state, buffers) {
            (ProbeState::Available(kernel), Some(buffers)) => (kernel, buffers),
            _ => {
                let reason = if self.is_available() {
                    "device buffers missing"
                } else {
                    "kernel unavailable"
                };
                diagnostics.emit_once("dispatch_rejected", Severity::Warning, || {
                    EventKind::DispatchRejected {
                        reason: reason.to_string(),
                    }
                });
                return Ok(DispatchOutcome::Skipped);
            }
        };

        let groups = self.group_count(params.constraint_count);
        if groups == 0 {
            return Ok(DispatchOutcome::Skipped);
        }

        backend.dispatch(&DispatchRequest {
            kernel,
            buffers,
            params,
            group_count: groups,
        })?;
        Ok(DispatchOutcome::Submitted { groups })
    }
}
