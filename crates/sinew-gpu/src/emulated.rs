//! CPU-executed device queue.
//!
//! [`EmulatedDevice`] implements [`ComputeBackend`] without a GPU. Work is
//! queued exactly like on a real device and only executed when the host
//! blocks in [`ComputeBackend::complete_readback`], so ordering bugs in
//! the solver show up here too. Faults can be injected through
//! [`DeviceControls`] after the device has been handed to a solver.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use bytemuck::Pod;
use sinew_mesh::DistanceConstraint;
use sinew_types::constants::MAX_WORKGROUP_SIZE;
use sinew_types::{SinewError, SinewResult};

use crate::backend::{ComputeBackend, DispatchRequest, ReadbackTicket};
use crate::buffers::{BufferDesc, BufferHandle, BufferTriple};
use crate::kernel::{DistanceParams, KernelHandle, KernelSource, DISTANCE_ENTRY_POINT};

/// How invocations of one dispatch observe each other's writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationOrder {
    /// Invocations run one after another; later ones see earlier writes.
    /// Equivalent to the CPU relaxation sweep.
    Sequential,
    /// Every invocation reads positions as they were before the dispatch
    /// and writes land in invocation order, so the last writer of a shared
    /// particle wins. Models the unsynchronized GPU kernel.
    #[default]
    Snapshot,
}

/// Counters exposed for tests and benchmarks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub kernels_compiled: u32,
    pub buffers_created: u32,
    pub live_buffers: u32,
    pub uploads: u32,
    pub dispatches: u32,
    pub readbacks: u32,
}

#[derive(Debug, Default)]
struct Faults {
    compile: bool,
    buffer_labels: Vec<String>,
    dispatch: bool,
    readback: bool,
}

#[derive(Debug, Default)]
struct Shared {
    faults: Faults,
    stats: DeviceStats,
}

/// Shared handle for fault injection and statistics.
#[derive(Debug, Clone, Default)]
pub struct DeviceControls {
    shared: Arc<Mutex<Shared>>,
}

impl DeviceControls {
    fn with<R: Default>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        self.shared.lock().map(|mut s| f(&mut s)).unwrap_or_default()
    }

    /// Makes every subsequent kernel compile fail.
    pub fn fail_compile(&self, fail: bool) {
        self.with(|s| s.faults.compile = fail);
    }

    /// Makes creation of buffers labelled `label` fail.
    pub fn fail_buffer(&self, label: &str) {
        self.with(|s| s.faults.buffer_labels.push(label.to_string()));
    }

    /// Removes all buffer creation faults.
    pub fn clear_buffer_faults(&self) {
        self.with(|s| s.faults.buffer_labels.clear());
    }

    /// Makes every subsequent dispatch fail.
    pub fn fail_dispatch(&self, fail: bool) {
        self.with(|s| s.faults.dispatch = fail);
    }

    /// Makes every subsequent readback fail.
    pub fn fail_readback(&self, fail: bool) {
        self.with(|s| s.faults.readback = fail);
    }

    /// Returns a snapshot of the device counters.
    pub fn stats(&self) -> DeviceStats {
        self.with(|s| s.stats.clone())
    }
}

enum Job {
    Upload {
        buffer: BufferHandle,
        bytes: Vec<u8>,
    },
    Dispatch {
        params: DistanceParams,
        buffers: BufferTriple,
    },
    Copy {
        ticket: u64,
        buffer: BufferHandle,
        byte_len: usize,
    },
}

/// A [`ComputeBackend`] that executes its queue on the calling thread.
pub struct EmulatedDevice {
    buffers: HashMap<BufferHandle, Vec<u8>>,
    next_buffer: u32,
    kernels: HashMap<KernelHandle, u32>,
    next_kernel: u32,
    queue: VecDeque<Job>,
    completed: HashMap<u64, Vec<u8>>,
    next_ticket: u64,
    order: InvocationOrder,
    controls: DeviceControls,
}

impl EmulatedDevice {
    /// Creates a device with [`InvocationOrder::Snapshot`] semantics.
    pub fn new() -> Self {
        Self::with_order(InvocationOrder::default())
    }

    pub fn with_order(order: InvocationOrder) -> Self {
        Self {
            buffers: HashMap::new(),
            next_buffer: 0,
            kernels: HashMap::new(),
            next_kernel: 0,
            queue: VecDeque::new(),
            completed: HashMap::new(),
            next_ticket: 0,
            order,
            controls: DeviceControls::default(),
        }
    }

    /// Returns a handle for fault injection and statistics.
    pub fn controls(&self) -> DeviceControls {
        self.controls.clone()
    }

    /// Number of enqueued jobs not yet executed.
    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    fn buffer(&self, handle: BufferHandle) -> SinewResult<&Vec<u8>> {
        self.buffers
            .get(&handle)
            .ok_or_else(|| SinewError::Gpu(format!("unknown buffer {}", handle.0)))
    }

    /// Executes every queued job in submission order.
    fn drain(&mut self) -> SinewResult<()> {
        while let Some(job) = self.queue.pop_front() {
            match job {
                Job::Upload { buffer, bytes } => {
                    let dst = self
                        .buffers
                        .get_mut(&buffer)
                        .ok_or_else(|| SinewError::Gpu(format!("buffer {} released before upload", buffer.0)))?;
                    dst[..bytes.len()].copy_from_slice(&bytes);
                }
                Job::Dispatch { params, buffers } => self.run_distance_kernel(&params, &buffers)?,
                Job::Copy {
                    ticket,
                    buffer,
                    byte_len,
                } => {
                    let bytes = self.buffer(buffer)?[..byte_len].to_vec();
                    self.completed.insert(ticket, bytes);
                }
            }
        }
        Ok(())
    }

    fn run_distance_kernel(&mut self, params: &DistanceParams, buffers: &BufferTriple) -> SinewResult<()> {
        let pairs: Vec<[u32; 2]> = decode(self.buffer(buffers.constraints)?);
        let rest_lengths: Vec<f32> = decode(self.buffer(buffers.rest_lengths)?);
        let mut positions: Vec<[f32; 4]> = decode(self.buffer(buffers.positions)?);

        let snapshot = match self.order {
            InvocationOrder::Snapshot => Some(positions.clone()),
            InvocationOrder::Sequential => None,
        };

        let start = params.constraint_offset as usize;
        let end = (start + params.constraint_count as usize)
            .min(pairs.len())
            .min(rest_lengths.len());
        let particle_limit = (params.particle_count as usize).min(positions.len());

        for ci in start..end {
            let [a, b] = pairs[ci];
            let (a, b) = (a as usize, b as usize);
            if a >= particle_limit || b >= particle_limit {
                continue;
            }

            let (p1, p2) = match &snapshot {
                Some(s) => (s[a], s[b]),
                None => (positions[a], positions[b]),
            };
            let (p1, p2) = (to_vec3(p1), to_vec3(p2));
            let Some((d1, d2)) =
                DistanceConstraint::project(p1, p2, rest_lengths[ci], params.stiffness, params.dt)
            else {
                continue;
            };

            let (n1, n2) = (p1 + d1, p2 + d2);
            positions[a] = [n1.x, n1.y, n1.z, 1.0];
            positions[b] = [n2.x, n2.y, n2.z, 1.0];
        }

        let dst = self
            .buffers
            .get_mut(&buffers.positions)
            .ok_or_else(|| SinewError::Gpu("positions buffer released before dispatch".into()))?;
        let bytes: &[u8] = bytemuck::cast_slice(&positions);
        dst[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Default for EmulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

#[inline]
fn to_vec3(v: [f32; 4]) -> glam::Vec3 {
    glam::Vec3::new(v[0], v[1], v[2])
}

impl ComputeBackend for EmulatedDevice {
    fn name(&self) -> &str {
        "emulated"
    }

    fn is_gpu(&self) -> bool {
        false
    }

    fn compile_kernel(&mut self, source: &KernelSource, workgroup_size: u32) -> SinewResult<KernelHandle> {
        if self.controls.with(|s| s.faults.compile) {
            return Err(SinewError::KernelUnavailable("injected compile failure".into()));
        }
        if workgroup_size == 0 || workgroup_size > MAX_WORKGROUP_SIZE {
            return Err(SinewError::KernelUnavailable(format!(
                "workgroup size {workgroup_size} outside 1..={MAX_WORKGROUP_SIZE}"
            )));
        }

        let wgsl = source.specialize(workgroup_size)?;
        if !wgsl.contains(DISTANCE_ENTRY_POINT) {
            return Err(SinewError::KernelUnavailable(format!(
                "entry point '{DISTANCE_ENTRY_POINT}' not found"
            )));
        }

        let handle = KernelHandle(self.next_kernel);
        self.next_kernel += 1;
        self.kernels.insert(handle, workgroup_size);
        self.controls.with(|s| s.stats.kernels_compiled += 1);
        Ok(handle)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> SinewResult<BufferHandle> {
        desc.validate()?;
        let injected = self
            .controls
            .with(|s| s.faults.buffer_labels.iter().any(|l| l == desc.label));
        if injected {
            return Err(SinewError::BufferAllocation {
                label: desc.label.to_string(),
                reason: "injected allocation failure".into(),
            });
        }

        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(handle, vec![0u8; desc.byte_size() as usize]);
        self.controls.with(|s| {
            s.stats.buffers_created += 1;
            s.stats.live_buffers += 1;
        });
        Ok(handle)
    }

    fn upload(&mut self, buffer: BufferHandle, bytes: &[u8]) -> SinewResult<()> {
        let capacity = self.buffer(buffer)?.len();
        if bytes.len() > capacity {
            return Err(SinewError::Gpu(format!(
                "upload of {} bytes exceeds buffer {} ({} bytes)",
                bytes.len(),
                buffer.0,
                capacity
            )));
        }
        self.queue.push_back(Job::Upload {
            buffer,
            bytes: bytes.to_vec(),
        });
        self.controls.with(|s| s.stats.uploads += 1);
        Ok(())
    }

    fn dispatch(&mut self, request: &DispatchRequest<'_>) -> SinewResult<()> {
        if self.controls.with(|s| s.faults.dispatch) {
            return Err(SinewError::Gpu("injected dispatch failure".into()));
        }
        if !self.kernels.contains_key(&request.kernel) {
            return Err(SinewError::Gpu(format!("unknown kernel {}", request.kernel.0)));
        }
        for handle in request.buffers.handles() {
            self.buffer(handle)?;
        }

        self.queue.push_back(Job::Dispatch {
            params: request.params,
            buffers: *request.buffers,
        });
        self.controls.with(|s| s.stats.dispatches += 1);
        Ok(())
    }

    fn schedule_readback(&mut self, buffer: BufferHandle, byte_len: u64) -> SinewResult<ReadbackTicket> {
        let capacity = self.buffer(buffer)?.len() as u64;
        if byte_len > capacity {
            return Err(SinewError::Readback(format!(
                "readback of {byte_len} bytes exceeds buffer {} ({capacity} bytes)",
                buffer.0
            )));
        }

        let ticket = ReadbackTicket {
            id: self.next_ticket,
            byte_len,
        };
        self.next_ticket += 1;
        self.queue.push_back(Job::Copy {
            ticket: ticket.id,
            buffer,
            byte_len: byte_len as usize,
        });
        Ok(ticket)
    }

    fn complete_readback(&mut self, ticket: ReadbackTicket) -> SinewResult<Vec<u8>> {
        self.drain()?;
        let bytes = self
            .completed
            .remove(&ticket.id)
            .ok_or_else(|| SinewError::Readback(format!("unknown readback ticket {}", ticket.id)))?;
        if self.controls.with(|s| s.faults.readback) {
            return Err(SinewError::Readback("injected map failure".into()));
        }
        self.controls.with(|s| s.stats.readbacks += 1);
        Ok(bytes)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_some() {
            self.controls.with(|s| s.stats.live_buffers -= 1);
        }
    }
}
