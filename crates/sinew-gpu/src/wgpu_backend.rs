//! GPU compute through wgpu.
//!
//! Buffers, bind groups and staging buffers are owned here and addressed by
//! the opaque handles from [`crate::buffers`]. Validation and allocation
//! failures are captured with error scopes and returned as errors instead
//! of reaching the uncaptured-error handler.

use std::collections::HashMap;
use std::sync::mpsc;

use sinew_types::{SinewError, SinewResult};

use crate::backend::{ComputeBackend, DispatchRequest, ReadbackTicket};
use crate::buffers::{BufferAccess, BufferDesc, BufferHandle};
use crate::kernel::{DistanceParams, KernelHandle, KernelSource, DISTANCE_ENTRY_POINT};

struct Kernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

struct PendingReadback {
    staging: wgpu::Buffer,
    rx: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    byte_len: u64,
}

/// [`ComputeBackend`] running the distance kernel on a wgpu device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    next_buffer: u32,
    kernels: Vec<Kernel>,
    params: wgpu::Buffer,
    bind_groups: HashMap<(KernelHandle, [BufferHandle; 3]), wgpu::BindGroup>,
    staging_pool: Vec<wgpu::Buffer>,
    pending: HashMap<u64, PendingReadback>,
    next_ticket: u64,
}

impl WgpuBackend {
    /// Requests the default high-performance adapter. Blocks.
    pub fn new() -> SinewResult<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> SinewResult<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| SinewError::Gpu("no compatible adapter".into()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("sinew.device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| SinewError::Gpu(format!("device request failed: {e}")))?;

        Ok(Self::from_device(device, queue, adapter.get_info()))
    }

    /// Wraps an existing device, e.g. one shared with a renderer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, info: wgpu::AdapterInfo) -> Self {
        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(%error, "uncaptured wgpu error");
        }));
        tracing::info!(adapter = %info.name, backend = ?info.backend, "wgpu device ready");

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sinew.params"),
            size: std::mem::size_of::<DistanceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            info,
            buffers: HashMap::new(),
            next_buffer: 0,
            kernels: Vec::new(),
            params,
            bind_groups: HashMap::new(),
            staging_pool: Vec::new(),
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    fn buffer(&self, handle: BufferHandle) -> SinewResult<&wgpu::Buffer> {
        self.buffers
            .get(&handle)
            .ok_or_else(|| SinewError::Gpu(format!("unknown buffer {}", handle.0)))
    }

    fn bind_group_layout(&self) -> wgpu::BindGroupLayout {
        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sinew.distance.layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1, false),
                storage(2, true),
                storage(3, true),
            ],
        })
    }

    fn bind_group(&mut self, kernel: KernelHandle, handles: [BufferHandle; 3]) -> SinewResult<()> {
        if self.bind_groups.contains_key(&(kernel, handles)) {
            return Ok(());
        }

        let layout = &self
            .kernels
            .get(kernel.0 as usize)
            .ok_or_else(|| SinewError::Gpu(format!("unknown kernel {}", kernel.0)))?
            .layout;
        let [positions, constraints, rest_lengths] = handles;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sinew.distance.bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.buffer(positions)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.buffer(constraints)?.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.buffer(rest_lengths)?.as_entire_binding(),
                },
            ],
        });
        self.bind_groups.insert((kernel, handles), bind_group);
        Ok(())
    }

    fn take_staging(&mut self, size: u64) -> wgpu::Buffer {
        if let Some(i) = self.staging_pool.iter().position(|b| b.size() >= size) {
            return self.staging_pool.swap_remove(i);
        }
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sinew.staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn compile_kernel(&mut self, source: &KernelSource, workgroup_size: u32) -> SinewResult<KernelHandle> {
        let limits = self.device.limits();
        let max = limits
            .max_compute_workgroup_size_x
            .min(limits.max_compute_invocations_per_workgroup);
        if workgroup_size == 0 || workgroup_size > max {
            return Err(SinewError::KernelUnavailable(format!(
                "workgroup size {workgroup_size} outside 1..={max} on {}",
                self.info.name
            )));
        }

        let wgsl = source.specialize(workgroup_size)?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sinew.distance.wgsl"),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });
        let layout = self.bind_group_layout();
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sinew.distance.pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sinew.distance.pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(DISTANCE_ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(SinewError::KernelUnavailable(error.to_string()));
        }

        let handle = KernelHandle(self.kernels.len() as u32);
        self.kernels.push(Kernel { pipeline, layout });
        tracing::debug!(workgroup_size, source = %source.describe(), "distance kernel compiled");
        Ok(handle)
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> SinewResult<BufferHandle> {
        desc.validate()?;
        let size = desc.byte_size();
        let limits = self.device.limits();
        if size > limits.max_buffer_size || size > limits.max_storage_buffer_binding_size as u64 {
            return Err(SinewError::BufferAllocation {
                label: desc.label.to_string(),
                reason: format!("{size} bytes exceeds device limits"),
            });
        }

        let mut usage = wgpu::BufferUsages::STORAGE;
        if desc.upload_target {
            usage |= wgpu::BufferUsages::COPY_DST;
        }
        if desc.readback_source || desc.access == BufferAccess::ReadWrite {
            usage |= wgpu::BufferUsages::COPY_SRC;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = validation.or(oom) {
            buffer.destroy();
            return Err(SinewError::BufferAllocation {
                label: desc.label.to_string(),
                reason: error.to_string(),
            });
        }

        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn upload(&mut self, buffer: BufferHandle, bytes: &[u8]) -> SinewResult<()> {
        let target = self.buffer(buffer)?;
        if bytes.len() as u64 > target.size() {
            return Err(SinewError::Gpu(format!(
                "upload of {} bytes exceeds buffer {} ({} bytes)",
                bytes.len(),
                buffer.0,
                target.size()
            )));
        }
        self.queue.write_buffer(target, 0, bytes);
        Ok(())
    }

    fn dispatch(&mut self, request: &DispatchRequest<'_>) -> SinewResult<()> {
        let handles = request.buffers.handles();
        self.bind_group(request.kernel, handles)?;
        let (Some(kernel), Some(bind_group)) = (
            self.kernels.get(request.kernel.0 as usize),
            self.bind_groups.get(&(request.kernel, handles)),
        ) else {
            return Err(SinewError::Gpu("bind group missing after creation".into()));
        };

        self.queue
            .write_buffer(&self.params, 0, bytemuck::bytes_of(&request.params));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sinew.distance.encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sinew.distance.pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(request.group_count, 1, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn schedule_readback(&mut self, buffer: BufferHandle, byte_len: u64) -> SinewResult<ReadbackTicket> {
        let size = self.buffer(buffer)?.size();
        if byte_len == 0 || byte_len > size || byte_len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(SinewError::Readback(format!(
                "invalid readback of {byte_len} bytes from buffer {} ({size} bytes)",
                buffer.0
            )));
        }

        let staging = self.take_staging(byte_len);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sinew.readback.encoder"),
            });
        encoder.copy_buffer_to_buffer(self.buffer(buffer)?, 0, &staging, 0, byte_len);
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        staging
            .slice(..byte_len)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });

        let ticket = ReadbackTicket {
            id: self.next_ticket,
            byte_len,
        };
        self.next_ticket += 1;
        self.pending.insert(
            ticket.id,
            PendingReadback {
                staging,
                rx,
                byte_len,
            },
        );
        Ok(ticket)
    }

    fn complete_readback(&mut self, ticket: ReadbackTicket) -> SinewResult<Vec<u8>> {
        let pending = self
            .pending
            .remove(&ticket.id)
            .ok_or_else(|| SinewError::Readback(format!("unknown readback ticket {}", ticket.id)))?;

        let _ = self.device.poll(wgpu::Maintain::Wait);
        let mapped = match pending.rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SinewError::Readback(format!("buffer map failed: {e}"))),
            Err(_) => Err(SinewError::Readback("map channel disconnected, device lost?".into())),
        };
        if let Err(e) = mapped {
            // A failed map leaves the staging buffer unusable.
            pending.staging.destroy();
            return Err(e);
        }

        let bytes = {
            let view = pending.staging.slice(..pending.byte_len).get_mapped_range();
            view.to_vec()
        };
        pending.staging.unmap();
        self.staging_pool.push(pending.staging);
        Ok(bytes)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if let Some(b) = self.buffers.remove(&buffer) {
            b.destroy();
            self.bind_groups.retain(|(_, handles), _| !handles.contains(&buffer));
        }
    }
}
