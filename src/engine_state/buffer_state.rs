//! # Buffer State Module
//!
//! This module owns the creation and release of the per-layer vertex buffers held by renderable
//! chunks.
//!
//! ## Architecture
//!
//! [`VertexBufferBackend`] is the render boundary: renderable chunks hand it vertex data and get
//! back an opaque buffer handle, and give the handle back when they drop the geometry. A handle
//! is moved into [`VertexBufferBackend::release`], so a buffer cannot be released twice.
//!
//! Two backends are provided:
//!
//! * [`WgpuBufferState`] creates real GPU buffers on a `wgpu::Device`
//! * [`HeadlessBufferState`] keeps no GPU memory and records every upload and release, for
//!   servers, tests and tools
//!
//! Both keep per-buffer analytics so the total memory held by chunk geometry can be reported.

use std::collections::{HashMap, HashSet};

use wgpu::util::DeviceExt;

use crate::engine_state::rendering::Vertex;
use crate::error::{EngineError, EngineResult};

/// Analytics data for a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BufferAnalytics {
    /// Memory allocated for the buffer in bytes
    allocated_memory: u64,
    /// Number of vertices stored in the buffer
    vertex_count: u32,
}

impl BufferAnalytics {
    fn for_vertices(vertices: &[Vertex]) -> Self {
        Self {
            allocated_memory: std::mem::size_of_val(vertices) as u64,
            vertex_count: vertices.len() as u32,
        }
    }
}

/// Something that can hold chunk geometry.
pub trait VertexBufferBackend {
    /// Handle to one uploaded vertex buffer.
    type Buffer;

    /// Uploads a vertex list and returns a handle to the new buffer.
    ///
    /// # Errors
    /// [`EngineError::BufferUpload`] if the backend cannot create the buffer.
    fn upload_vertices(&mut self, label: &str, vertices: &[Vertex]) -> EngineResult<Self::Buffer>;

    /// Releases a buffer created by this backend.
    fn release(&mut self, buffer: Self::Buffer);

    /// Number of buffers created and not yet released.
    fn live_buffers(&self) -> usize;

    /// Bytes held by live buffers.
    fn allocated_memory(&self) -> u64;
}

/// A vertex buffer created by [`WgpuBufferState`].
#[derive(Debug)]
pub struct WgpuVertexBuffer {
    id: u64,
    buffer: wgpu::Buffer,
}

impl WgpuVertexBuffer {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// GPU-backed vertex buffer manager.
///
/// # Examples
///
/// ```no_run
/// # fn demo(device: wgpu::Device) -> voxel_runtime::error::EngineResult<()> {
/// use voxel_runtime::engine_state::buffer_state::{VertexBufferBackend, WgpuBufferState};
///
/// let mut buffer_state = WgpuBufferState::new(device);
/// let buffer = buffer_state.upload_vertices("chunk (0, 0, 0) solid", &[])?;
/// buffer_state.release(buffer);
/// # Ok(())
/// # }
/// ```
pub struct WgpuBufferState {
    device: wgpu::Device,
    buffer_analytics: HashMap<u64, BufferAnalytics>,
    next_buffer_id: u64,
}

impl WgpuBufferState {
    pub fn new(device: wgpu::Device) -> Self {
        Self {
            device,
            buffer_analytics: HashMap::new(),
            next_buffer_id: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
}

impl VertexBufferBackend for WgpuBufferState {
    type Buffer = WgpuVertexBuffer;

    fn upload_vertices(&mut self, label: &str, vertices: &[Vertex]) -> EngineResult<WgpuVertexBuffer> {
        let analytics = BufferAnalytics::for_vertices(vertices);
        let max_buffer_size = self.device.limits().max_buffer_size;
        if analytics.allocated_memory > max_buffer_size {
            return Err(EngineError::BufferUpload {
                label: label.to_string(),
                reason: format!(
                    "{} bytes exceeds the device limit of {} bytes",
                    analytics.allocated_memory, max_buffer_size
                ),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            buffer.destroy();
            return Err(EngineError::BufferUpload {
                label: label.to_string(),
                reason: error.to_string(),
            });
        }

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffer_analytics.insert(id, analytics);
        Ok(WgpuVertexBuffer { id, buffer })
    }

    fn release(&mut self, buffer: WgpuVertexBuffer) {
        if self.buffer_analytics.remove(&buffer.id).is_none() {
            log::warn!("Releasing vertex buffer {} not created by this backend", buffer.id);
        }
        buffer.buffer.destroy();
    }

    fn live_buffers(&self) -> usize {
        self.buffer_analytics.len()
    }

    fn allocated_memory(&self) -> u64 {
        self.buffer_analytics
            .values()
            .map(|analytics| analytics.allocated_memory)
            .sum()
    }
}

/// A vertex buffer created by [`HeadlessBufferState`].
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessBuffer {
    id: u64,
    vertex_count: u32,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// Vertex buffer backend that holds no GPU memory.
///
/// Every upload and release is recorded, which makes buffer ownership observable in tests.
#[derive(Debug, Default)]
pub struct HeadlessBufferState {
    buffer_analytics: HashMap<u64, BufferAnalytics>,
    released: HashSet<u64>,
    next_buffer_id: u64,
    uploads: u64,
    releases: u64,
    foreign_releases: u64,
    failures_to_inject: usize,
}

impl HeadlessBufferState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` uploads fail, as a device running out of memory would.
    pub fn fail_next_uploads(&mut self, count: usize) {
        self.failures_to_inject = count;
    }

    /// Total successful uploads.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Total releases.
    pub fn releases(&self) -> u64 {
        self.releases
    }

    /// Releases of handles that were not live at the time.
    pub fn foreign_releases(&self) -> u64 {
        self.foreign_releases
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.buffer_analytics.contains_key(&id)
    }

    pub fn was_released(&self, id: u64) -> bool {
        self.released.contains(&id)
    }
}

impl VertexBufferBackend for HeadlessBufferState {
    type Buffer = HeadlessBuffer;

    fn upload_vertices(&mut self, label: &str, vertices: &[Vertex]) -> EngineResult<HeadlessBuffer> {
        if self.failures_to_inject > 0 {
            self.failures_to_inject -= 1;
            return Err(EngineError::BufferUpload {
                label: label.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let analytics = BufferAnalytics::for_vertices(vertices);
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.uploads += 1;
        self.buffer_analytics.insert(id, analytics);
        log::trace!("Uploaded '{}' as headless buffer {}", label, id);
        Ok(HeadlessBuffer {
            id,
            vertex_count: analytics.vertex_count,
        })
    }

    fn release(&mut self, buffer: HeadlessBuffer) {
        self.releases += 1;
        if self.buffer_analytics.remove(&buffer.id).is_none() {
            log::warn!("Releasing headless buffer {} that is not live", buffer.id);
            self.foreign_releases += 1;
        }
        self.released.insert(buffer.id);
    }

    fn live_buffers(&self) -> usize {
        self.buffer_analytics.len()
    }

    fn allocated_memory(&self) -> u64 {
        self.buffer_analytics
            .values()
            .map(|analytics| analytics.allocated_memory)
            .sum()
    }
}
