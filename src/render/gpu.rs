// SPDX-License-Identifier: GPL-3.0-only

//! GPU texture upload for rendered frames.
//!
//! Creates a standalone wgpu device and keeps one `wgpu::Texture` per slot,
//! reallocated only when the frame size or pixel format changes.

use super::texture_cache::FrameTexture;
use crate::backends::camera::types::{CameraPosition, PixelFormat};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub use wgpu_compute as wgpu;

/// Information about the created GPU device
#[derive(Debug)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
}

/// Create a wgpu device and queue for texture uploads
pub async fn create_device(
    label: &str,
) -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>, GpuDeviceInfo), String> {
    info!(label = label, "Creating GPU device for texture upload");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::VULKAN,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| format!("Failed to find suitable GPU adapter: {}", e))?;

    let adapter_info = adapter.get_info();
    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| format!("Failed to create GPU device: {}", e))?;

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
    };

    Ok((Arc::new(device), Arc::new(queue), info))
}

/// Blocking wrapper for callers without an executor
pub fn create_device_blocking(
    label: &str,
) -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>, GpuDeviceInfo), String> {
    pollster::block_on(create_device(label))
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn allocate(
    device: &wgpu::Device,
    position: CameraPosition,
    size: wgpu::Extent3d,
    format: wgpu::TextureFormat,
) -> SlotTexture {
    debug!(%position, width = size.width, height = size.height, "Allocating GPU texture");
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("frame_texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    SlotTexture {
        texture,
        size,
        format,
        // Forces the first upload
        generation: u64::MAX,
    }
}

struct SlotTexture {
    texture: wgpu::Texture,
    size: wgpu::Extent3d,
    format: wgpu::TextureFormat,
    generation: u64,
}

/// Copies mapped frames into sampleable GPU textures
pub struct GpuTextureUploader {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    textures: HashMap<CameraPosition, SlotTexture>,
}

impl GpuTextureUploader {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            textures: HashMap::new(),
        }
    }

    /// Upload `frame` into the texture for `position`; unchanged frames
    /// are not uploaded again
    pub fn upload(&mut self, position: CameraPosition, frame: &FrameTexture) -> &wgpu::Texture {
        let size = wgpu::Extent3d {
            width: frame.width(),
            height: frame.height(),
            depth_or_array_layers: 1,
        };
        let format = texture_format(frame.format());

        let device = &self.device;
        let slot = self
            .textures
            .entry(position)
            .or_insert_with(|| allocate(device, position, size, format));
        if slot.size != size || slot.format != format {
            *slot = allocate(device, position, size, format);
        }

        let queue = &self.queue;
        if slot.generation != frame.generation() {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &slot.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                frame.pixels(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(frame.stride()),
                    rows_per_image: Some(frame.height()),
                },
                size,
            );
            slot.generation = frame.generation();
        }
        &slot.texture
    }

    /// Drop every GPU texture
    pub fn clear(&mut self) {
        self.textures.clear();
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_formats() {
        assert_eq!(
            texture_format(PixelFormat::Bgra8),
            wgpu::TextureFormat::Bgra8Unorm
        );
        assert_eq!(
            texture_format(PixelFormat::Rgba8),
            wgpu::TextureFormat::Rgba8Unorm
        );
    }

    #[tokio::test]
    async fn test_create_device() {
        // Needs a Vulkan adapter, so it is skipped on machines without one
        match create_device("test_device").await {
            Ok((device, queue, info)) => {
                assert!(!info.adapter_name.is_empty());
                let mut uploader = GpuTextureUploader::new(device, queue);
                assert!(uploader.is_empty());
                uploader.clear();
            }
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
            }
        }
    }
}
