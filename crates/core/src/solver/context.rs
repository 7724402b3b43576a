//! GPU context and initialization
//!
//! This module handles GPU device initialization and capability detection.
//! It distinguishes between "no GPU found" (expected on headless machines)
//! and "GPU found but failed to initialize" (worth a warning).

/// Result of GPU initialization attempt
///
/// This enum distinguishes between different failure modes:
/// - `NoGpuFound`: No compatible GPU adapter (silent fallback to CPU)
/// - `InitFailed`: GPU found but initialization failed (log warning)
#[derive(Debug)]
pub enum GpuInitResult {
    /// GPU initialized successfully
    #[cfg(feature = "gpu")]
    Success(GpuContext),
    /// No GPU adapter found (silent fallback to CPU)
    NoGpuFound,
    /// GPU found but initialization failed (log warning, fallback to CPU)
    InitFailed {
        /// Name of the adapter that failed
        adapter_name: String,
        /// Error message
        error: String,
    },
}

#[cfg(feature = "gpu")]
mod gpu_impl {
    use super::GpuInitResult;
    use tracing::{debug, info};

    /// Bytes per texel summed over every GPU field: H0 (16), three spectra
    /// (24), two FFT ping-pong buffers (16), three spatial maps (12), normal
    /// (8), foam (4), plus the normal-sized readback staging buffer (8)
    const BYTES_PER_TEXEL: u64 = 88;

    /// GPU context managing device and queue
    ///
    /// Wraps wgpu device and queue along with adapter information.
    #[derive(Debug)]
    pub struct GpuContext {
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter_info: wgpu::AdapterInfo,
    }

    impl GpuContext {
        /// Initialize GPU context
        ///
        /// # Returns
        ///
        /// - `GpuInitResult::Success` - GPU ready to use
        /// - `GpuInitResult::NoGpuFound` - No compatible GPU adapter
        /// - `GpuInitResult::InitFailed` - GPU found but initialization failed
        #[expect(clippy::new_ret_no_self)]
        pub fn new() -> GpuInitResult {
            info!("Attempting to initialize GPU context");

            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let adapter = if let Some(a) =
                pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })) {
                debug!("Found GPU adapter: {}", a.get_info().name);
                a
            } else {
                debug!("No GPU adapter found");
                return GpuInitResult::NoGpuFound;
            };

            let adapter_info = adapter.get_info();
            let adapter_name = adapter_info.name.clone();

            // Device creation can fail even with a valid adapter
            match pollster::block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Ocean GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )) {
                Ok((device, queue)) => {
                    info!("GPU context initialized successfully: {}", adapter_name);
                    GpuInitResult::Success(Self {
                        device,
                        queue,
                        adapter_info,
                    })
                }
                Err(e) => {
                    debug!("Failed to create GPU device: {}", e);
                    GpuInitResult::InitFailed {
                        adapter_name,
                        error: e.to_string(),
                    }
                }
            }
        }

        /// Get adapter name for logging
        #[must_use]
        pub fn adapter_name(&self) -> &str {
            &self.adapter_info.name
        }

        /// Check if the device can hold every field of a `map_size` grid
        ///
        /// # Arguments
        ///
        /// * `map_size` - Grid side in texels
        ///
        /// # Returns
        ///
        /// `true` if the grid fits the texture and buffer limits
        #[must_use]
        pub fn can_allocate(&self, map_size: u32) -> bool {
            let limits = self.device.limits();
            if map_size > limits.max_texture_dimension_2d {
                return false;
            }

            let texels = u64::from(map_size) * u64::from(map_size);
            // Largest single buffer is H0 at 16 bytes per texel
            if texels * 16 > u64::from(limits.max_storage_buffer_binding_size) {
                return false;
            }

            // Leave half of the buffer limit as headroom for the renderer
            texels * BYTES_PER_TEXEL < limits.max_buffer_size / 2
        }

        /// Get reference to wgpu device
        #[must_use]
        pub fn device(&self) -> &wgpu::Device {
            &self.device
        }

        /// Get reference to wgpu queue
        #[must_use]
        pub fn queue(&self) -> &wgpu::Queue {
            &self.queue
        }

        /// Hand the device and queue over to a solver
        #[must_use]
        pub fn into_device_queue(self) -> (wgpu::Device, wgpu::Queue, wgpu::AdapterInfo) {
            (self.device, self.queue, self.adapter_info)
        }
    }

}

#[cfg(feature = "gpu")]
pub use gpu_impl::GpuContext;
