//! Frequency-domain side of the ocean
//!
//! - [`butterfly`]: radix-2 twiddle table shared by row and column FFT passes
//! - [`phillips`]: initial Phillips spectrum H0 from wind and domain size
//! - [`evolve`]: per-frame time evolution into height and choppy displacement spectra

pub mod butterfly;
pub mod evolve;
pub mod phillips;

pub use butterfly::ButterflyTable;
pub use evolve::{dispersion, evolve_spectrum, evolve_texel, EvolvedTexel};
pub use phillips::{phillips, InitialSpectrum, SpectrumParams};

use bytemuck::{Pod, Zeroable};
pub use num_complex::Complex32;

/// One texel of the initial spectrum
///
/// Holds `h0(k)` and `conj(h0(−k))` side by side so evolution never needs a
/// second, mirrored read.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SpectrumTexel {
    /// Amplitude at `k`
    pub h0: Complex32,
    /// Conjugated amplitude at `−k`
    pub h0_minus_k_conj: Complex32,
}
