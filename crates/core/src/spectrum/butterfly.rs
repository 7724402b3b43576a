//! Butterfly (twiddle factor) table for radix-2 decimation-in-time FFTs
//!
//! Row `s` of the table serves stage `s`. Within a stage the line is cut into
//! groups of width `2·2^s`; entry `i` is the factor applied to the bottom
//! element of `i`'s butterfly pair, already negated for the bottom slot, so a
//! stage is `out[i] = src[top(i)] + table[s][i] · src[top(i) + 2^s]` for
//! every `i` without branching.

use super::Complex32;
use crate::error::{OceanError, Result};
use half::f16;
use std::f64::consts::TAU;

/// Precomputed twiddle factors for one transform size
#[derive(Debug, Clone, PartialEq)]
pub struct ButterflyTable {
    size: usize,
    stages: usize,
    /// Stage-major: `data[stage * size + index]`
    data: Vec<Complex32>,
}

impl ButterflyTable {
    /// Build the table for `map_size`-point transforms
    ///
    /// # Errors
    ///
    /// Returns `OceanError::InvalidMapSize` if `map_size` is not a power of two
    /// of at least 2.
    pub fn build(map_size: u32) -> Result<Self> {
        if !map_size.is_power_of_two() || map_size < 2 {
            return Err(OceanError::InvalidMapSize {
                map_size,
                reason: "butterfly table needs a power of two of at least 2",
            });
        }

        let size = map_size as usize;
        let stages = map_size.trailing_zeros() as usize;
        let mut data = vec![Complex32::default(); size * stages];

        for stage in 0..stages {
            let row = stage * size;
            let offset = 1usize << stage;
            let num_iterations = size / (2 * offset);

            let mut start = 0;
            let mut end = 2 * offset;
            for _ in 0..num_iterations {
                for (k, slot) in (start..end).step_by(2).enumerate() {
                    let phase = TAU * (k * num_iterations) as f64 / size as f64;
                    let (sin, cos) = phase.sin_cos();
                    let (sin, cos) = (sin as f32, cos as f32);
                    data[row + slot / 2] = Complex32::new(cos, -sin);
                    data[row + slot / 2 + offset] = Complex32::new(-cos, sin);
                }
                start += 4 * offset;
                end += 4 * offset;
            }
        }

        Ok(Self { size, stages, data })
    }

    /// Transform size the table was built for
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stages, `log2(size)`
    pub fn stages(&self) -> usize {
        self.stages
    }

    /// Twiddle factor for `index` within `stage`
    #[inline]
    pub fn twiddle(&self, stage: usize, index: usize) -> Complex32 {
        self.data[stage * self.size + index]
    }

    /// All factors of one stage
    #[inline]
    pub fn row(&self, stage: usize) -> &[Complex32] {
        &self.data[stage * self.size..(stage + 1) * self.size]
    }

    /// Pack the table as 16-bit float pairs, stage-major
    ///
    /// This is the `Rg16Float` texture layout: `size` texels wide and
    /// `stages` texels tall.
    pub fn to_half_pairs(&self) -> Vec<[f16; 2]> {
        self.data
            .iter()
            .map(|c| [f16::from_f32(c.re), f16::from_f32(c.im)])
            .collect()
    }
}
