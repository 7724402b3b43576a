//! Separable 2D FFT driven by the butterfly table
//!
//! Every stage computes each output independently:
//!
//! ```text
//! span = 2^stage
//! top  = (i / 2·span)·2·span + i mod span
//! out[i] = src[top] + w(stage, i) · src[top + span]
//! ```
//!
//! Stage 0 reads its source in bit-reversed order. The inverse direction uses
//! conjugated twiddles and no normalization, matching the spectrum scaling.
//!
//! The 2D inverse is a row pass into a scratch field followed by a column pass
//! out of it. The column pass only starts once every row has been written.
//! Because the spectrum is centered on `N/2`, the spatial result carries a
//! `(−1)^(x+y)` checkerboard that the column pass removes while taking the
//! real part.

use crate::error::{OceanError, Result};
use crate::field::Field2D;
use crate::spectrum::{ButterflyTable, Complex32};
use rayon::prelude::*;

/// Transform direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `X[k] = Σ x[n]·e^{−2πikn/N}`
    Forward,
    /// `x[n] = Σ X[k]·e^{+2πikn/N}` (unnormalized)
    Inverse,
}

/// Reverse the low `bits` bits of `index`
#[inline]
pub fn reverse_bits(index: usize, bits: usize) -> usize {
    if bits == 0 {
        return 0;
    }
    index.reverse_bits() >> (usize::BITS as usize - bits)
}

/// Transform one line of `table.size()` samples
///
/// # Panics
///
/// Panics if `input.len()` differs from the table size
pub fn transform_line(
    input: &[Complex32],
    table: &ButterflyTable,
    direction: Direction,
) -> Vec<Complex32> {
    let n = table.size();
    let bits = table.stages();
    assert_eq!(input.len(), n, "Line length must match the butterfly table");

    let mut src: Vec<Complex32> = (0..n).map(|i| input[reverse_bits(i, bits)]).collect();
    let mut dst = vec![Complex32::default(); n];

    for stage in 0..bits {
        let span = 1usize << stage;
        let twiddles = table.row(stage);
        for (i, out) in dst.iter_mut().enumerate() {
            let top = (i / (2 * span)) * 2 * span + i % span;
            let w = match direction {
                Direction::Forward => twiddles[i],
                Direction::Inverse => twiddles[i].conj(),
            };
            *out = src[top] + w * src[top + span];
        }
        std::mem::swap(&mut src, &mut dst);
    }

    src
}

fn check_size(table: &ButterflyTable, actual: usize) -> Result<()> {
    if actual == table.size() {
        Ok(())
    } else {
        Err(OceanError::SizeMismatch {
            expected: table.size(),
            actual,
        })
    }
}

/// Inverse 2D FFT of a centered spectrum into a real spatial field
///
/// # Arguments
///
/// * `spectrum` - Complex spectrum, DC at `(N/2, N/2)`
/// * `scratch` - Intermediate field written by the row pass
/// * `output` - Real spatial field written by the column pass
/// * `table` - Butterfly table built for `N`
///
/// # Errors
///
/// Returns `OceanError::SizeMismatch` if any field differs from the table size.
pub fn inverse_fft_2d<C, R>(
    spectrum: &C,
    scratch: &mut C,
    output: &mut R,
    table: &ButterflyTable,
) -> Result<()>
where
    C: Field2D<Complex32>,
    R: Field2D<f32>,
{
    check_size(table, spectrum.size())?;
    check_size(table, scratch.size())?;
    check_size(table, output.size())?;
    let n = table.size();

    // Pass 1: rows
    let rows: Vec<Vec<Complex32>> = (0..n)
        .into_par_iter()
        .map(|y| {
            let line: Vec<Complex32> = (0..n).map(|x| spectrum.get(x, y)).collect();
            transform_line(&line, table, Direction::Inverse)
        })
        .collect();
    for (y, row) in rows.iter().enumerate() {
        for (x, value) in row.iter().enumerate() {
            scratch.set(x, y, *value);
        }
    }

    // Pass 2: columns, strictly after every row has landed in scratch
    let intermediate: &C = scratch;
    let columns: Vec<Vec<Complex32>> = (0..n)
        .into_par_iter()
        .map(|x| {
            let line: Vec<Complex32> = (0..n).map(|y| intermediate.get(x, y)).collect();
            transform_line(&line, table, Direction::Inverse)
        })
        .collect();
    for (x, column) in columns.iter().enumerate() {
        for (y, value) in column.iter().enumerate() {
            let sign = if (x + y) % 2 == 0 { 1.0 } else { -1.0 };
            output.set(x, y, sign * value.re);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{LinearField, TiledField};
    use approx::assert_relative_eq;
    use std::f32::consts::TAU;

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b001, 3), 0b100);
        assert_eq!(reverse_bits(0b110, 3), 0b011);
        assert_eq!(reverse_bits(5, 0), 0);
    }

    #[test]
    fn test_impulse_transforms_to_constant() {
        let table = ButterflyTable::build(16).unwrap();
        let mut input = vec![Complex32::default(); 16];
        input[0] = Complex32::new(1.0, 0.0);
        for value in transform_line(&input, &table, Direction::Forward) {
            assert_relative_eq!(value.re, 1.0, epsilon = 1e-6);
            assert_relative_eq!(value.im, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_forward_then_inverse_scales_by_n() {
        let table = ButterflyTable::build(64).unwrap();
        let input: Vec<Complex32> = (0..64)
            .map(|i| Complex32::new((i as f32 * 0.37).sin(), (i as f32 * 0.11).cos()))
            .collect();
        let spectrum = transform_line(&input, &table, Direction::Forward);
        let back = transform_line(&spectrum, &table, Direction::Inverse);
        for (a, b) in input.iter().zip(&back) {
            assert_relative_eq!(a.re * 64.0, b.re, epsilon = 1e-3);
            assert_relative_eq!(a.im * 64.0, b.im, epsilon = 1e-3);
        }
    }

    fn single_bin<F: Field2D<Complex32>>(n: usize, bin_x: usize, bin_y: usize) -> F {
        let mut field = F::new(n);
        field.set(bin_x, bin_y, Complex32::new(1.0, 0.0));
        field
    }

    #[test]
    fn test_single_bin_reproduces_cosine() {
        let n = 32;
        let table = ButterflyTable::build(n as u32).unwrap();
        // Three cycles along x, one along y
        let spectrum: LinearField<Complex32> = single_bin(n, n / 2 + 3, n / 2 + 1);
        let mut scratch: LinearField<Complex32> = Field2D::new(n);
        let mut output: LinearField<f32> = Field2D::new(n);
        inverse_fft_2d(&spectrum, &mut scratch, &mut output, &table).unwrap();

        for y in 0..n {
            for x in 0..n {
                let expected = (TAU * (3 * x + y) as f32 / n as f32).cos();
                assert_relative_eq!(output.get(x, y), expected, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_dc_bin_is_constant() {
        let n = 32;
        let table = ButterflyTable::build(n as u32).unwrap();
        let mut spectrum: LinearField<Complex32> = Field2D::new(n);
        spectrum.set(n / 2, n / 2, Complex32::new(2.5, 0.0));
        let mut scratch: LinearField<Complex32> = Field2D::new(n);
        let mut output: LinearField<f32> = Field2D::new(n);
        inverse_fft_2d(&spectrum, &mut scratch, &mut output, &table).unwrap();
        for value in output.as_slice() {
            assert_relative_eq!(*value, 2.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_tiled_storage_matches_linear() {
        let n = 64;
        let table = ButterflyTable::build(n as u32).unwrap();
        let mut linear: LinearField<Complex32> = Field2D::new(n);
        let mut tiled: TiledField<Complex32> = Field2D::new(n);
        for y in 0..n {
            for x in 0..n {
                let v = Complex32::new(((x * 7 + y * 3) % 11) as f32, ((x + y * 5) % 7) as f32);
                linear.set(x, y, v);
                tiled.set(x, y, v);
            }
        }

        let mut linear_scratch: LinearField<Complex32> = Field2D::new(n);
        let mut linear_out: LinearField<f32> = Field2D::new(n);
        inverse_fft_2d(&linear, &mut linear_scratch, &mut linear_out, &table).unwrap();

        let mut tiled_scratch: TiledField<Complex32> = Field2D::new(n);
        let mut tiled_out: TiledField<f32> = Field2D::new(n);
        inverse_fft_2d(&tiled, &mut tiled_scratch, &mut tiled_out, &table).unwrap();

        assert_eq!(linear_out.to_row_major(), tiled_out.to_row_major());
    }

    #[test]
    fn test_table_size_mismatch_is_error() {
        let table = ButterflyTable::build(64).unwrap();
        let spectrum: LinearField<Complex32> = Field2D::new(32);
        let mut scratch: LinearField<Complex32> = Field2D::new(32);
        let mut output: LinearField<f32> = Field2D::new(32);
        let err = inverse_fft_2d(&spectrum, &mut scratch, &mut output, &table).unwrap_err();
        assert_eq!(
            err,
            OceanError::SizeMismatch {
                expected: 64,
                actual: 32
            }
        );
    }
}
