//! 2D field storage strategies
//!
//! Every per-texel quantity (spectra, spatial maps, normals, foam) lives in a
//! square field implementing [`Field2D`]. The algorithms only see that trait,
//! so the concrete memory layout is picked once at configuration time:
//!
//! - [`LinearField`]: row-major linear buffer (`y * size + x`), the layout a
//!   host readback sees directly.
//! - [`TiledField`]: 32×32 texel tiles stored contiguously, the block layout a
//!   GPU texture uses. Rows are not contiguous, so row-major export copies.
//!
//! [`StorageLayout`] ties a layout to a field family for any element type.

use crate::error::{OceanError, Result};
use crate::grid::TILE_SIZE;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Element types a field can hold
pub trait FieldElement: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> FieldElement for T {}

/// Abstract square 2D field
///
/// Coordinates are `(x, y)` with `x` the column and `y` the row.
pub trait Field2D<T: FieldElement>: Send + Sync {
    /// Allocate a `size × size` field filled with `T::default()`
    fn new(size: usize) -> Self
    where
        Self: Sized;

    /// Field side in texels
    fn size(&self) -> usize;

    /// Read the texel at `(x, y)`
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    fn get(&self, x: usize, y: usize) -> T;

    /// Write the texel at `(x, y)`
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    fn set(&mut self, x: usize, y: usize, value: T);

    /// Export the field in row-major order
    ///
    /// Borrowed when the storage already is row-major, owned otherwise.
    fn to_row_major(&self) -> Cow<'_, [T]>;

    /// Overwrite the whole field from row-major data
    ///
    /// # Errors
    ///
    /// Returns `OceanError::SizeMismatch` if `values.len() != size²`
    fn copy_from_row_major(&mut self, values: &[T]) -> Result<()> {
        let size = self.size();
        if values.len() != size * size {
            return Err(OceanError::SizeMismatch {
                expected: size * size,
                actual: values.len(),
            });
        }
        for y in 0..size {
            for x in 0..size {
                self.set(x, y, values[y * size + x]);
            }
        }
        Ok(())
    }

    /// Fill the whole field with one value
    fn fill(&mut self, value: T);
}

/// Row-major linear field (buffer layout)
#[derive(Debug, Clone)]
pub struct LinearField<T> {
    data: Vec<T>,
    size: usize,
}

impl<T: FieldElement> LinearField<T> {
    /// Borrow the raw row-major data
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T: FieldElement> Field2D<T> for LinearField<T> {
    fn new(size: usize) -> Self {
        Self {
            data: vec![T::default(); size * size],
            size,
        }
    }

    fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn get(&self, x: usize, y: usize) -> T {
        assert!(x < self.size && y < self.size, "Coordinates out of bounds");
        self.data[y * self.size + x]
    }

    #[inline]
    fn set(&mut self, x: usize, y: usize, value: T) {
        assert!(x < self.size && y < self.size, "Coordinates out of bounds");
        self.data[y * self.size + x] = value;
    }

    fn to_row_major(&self) -> Cow<'_, [T]> {
        Cow::Borrowed(&self.data)
    }

    fn copy_from_row_major(&mut self, values: &[T]) -> Result<()> {
        if values.len() != self.data.len() {
            return Err(OceanError::SizeMismatch {
                expected: self.data.len(),
                actual: values.len(),
            });
        }
        self.data.copy_from_slice(values);
        Ok(())
    }

    fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

/// Field stored as contiguous 32×32 tiles (texture layout)
#[derive(Debug, Clone)]
pub struct TiledField<T> {
    data: Vec<T>,
    size: usize,
    tiles_per_row: usize,
}

impl<T> TiledField<T> {
    #[inline]
    fn offset(&self, x: usize, y: usize) -> usize {
        let tile = TILE_SIZE as usize;
        let tile_index = (y / tile) * self.tiles_per_row + x / tile;
        tile_index * tile * tile + (y % tile) * tile + x % tile
    }
}

impl<T: FieldElement> Field2D<T> for TiledField<T> {
    /// # Panics
    ///
    /// Panics if `size` is not a multiple of the 32 texel tile
    fn new(size: usize) -> Self {
        let tile = TILE_SIZE as usize;
        assert!(size % tile == 0, "Tiled field size must be a multiple of {tile}");
        Self {
            data: vec![T::default(); size * size],
            size,
            tiles_per_row: size / tile,
        }
    }

    fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn get(&self, x: usize, y: usize) -> T {
        assert!(x < self.size && y < self.size, "Coordinates out of bounds");
        self.data[self.offset(x, y)]
    }

    #[inline]
    fn set(&mut self, x: usize, y: usize, value: T) {
        assert!(x < self.size && y < self.size, "Coordinates out of bounds");
        let offset = self.offset(x, y);
        self.data[offset] = value;
    }

    fn to_row_major(&self) -> Cow<'_, [T]> {
        let mut out = Vec::with_capacity(self.size * self.size);
        for y in 0..self.size {
            for x in 0..self.size {
                out.push(self.data[self.offset(x, y)]);
            }
        }
        Cow::Owned(out)
    }

    fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

/// A field family with one memory layout for every element type
pub trait StorageLayout: Send + Sync + 'static {
    /// Layout name for logging
    const NAME: &'static str;

    /// Field type holding elements of type `T`
    type Field<T: FieldElement>: Field2D<T>;
}

/// Row-major linear buffers
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl StorageLayout for Linear {
    const NAME: &'static str = "linear";
    type Field<T: FieldElement> = LinearField<T>;
}

/// 32×32 tiled texture-style storage
#[derive(Debug, Clone, Copy, Default)]
pub struct Tiled;

impl StorageLayout for Tiled {
    const NAME: &'static str = "tiled";
    type Field<T: FieldElement> = TiledField<T>;
}

/// Configuration-time choice of storage layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutKind {
    /// [`Linear`] storage
    #[default]
    Linear,
    /// [`Tiled`] storage
    Tiled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_get_set() {
        let mut field: LinearField<f32> = Field2D::new(4);
        field.set(3, 1, 7.5);
        assert_eq!(field.get(3, 1), 7.5);
        // Row-major indexing
        assert_eq!(field.as_slice()[4 + 3], 7.5);
    }

    #[test]
    fn test_tiled_matches_linear_row_major() {
        let mut linear: LinearField<u32> = Field2D::new(64);
        let mut tiled: TiledField<u32> = Field2D::new(64);
        for y in 0..64 {
            for x in 0..64 {
                let v = (y * 64 + x) as u32;
                linear.set(x, y, v);
                tiled.set(x, y, v);
            }
        }
        assert_eq!(linear.to_row_major(), tiled.to_row_major());
        assert!(matches!(tiled.to_row_major(), Cow::Owned(_)));
        assert!(matches!(linear.to_row_major(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_tiles_are_contiguous() {
        let mut tiled: TiledField<u8> = Field2D::new(64);
        // Last texel of the first tile and first texel of the second tile
        tiled.set(31, 31, 1);
        tiled.set(32, 0, 2);
        assert_eq!(tiled.data[32 * 32 - 1], 1);
        assert_eq!(tiled.data[32 * 32], 2);
    }

    #[test]
    fn test_copy_from_row_major_checks_size() {
        let mut field: TiledField<f32> = Field2D::new(32);
        let err = field.copy_from_row_major(&[0.0; 10]).unwrap_err();
        assert_eq!(
            err,
            OceanError::SizeMismatch {
                expected: 1024,
                actual: 10
            }
        );

        let values: Vec<f32> = (0..1024).map(|i| i as f32).collect();
        field.copy_from_row_major(&values).unwrap();
        assert_eq!(field.get(5, 2), 69.0);
    }

    #[test]
    #[should_panic(expected = "Coordinates out of bounds")]
    fn test_out_of_bounds_panics() {
        let field: LinearField<f32> = Field2D::new(8);
        let _ = field.get(8, 0);
    }
}
