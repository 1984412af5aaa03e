use indexmap::map::{Iter, IterMut};
use indexmap::IndexMap;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use super::array::DataArray;
use super::encodings::{ArrayRetrievalError, ArrayType, BinaryCompressionType, Bytes};

/// The arrays of a spectrum, keyed by [`ArrayType`] and kept in the order they were added
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BinaryArrayMap {
    pub byte_buffer_map: IndexMap<ArrayType, DataArray>,
}

impl BinaryArrayMap {
    pub fn new() -> BinaryArrayMap {
        BinaryArrayMap {
            ..Default::default()
        }
    }

    /// Get the number of arrays in the map
    pub fn len(&self) -> usize {
        self.byte_buffer_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_buffer_map.is_empty()
    }

    /// Iterate over references to the key-value pairs of this map
    pub fn iter(&self) -> Iter<ArrayType, DataArray> {
        self.byte_buffer_map.iter()
    }

    /// Iterate over mutable references to the key-value pairs of this map
    pub fn iter_mut(&mut self) -> IterMut<ArrayType, DataArray> {
        self.byte_buffer_map.iter_mut()
    }

    /// Encode every [`DataArray`] in this map with its current tags, in map order. If there
    /// are many arrays and the `parallelism` feature is enabled, each array will be encoded
    /// on a separate thread.
    ///
    /// Each entry carries the compression the bytes were actually written with, see
    /// [`DataArray::encode_for_writing`].
    pub fn encode_all_arrays(
        &self,
    ) -> Result<Vec<(BinaryCompressionType, Bytes)>, ArrayRetrievalError> {
        #[cfg(not(feature = "parallelism"))]
        {
            self._encode_all_arrays()
        }
        #[cfg(feature = "parallelism")]
        {
            if self.len() > 2 {
                self._encode_all_arrays_parallel()
            } else {
                self._encode_all_arrays()
            }
        }
    }

    fn _encode_all_arrays(
        &self,
    ) -> Result<Vec<(BinaryCompressionType, Bytes)>, ArrayRetrievalError> {
        self.byte_buffer_map
            .values()
            .map(|v| v.encode_for_writing())
            .collect()
    }

    #[cfg(feature = "parallelism")]
    fn _encode_all_arrays_parallel(
        &self,
    ) -> Result<Vec<(BinaryCompressionType, Bytes)>, ArrayRetrievalError> {
        let arrays: Vec<&DataArray> = self.byte_buffer_map.values().collect();
        arrays.par_iter().map(|v| v.encode_for_writing()).collect()
    }

    /// Add a [`DataArray`] to the map by its [`ArrayType`] name, replacing any array
    /// of the same name in place
    pub fn add(&mut self, array: DataArray) {
        self.byte_buffer_map.insert(array.name.clone(), array);
    }

    /// Get a reference to a specific [`DataArray`] if present
    pub fn get(&self, array_type: &ArrayType) -> Option<&DataArray> {
        self.byte_buffer_map.get(array_type)
    }

    /// Get a mutable reference to a specific [`DataArray`] if present
    pub fn get_mut(&mut self, array_type: &ArrayType) -> Option<&mut DataArray> {
        self.byte_buffer_map.get_mut(array_type)
    }

    /// Check whether a specific [`ArrayType`] is present
    pub fn has_array(&self, array_type: &ArrayType) -> bool {
        self.byte_buffer_map.contains_key(array_type)
    }

    /// Remove an array, preserving the order of the others
    pub fn remove(&mut self, array_type: &ArrayType) -> Option<DataArray> {
        self.byte_buffer_map.shift_remove(array_type)
    }

    /// Drop every array for which `f` returns `false`
    pub fn retain<F: FnMut(&ArrayType, &mut DataArray) -> bool>(&mut self, f: F) {
        self.byte_buffer_map.retain(f)
    }

    /// Clear the map, discarding any array data
    pub fn clear(&mut self) {
        self.byte_buffer_map.clear();
    }

    pub fn mzs(&self) -> Result<&[f64], ArrayRetrievalError> {
        self.get(&ArrayType::MZArray)
            .map(|a| a.values())
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::MZArray))
    }

    pub fn mzs_mut(&mut self) -> Result<&mut Vec<f64>, ArrayRetrievalError> {
        self.get_mut(&ArrayType::MZArray)
            .map(|a| a.values_mut())
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::MZArray))
    }

    pub fn intensities(&self) -> Result<&[f64], ArrayRetrievalError> {
        self.get(&ArrayType::IntensityArray)
            .map(|a| a.values())
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::IntensityArray))
    }

    pub fn intensities_mut(&mut self) -> Result<&mut Vec<f64>, ArrayRetrievalError> {
        self.get_mut(&ArrayType::IntensityArray)
            .map(|a| a.values_mut())
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::IntensityArray))
    }

    /// The length shared by the m/z array and the other arrays, or of the first array
    /// if there is no m/z array
    pub fn default_length(&self) -> usize {
        self.get(&ArrayType::MZArray)
            .or_else(|| self.byte_buffer_map.values().next())
            .map(|a| a.len())
            .unwrap_or_default()
    }

    /// Apply `mask` to every array whose length equals the mask's length, keeping the
    /// positions where `mask` is `true`. Arrays of any other length are left untouched.
    pub fn retain_mask(&mut self, mask: &[bool]) {
        for (_, array) in self.iter_mut() {
            if array.len() == mask.len() {
                array.retain_mask(mask);
            }
        }
    }
}
