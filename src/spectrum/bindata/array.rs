use std::fmt::{self, Formatter};

use crate::params::{Param, ParamList, Unit};

use super::codec;
use super::encodings::{
    ArrayRetrievalError, ArrayType, BinaryCompressionType, BinaryDataArrayType, Bytes,
};

/// A decoded data array together with the encoding it will be written with.
///
/// This type is modeled after the `<binaryDataArray>` element in mzML. The values are
/// always held as `f64` in memory, already reduced to the precision of [`DataArray::dtype`],
/// while [`DataArray::compression`] only describes how the array is written next.
///
/// Changing the encoding is cheap: [`DataArray::store_compressed`] only retags the array, and
/// [`DataArray::store_as`] reduces the values to the new width so that later operations see
/// exactly what will be written.
#[derive(Default, Clone, PartialEq)]
pub struct DataArray {
    pub name: ArrayType,
    pub dtype: BinaryDataArrayType,
    pub compression: BinaryCompressionType,
    pub unit: Unit,
    /// Any additional parameters of the array beyond its name, width and compression
    pub params: Option<Box<ParamList>>,
    pub data_processing_reference: Option<Box<str>>,
    values: Vec<f64>,
}

impl fmt::Debug for DataArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataArray")
            .field("name", &self.name)
            .field("size", &self.values.len())
            .field("dtype", &self.dtype)
            .field("compression", &self.compression)
            .field("params", &self.params)
            .field("unit", &self.unit)
            .finish()
    }
}

impl DataArray {
    pub fn new() -> DataArray {
        DataArray {
            ..Default::default()
        }
    }

    pub fn from_name(name: &ArrayType) -> DataArray {
        DataArray {
            dtype: name.preferred_dtype(),
            name: name.clone(),
            unit: name.default_unit(),
            ..Default::default()
        }
    }

    /// Wrap `values` as an array of `name` stored at `dtype`. The values are reduced to the
    /// precision of `dtype`.
    pub fn wrap(name: &ArrayType, dtype: BinaryDataArrayType, values: Vec<f64>) -> DataArray {
        let mut array = DataArray {
            dtype,
            name: name.clone(),
            unit: name.default_unit(),
            values,
            ..Default::default()
        };
        array.reduce_values();
        array
    }

    /// Decode the raw (already base64-decoded) `bytes` of an array stored at `dtype` under
    /// `compression`. The array keeps both tags, so writing it back uses the same encoding.
    pub fn decode_from(
        name: &ArrayType,
        dtype: BinaryDataArrayType,
        compression: BinaryCompressionType,
        bytes: &[u8],
    ) -> Result<DataArray, ArrayRetrievalError> {
        let values = codec::decode(bytes, &dtype, compression)?;
        Ok(DataArray {
            dtype,
            compression,
            name: name.clone(),
            unit: name.default_unit(),
            values,
            ..Default::default()
        })
    }

    /// Encode the values to raw bytes with the current width and compression
    pub fn encode(&self) -> Result<Bytes, ArrayRetrievalError> {
        codec::encode(&self.values, self.dtype, self.compression)
    }

    /// Encode the values for writing, returning the compression the bytes were actually
    /// encoded with.
    ///
    /// When a numpress scheme cannot hold these values within its error bound the array is
    /// written with zlib instead, so nothing is lost beyond the precision of the data type.
    pub fn encode_for_writing(
        &self,
    ) -> Result<(BinaryCompressionType, Bytes), ArrayRetrievalError> {
        match self.encode() {
            Ok(bytes) => Ok((self.compression, bytes)),
            Err(ArrayRetrievalError::NumpressOutOfRange { reason, .. }) => {
                log::debug!(
                    "Writing the {} with zlib compression instead of {}: {reason}",
                    self.name,
                    self.compression
                );
                let compression = BinaryCompressionType::Zlib;
                let bytes = codec::encode(&self.values, self.dtype, compression)?;
                Ok((compression, bytes))
            }
            Err(e) => Err(e),
        }
    }

    /// Encode the values and wrap them in base64, as they appear in a `<binary>` element
    pub fn encode_base64(&self) -> Result<String, ArrayRetrievalError> {
        let bytes = self.encode()?;
        Ok(base64_simd::STANDARD.encode_type::<String>(&bytes))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable access to the values. Values written through this slice are cast to
    /// [`DataArray::dtype`] when the array is encoded.
    pub fn values_mut(&mut self) -> &mut Vec<f64> {
        &mut self.values
    }

    pub fn set_values(&mut self, values: Vec<f64>) {
        self.values = values;
        self.reduce_values();
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Retag the array to be written with `compression`
    pub fn store_compressed(&mut self, compression: BinaryCompressionType) {
        self.compression = compression;
    }

    /// Retag the array to be written at `dtype`, reducing the stored values to that width
    pub fn store_as(&mut self, dtype: BinaryDataArrayType) {
        if self.dtype == dtype {
            return;
        }
        self.dtype = dtype;
        self.reduce_values();
    }

    /// Keep only the values where `mask` is `true`, preserving their order
    pub fn retain_mask(&mut self, mask: &[bool]) {
        let mut it = mask.iter();
        self.values.retain(|_| it.next().copied().unwrap_or(false));
    }

    pub fn add_param(&mut self, param: Param) {
        self.params.get_or_insert_with(Default::default).push(param);
    }

    fn reduce_values(&mut self) {
        if matches!(
            self.dtype,
            BinaryDataArrayType::Float64 | BinaryDataArrayType::Unknown
        ) {
            return;
        }
        let dtype = self.dtype;
        self.values
            .iter_mut()
            .for_each(|v| *v = dtype.reduce_precision(*v));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_roundtrip() -> Result<(), ArrayRetrievalError> {
        let values: Vec<f64> = (0..64).map(|i| 300.0 + i as f64 * 0.25).collect();
        let mut da = DataArray::wrap(
            &ArrayType::MZArray,
            BinaryDataArrayType::Float64,
            values.clone(),
        );
        da.store_compressed(BinaryCompressionType::Zlib);
        let bytes = da.encode()?;
        let dup = DataArray::decode_from(
            &ArrayType::MZArray,
            BinaryDataArrayType::Float64,
            BinaryCompressionType::Zlib,
            &bytes,
        )?;
        assert_eq!(dup.values(), values.as_slice());
        assert_eq!(dup.compression, BinaryCompressionType::Zlib);
        assert_eq!(dup.unit, Unit::MZ);
        Ok(())
    }

    #[test]
    fn test_unrepresentable_numpress_falls_back() -> Result<(), ArrayRetrievalError> {
        let values = vec![-12.5, 0.25, 40.0, 5e9];
        let mut da = DataArray::wrap(
            &ArrayType::IntensityArray,
            BinaryDataArrayType::Float64,
            values.clone(),
        );
        da.store_compressed(BinaryCompressionType::NumpressSLOF);
        assert!(matches!(
            da.encode(),
            Err(ArrayRetrievalError::NumpressOutOfRange { .. })
        ));
        let (compression, bytes) = da.encode_for_writing()?;
        assert_eq!(compression, BinaryCompressionType::Zlib);
        let dup = DataArray::decode_from(
            &ArrayType::IntensityArray,
            BinaryDataArrayType::Float64,
            compression,
            &bytes,
        )?;
        assert_eq!(dup.values(), values.as_slice());

        let positive: Vec<f64> = values.iter().map(|v| v.abs()).collect();
        da.set_values(positive);
        let (compression, _) = da.encode_for_writing()?;
        assert_eq!(compression, BinaryCompressionType::NumpressSLOF);
        Ok(())
    }

    #[test]
    fn test_store_as() {
        let mut da = DataArray::wrap(
            &ArrayType::IntensityArray,
            BinaryDataArrayType::Float64,
            vec![1.7, 0.1, -3.9],
        );
        da.store_as(BinaryDataArrayType::Float32);
        assert_eq!(da.values()[1], 0.1f32 as f64);
        da.store_as(BinaryDataArrayType::Int32);
        assert_eq!(da.values(), &[1.0, 0.0, -3.0]);
    }

    #[test]
    fn test_base64() -> Result<(), ArrayRetrievalError> {
        let da = DataArray::wrap(
            &ArrayType::IntensityArray,
            BinaryDataArrayType::Float32,
            vec![1.0, 2.0],
        );
        assert_eq!(da.encode_base64()?, "AACAPwAAAEA=");
        Ok(())
    }

    #[test]
    fn test_retain_mask() {
        let mut da = DataArray::wrap(
            &ArrayType::ChargeArray,
            BinaryDataArrayType::Int32,
            vec![1.0, 2.0, 3.0, 4.0],
        );
        da.retain_mask(&[true, false, false, true]);
        assert_eq!(da.values(), &[1.0, 4.0]);
        assert_eq!(da.len(), 2);
    }
}
