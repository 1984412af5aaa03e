//! Translate between logical `f64` sequences and the byte strings stored in a
//! `<binaryDataArray>`, before base64 encoding.
use std::io::prelude::*;

use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use num_traits::{AsPrimitive, FromBytes, ToBytes};

use super::encodings::{ArrayRetrievalError, BinaryCompressionType, BinaryDataArrayType, Bytes};

/// Decode `bytes` stored at width `dtype` under `compression` into values.
///
/// An empty byte string is an empty array regardless of the encoding.
pub fn decode(
    bytes: &[u8],
    dtype: &BinaryDataArrayType,
    compression: BinaryCompressionType,
) -> Result<Vec<f64>, ArrayRetrievalError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut values = match compression {
        BinaryCompressionType::NoCompression => return unpack_values(bytes, dtype),
        BinaryCompressionType::Zlib => {
            let inflated = decompress_zlib(bytes)?;
            return unpack_values(&inflated, dtype);
        }
        BinaryCompressionType::NumpressLinear => decompress_numpress_linear(bytes)?,
        BinaryCompressionType::NumpressPIC => decompress_numpress_pic(bytes)?,
        BinaryCompressionType::NumpressSLOF => decompress_numpress_slof(bytes)?,
        BinaryCompressionType::NumpressLinearZlib => {
            decompress_numpress_linear(&decompress_zlib(bytes)?)?
        }
        BinaryCompressionType::NumpressPICZlib => {
            decompress_numpress_pic(&decompress_zlib(bytes)?)?
        }
        BinaryCompressionType::NumpressSLOFZlib => {
            decompress_numpress_slof(&decompress_zlib(bytes)?)?
        }
        BinaryCompressionType::LinearPrediction | BinaryCompressionType::DeltaPrediction => {
            return Err(ArrayRetrievalError::UnsupportedCompression(compression))
        }
    };
    if !matches!(dtype, BinaryDataArrayType::Float64 | BinaryDataArrayType::Unknown) {
        values
            .iter_mut()
            .for_each(|v| *v = dtype.reduce_precision(*v));
    }
    Ok(values)
}

/// Encode `values` at width `dtype` under `compression`.
///
/// Values are cast to `dtype` first. For the numpress schemes the reduced values are
/// compressed with the optimal fixed point for the array. A numpress scheme that cannot
/// reproduce the values within [`BinaryCompressionType::error_bound`] fails with
/// [`ArrayRetrievalError::NumpressOutOfRange`] instead of losing them.
pub fn encode(
    values: &[f64],
    dtype: BinaryDataArrayType,
    compression: BinaryCompressionType,
) -> Result<Bytes, ArrayRetrievalError> {
    let reduced = || -> Vec<f64> { values.iter().map(|v| dtype.reduce_precision(*v)).collect() };
    match compression {
        BinaryCompressionType::NoCompression => pack_values(values, dtype),
        BinaryCompressionType::Zlib => compress_zlib(&pack_values(values, dtype)?),
        BinaryCompressionType::NumpressLinear => compress_numpress_linear(&reduced()),
        BinaryCompressionType::NumpressPIC => compress_numpress_pic(&reduced()),
        BinaryCompressionType::NumpressSLOF => compress_numpress_slof(&reduced()),
        BinaryCompressionType::NumpressLinearZlib => {
            compress_zlib(&compress_numpress_linear(&reduced())?)
        }
        BinaryCompressionType::NumpressPICZlib => {
            compress_zlib(&compress_numpress_pic(&reduced())?)
        }
        BinaryCompressionType::NumpressSLOFZlib => {
            compress_zlib(&compress_numpress_slof(&reduced())?)
        }
        BinaryCompressionType::LinearPrediction | BinaryCompressionType::DeltaPrediction => {
            Err(ArrayRetrievalError::UnsupportedCompression(compression))
        }
    }
}

fn out_of_range(compression: BinaryCompressionType, reason: String) -> ArrayRetrievalError {
    ArrayRetrievalError::NumpressOutOfRange {
        compression,
        reason,
    }
}

pub fn compress_numpress_linear(data: &[f64]) -> Result<Bytes, ArrayRetrievalError> {
    let compression = BinaryCompressionType::NumpressLinear;
    if let Some(v) = data.iter().find(|v| !v.is_finite()) {
        return Err(out_of_range(compression, format!("{v} is not finite")));
    }
    let scaling = numpress::optimal_scaling(data);
    if !data.is_empty() && !(scaling.is_finite() && scaling > 0.0) {
        return Err(out_of_range(
            compression,
            format!("no usable fixed point, found {scaling}"),
        ));
    }
    // The first two values are stored as unsigned 32-bit integers
    for v in data.iter().take(2) {
        let seed = v * scaling + 0.5;
        if !(0.0..4294967296.0).contains(&seed) {
            return Err(out_of_range(
                compression,
                format!("{v} cannot start the sequence at fixed point {scaling}"),
            ));
        }
    }
    Ok(numpress::numpress_compress(data, scaling)?)
}

pub fn compress_numpress_slof(data: &[f64]) -> Result<Bytes, ArrayRetrievalError> {
    if let Some(v) = data.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
        return Err(out_of_range(
            BinaryCompressionType::NumpressSLOF,
            format!("{v} is negative or not finite"),
        ));
    }
    let scaling = numpress::optimal_slof_fixed_point(data);
    let mut buf = Bytes::new();
    numpress::encode_slof(data, &mut buf, scaling)?;
    Ok(buf)
}

pub fn compress_numpress_pic(data: &[f64]) -> Result<Bytes, ArrayRetrievalError> {
    // values are rounded half up into a u32
    if let Some(v) = data
        .iter()
        .find(|v| !(v.is_finite() && (0.0..4294967296.0).contains(&(**v + 0.5))))
    {
        return Err(out_of_range(
            BinaryCompressionType::NumpressPIC,
            format!("{v} does not round to an unsigned 32-bit integer"),
        ));
    }
    let mut buf = Bytes::new();
    numpress::encode_pic(data, &mut buf)?;
    Ok(buf)
}

pub fn decompress_numpress_linear(data: &[u8]) -> Result<Vec<f64>, ArrayRetrievalError> {
    if data.len() < 8 {
        return Err(ArrayRetrievalError::NumpressTruncated(format!(
            "{} bytes cannot hold the fixed point",
            data.len()
        )));
    }
    Ok(numpress::numpress_decompress(data)?)
}

pub fn decompress_numpress_slof(data: &[u8]) -> Result<Vec<f64>, ArrayRetrievalError> {
    if data.len() < 8 || (data.len() - 8) % 2 != 0 {
        return Err(ArrayRetrievalError::NumpressTruncated(format!(
            "{} bytes is not a fixed point followed by 16-bit values",
            data.len()
        )));
    }
    let mut values = Vec::with_capacity((data.len() - 8) / 2);
    numpress::decode_slof(data, &mut values)?;
    Ok(values)
}

pub fn decompress_numpress_pic(data: &[u8]) -> Result<Vec<f64>, ArrayRetrievalError> {
    let mut values = Vec::new();
    numpress::decode_pic(data, &mut values)?;
    Ok(values)
}

pub fn compress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
    let mut compressor = ZlibEncoder::new(Bytes::new(), Compression::best());
    compressor
        .write_all(bytestring)
        .and_then(|_| compressor.finish())
        .map_err(|e| ArrayRetrievalError::DecompressionError(format!("deflate failed: {e}")))
}

pub fn decompress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
    let mut decompressor = ZlibDecoder::new(Bytes::new());
    decompressor
        .write_all(bytestring)
        .and_then(|_| decompressor.finish())
        .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))
}

fn unpack<T, const N: usize>(bytes: &[u8]) -> Result<Vec<f64>, ArrayRetrievalError>
where
    T: FromBytes<Bytes = [u8; N]> + AsPrimitive<f64>,
{
    if bytes.len() % N != 0 {
        return Err(ArrayRetrievalError::DataTypeSizeMismatch {
            length: bytes.len(),
            width: N,
        });
    }
    Ok(bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut buf = [0u8; N];
            buf.copy_from_slice(chunk);
            T::from_le_bytes(&buf).as_()
        })
        .collect())
}

fn pack<T, const N: usize>(values: &[f64]) -> Bytes
where
    T: ToBytes<Bytes = [u8; N]> + Copy + 'static,
    f64: AsPrimitive<T>,
{
    let mut buffer = Bytes::with_capacity(values.len() * N);
    for v in values {
        let v: T = v.as_();
        buffer.extend_from_slice(&v.to_le_bytes());
    }
    buffer
}

fn unpack_values(
    bytes: &[u8],
    dtype: &BinaryDataArrayType,
) -> Result<Vec<f64>, ArrayRetrievalError> {
    match dtype {
        BinaryDataArrayType::Float64 => {
            if cfg!(target_endian = "little") && bytes.len() % 8 == 0 {
                Ok(bytemuck::pod_collect_to_vec::<u8, f64>(bytes))
            } else {
                unpack::<f64, 8>(bytes)
            }
        }
        BinaryDataArrayType::Float32 => unpack::<f32, 4>(bytes),
        BinaryDataArrayType::Int32 => unpack::<i32, 4>(bytes),
        BinaryDataArrayType::Int64 => unpack::<i64, 8>(bytes),
        BinaryDataArrayType::Unknown => Err(ArrayRetrievalError::UnknownDataType),
    }
}

fn pack_values(values: &[f64], dtype: BinaryDataArrayType) -> Result<Bytes, ArrayRetrievalError> {
    match dtype {
        BinaryDataArrayType::Float64 => {
            if cfg!(target_endian = "little") {
                Ok(bytemuck::cast_slice::<f64, u8>(values).to_vec())
            } else {
                Ok(pack::<f64, 8>(values))
            }
        }
        BinaryDataArrayType::Float32 => Ok(pack::<f32, 4>(values)),
        BinaryDataArrayType::Int32 => Ok(pack::<i32, 4>(values)),
        BinaryDataArrayType::Int64 => Ok(pack::<i64, 8>(values)),
        BinaryDataArrayType::Unknown => Err(ArrayRetrievalError::UnknownDataType),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Vec<f64> {
        (0..256)
            .map(|i| 150.0 + i as f64 * 1.0625 + ((i % 7) as f64) * 0.125)
            .collect()
    }

    #[test]
    fn test_lossless_exact() {
        let values = sample();
        for dtype in [BinaryDataArrayType::Float64, BinaryDataArrayType::Float32] {
            for compression in [BinaryCompressionType::NoCompression, BinaryCompressionType::Zlib] {
                let bytes = encode(&values, dtype, compression).unwrap();
                let decoded = decode(&bytes, &dtype, compression).unwrap();
                assert_eq!(decoded, values, "{dtype} {compression}");
            }
        }
        let counts = vec![0.0, 3.0, -12.0, 40000.0];
        let bytes =
            encode(&counts, BinaryDataArrayType::Int32, BinaryCompressionType::Zlib).unwrap();
        assert!(!bytes.is_empty());
        let decoded =
            decode(&bytes, &BinaryDataArrayType::Int32, BinaryCompressionType::Zlib).unwrap();
        assert_eq!(decoded, counts);
    }

    #[test]
    fn test_width_reduction() {
        let bytes = encode(
            &[1.5, -2.7, 1e12],
            BinaryDataArrayType::Int32,
            BinaryCompressionType::NoCompression,
        )
        .unwrap();
        assert_eq!(bytes.len(), 12);
        let decoded = decode(
            &bytes,
            &BinaryDataArrayType::Int32,
            BinaryCompressionType::NoCompression,
        )
        .unwrap();
        assert_eq!(decoded, vec![1.0, -2.0, i32::MAX as f64]);

        let decoded = decode(
            &encode(&[0.1], BinaryDataArrayType::Float32, BinaryCompressionType::NoCompression)
                .unwrap(),
            &BinaryDataArrayType::Float32,
            BinaryCompressionType::NoCompression,
        )
        .unwrap();
        assert_eq!(decoded, vec![0.1f32 as f64]);
    }

    const NUMPRESS: [BinaryCompressionType; 6] = [
        BinaryCompressionType::NumpressLinear,
        BinaryCompressionType::NumpressLinearZlib,
        BinaryCompressionType::NumpressPIC,
        BinaryCompressionType::NumpressPICZlib,
        BinaryCompressionType::NumpressSLOF,
        BinaryCompressionType::NumpressSLOFZlib,
    ];

    /// Deterministic arrays mixing signs, sub-unit values and large magnitudes
    fn scattered(seed: u64, n: usize) -> Vec<f64> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
                let exponent = ((state >> 3) % 13) as i32 - 2;
                let sign = if state % 5 == 0 { -1.0 } else { 1.0 };
                sign * unit * 10f64.powi(exponent)
            })
            .collect()
    }

    /// Check that `values` either round trip within the documented bound or are refused
    fn assert_bounded_or_refused(values: &[f64], compression: BinaryCompressionType) -> bool {
        match encode(values, BinaryDataArrayType::Float64, compression) {
            Ok(bytes) => {
                let decoded = decode(&bytes, &BinaryDataArrayType::Float64, compression).unwrap();
                assert_eq!(decoded.len(), values.len());
                let bound = compression.error_bound(values) * (1.0 + 1e-6);
                for (a, b) in values.iter().zip(decoded.iter()) {
                    let slack = (a.abs() + 1.0) * 1e-12;
                    assert!(
                        (a - b).abs() <= bound + slack,
                        "{compression}: |{a} - {b}| > {bound} in {values:?}"
                    );
                }
                true
            }
            Err(ArrayRetrievalError::NumpressOutOfRange { .. }) => false,
            Err(e) => panic!("{compression} failed with {e} on {values:?}"),
        }
    }

    #[test]
    fn test_numpress_bounded() {
        let values = sample();
        for compression in NUMPRESS {
            assert!(assert_bounded_or_refused(&values, compression));
        }
    }

    #[test]
    fn test_numpress_scattered_values() {
        for seed in 0..64 {
            let values = scattered(seed, 40);
            let non_negative: Vec<f64> = values.iter().map(|v| v.abs()).collect();
            let fits_u32 = non_negative.iter().all(|v| *v < u32::MAX as f64);
            for compression in NUMPRESS {
                assert_bounded_or_refused(&values, compression);
                let accepted = assert_bounded_or_refused(&non_negative, compression);
                let must_accept = match compression {
                    BinaryCompressionType::NumpressSLOF
                    | BinaryCompressionType::NumpressSLOFZlib => true,
                    BinaryCompressionType::NumpressPIC
                    | BinaryCompressionType::NumpressPICZlib => fits_u32,
                    _ => false,
                };
                if must_accept {
                    assert!(accepted, "{compression} refused {non_negative:?}");
                }
            }
        }
    }

    #[test]
    fn test_short_logged_dynamic_range() {
        let values = vec![0.0, 0.2, 0.4, 1.7, 12.0, 1e3, 5e9, 1e12];
        for compression in [
            BinaryCompressionType::NumpressSLOF,
            BinaryCompressionType::NumpressSLOFZlib,
        ] {
            assert!(assert_bounded_or_refused(&values, compression));
            let bytes = encode(&values, BinaryDataArrayType::Float32, compression).unwrap();
            let decoded = decode(&bytes, &BinaryDataArrayType::Float32, compression).unwrap();
            assert!(decoded[1] > 0.0 && decoded[2] > decoded[1]);
            assert!((decoded[6] - 5e9).abs() / 5e9 < 1e-3);
        }
    }

    #[test]
    fn test_numpress_refuses_unrepresentable() {
        let err = encode(
            &[-100.0, 5.0, 1000.0],
            BinaryDataArrayType::Float64,
            BinaryCompressionType::NumpressSLOF,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ArrayRetrievalError::NumpressOutOfRange {
                compression: BinaryCompressionType::NumpressSLOF,
                ..
            }
        ));
        assert!(!err.is_corrupt_stream());

        for values in [vec![-100.0, 5.0, 1000.0], vec![10.0, 5e9]] {
            let err = encode(
                &values,
                BinaryDataArrayType::Float32,
                BinaryCompressionType::NumpressPIC,
            )
            .unwrap_err();
            assert!(matches!(err, ArrayRetrievalError::NumpressOutOfRange { .. }));
        }

        let err = encode(
            &[-3.0, 1.0, 2.0],
            BinaryDataArrayType::Float64,
            BinaryCompressionType::NumpressLinear,
        )
        .unwrap_err();
        assert!(matches!(err, ArrayRetrievalError::NumpressOutOfRange { .. }));

        let err = encode(
            &[1.0, f64::NAN],
            BinaryDataArrayType::Float64,
            BinaryCompressionType::NumpressLinear,
        )
        .unwrap_err();
        assert!(matches!(err, ArrayRetrievalError::NumpressOutOfRange { .. }));
    }

    #[test]
    fn test_numpress_linear_negative_tail() {
        let values = vec![10.0, 5.0, 0.0, -5.25, -10.5, -100.125, 3.0];
        assert!(assert_bounded_or_refused(
            &values,
            BinaryCompressionType::NumpressLinear
        ));
    }

    #[test]
    fn test_corrupt_streams() {
        let err = decode(
            &[0u8; 7],
            &BinaryDataArrayType::Float64,
            BinaryCompressionType::NoCompression,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ArrayRetrievalError::DataTypeSizeMismatch {
                length: 7,
                width: 8
            }
        );
        assert!(err.is_corrupt_stream());

        let err = decode(
            b"not a zlib stream",
            &BinaryDataArrayType::Float64,
            BinaryCompressionType::Zlib,
        )
        .unwrap_err();
        assert!(matches!(err, ArrayRetrievalError::DecompressionError(_)));

        let inflated_odd = compress_zlib(&[1, 2, 3, 4, 5]).unwrap();
        assert!(decode(
            &inflated_odd,
            &BinaryDataArrayType::Float32,
            BinaryCompressionType::Zlib
        )
        .is_err());

        let err = decode(
            &[0u8; 4],
            &BinaryDataArrayType::Float64,
            BinaryCompressionType::NumpressLinear,
        )
        .unwrap_err();
        assert!(matches!(err, ArrayRetrievalError::NumpressTruncated(_)));

        let mut slof = encode(
            &[1.0, 2.0, 3.0],
            BinaryDataArrayType::Float64,
            BinaryCompressionType::NumpressSLOF,
        )
        .unwrap();
        slof.pop();
        let err = decode(
            &slof,
            &BinaryDataArrayType::Float64,
            BinaryCompressionType::NumpressSLOF,
        )
        .unwrap_err();
        assert!(err.is_corrupt_stream());

        let err = decode(
            &[0u8; 16],
            &BinaryDataArrayType::Float64,
            BinaryCompressionType::LinearPrediction,
        )
        .unwrap_err();
        assert!(err.is_corrupt_stream());
    }

    #[test]
    fn test_empty() {
        for compression in BinaryCompressionType::COMPRESSION_METHODS {
            let decoded = decode(&[], &BinaryDataArrayType::Float64, *compression).unwrap();
            assert!(decoded.is_empty());
            let bytes = encode(&[], BinaryDataArrayType::Float64, *compression).unwrap();
            let decoded = decode(&bytes, &BinaryDataArrayType::Float64, *compression).unwrap();
            assert!(decoded.is_empty());
        }
    }
}
