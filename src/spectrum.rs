//! The in-memory representation of a single spectrum and its binary data arrays.
pub mod bindata;
pub(crate) mod spectrum_types;

pub use bindata::{
    ArrayRetrievalError, ArrayType, BinaryArrayMap, BinaryCompressionType, BinaryDataArrayType,
    DataArray,
};
pub use spectrum_types::{RetentionTime, Spectrum};
