pub mod codec;
mod array;
mod encodings;
mod map;

pub use array::DataArray;
pub use encodings::{
    ArrayRetrievalError, ArrayType, BinaryCompressionType, BinaryDataArrayType, Bytes,
};
pub use map::BinaryArrayMap;
