//! Image decoding and normalization into classifier input tensors.

mod decode;
mod family;
mod normalize;

pub use decode::decode_oriented;
pub use family::Preprocessing;
pub use normalize::{normalize, normalize_many, to_tensor};
