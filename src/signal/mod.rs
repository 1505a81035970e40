//! Signal processing: wire decoding, feature extraction and smoothing

pub mod codec;
pub mod features;
pub mod filter;

pub use codec::{decode, decode_tagged, DecodeError, DecodedSignal, Encoding};
pub use features::{
    extract, EmptySignalError, Extraction, FeatureProfile, FeatureVector, LayoutMismatchError,
    UnknownProfileError,
};
pub use filter::smooth;
