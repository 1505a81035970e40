//! Data models

pub mod channel;
pub mod sample;

pub use channel::*;
pub use sample::*;
