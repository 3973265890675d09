//! The two fixed network topologies.
//!
//! Both are built from the same vocabulary of [`layers`](crate::layers) and
//! [`blocks`](crate::blocks); they differ only in the stage list and shape
//! constants each `build` function writes out.

pub mod squeezenet;
pub mod xception;

pub use squeezenet::SqueezeNetConfig;
pub use xception::XceptionConfig;
