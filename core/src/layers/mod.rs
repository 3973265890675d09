//! Layer zoo: the stage kinds a plan can hold.
//!
//! A layer binds its weights (borrowed from a parameter source) and knows
//! how to map an input shape to an output shape. The plan asks for the output
//! shape once, while building; `forward` then only runs on buffers that
//! already have the right lengths.

pub mod conv;
pub mod fire;
pub mod pooling;
pub mod separable;

use crate::error::CnnResult;
use crate::tensor::Shape;

pub trait Layer: Send + Sync {
    /// Kind of layer, for logs.
    fn name(&self) -> &'static str;

    /// Shape this layer produces for `input`. `stage` names the plan stage in
    /// any error.
    fn output_shape(&self, stage: &str, input: Shape) -> CnnResult<Shape>;

    /// Floats of intermediate storage `forward` needs besides its output.
    fn scratch_len(&self, _input: Shape) -> usize {
        0
    }

    /// Computes the layer into `output` (exactly `output_shape(input).total()`
    /// long). `scratch` holds at least `scratch_len(input)` floats.
    fn forward(
        &self,
        input: &[f32],
        input_shape: Shape,
        output: &mut [f32],
        scratch: &mut [f32],
    ) -> CnnResult<Shape>;
}

pub use conv::{Conv2d, DepthwiseConv2d};
pub use fire::FireBlock;
pub use pooling::{GlobalAvgPool, MaxPool2d};
pub use separable::SeparableConv;
