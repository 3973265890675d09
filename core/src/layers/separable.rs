//! Separable convolution: depthwise then pointwise.

use crate::error::{CnnError, CnnResult};
use crate::tensor::Shape;
use super::{Conv2d, DepthwiseConv2d, Layer};

/// A depthwise convolution (same channel count as the input) feeding a 1×1
/// convolution that sets the output channel count. The depthwise result lives
/// in scratch for the duration of the stage.
#[derive(Debug, Clone, Copy)]
pub struct SeparableConv<'w> {
    pub depthwise: DepthwiseConv2d<'w>,
    pub pointwise: Conv2d<'w>,
}

impl<'w> SeparableConv<'w> {
    pub fn new(depthwise: DepthwiseConv2d<'w>, pointwise: Conv2d<'w>) -> CnnResult<Self> {
        if pointwise.in_c != depthwise.channels {
            return Err(CnnError::ParameterLength {
                name: "separable.pointwise.weight".into(),
                expected: depthwise.channels,
                actual: pointwise.in_c,
            });
        }
        Ok(Self { depthwise, pointwise })
    }
}

impl Layer for SeparableConv<'_> {
    fn name(&self) -> &'static str {
        "SeparableConv"
    }

    fn output_shape(&self, stage: &str, input: Shape) -> CnnResult<Shape> {
        let mid = self.depthwise.output_shape(stage, input)?;
        self.pointwise.output_shape(stage, mid)
    }

    fn scratch_len(&self, input: Shape) -> usize {
        self.depthwise
            .output_shape(self.name(), input)
            .map_or(0, |mid| mid.total())
    }

    fn forward(
        &self,
        input: &[f32],
        input_shape: Shape,
        output: &mut [f32],
        scratch: &mut [f32],
    ) -> CnnResult<Shape> {
        let mid = self.depthwise.output_shape(self.name(), input_shape)?;
        let dw_buf = &mut scratch[..mid.total()];
        self.depthwise.forward(input, input_shape, dw_buf, &mut [])?;
        self.pointwise.forward(dw_buf, mid, output, &mut [])
    }
}
