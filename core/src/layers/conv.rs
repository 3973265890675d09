//! Standard and depthwise 2D convolution layers.

use crate::error::{CnnError, CnnResult};
use crate::math;
use crate::tensor::{Shape, Window};
use super::Layer;

/// Dense convolution over all input channels. Also serves as the pointwise
/// half of a separable block and as the 1×1 classifier projection.
#[derive(Debug, Clone, Copy)]
pub struct Conv2d<'w> {
    weights: &'w [f32],
    bias: Option<&'w [f32]>,
    pub in_c: usize,
    pub out_c: usize,
    pub window: Window,
    pub relu: bool,
}

impl<'w> Conv2d<'w> {
    pub fn new(
        weights: &'w [f32],
        bias: Option<&'w [f32]>,
        in_c: usize,
        out_c: usize,
        window: Window,
        relu: bool,
    ) -> CnnResult<Self> {
        let expected = out_c * in_c * window.taps();
        if weights.len() != expected {
            return Err(CnnError::ParameterLength {
                name: "conv2d.weight".into(),
                expected,
                actual: weights.len(),
            });
        }
        if let Some(b) = bias {
            if b.len() != out_c {
                return Err(CnnError::ParameterLength {
                    name: "conv2d.bias".into(),
                    expected: out_c,
                    actual: b.len(),
                });
            }
        }
        Ok(Self { weights, bias, in_c, out_c, window, relu })
    }

    /// 1×1, stride 1 convolution.
    pub fn pointwise(
        weights: &'w [f32],
        bias: Option<&'w [f32]>,
        in_c: usize,
        out_c: usize,
        relu: bool,
    ) -> CnnResult<Self> {
        Self::new(weights, bias, in_c, out_c, Window::pointwise(), relu)
    }
}

impl Layer for Conv2d<'_> {
    fn name(&self) -> &'static str {
        "Conv2d"
    }

    fn output_shape(&self, stage: &str, input: Shape) -> CnnResult<Shape> {
        if input.c != self.in_c {
            return Err(CnnError::shape(stage, input.with_channels(self.in_c), input));
        }
        self.window.output_shape(stage, input, self.out_c)
    }

    fn forward(
        &self,
        input: &[f32],
        input_shape: Shape,
        output: &mut [f32],
        _scratch: &mut [f32],
    ) -> CnnResult<Shape> {
        let out_shape = self.output_shape(self.name(), input_shape)?;
        math::convolution(
            input, input_shape, self.weights, self.bias,
            output, out_shape, self.window, self.relu,
        )?;
        Ok(out_shape)
    }
}

/// One filter per channel, no channel mixing.
#[derive(Debug, Clone, Copy)]
pub struct DepthwiseConv2d<'w> {
    weights: &'w [f32],
    bias: Option<&'w [f32]>,
    pub channels: usize,
    pub window: Window,
    pub relu: bool,
}

impl<'w> DepthwiseConv2d<'w> {
    pub fn new(
        weights: &'w [f32],
        bias: Option<&'w [f32]>,
        channels: usize,
        window: Window,
        relu: bool,
    ) -> CnnResult<Self> {
        let expected = channels * window.taps();
        if weights.len() != expected {
            return Err(CnnError::ParameterLength {
                name: "depthwise.weight".into(),
                expected,
                actual: weights.len(),
            });
        }
        if let Some(b) = bias {
            if b.len() != channels {
                return Err(CnnError::ParameterLength {
                    name: "depthwise.bias".into(),
                    expected: channels,
                    actual: b.len(),
                });
            }
        }
        Ok(Self { weights, bias, channels, window, relu })
    }
}

impl Layer for DepthwiseConv2d<'_> {
    fn name(&self) -> &'static str {
        "DepthwiseConv2d"
    }

    fn output_shape(&self, stage: &str, input: Shape) -> CnnResult<Shape> {
        if input.c != self.channels {
            return Err(CnnError::shape(stage, input.with_channels(self.channels), input));
        }
        self.window.output_shape(stage, input, self.channels)
    }

    fn forward(
        &self,
        input: &[f32],
        input_shape: Shape,
        output: &mut [f32],
        _scratch: &mut [f32],
    ) -> CnnResult<Shape> {
        let out_shape = self.output_shape(self.name(), input_shape)?;
        math::depthwise_convolution(
            input, input_shape, self.weights, self.bias,
            output, out_shape, self.window, self.relu,
        )?;
        Ok(out_shape)
    }
}
