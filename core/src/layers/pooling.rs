//! Pooling layers: windowed max and global average.
//!
//! No learnable parameters.

use crate::error::{CnnError, CnnResult};
use crate::math;
use crate::tensor::{Shape, Window};
use super::Layer;

/// Max pooling 2D layer.
///
/// Positions outside the input are skipped rather than read as zero, so a
/// window over negative activations still yields their true maximum.
#[derive(Debug, Clone, Copy)]
pub struct MaxPool2d {
    pub window: Window,
}

impl MaxPool2d {
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    /// Square pooling without padding (e.g. 3×3, stride 2).
    pub fn square(size: usize, stride: usize) -> Self {
        Self::new(Window::square(size, stride, 0))
    }
}

impl Layer for MaxPool2d {
    fn name(&self) -> &'static str {
        "MaxPool2d"
    }

    fn output_shape(&self, stage: &str, input: Shape) -> CnnResult<Shape> {
        self.window.pool_output_shape(stage, input)
    }

    fn forward(
        &self,
        input: &[f32],
        input_shape: Shape,
        output: &mut [f32],
        _scratch: &mut [f32],
    ) -> CnnResult<Shape> {
        let out_shape = self.output_shape(self.name(), input_shape)?;
        math::max_pool(input, input_shape, output, out_shape, self.window)?;
        Ok(out_shape)
    }
}

/// Reduces every channel plane to its mean: `(C, H, W) -> (C, 1, 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalAvgPool;

impl Layer for GlobalAvgPool {
    fn name(&self) -> &'static str {
        "GlobalAvgPool"
    }

    fn output_shape(&self, stage: &str, input: Shape) -> CnnResult<Shape> {
        if input.plane() == 0 {
            return Err(CnnError::shape(stage, Shape::new(input.c, 1, 1), input));
        }
        Ok(Shape::vector(input.c))
    }

    fn forward(
        &self,
        input: &[f32],
        input_shape: Shape,
        output: &mut [f32],
        _scratch: &mut [f32],
    ) -> CnnResult<Shape> {
        math::global_average_pool(input, input_shape, output)?;
        Ok(Shape::vector(input_shape.c))
    }
}
