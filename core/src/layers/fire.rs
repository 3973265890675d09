//! Fire block: 1×1 squeeze, then parallel 1×1 and 3×3 expands, concatenated.
//!
//! ```text
//! input ─ squeeze 1x1 + ReLU ─┬─ expand 1x1 + ReLU ─┐
//!                             └─ expand 3x3 + ReLU ─┴─ concat(C) ─ output
//! ```
//!
//! Because maps are channel-major, the concat is free: the 1×1 branch writes
//! the first `e1 * H * W` floats of the output and the 3×3 branch the rest.

use crate::error::{CnnError, CnnResult};
use crate::tensor::Shape;
use super::{Conv2d, Layer};

#[derive(Debug, Clone, Copy)]
pub struct FireBlock<'w> {
    pub squeeze: Conv2d<'w>,
    pub expand1x1: Conv2d<'w>,
    pub expand3x3: Conv2d<'w>,
}

impl<'w> FireBlock<'w> {
    /// Wires three convolutions into a fire block. The expand branches must
    /// both read the squeeze output.
    pub fn new(
        squeeze: Conv2d<'w>,
        expand1x1: Conv2d<'w>,
        expand3x3: Conv2d<'w>,
    ) -> CnnResult<Self> {
        for branch in [&expand1x1, &expand3x3] {
            if branch.in_c != squeeze.out_c {
                return Err(CnnError::ParameterLength {
                    name: "fire.expand.weight".into(),
                    expected: squeeze.out_c,
                    actual: branch.in_c,
                });
            }
        }
        Ok(Self { squeeze, expand1x1, expand3x3 })
    }

    fn shapes(&self, stage: &str, input: Shape) -> CnnResult<(Shape, Shape, Shape)> {
        let squeezed = self.squeeze.output_shape(stage, input)?;
        let e1 = self.expand1x1.output_shape(stage, squeezed)?;
        let e3 = self.expand3x3.output_shape(stage, squeezed)?;
        if (e1.h, e1.w) != (e3.h, e3.w) {
            return Err(CnnError::shape(stage, e1.with_channels(e3.c), e3));
        }
        Ok((squeezed, e1, e3))
    }
}

impl Layer for FireBlock<'_> {
    fn name(&self) -> &'static str {
        "FireBlock"
    }

    fn output_shape(&self, stage: &str, input: Shape) -> CnnResult<Shape> {
        let (_, e1, e3) = self.shapes(stage, input)?;
        Ok(e1.with_channels(e1.c + e3.c))
    }

    fn scratch_len(&self, input: Shape) -> usize {
        self.squeeze
            .output_shape(self.name(), input)
            .map_or(0, |squeezed| squeezed.total())
    }

    fn forward(
        &self,
        input: &[f32],
        input_shape: Shape,
        output: &mut [f32],
        scratch: &mut [f32],
    ) -> CnnResult<Shape> {
        let (squeezed, e1, e3) = self.shapes(self.name(), input_shape)?;
        let squeeze_buf = &mut scratch[..squeezed.total()];
        self.squeeze.forward(input, input_shape, squeeze_buf, &mut [])?;

        let (left, right) = output.split_at_mut(e1.total());
        self.expand1x1.forward(squeeze_buf, squeezed, left, &mut [])?;
        self.expand3x3.forward(squeeze_buf, squeezed, &mut right[..e3.total()], &mut [])?;

        Ok(e1.with_channels(e1.c + e3.c))
    }
}
