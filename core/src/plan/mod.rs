//! Static execution plans.
//!
//! A plan is pure data: an ordered list of stages, the buffer each stage
//! reads and writes, and the workspace layout those buffers live in.
//!
//! ```text
//! image ─ stage[0] ─ stage[1] ─ ... ─ stage[k] ─┬─ add ─ ... ─ logits
//!                       └────── shortcut ───────┘
//! ```
//!
//! Every shape, channel count and buffer hazard is checked once by
//! [`PlanBuilder`]; [`ExecutionPlan::run_network`] then walks the stages in
//! order without further validation of the graph.

mod builder;
mod session;

pub use builder::PlanBuilder;
pub use session::Session;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use log::trace;

use crate::arena::{Arena, ArenaLayout, BufferId, BufferSlot};
use crate::error::{CnnError, CnnResult};
use crate::layers::Layer;
use crate::math;
use crate::params::ParamSpec;
use crate::tensor::Shape;

/// Where a tensor lives: the caller's image or a plan buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Image,
    Buffer(BufferId),
}

/// A feature map produced by some stage (or the input image), as seen at
/// plan-construction time. Holding a `TensorRef` does not keep its buffer
/// from being reused; the builder rejects reads of overwritten tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorRef {
    pub(crate) source: Source,
    pub shape: Shape,
    /// Number of the stage that wrote it (1-based); 0 for the image.
    pub(crate) version: usize,
}

impl TensorRef {
    /// Buffer holding this tensor, `None` for the input image.
    pub fn buffer(&self) -> Option<BufferId> {
        match self.source {
            Source::Image => None,
            Source::Buffer(id) => Some(id),
        }
    }
}

pub(crate) enum StageOp<'w> {
    Layer(Box<dyn Layer + 'w>),
    /// Residual merge of the stage input with `shortcut`.
    Add { shortcut: TensorRef },
}

/// One step of the plan.
pub struct Stage<'w> {
    name: String,
    pub(crate) op: StageOp<'w>,
    pub(crate) input: TensorRef,
    pub(crate) output: BufferId,
    pub(crate) output_shape: Shape,
    pub(crate) scratch_len: usize,
}

impl Stage<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layer kind, or `"Add"` for residual merges.
    pub fn kind(&self) -> &'static str {
        match &self.op {
            StageOp::Layer(layer) => layer.name(),
            StageOp::Add { .. } => "Add",
        }
    }

    pub fn input_shape(&self) -> Shape {
        self.input.shape
    }

    pub fn output_shape(&self) -> Shape {
        self.output_shape
    }

    /// The second producer of a residual merge.
    pub fn shortcut(&self) -> Option<TensorRef> {
        match &self.op {
            StageOp::Add { shortcut } => Some(*shortcut),
            StageOp::Layer(_) => None,
        }
    }

    pub fn output_buffer(&self) -> BufferId {
        self.output
    }
}

/// A validated, immutable network plan bound to borrowed parameters.
pub struct ExecutionPlan<'w> {
    input_shape: Shape,
    output: TensorRef,
    stages: Vec<Stage<'w>>,
    layout: ArenaLayout,
    scratch: Option<BufferId>,
    parameters: Vec<ParamSpec>,
}

impl<'w> ExecutionPlan<'w> {
    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    /// Shape of the logits (`num_classes` × 1 × 1 for both networks).
    pub fn output_shape(&self) -> Shape {
        self.output.shape
    }

    pub fn stages(&self) -> &[Stage<'w>] {
        &self.stages
    }

    pub fn buffers(&self) -> &[BufferSlot] {
        self.layout.slots()
    }

    /// Floats of workspace [`run_network`](Self::run_network) needs.
    pub fn workspace_len(&self) -> usize {
        self.layout.total_len()
    }

    /// Every tensor the plan is bound to, in binding order.
    pub fn parameters(&self) -> &[ParamSpec] {
        &self.parameters
    }

    /// Runs one forward pass.
    ///
    /// `image` is `C*H*W` floats in channel-major order, `workspace` at least
    /// [`workspace_len`](Self::workspace_len) floats, and `logits` receives the
    /// output tensor. The plan itself is not modified, so it can be run again
    /// with other images.
    pub fn run_network(&self, image: &[f32], workspace: &mut [f32], logits: &mut [f32]) -> CnnResult<()> {
        if image.len() != self.input_shape.total() {
            return Err(CnnError::InvalidInputLength {
                expected: self.input_shape.total(),
                actual: image.len(),
            });
        }
        if logits.len() != self.output.shape.total() {
            return Err(CnnError::InvalidInputLength {
                expected: self.output.shape.total(),
                actual: logits.len(),
            });
        }

        let mut arena = Arena::new(workspace, &self.layout)?;
        for stage in &self.stages {
            trace!("{} ({}) -> {}", stage.name, stage.kind(), stage.output_shape);
            self.execute(stage, image, &mut arena)?;
        }

        match self.output.source {
            Source::Image => logits.copy_from_slice(image),
            Source::Buffer(id) => {
                let [out] = arena.regions([Some((id, logits.len()))])?;
                logits.copy_from_slice(out);
            }
        }
        Ok(())
    }

    fn execute(&self, stage: &Stage<'w>, image: &[f32], arena: &mut Arena<'_>) -> CnnResult<()> {
        let out_req = Some((stage.output, stage.output_shape.total()));
        let in_req = stage.input.buffer().map(|id| (id, stage.input.shape.total()));

        match &stage.op {
            StageOp::Layer(layer) => {
                let scratch_req = self
                    .scratch
                    .filter(|_| stage.scratch_len > 0)
                    .map(|id| (id, stage.scratch_len));
                let [out, scratch, held] = arena.regions([out_req, scratch_req, in_req])?;
                let input: &[f32] = match stage.input.source {
                    Source::Image => image,
                    Source::Buffer(_) => held,
                };
                layer.forward(input, stage.input.shape, out, scratch)?;
            }
            StageOp::Add { shortcut } => {
                let same = shortcut.source == stage.input.source;
                let sc_req = match shortcut.buffer() {
                    Some(id) if !same => Some((id, shortcut.shape.total())),
                    _ => None,
                };
                let [out, main_held, sc_held] = arena.regions([out_req, in_req, sc_req])?;
                let main: &[f32] = match stage.input.source {
                    Source::Image => image,
                    Source::Buffer(_) => main_held,
                };
                let side: &[f32] = match shortcut.source {
                    _ if same => main,
                    Source::Image => image,
                    Source::Buffer(_) => sc_held,
                };
                math::add(main, side, out)?;
            }
        }
        Ok(())
    }
}
