//! Plan construction and the single validation/sizing pass.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{debug, info};

use super::{ExecutionPlan, Source, Stage, StageOp, TensorRef};
use crate::arena::{ArenaLayout, BufferId};
use crate::error::{CnnError, CnnResult};
use crate::layers::Layer;
use crate::params::ParamSpec;
use crate::tensor::Shape;

struct BufferDecl {
    name: String,
    /// Declared size; `None` means "as large as the largest map written".
    fixed: Option<usize>,
    /// Version of the tensor currently held (0 = nothing written yet).
    version: usize,
}

/// Records stages in dependency order and checks each as it is added.
///
/// Stage outputs go to named buffers chosen by the caller, so ping-pong
/// schemes and residual merges are explicit. The builder rejects:
/// - shape or channel mismatches (via each layer's `output_shape`),
/// - residual adds over differently shaped operands,
/// - a stage writing a buffer it also reads,
/// - a read of a tensor whose buffer has been overwritten since.
pub struct PlanBuilder<'w> {
    input: TensorRef,
    buffers: Vec<BufferDecl>,
    stages: Vec<Stage<'w>>,
    scratch: Option<BufferId>,
}

impl<'w> PlanBuilder<'w> {
    pub fn new(input_shape: Shape) -> Self {
        Self {
            input: TensorRef {
                source: Source::Image,
                shape: input_shape,
                version: 0,
            },
            buffers: Vec::new(),
            stages: Vec::new(),
            scratch: None,
        }
    }

    /// The input image as a tensor.
    pub fn input(&self) -> TensorRef {
        self.input
    }

    /// Declares a buffer sized by the plan's sizing pass.
    pub fn buffer(&mut self, name: &str) -> BufferId {
        self.declare(name, None)
    }

    /// Declares a buffer of fixed capacity; building fails if any stage would
    /// write more than `capacity` floats into it.
    pub fn buffer_with_capacity(&mut self, name: &str, capacity: usize) -> BufferId {
        self.declare(name, Some(capacity))
    }

    fn declare(&mut self, name: &str, fixed: Option<usize>) -> BufferId {
        self.buffers.push(BufferDecl {
            name: name.to_string(),
            fixed,
            version: 0,
        });
        BufferId(self.buffers.len() - 1)
    }

    /// The declaration behind `id`; ids handed out by another builder may
    /// point past the end.
    fn decl(&self, stage: &str, id: BufferId) -> CnnResult<&BufferDecl> {
        self.buffers.get(id.index()).ok_or_else(|| CnnError::BufferCapacityExceeded {
            stage: stage.to_string(),
            buffer: "<unknown>".into(),
            required: 0,
            available: 0,
        })
    }

    fn buffer_name(&self, id: BufferId) -> String {
        self.buffers
            .get(id.index())
            .map_or_else(|| "<unknown>".to_string(), |decl| decl.name.clone())
    }

    fn ensure_fresh(&self, stage: &str, tensor: &TensorRef) -> CnnResult<()> {
        if let Source::Buffer(id) = tensor.source {
            if self.decl(stage, id)?.version != tensor.version {
                return Err(CnnError::StaleTensor {
                    stage: stage.to_string(),
                    buffer: self.buffer_name(id),
                });
            }
        }
        Ok(())
    }

    fn ensure_distinct(&self, stage: &str, tensor: &TensorRef, output: BufferId) -> CnnResult<()> {
        if tensor.source == Source::Buffer(output) {
            return Err(CnnError::BufferAliasing {
                stage: stage.to_string(),
                buffer: self.buffer_name(output),
            });
        }
        Ok(())
    }

    fn scratch_buffer(&mut self) -> BufferId {
        match self.scratch {
            Some(id) => id,
            None => {
                let id = self.declare("scratch", None);
                self.scratch = Some(id);
                id
            }
        }
    }

    /// `stage.output` must already have been checked with [`Self::decl`].
    fn push(&mut self, stage: Stage<'w>) -> TensorRef {
        let version = self.stages.len() + 1;
        let output = stage.output;
        let shape = stage.output_shape;
        debug!(
            "stage {:>3} {:<24} {:<16} {} -> {} in `{}`",
            version,
            stage.name(),
            stage.kind(),
            stage.input.shape,
            shape,
            self.buffers[output.0].name
        );
        self.buffers[output.0].version = version;
        self.stages.push(stage);
        TensorRef {
            source: Source::Buffer(output),
            shape,
            version,
        }
    }

    /// Appends `layer` reading `input` and writing `output`.
    pub fn layer<L: Layer + 'w>(
        &mut self,
        name: impl Into<String>,
        layer: L,
        input: TensorRef,
        output: BufferId,
    ) -> CnnResult<TensorRef> {
        let name = name.into();
        self.decl(&name, output)?;
        self.ensure_fresh(&name, &input)?;
        self.ensure_distinct(&name, &input, output)?;
        let output_shape = layer.output_shape(&name, input.shape)?;

        let scratch_len = layer.scratch_len(input.shape);
        if scratch_len > 0 {
            let scratch = self.scratch_buffer();
            if scratch == output {
                return Err(CnnError::BufferAliasing {
                    stage: name,
                    buffer: self.buffer_name(scratch),
                });
            }
        }

        Ok(self.push(Stage {
            name,
            op: StageOp::Layer(Box::new(layer)),
            input,
            output,
            output_shape,
            scratch_len,
        }))
    }

    /// Appends a residual merge `main + shortcut` into `output`. Both
    /// operands must still be live and have identical shapes.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        main: TensorRef,
        shortcut: TensorRef,
        output: BufferId,
    ) -> CnnResult<TensorRef> {
        let name = name.into();
        self.decl(&name, output)?;
        self.ensure_fresh(&name, &main)?;
        self.ensure_fresh(&name, &shortcut)?;
        if main.shape != shortcut.shape {
            return Err(CnnError::shape(&name, main.shape, shortcut.shape));
        }
        self.ensure_distinct(&name, &main, output)?;
        self.ensure_distinct(&name, &shortcut, output)?;

        Ok(self.push(Stage {
            name,
            op: StageOp::Add { shortcut },
            input: main,
            output,
            output_shape: main.shape,
            scratch_len: 0,
        }))
    }

    /// Sizes every buffer, freezes the workspace layout and returns the plan.
    /// `output` is the tensor copied out as logits; `parameters` is recorded
    /// for introspection.
    pub fn finish(self, output: TensorRef, parameters: Vec<ParamSpec>) -> CnnResult<ExecutionPlan<'w>> {
        self.ensure_fresh("output", &output)?;

        let mut required = alloc::vec![0usize; self.buffers.len()];
        for stage in &self.stages {
            let need = &mut required[stage.output.0];
            *need = (*need).max(stage.output_shape.total());
            if let Some(decl) = self.buffers[stage.output.0].fixed.filter(|&cap| cap < *need) {
                return Err(CnnError::BufferCapacityExceeded {
                    stage: stage.name().to_string(),
                    buffer: self.buffer_name(stage.output),
                    required: *need,
                    available: decl,
                });
            }
            if let Some(scratch) = self.scratch.filter(|_| stage.scratch_len > 0) {
                let need = &mut required[scratch.0];
                *need = (*need).max(stage.scratch_len);
                if let Some(cap) = self.buffers[scratch.0].fixed.filter(|&cap| cap < *need) {
                    return Err(CnnError::BufferCapacityExceeded {
                        stage: stage.name().to_string(),
                        buffer: self.buffer_name(scratch),
                        required: *need,
                        available: cap,
                    });
                }
            }
        }

        let layout = ArenaLayout::pack(
            self.buffers
                .iter()
                .zip(&required)
                .map(|(decl, &need)| (decl.name.clone(), decl.fixed.unwrap_or(need))),
        );

        for slot in layout.slots() {
            debug!("buffer `{}`: offset {} capacity {}", slot.name, slot.offset, slot.capacity);
        }
        info!(
            "plan ready: {} stages, {} buffers, {} workspace floats, {} parameter tensors",
            self.stages.len(),
            layout.slots().len(),
            layout.total_len(),
            parameters.len()
        );

        Ok(ExecutionPlan {
            input_shape: self.input.shape,
            output,
            stages: self.stages,
            layout,
            scratch: self.scratch,
            parameters,
        })
    }
}
