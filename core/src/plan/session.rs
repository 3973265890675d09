//! A plan together with its own workspace.

use alloc::vec;
use alloc::vec::Vec;

use super::ExecutionPlan;
use crate::error::CnnResult;
use crate::math;

/// Owns a plan and the fixed buffers it runs in. The workspace is allocated
/// once here; every later call reuses it.
pub struct Session<'w> {
    plan: ExecutionPlan<'w>,
    workspace: Vec<f32>,
    logits: Vec<f32>,
}

impl<'w> Session<'w> {
    pub fn new(plan: ExecutionPlan<'w>) -> Self {
        let workspace = vec![0.0; plan.workspace_len()];
        let logits = vec![0.0; plan.output_shape().total()];
        Self { plan, workspace, logits }
    }

    pub fn plan(&self) -> &ExecutionPlan<'w> {
        &self.plan
    }

    /// Forward pass over `image`; returns the logits (before any softmax).
    pub fn run_network(&mut self, image: &[f32]) -> CnnResult<&[f32]> {
        self.plan.run_network(image, &mut self.workspace, &mut self.logits)?;
        Ok(&self.logits)
    }

    /// Index of the largest logit.
    pub fn predict(&mut self, image: &[f32]) -> CnnResult<usize> {
        let logits = self.run_network(image)?;
        math::argmax(logits)
    }

    pub fn into_plan(self) -> ExecutionPlan<'w> {
        self.plan
    }
}
