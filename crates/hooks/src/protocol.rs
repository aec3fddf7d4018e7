//! Hook protocol between the workflow engine and swipe
//!
//! Each hook sees a task or workflow twice: `before` it runs, with a chance
//! to adjust the context, and `after` it finishes, with the engine's result.
//! `after` returns the result the engine should observe, so a hook can pass
//! a success through, turn it into a failure, or re-raise an error.
//!
//! Hooks nest: a [`HookChain`] calls `before` in registration order and
//! `after` in reverse, so the first hook registered is the outermost.

use crate::context::{TaskContext, WorkflowContext};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use swipe_core::{Bindings, Result};

#[async_trait]
pub trait TaskHook: Send + Sync {
    async fn before(&self, _ctx: &mut TaskContext) -> Result<()> {
        Ok(())
    }

    async fn after(&self, ctx: &TaskContext, result: Result<Bindings>) -> Result<Bindings>;
}

#[async_trait]
pub trait WorkflowHook: Send + Sync {
    async fn before(&self, _ctx: &mut WorkflowContext) -> Result<()> {
        Ok(())
    }

    async fn after(&self, ctx: &WorkflowContext, result: Result<Bindings>) -> Result<Bindings>;
}

#[derive(Default, Clone)]
pub struct HookChain {
    task_hooks: Vec<Arc<dyn TaskHook>>,
    workflow_hooks: Vec<Arc<dyn WorkflowHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_hook(mut self, hook: Arc<dyn TaskHook>) -> Self {
        self.task_hooks.push(hook);
        self
    }

    pub fn with_workflow_hook(mut self, hook: Arc<dyn WorkflowHook>) -> Self {
        self.workflow_hooks.push(hook);
        self
    }

    pub fn task_hook_count(&self) -> usize {
        self.task_hooks.len()
    }

    pub async fn task_before(&self, ctx: &mut TaskContext) -> Result<()> {
        for hook in &self.task_hooks {
            hook.before(ctx).await?;
        }
        Ok(())
    }

    pub async fn task_after(&self, ctx: &TaskContext, mut result: Result<Bindings>) -> Result<Bindings> {
        for hook in self.task_hooks.iter().rev() {
            result = hook.after(ctx, result).await;
        }
        result
    }

    pub async fn workflow_before(&self, ctx: &mut WorkflowContext) -> Result<()> {
        for hook in &self.workflow_hooks {
            hook.before(ctx).await?;
        }
        Ok(())
    }

    pub async fn workflow_after(
        &self,
        ctx: &WorkflowContext,
        mut result: Result<Bindings>,
    ) -> Result<Bindings> {
        for hook in self.workflow_hooks.iter().rev() {
            result = hook.after(ctx, result).await;
        }
        result
    }

    /// Wrap one task execution in every task hook.
    ///
    /// A failing `before` short-circuits: the task body does not run and
    /// the error is still shown to every hook's `after`.
    pub async fn run_task<F, Fut>(&self, mut ctx: TaskContext, body: F) -> Result<Bindings>
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = (TaskContext, Result<Bindings>)>,
    {
        if let Err(e) = self.task_before(&mut ctx).await {
            return self.task_after(&ctx, Err(e)).await;
        }
        let (ctx, result) = body(ctx).await;
        self.task_after(&ctx, result).await
    }

    /// Wrap one workflow execution in every workflow hook
    pub async fn run_workflow<F, Fut>(&self, mut ctx: WorkflowContext, body: F) -> Result<Bindings>
    where
        F: FnOnce(WorkflowContext) -> Fut,
        Fut: Future<Output = (WorkflowContext, Result<Bindings>)>,
    {
        if let Err(e) = self.workflow_before(&mut ctx).await {
            return self.workflow_after(&ctx, Err(e)).await;
        }
        let (ctx, result) = body(ctx).await;
        self.workflow_after(&ctx, result).await
    }
}
