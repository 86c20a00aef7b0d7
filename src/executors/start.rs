//! `start` — entry point; records the run input as its outputs.

use async_trait::async_trait;

use super::{result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::types::{NodeExecutionResult, NodeType};

pub struct StartExecutor;

#[async_trait]
impl NodeExecutor for StartExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Start
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        _services: &ExecutorServices,
    ) -> NodeExecutionResult {
        ctx.log(LogLevel::Info, "workflow started");
        let mut builder = result_for(node, ctx);
        for (key, value) in ctx.input() {
            builder = builder.output(key.clone(), value.clone());
        }
        builder.completed()
    }
}
