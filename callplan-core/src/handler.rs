// callplan-core/src/handler.rs

//! The request handler: planning, validation, fallback, and execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::HandlerError;
use crate::execution::{ExecutedFuncCall, ExecutionResult, FuncResult, Orchestrator};
use crate::llm::{Completer, Message};
use crate::parser::{self, PlannedFuncCall};
use crate::progress;
use crate::prompt;
use crate::tools::ToolSet;

/// Fixed reply when no plan survives parsing and validation.
pub const UNPROCESSABLE_REQUEST_MESSAGE: &str =
    "Unable to process this request. Please rephrase or provide a different query.";

pub type AlterUserRequestFn = Box<dyn Fn(String) -> String + Send + Sync>;
pub type AlterResultFn = Box<dyn Fn(&mut ProcessingResult) -> anyhow::Result<()> + Send + Sync>;

/// Supplies tool definitions and wires their executors into an orchestrator.
pub trait Tools: Send + Sync {
    fn available_tools(&self) -> ToolSet;
    fn register_with(&self, orchestrator: &mut Orchestrator) -> anyhow::Result<()>;
}

/// The outcome of processing one user request: the executed call tree plus
/// access to the formatted top-level summary.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub execution: ExecutionResult,
}

/// Resources for a [`RequestHandler`].
pub struct RequestHandlerConfig {
    pub llm_client: Arc<dyn Completer>,
    pub tools: Arc<dyn Tools>,
    /// Per-call executor timeout.
    pub timeout: Duration,
    /// Run top-level plan entries concurrently.
    pub concurrent_execution: bool,
    /// Applied to the user request before planning.
    pub alter_user_request: Option<AlterUserRequestFn>,
    /// Applied to the result after execution.
    pub alter_result: Option<AlterResultFn>,
}

/// Drives a user request through the pipeline: prompt the model for a plan
/// constrained by the toolset schema, parse it, validate each top-level call
/// with a second model pass, then execute what survives.
pub struct RequestHandler {
    config: RequestHandlerConfig,
    orchestrator: Arc<Orchestrator>,
    tool_set: ToolSet,
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("tool_set", &self.tool_set)
            .finish_non_exhaustive()
    }
}

impl RequestHandler {
    pub fn new(config: RequestHandlerConfig) -> Result<Self, HandlerError> {
        let tool_set = config.tools.available_tools();
        tool_set.validate()?;

        let mut orchestrator = Orchestrator::new(
            config.timeout,
            config.concurrent_execution,
            tool_set.clone(),
        );
        config
            .tools
            .register_with(&mut orchestrator)
            .map_err(HandlerError::Registration)?;

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            tool_set,
        })
    }

    pub async fn process_user_request(
        &self,
        cancel: CancellationToken,
        message: &str,
        progress: Arc<dyn progress::Stream>,
    ) -> Result<ProcessingResult, HandlerError> {
        progress.send("Processing user request...");

        let message = match &self.config.alter_user_request {
            Some(alter) => {
                let altered = alter(message.to_string());
                debug!(original = %message, altered = %altered, "altered user request");
                altered
            }
            None => message.to_string(),
        };

        let plan = self
            .generate_function_calls(&message, progress.clone())
            .await?;
        let plan = self
            .evaluate_plan_consistency(&message, plan, progress.clone())
            .await?;

        if plan.is_empty() {
            return Ok(ProcessingResult {
                execution: unprocessable_request_execution(),
            });
        }

        progress.send("Executing function calls...");
        let execution = self
            .orchestrator
            .execute(cancel, &plan, progress)
            .await?;

        let mut result = ProcessingResult { execution };
        if let Some(alter) = &self.config.alter_result {
            alter(&mut result).map_err(HandlerError::AlterResult)?;
        }

        Ok(result)
    }

    async fn generate_function_calls(
        &self,
        message: &str,
        progress: Arc<dyn progress::Stream>,
    ) -> Result<Vec<PlannedFuncCall>, HandlerError> {
        progress.send("Generating system prompt...");
        let system_prompt = prompt::create_plan_prompt(&self.tool_set);

        progress.send("Generating schema for constrained generation...");
        let json_schema = self.tool_set.to_json_schema()?;

        progress.send("Thinking...");
        let messages = [Message::system(system_prompt), Message::user(message)];
        let completion = self
            .config
            .llm_client
            .complete(&messages, Some(&json_schema))
            .await
            .map_err(HandlerError::Llm)?;

        progress.send("Synthesizing function calls...");
        Ok(parser::parse_plan(completion.as_bytes())?)
    }

    /// Asks the model for a boolean verdict on each top-level call, rendered
    /// against only the tools its subtree uses (the full type dictionary is
    /// kept so every reference resolves). Entries judged inconsistent with
    /// the request are dropped.
    async fn evaluate_plan_consistency(
        &self,
        message: &str,
        plan: Vec<PlannedFuncCall>,
        progress: Arc<dyn progress::Stream>,
    ) -> Result<Vec<PlannedFuncCall>, HandlerError> {
        if plan.is_empty() {
            return Ok(plan);
        }
        progress.send("Evaluating function calls consistency...");

        let verdict_schema = prompt::validation_response_schema().to_string();

        let mut kept = Vec::with_capacity(plan.len());
        for call in plan {
            let used_tool_names = call.collect_called_tools();
            let mut used = Vec::with_capacity(used_tool_names.len());
            for tool_name in &used_tool_names {
                match self.tool_set.find_tool(tool_name) {
                    Some(tool) => used.push(tool.clone()),
                    None => return Err(HandlerError::MissingTool(tool_name.clone())),
                }
            }

            let scoped = ToolSet {
                functions: used,
                type_definitions: self.tool_set.type_definitions.clone(),
            };

            if self
                .evaluate_single_call(message, &call, &verdict_schema, &scoped)
                .await?
            {
                kept.push(call);
            } else {
                info!(function = %call.name, "dropping function call rejected by validator");
            }
        }

        Ok(kept)
    }

    async fn evaluate_single_call(
        &self,
        message: &str,
        call: &PlannedFuncCall,
        verdict_schema: &str,
        scoped: &ToolSet,
    ) -> Result<bool, HandlerError> {
        let rendered = serde_json::to_string_pretty(call).map_err(HandlerError::Render)?;
        let definitions = scoped.to_json_definitions();
        let user_prompt = prompt::create_validation_prompt(message, &rendered, &definitions);

        let body = self
            .config
            .llm_client
            .complete(&[Message::user(user_prompt)], Some(verdict_schema))
            .await
            .map_err(HandlerError::Llm)?;

        #[derive(Deserialize)]
        struct Verdict {
            success: bool,
        }

        let verdict: Verdict =
            serde_json::from_str(&body).map_err(HandlerError::InvalidVerdict)?;

        info!(function = %call.name, success = verdict.success, "validator verdict");
        Ok(verdict.success)
    }
}

/// The synthetic result returned when parsing or validation leaves nothing
/// to execute. A successful outcome, not an error.
pub fn unprocessable_request_execution() -> ExecutionResult {
    ExecutionResult {
        func_calls: vec![ExecutedFuncCall {
            name: "__builtin__.unprocessable_request".to_string(),
            purpose: "Return a response for an unprocessable request".to_string(),
            args: HashMap::new(),
            result: FuncResult {
                present: false,
                value: Value::Null,
                format_fn: Some(FuncResult::formatter(|| {
                    Ok(UNPROCESSABLE_REQUEST_MESSAGE.to_string())
                })),
                metadata: None,
            },
        }],
    }
}
