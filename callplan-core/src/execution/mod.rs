// callplan-core/src/execution/mod.rs

//! The orchestrator: walks a planned call tree, evaluating nested calls
//! first so their results feed parent arguments, enforcing required
//! parameters, memoizing by fingerprint, applying per-call timeouts, and
//! optionally running top-level calls concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::parser::{ArgValue, PlannedFuncCall};
use crate::progress;
use crate::tools::ToolSet;
use crate::utils::canonical_json;

mod result;
pub use result::{
    Arg, ExecutedFuncCall, ExecutionResult, FormatFn, FuncResult, FuncResults, DEFAULT_SEPARATOR,
};


/// An executable tool implementation.
///
/// The executor interprets its own argument types: `args` maps argument
/// names to plain JSON values, with nested-call arguments already replaced
/// by their results. An `Err` marks an execution failure; a result with
/// `present == false` means the tool ran but found nothing.
#[async_trait]
pub trait FuncExecutor: Send + Sync {
    async fn call(
        &self,
        cancel: CancellationToken,
        args: HashMap<String, Value>,
        progress: Arc<dyn progress::Stream>,
    ) -> anyhow::Result<FuncResult>;
}

/// What went wrong while executing a call.
#[derive(Debug, Error)]
pub enum ExecutionErrorKind {
    #[error("unknown function")]
    UnknownFunction,
    #[error("missing argument for required parameter {0}")]
    MissingRequired(String),
    #[error("function schema not found")]
    SchemaNotFound,
    #[error("function execution timed out")]
    Timeout,
    #[error("function execution cancelled")]
    Cancelled,
    #[error("{0}")]
    Executor(#[source] anyhow::Error),
    #[error(transparent)]
    Nested(Box<ExecutionError>),
}

/// An execution failure, attributed to the function (and argument) where it
/// occurred. Nested failures wrap so the final error identifies the chain
/// leading to the offender.
#[derive(Debug)]
pub struct ExecutionError {
    pub func_name: String,
    pub arg_name: Option<String>,
    pub kind: ExecutionErrorKind,
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.arg_name {
            Some(arg_name) => write!(
                f,
                "error in function '{}' for argument '{}': {}",
                self.func_name, arg_name, self.kind
            ),
            None => write!(f, "error in function '{}': {}", self.func_name, self.kind),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl ExecutionError {
    fn new(func_name: &str, kind: ExecutionErrorKind) -> Self {
        Self {
            func_name: func_name.to_string(),
            arg_name: None,
            kind,
        }
    }

    fn for_arg(func_name: &str, arg_name: &str, kind: ExecutionErrorKind) -> Self {
        Self {
            func_name: func_name.to_string(),
            arg_name: Some(arg_name.to_string()),
            kind,
        }
    }

    /// The innermost error of a nested chain.
    pub fn root(&self) -> &ExecutionError {
        match &self.kind {
            ExecutionErrorKind::Nested(inner) => inner.root(),
            _ => self,
        }
    }
}

/// Outcome of the required-argument check.
enum RequiredArgs {
    Satisfied,
    /// A required child resolved with no data but can explain itself; the
    /// call completes (not an error) carrying the child's formatter.
    Formattable(FormatFn),
}

/// Executes call trees against registered executors. The memo cache lives as
/// long as the orchestrator instance.
pub struct Orchestrator {
    functions: HashMap<String, Arc<dyn FuncExecutor>>,
    memo: RwLock<HashMap<String, FuncResult>>,
    /// Per-fingerprint gates so identical calls running concurrently share
    /// one executor invocation.
    in_flight: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
    concurrent: bool,
    tool_set: ToolSet,
}

impl Orchestrator {
    pub fn new(timeout: Duration, concurrent: bool, tool_set: ToolSet) -> Self {
        Self {
            functions: HashMap::new(),
            memo: RwLock::new(HashMap::new()),
            in_flight: StdMutex::new(HashMap::new()),
            timeout,
            concurrent,
            tool_set,
        }
    }

    /// Registers an executor under a function name. Definitions for the name
    /// come from the `ToolSet` given at construction.
    pub fn register_function(&mut self, name: impl Into<String>, executor: Arc<dyn FuncExecutor>) {
        self.functions.insert(name.into(), executor);
    }

    pub fn tool_set(&self) -> &ToolSet {
        &self.tool_set
    }

    /// Executes the top-level plan sequence, sequentially or concurrently
    /// per configuration.
    pub async fn execute(
        self: &Arc<Self>,
        cancel: CancellationToken,
        plan: &[PlannedFuncCall],
        progress: Arc<dyn progress::Stream>,
    ) -> Result<ExecutionResult, ExecutionError> {
        if self.concurrent {
            self.execute_concurrent(cancel, plan, progress).await
        } else {
            self.execute_sequential(cancel, plan, progress).await
        }
    }

    /// Runs calls in input order; the first failure aborts the whole
    /// execution.
    async fn execute_sequential(
        self: &Arc<Self>,
        cancel: CancellationToken,
        plan: &[PlannedFuncCall],
        progress: Arc<dyn progress::Stream>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut func_calls = Vec::with_capacity(plan.len());
        for call in plan {
            info!(function = %call.name, "executing function");
            let executed = self
                .execute_call(cancel.clone(), call, progress.clone())
                .await?;
            info!(function = %call.name, "function executed successfully");
            func_calls.push(executed);
        }
        Ok(ExecutionResult { func_calls })
    }

    /// Runs top-level calls in parallel tasks sharing a cancellable child
    /// token. The first failure cancels the group; remaining tasks are
    /// drained and their results discarded.
    async fn execute_concurrent(
        self: &Arc<Self>,
        cancel: CancellationToken,
        plan: &[PlannedFuncCall],
        progress: Arc<dyn progress::Stream>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let group = cancel.child_token();
        let mut tasks: JoinSet<(usize, Result<ExecutedFuncCall, ExecutionError>)> = JoinSet::new();

        for (index, call) in plan.iter().enumerate() {
            let this = Arc::clone(self);
            let call = call.clone();
            let token = group.clone();
            let progress = Arc::clone(&progress);
            tasks.spawn(async move {
                info!(function = %call.name, "executing function");
                let outcome = this.execute_call(token, &call, progress).await;
                if outcome.is_ok() {
                    info!(function = %call.name, "function executed successfully");
                }
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<ExecutedFuncCall>> = (0..plan.len()).map(|_| None).collect();
        let mut first_error: Option<ExecutionError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(executed))) => {
                    slots[index] = Some(executed);
                }
                Ok((_, Err(err))) => {
                    if first_error.is_none() {
                        group.cancel();
                        first_error = Some(err);
                    } else {
                        // Follow-on failures after the group cancelled.
                        debug!(error = %err, "sibling task failed after cancellation");
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        group.cancel();
                        first_error = Some(ExecutionError::new(
                            "execution task",
                            ExecutionErrorKind::Executor(anyhow!(
                                "execution task failed: {join_err}"
                            )),
                        ));
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        Ok(ExecutionResult {
            func_calls: slots.into_iter().flatten().collect(),
        })
    }

    /// Executes one call: children first, then required-argument checks,
    /// memo lookup, and finally the executor under a timeout watchdog.
    /// Boxed because the future recurses through nested arguments.
    fn execute_call<'a>(
        self: &'a Arc<Self>,
        cancel: CancellationToken,
        call: &'a PlannedFuncCall,
        progress: Arc<dyn progress::Stream>,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutedFuncCall, ExecutionError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(executor) = self.functions.get(&call.name) else {
                return Err(ExecutionError::new(
                    &call.name,
                    ExecutionErrorKind::UnknownFunction,
                ));
            };

            let args = self
                .process_args(cancel.clone(), call, progress.clone())
                .await?;

            match self.check_required_args(call, &args)? {
                RequiredArgs::Satisfied => {}
                RequiredArgs::Formattable(format_fn) => {
                    // The missing child explains itself to the user.
                    return Ok(ExecutedFuncCall {
                        name: call.name.clone(),
                        purpose: call.purpose.clone(),
                        args,
                        result: FuncResult::not_found(Some(format_fn)),
                    });
                }
            }

            let materialized = materialize_args(&args);
            let fingerprint = fingerprint(&call.name, &materialized);

            // Serialize identical in-flight calls on a shared gate so the
            // second one finds the first one's memo entry.
            let gate = self.flight_gate(&fingerprint);
            let _guard = gate.lock().await;

            if let Some(result) = self.memoized(&fingerprint) {
                debug!(function = %call.name, "using memoized result");
                return Ok(ExecutedFuncCall {
                    name: call.name.clone(),
                    purpose: call.purpose.clone(),
                    args,
                    result,
                });
            }

            let result = self
                .invoke_with_timeout(cancel, Arc::clone(executor), &call.name, materialized, progress)
                .await?;

            self.memo
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(fingerprint, result.clone());
            debug!(function = %call.name, "function executed and result memoized");

            Ok(ExecutedFuncCall {
                name: call.name.clone(),
                purpose: call.purpose.clone(),
                args,
                result,
            })
        })
    }

    /// Resolves the argument mapping, executing nested calls depth-first.
    async fn process_args(
        self: &Arc<Self>,
        cancel: CancellationToken,
        call: &PlannedFuncCall,
        progress: Arc<dyn progress::Stream>,
    ) -> Result<HashMap<String, Arg>, ExecutionError> {
        let mut args = HashMap::with_capacity(call.args.len());
        for (key, value) in &call.args {
            match value {
                ArgValue::Call(nested) => {
                    debug!(
                        function = %call.name,
                        argument = %key,
                        nested = %nested.name,
                        "executing nested function argument"
                    );
                    let executed = self
                        .execute_call(cancel.clone(), nested, progress.clone())
                        .await
                        .map_err(|err| {
                            ExecutionError::for_arg(
                                &call.name,
                                key,
                                ExecutionErrorKind::Nested(Box::new(err)),
                            )
                        })?;
                    args.insert(key.clone(), Arg::Call(Box::new(executed)));
                }
                ArgValue::Value(literal) => {
                    args.insert(key.clone(), Arg::Value(literal.clone()));
                }
            }
        }
        Ok(args)
    }

    /// A required parameter is satisfied by a literal, or by a child call
    /// whose result is present. An absent child with a formatter turns the
    /// current call into a formattable non-result instead of an error.
    fn check_required_args(
        &self,
        call: &PlannedFuncCall,
        args: &HashMap<String, Arg>,
    ) -> Result<RequiredArgs, ExecutionError> {
        let Some(definition) = self.tool_set.find_tool(&call.name) else {
            return Err(ExecutionError::new(
                &call.name,
                ExecutionErrorKind::SchemaNotFound,
            ));
        };

        for param in &definition.parameters.required {
            match args.get(param) {
                None => {
                    return Err(ExecutionError::for_arg(
                        &call.name,
                        param,
                        ExecutionErrorKind::MissingRequired(param.clone()),
                    ));
                }
                Some(Arg::Value(_)) => {}
                Some(Arg::Call(child)) => {
                    if child.result.present {
                        continue;
                    }
                    match &child.result.format_fn {
                        Some(format_fn) => {
                            return Ok(RequiredArgs::Formattable(Arc::clone(format_fn)));
                        }
                        None => {
                            return Err(ExecutionError::for_arg(
                                &call.name,
                                param,
                                ExecutionErrorKind::MissingRequired(param.clone()),
                            ));
                        }
                    }
                }
            }
        }

        Ok(RequiredArgs::Satisfied)
    }

    fn flight_gate(&self, fingerprint: &str) -> Arc<AsyncMutex<()>> {
        let mut gates = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(fingerprint.to_string()).or_default())
    }

    fn memoized(&self, fingerprint: &str) -> Option<FuncResult> {
        self.memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned()
    }

    /// Runs the executor in a sibling task and races completion against the
    /// per-call timeout and the caller's cancellation, so a timeout is
    /// observed even if the executor ignores its token.
    async fn invoke_with_timeout(
        &self,
        cancel: CancellationToken,
        executor: Arc<dyn FuncExecutor>,
        name: &str,
        args: HashMap<String, Value>,
        progress: Arc<dyn progress::Stream>,
    ) -> Result<FuncResult, ExecutionError> {
        let exec_token = cancel.child_token();
        let task_token = exec_token.clone();
        let handle = tokio::spawn(async move { executor.call(task_token, args, progress).await });

        tokio::select! {
            joined = handle => match joined {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(err)) => {
                    warn!(function = %name, error = %err, "error executing function");
                    Err(ExecutionError::new(name, ExecutionErrorKind::Executor(err)))
                }
                Err(join_err) => Err(ExecutionError::new(
                    name,
                    ExecutionErrorKind::Executor(anyhow!("executor task failed: {join_err}")),
                )),
            },
            _ = tokio::time::sleep(self.timeout) => {
                warn!(function = %name, "function timed out");
                // Signal the detached executor task; cooperative executors stop.
                exec_token.cancel();
                Err(ExecutionError::new(name, ExecutionErrorKind::Timeout))
            }
            _ = cancel.cancelled() => {
                Err(ExecutionError::new(name, ExecutionErrorKind::Cancelled))
            }
        }
    }
}

/// Plain argument mapping handed to executors: literals as-is, child calls
/// replaced by their result values. Absent children are omitted entirely, so
/// two calls differing only in an absent optional child fingerprint alike.
fn materialize_args(args: &HashMap<String, Arg>) -> HashMap<String, Value> {
    let mut materialized = HashMap::with_capacity(args.len());
    for (key, arg) in args {
        match arg {
            Arg::Value(value) => {
                materialized.insert(key.clone(), value.clone());
            }
            Arg::Call(child) if child.result.present => {
                materialized.insert(key.clone(), child.result.value.clone());
            }
            Arg::Call(_) => {}
        }
    }
    materialized
}

/// SHA-256 hex of the canonical JSON of the call name and its materialized
/// arguments. Key order never changes a fingerprint.
fn fingerprint(name: &str, args: &HashMap<String, Value>) -> String {
    let canonical = canonical_json(&json!({ "Name": name, "Args": args }));
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
