// callplan-core/src/handler_tests.rs
#![cfg(test)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::execution::{FuncExecutor, FuncResult, Orchestrator};
use crate::handler::{
    RequestHandler, RequestHandlerConfig, Tools, UNPROCESSABLE_REQUEST_MESSAGE,
};
use crate::llm::{Completer, Message};
use crate::progress::{NoOp, Stream};
use crate::tools::{FuncDefinition, ToolSet, TypeInfo};
use crate::HandlerError;

/// Completer that replays scripted responses and records every request.
struct MockCompleter {
    responses: StdMutex<VecDeque<String>>,
    requests: Arc<StdMutex<Vec<(Vec<Message>, Option<String>)>>>,
}

impl MockCompleter {
    fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: StdMutex::new(responses.into_iter().map(String::from).collect()),
            requests: Arc::new(StdMutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(
        &self,
        messages: &[Message],
        json_schema: Option<&str>,
    ) -> anyhow::Result<String> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), json_schema.map(String::from)));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("mock completer ran out of scripted responses"))
    }
}

struct StaticExecutor {
    label: String,
    log: Arc<StdMutex<Vec<String>>>,
    result: FuncResult,
}

#[async_trait]
impl FuncExecutor for StaticExecutor {
    async fn call(
        &self,
        _cancel: CancellationToken,
        _args: HashMap<String, Value>,
        _progress: Arc<dyn Stream>,
    ) -> anyhow::Result<FuncResult> {
        self.log.lock().unwrap().push(self.label.clone());
        Ok(self.result.clone())
    }
}

struct WeatherTools {
    log: Arc<StdMutex<Vec<String>>>,
}

fn named(type_name: &str) -> TypeInfo {
    TypeInfo {
        type_name: type_name.to_string(),
        ..TypeInfo::default()
    }
}

fn object(properties: Vec<(&str, TypeInfo)>, required: Vec<&str>) -> TypeInfo {
    TypeInfo {
        type_name: "object".to_string(),
        properties: Some(
            properties
                .into_iter()
                .map(|(name, info)| (name.to_string(), info))
                .collect(),
        ),
        required: required.into_iter().map(String::from).collect(),
        ..TypeInfo::default()
    }
}

impl Tools for WeatherTools {
    fn available_tools(&self) -> ToolSet {
        ToolSet {
            functions: vec![
                FuncDefinition {
                    name: "get_coordinates".to_string(),
                    description: "Resolve a city into coordinates".to_string(),
                    parameters: object(vec![("city", named("string"))], vec!["city"]),
                    returns: named("coordinates_value"),
                },
                FuncDefinition {
                    name: "get_weather_forecast".to_string(),
                    description: "Forecast for coordinates".to_string(),
                    parameters: object(
                        vec![("coordinates", named("coordinates_value"))],
                        vec!["coordinates"],
                    ),
                    returns: named("weather_forecast_value"),
                },
            ],
            type_definitions: [
                (
                    "coordinates_value".to_string(),
                    object(
                        vec![("lat", named("number")), ("lon", named("number"))],
                        vec![],
                    ),
                ),
                (
                    "weather_forecast_value".to_string(),
                    object(vec![("temperature", named("number"))], vec![]),
                ),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn register_with(&self, orchestrator: &mut Orchestrator) -> anyhow::Result<()> {
        orchestrator.register_function(
            "get_coordinates",
            Arc::new(StaticExecutor {
                label: "get_coordinates".to_string(),
                log: Arc::clone(&self.log),
                result: FuncResult::found(
                    json!({"lat": 45.07, "lon": 7.69}),
                    FuncResult::formatter(|| Ok("Latitude: 45.07, Longitude: 7.69".to_string())),
                ),
            }) as Arc<dyn FuncExecutor>,
        );
        orchestrator.register_function(
            "get_weather_forecast",
            Arc::new(StaticExecutor {
                label: "get_weather_forecast".to_string(),
                log: Arc::clone(&self.log),
                result: FuncResult::found(
                    json!({"temperature": 21.5}),
                    FuncResult::formatter(|| Ok("Sunny, 21.5 C".to_string())),
                ),
            }) as Arc<dyn FuncExecutor>,
        );
        Ok(())
    }
}

fn handler_with(
    llm: Arc<MockCompleter>,
    log: Arc<StdMutex<Vec<String>>>,
) -> RequestHandler {
    RequestHandler::new(RequestHandlerConfig {
        llm_client: llm,
        tools: Arc::new(WeatherTools { log }),
        timeout: Duration::from_secs(5),
        concurrent_execution: false,
        alter_user_request: None,
        alter_result: None,
    })
    .unwrap()
}

fn weather_plan_json() -> &'static str {
    r#"{
        "understanding": "weather in Turin",
        "main_functions": [
            {
                "get_weather_forecast": {
                    "purpose": "To retrieve the forecast for the requested city",
                    "args": {
                        "coordinates": {
                            "func_call": {
                                "get_coordinates": {
                                    "purpose": "To resolve the city into coordinates",
                                    "args": { "city": "Turin" }
                                }
                            }
                        }
                    }
                }
            }
        ]
    }"#
}

fn progress() -> Arc<dyn Stream> {
    Arc::new(NoOp)
}

#[tokio::test]
async fn plans_validates_and_executes() {
    let llm = MockCompleter::new(vec![weather_plan_json(), r#"{"success": true}"#]);
    let log = Arc::new(StdMutex::new(Vec::new()));
    let handler = handler_with(Arc::clone(&llm), Arc::clone(&log));

    let result = handler
        .process_user_request(
            CancellationToken::new(),
            "What's the weather like in Turin?",
            progress(),
        )
        .await
        .unwrap();

    // Child first, then the parent.
    assert_eq!(
        *log.lock().unwrap(),
        vec!["get_coordinates".to_string(), "get_weather_forecast".to_string()]
    );

    let formatted = result.execution.main_results().format("").unwrap();
    assert_eq!(formatted, "Sunny, 21.5 C");

    let requests = llm.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);

    // Planning pass: system prompt with catalog plus the user message,
    // constrained by the toolset schema.
    let (messages, schema) = &requests[0];
    assert_eq!(messages[0].role, "system");
    assert!(messages[0].content.contains("<functions>"));
    assert_eq!(messages[1].content, "What's the weather like in Turin?");
    assert!(schema.as_deref().unwrap().contains("func_call_returning_coordinates_value"));

    // Validation pass: single user prompt constrained to the verdict object.
    let (messages, schema) = &requests[1];
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.contains("Function Calls to Validate:"));
    assert!(messages[0].content.contains("get_weather_forecast"));
    assert!(schema.as_deref().unwrap().contains("success"));
}

#[tokio::test]
async fn rejected_plan_falls_back_to_unprocessable() {
    let llm = MockCompleter::new(vec![weather_plan_json(), r#"{"success": false}"#]);
    let log = Arc::new(StdMutex::new(Vec::new()));
    let handler = handler_with(llm, Arc::clone(&log));

    let result = handler
        .process_user_request(CancellationToken::new(), "What's the weather?", progress())
        .await
        .unwrap();

    assert!(log.lock().unwrap().is_empty());
    assert_eq!(result.execution.func_calls.len(), 1);
    assert_eq!(
        result.execution.func_calls[0].name,
        "__builtin__.unprocessable_request"
    );
    assert!(!result.execution.func_calls[0].result.present);
    assert_eq!(
        result.execution.main_results().format("").unwrap(),
        UNPROCESSABLE_REQUEST_MESSAGE
    );
}

#[tokio::test]
async fn empty_plan_falls_back_without_validation() {
    let llm = MockCompleter::new(vec![
        r#"{"understanding": "no tool fits", "main_functions": []}"#,
    ]);
    let log = Arc::new(StdMutex::new(Vec::new()));
    let handler = handler_with(Arc::clone(&llm), log);

    let result = handler
        .process_user_request(CancellationToken::new(), "Tell me a joke", progress())
        .await
        .unwrap();

    assert_eq!(
        result.execution.func_calls[0].name,
        "__builtin__.unprocessable_request"
    );
    // Only the planning call went out; nothing to validate.
    assert_eq!(llm.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn plan_with_unknown_tool_is_a_missing_tool_error() {
    let plan = r#"{
        "understanding": "x",
        "main_functions": [
            {"made_up_tool": {"purpose": "p", "args": {}}}
        ]
    }"#;
    let llm = MockCompleter::new(vec![plan]);
    let log = Arc::new(StdMutex::new(Vec::new()));
    let handler = handler_with(llm, log);

    let err = handler
        .process_user_request(CancellationToken::new(), "anything", progress())
        .await
        .unwrap_err();

    assert!(matches!(err, HandlerError::MissingTool(name) if name == "made_up_tool"));
}

#[tokio::test]
async fn unparseable_completion_is_a_parse_error() {
    let llm = MockCompleter::new(vec!["I refuse to answer in JSON"]);
    let log = Arc::new(StdMutex::new(Vec::new()));
    let handler = handler_with(llm, log);

    let err = handler
        .process_user_request(CancellationToken::new(), "anything", progress())
        .await
        .unwrap_err();

    assert!(matches!(err, HandlerError::Parse(_)));
}

#[tokio::test]
async fn malformed_verdict_is_reported() {
    let llm = MockCompleter::new(vec![weather_plan_json(), "not a verdict"]);
    let log = Arc::new(StdMutex::new(Vec::new()));
    let handler = handler_with(llm, log);

    let err = handler
        .process_user_request(CancellationToken::new(), "weather in Turin", progress())
        .await
        .unwrap_err();

    assert!(matches!(err, HandlerError::InvalidVerdict(_)));
}

#[tokio::test]
async fn llm_transport_failure_propagates() {
    let llm = MockCompleter::new(vec![]);
    let log = Arc::new(StdMutex::new(Vec::new()));
    let handler = handler_with(llm, log);

    let err = handler
        .process_user_request(CancellationToken::new(), "anything", progress())
        .await
        .unwrap_err();

    assert!(matches!(err, HandlerError::Llm(_)));
}

#[tokio::test]
async fn alter_user_request_applies_before_planning_and_validation() {
    let llm = MockCompleter::new(vec![weather_plan_json(), r#"{"success": true}"#]);
    let log = Arc::new(StdMutex::new(Vec::new()));

    let handler = RequestHandler::new(RequestHandlerConfig {
        llm_client: Arc::clone(&llm) as Arc<dyn Completer>,
        tools: Arc::new(WeatherTools { log }),
        timeout: Duration::from_secs(5),
        concurrent_execution: false,
        alter_user_request: Some(Box::new(|message| format!("{message} (metric units)"))),
        alter_result: None,
    })
    .unwrap();

    handler
        .process_user_request(CancellationToken::new(), "weather in Turin", progress())
        .await
        .unwrap();

    let requests = llm.requests.lock().unwrap();
    assert_eq!(requests[0].0[1].content, "weather in Turin (metric units)");
    assert!(requests[1].0[0]
        .content
        .contains("weather in Turin (metric units)"));
}

#[tokio::test]
async fn alter_result_can_rewrite_the_outcome() {
    let llm = MockCompleter::new(vec![weather_plan_json(), r#"{"success": true}"#]);
    let log = Arc::new(StdMutex::new(Vec::new()));

    let handler = RequestHandler::new(RequestHandlerConfig {
        llm_client: llm,
        tools: Arc::new(WeatherTools { log }),
        timeout: Duration::from_secs(5),
        concurrent_execution: false,
        alter_user_request: None,
        alter_result: Some(Box::new(|result| {
            for call in &mut result.execution.func_calls {
                call.result.format_fn = Some(FuncResult::formatter(|| {
                    Ok("[redacted]".to_string())
                }));
            }
            Ok(())
        })),
    })
    .unwrap();

    let result = handler
        .process_user_request(CancellationToken::new(), "weather in Turin", progress())
        .await
        .unwrap();

    assert_eq!(
        result.execution.main_results().format("").unwrap(),
        "[redacted]"
    );
}

#[tokio::test]
async fn invalid_toolset_fails_construction() {
    struct BrokenTools;

    impl Tools for BrokenTools {
        fn available_tools(&self) -> ToolSet {
            ToolSet {
                functions: vec![FuncDefinition {
                    name: "broken".to_string(),
                    description: String::new(),
                    // Parameters must be an object type.
                    parameters: named("string"),
                    returns: named("string"),
                }],
                type_definitions: Default::default(),
            }
        }

        fn register_with(&self, _orchestrator: &mut Orchestrator) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let err = RequestHandler::new(RequestHandlerConfig {
        llm_client: MockCompleter::new(vec![]) as Arc<dyn Completer>,
        tools: Arc::new(BrokenTools),
        timeout: Duration::from_secs(5),
        concurrent_execution: false,
        alter_user_request: None,
        alter_result: None,
    })
    .unwrap_err();

    assert!(matches!(err, HandlerError::Schema(_)));
}

#[tokio::test]
async fn progress_messages_narrate_the_pipeline() {
    struct RecordingProgress(StdMutex<Vec<String>>);

    impl Stream for RecordingProgress {
        fn send(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    let llm = MockCompleter::new(vec![weather_plan_json(), r#"{"success": true}"#]);
    let log = Arc::new(StdMutex::new(Vec::new()));
    let handler = handler_with(llm, log);

    let recorder = Arc::new(RecordingProgress(StdMutex::new(Vec::new())));
    handler
        .process_user_request(
            CancellationToken::new(),
            "weather in Turin",
            Arc::clone(&recorder) as Arc<dyn Stream>,
        )
        .await
        .unwrap();

    let messages = recorder.0.lock().unwrap();
    assert_eq!(messages.first().unwrap(), "Processing user request...");
    assert!(messages.contains(&"Executing function calls...".to_string()));
}
