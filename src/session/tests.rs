use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};

use super::*;
use crate::error::{ProviderError, ToolError};
use crate::llm::{
    ModelCompletion, ModelMessage, ModelStreamChunk, ModelToolCall, ModelToolChoice,
    ModelToolDefinition,
};
use crate::tools::{ParameterType, ToolParameter, ToolResult};

enum Turn {
    Reply {
        deltas: Vec<&'static str>,
        completion: ModelCompletion,
    },
    Fail(&'static str),
    Hang,
}

#[derive(Default)]
struct ScriptedModel {
    turns: Mutex<VecDeque<Turn>>,
    seen: Mutex<Vec<Vec<ModelMessage>>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Turn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(VecDeque::from(turns)),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn next_turn(&self, messages: &[ModelMessage]) -> Turn {
        self.seen.lock().expect("lock poisoned").push(messages.to_vec());
        self.turns
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or(Turn::Fail("no more scripted turns"))
    }

    fn calls(&self) -> Vec<Vec<ModelMessage>> {
        self.seen.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        _tools: &[ModelToolDefinition],
        _tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError> {
        match self.next_turn(messages) {
            Turn::Reply { completion, .. } => Ok(completion),
            Turn::Fail(message) => Err(ProviderError::Response(message.to_string())),
            Turn::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Response("hung turn woke up".to_string()))
            }
        }
    }

    fn invoke_stream<'a>(
        &'a self,
        messages: &'a [ModelMessage],
        _tools: &'a [ModelToolDefinition],
        _tool_choice: ModelToolChoice,
    ) -> BoxStream<'a, Result<ModelStreamChunk, ProviderError>> {
        match self.next_turn(messages) {
            Turn::Reply { deltas, completion } => stream::iter(
                deltas
                    .into_iter()
                    .map(|delta| Ok(ModelStreamChunk::TextDelta(delta.to_string())))
                    .chain(std::iter::once(Ok(ModelStreamChunk::Completed(completion)))),
            )
            .boxed(),
            Turn::Fail(message) => {
                stream::iter(vec![Err(ProviderError::Response(message.to_string()))]).boxed()
            }
            Turn::Hang => stream::once(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Response("hung turn woke up".to_string()))
            })
            .boxed(),
        }
    }
}

fn reply(text: &str) -> Turn {
    Turn::Reply {
        deltas: Vec::new(),
        completion: ModelCompletion {
            text: Some(text.to_string()),
            ..ModelCompletion::default()
        },
    }
}

fn streamed(deltas: Vec<&'static str>) -> Turn {
    let text = deltas.concat();
    Turn::Reply {
        deltas,
        completion: ModelCompletion {
            text: Some(text),
            ..ModelCompletion::default()
        },
    }
}

fn call_tool(id: &str, name: &str, arguments: Value) -> Turn {
    Turn::Reply {
        deltas: Vec::new(),
        completion: ModelCompletion {
            tool_calls: vec![ModelToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
            ..ModelCompletion::default()
        },
    }
}

fn client(model: &Arc<ScriptedModel>) -> AgentClient {
    let model: Arc<dyn ChatModel> = model.clone();
    AgentClient::new(FixedModel(model))
}

fn record(session: &Session) -> (Subscription, Arc<Mutex<Vec<SessionEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = session.on(move |event| sink.lock().expect("lock poisoned").push(event.clone()));
    (subscription, events)
}

fn kinds(events: &Arc<Mutex<Vec<SessionEvent>>>) -> Vec<EventKind> {
    events
        .lock()
        .expect("lock poisoned")
        .iter()
        .map(SessionEvent::kind)
        .collect()
}

fn weather_tool() -> ToolSpec {
    #[derive(Deserialize)]
    struct Args {
        city: String,
    }

    ToolSpec::new("get_weather", "Get the current weather for a city")
        .with_parameters(vec![ToolParameter::required(
            "city",
            ParameterType::String,
            "City name",
        )])
        .expect("parameters valid")
        .with_typed_handler(|args: Args, _ctx| async move {
            Ok(ToolResult::success(format!("Weather in {}: sunny, 22C", args.city))
                .with_data(json!({"city": args.city, "condition": "sunny", "temperature_c": 22})))
        })
}

fn click_tool() -> ToolSpec {
    ToolSpec::new("click", "Click an element")
        .with_parameters(vec![ToolParameter::required(
            "selector",
            ParameterType::String,
            "CSS selector",
        )])
        .expect("parameters valid")
        .with_handler(|args, _ctx| {
            let selector = args
                .get("selector")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            async move {
                if selector.is_empty() {
                    return Err(ToolError::Execution("selector must not be empty".to_string()));
                }
                Ok(ToolResult::success(format!("Clicked {selector}")))
            }
        })
}

#[tokio::test]
async fn simple_question_ends_with_answer_then_idle() {
    let model = ScriptedModel::new(vec![reply("4")]);
    let session = client(&model)
        .create_session(SessionConfig::default())
        .expect("session");
    let (_subscription, events) = record(&session);

    let outcome = session.send_and_wait("What is 2+2?").await.expect("exchange");

    assert_eq!(outcome.message.as_deref(), Some("4"));
    assert_eq!(outcome.turns, 1);
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            SessionEvent::AssistantMessage {
                content: "4".to_string()
            },
            SessionEvent::SessionIdle,
        ]
    );
    assert_eq!(session.phase(), ExchangePhase::Completed);
}

#[tokio::test]
async fn tool_call_events_arrive_in_order() {
    let model = ScriptedModel::new(vec![
        call_tool("call_1", "get_weather", json!({"city": "Seattle"})),
        reply("It's sunny and 22C in Seattle."),
    ]);
    let session = client(&model)
        .create_session(SessionConfig::default().tool(weather_tool()))
        .expect("session");
    let (_subscription, events) = record(&session);

    let outcome = session
        .send_and_wait("What's the weather in Seattle?")
        .await
        .expect("exchange");

    assert_eq!(outcome.tool_calls, 1);
    assert_eq!(outcome.turns, 2);
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::ToolExecutionStart,
            EventKind::ToolExecutionComplete,
            EventKind::AssistantMessage,
            EventKind::SessionIdle,
        ]
    );

    let recorded = events.lock().unwrap().clone();
    let SessionEvent::ToolExecutionComplete { tool, result, .. } = &recorded[1] else {
        panic!("expected tool completion, got {:?}", recorded[1]);
    };
    assert_eq!(tool, "get_weather");
    assert!(result.success);
    assert_eq!(result.data.as_ref().expect("data")["city"], json!("Seattle"));

    let calls = model.calls();
    let tool_message = calls[1]
        .iter()
        .find_map(|message| match message {
            ModelMessage::ToolResult {
                content, is_error, ..
            } => Some((content.clone(), *is_error)),
            _ => None,
        })
        .expect("tool result sent back");
    assert!(tool_message.0.starts_with("Weather in Seattle"));
    assert!(!tool_message.1);
}

#[tokio::test]
async fn streamed_deltas_concatenate_to_assistant_message() {
    let model = ScriptedModel::new(vec![streamed(vec!["The ", "answer ", "is ", "4."])]);
    let session = client(&model)
        .create_session(SessionConfig::default().streaming(true))
        .expect("session");
    let (_subscription, events) = record(&session);

    session.send_and_wait("What is 2+2?").await.expect("exchange");

    let recorded = events.lock().unwrap().clone();
    let mut joined = String::new();
    let mut final_message = None;
    for event in &recorded {
        match event {
            SessionEvent::MessageDelta { delta } => {
                assert!(final_message.is_none(), "delta after the full message");
                joined.push_str(delta);
            }
            SessionEvent::AssistantMessage { content } => final_message = Some(content.clone()),
            _ => {}
        }
    }
    assert_eq!(final_message.as_deref(), Some("The answer is 4."));
    assert_eq!(joined, "The answer is 4.");
    assert_eq!(recorded.last(), Some(&SessionEvent::SessionIdle));
}

#[tokio::test]
async fn non_streaming_session_emits_no_deltas() {
    let model = ScriptedModel::new(vec![reply("4")]);
    let session = client(&model)
        .create_session(SessionConfig::default())
        .expect("session");
    let (_subscription, events) = record(&session);

    session.send_and_wait("What is 2+2?").await.expect("exchange");
    assert!(!kinds(&events).contains(&EventKind::MessageDelta));
}

#[tokio::test]
async fn second_send_while_pending_is_rejected() {
    let model = ScriptedModel::new(vec![Turn::Hang, reply("later")]);
    let session = client(&model)
        .create_session(SessionConfig::default())
        .expect("session");

    let pending = session.send("first").expect("first send");
    assert!(session.phase().is_pending());
    assert!(matches!(
        session.send("second"),
        Err(SessionError::ExchangeInFlight)
    ));

    session.abort().await;
    assert_eq!(session.phase(), ExchangePhase::Errored);
    assert!(matches!(
        pending.wait().await,
        Err(SessionError::ExchangeAbandoned)
    ));

    let outcome = session.send_and_wait("third").await.expect("session usable");
    assert_eq!(outcome.message.as_deref(), Some("later"));
}

#[tokio::test]
async fn backend_error_resolves_once_and_session_recovers() {
    let model = ScriptedModel::new(vec![Turn::Fail("connection reset"), reply("recovered")]);
    let session = client(&model)
        .create_session(SessionConfig::default())
        .expect("session");
    let (_subscription, events) = record(&session);

    let err = session
        .send_and_wait("hello")
        .await
        .expect_err("backend failure");
    assert!(matches!(err, SessionError::Backend(_)));
    assert_eq!(kinds(&events), vec![EventKind::SessionError]);
    assert_eq!(session.phase(), ExchangePhase::Errored);

    let outcome = session.send_and_wait("hello again").await.expect("recovers");
    assert_eq!(outcome.message.as_deref(), Some("recovered"));
    assert_eq!(
        kinds(&events)
            .iter()
            .filter(|kind| matches!(kind, EventKind::SessionIdle | EventKind::SessionError))
            .count(),
        2
    );
}

#[tokio::test]
async fn failing_tool_still_reaches_idle() {
    let model = ScriptedModel::new(vec![
        call_tool("call_1", "click", json!({"selector": "   "})),
        reply("I could not click anything."),
    ]);
    let session = client(&model)
        .create_session(SessionConfig::default().tool(click_tool()))
        .expect("session");
    let (_subscription, events) = record(&session);

    session.send_and_wait("Click the button").await.expect("exchange");

    let recorded = events.lock().unwrap().clone();
    let failure = recorded
        .iter()
        .find_map(|event| match event {
            SessionEvent::ToolExecutionComplete { result, .. } => Some(result.clone()),
            _ => None,
        })
        .expect("tool completed");
    assert!(!failure.success);
    assert!(failure.message.contains("selector must not be empty"));
    assert_eq!(recorded.last(), Some(&SessionEvent::SessionIdle));

    let calls = model.calls();
    assert!(calls[1].iter().any(|message| matches!(
        message,
        ModelMessage::ToolResult { is_error: true, .. }
    )));
}

#[tokio::test]
async fn timeout_aborts_exchange_and_allows_next_send() {
    let model = ScriptedModel::new(vec![Turn::Hang, reply("done")]);
    let session = client(&model)
        .create_session(
            SessionConfig::default().exchange_timeout(Some(Duration::from_millis(50))),
        )
        .expect("session");
    let (_subscription, events) = record(&session);

    let err = session.send_and_wait("slow").await.expect_err("times out");
    assert!(matches!(err, SessionError::Timeout { .. }));
    assert!(!session.phase().is_pending());
    assert_eq!(
        *events.lock().unwrap(),
        vec![SessionEvent::SessionError {
            message: SessionError::ExchangeAbandoned.to_string(),
        }]
    );

    let outcome = session.send_and_wait("fast").await.expect("next send");
    assert_eq!(outcome.message.as_deref(), Some("done"));
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::SessionError,
            EventKind::AssistantMessage,
            EventKind::SessionIdle
        ]
    );
}

fn stuck_tool() -> ToolSpec {
    ToolSpec::new("slow", "Never finishes").with_handler(|_args, _ctx| async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ToolResult::success("finished"))
    })
}

#[tokio::test]
async fn timeout_inside_a_tool_leaves_no_unanswered_call() {
    let model = ScriptedModel::new(vec![call_tool("call_1", "slow", json!({})), reply("done")]);
    let session = client(&model)
        .create_session(
            SessionConfig::default()
                .tool(stuck_tool())
                .exchange_timeout(Some(Duration::from_millis(50))),
        )
        .expect("session");
    let (_subscription, events) = record(&session);

    let err = session.send_and_wait("go").await.expect_err("times out");
    assert!(matches!(err, SessionError::Timeout { .. }));
    assert_eq!(
        kinds(&events),
        vec![EventKind::ToolExecutionStart, EventKind::SessionError]
    );
    assert_eq!(session.history_len().await, 0);

    session.send_and_wait("next").await.expect("session usable");
    let calls = model.calls();
    let sent = calls.last().expect("second exchange reached the model");
    assert!(matches!(
        sent.as_slice(),
        [ModelMessage::System(_), ModelMessage::User(prompt)] if prompt == "next"
    ));
}

#[tokio::test]
async fn explicit_abort_reports_one_error_event() {
    let model = ScriptedModel::new(vec![Turn::Hang]);
    let session = client(&model)
        .create_session(SessionConfig::default().streaming(true))
        .expect("session");
    let (_subscription, events) = record(&session);

    let pending = session.send("never answered").expect("send");
    session.abort().await;

    assert!(matches!(
        pending.wait().await,
        Err(SessionError::ExchangeAbandoned)
    ));
    assert_eq!(session.phase(), ExchangePhase::Errored);
    assert_eq!(kinds(&events), vec![EventKind::SessionError]);
}

#[tokio::test]
async fn dispose_abandons_pending_exchange() {
    let model = ScriptedModel::new(vec![Turn::Hang]);
    let session = client(&model)
        .create_session(SessionConfig::default())
        .expect("session");
    let (subscription, events) = record(&session);

    let pending = session.send("never answered").expect("send");
    session.dispose();

    assert!(matches!(
        pending.wait().await,
        Err(SessionError::ExchangeAbandoned)
    ));
    assert!(!subscription.is_active());
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn disposed_subscription_receives_nothing() {
    let model = ScriptedModel::new(vec![reply("one"), reply("two")]);
    let session = client(&model)
        .create_session(SessionConfig::default())
        .expect("session");

    let (subscription, events) = record(&session);
    subscription.dispose();
    session.send_and_wait("first").await.expect("exchange");
    assert!(events.lock().unwrap().is_empty());

    let (first, first_events) = record(&session);
    let (_second, second_events) = record(&session);
    assert!(!first.is_active());
    session.send_and_wait("second").await.expect("exchange");
    assert!(first_events.lock().unwrap().is_empty());
    assert_eq!(
        kinds(&second_events),
        vec![EventKind::AssistantMessage, EventKind::SessionIdle]
    );
}

async fn system_prompt_sent(config: SessionConfig) -> String {
    let model = ScriptedModel::new(vec![reply("ok")]);
    let session = client(&model).create_session(config).expect("session");
    session.send_and_wait("hi").await.expect("exchange");
    match model.calls()[0].first() {
        Some(ModelMessage::System(prompt)) => prompt.clone(),
        other => panic!("expected a system message first, got {other:?}"),
    }
}

#[tokio::test]
async fn system_message_modes_shape_the_prompt() {
    let default = system_prompt_sent(SessionConfig::default()).await;
    assert_eq!(default, DEFAULT_SYSTEM_PROMPT);

    let replaced = system_prompt_sent(
        SessionConfig::default()
            .system_message(SystemMessageMode::Replace, "You are a pirate. Answer in pirate speak."),
    )
    .await;
    assert_eq!(replaced, "You are a pirate. Answer in pirate speak.");

    let appended = system_prompt_sent(
        SessionConfig::default().system_message(SystemMessageMode::Append, "Always answer in French."),
    )
    .await;
    assert!(appended.starts_with(DEFAULT_SYSTEM_PROMPT));
    assert!(appended.ends_with("\n\nAlways answer in French."));
}

#[test]
fn system_message_mode_parses_case_insensitively() {
    assert_eq!("Replace".parse(), Ok(SystemMessageMode::Replace));
    assert_eq!(" append ".parse(), Ok(SystemMessageMode::Append));
    assert!("prepend".parse::<SystemMessageMode>().is_err());
}

#[tokio::test]
async fn history_is_retained_across_exchanges() {
    let model = ScriptedModel::new(vec![reply("Nice to meet you, Ada."), reply("Your name is Ada.")]);
    let session = client(&model)
        .create_session(SessionConfig::default())
        .expect("session");

    session.send_and_wait("My name is Ada.").await.expect("first");
    session.send_and_wait("What is my name?").await.expect("second");

    let second_call = &model.calls()[1];
    assert!(second_call.contains(&ModelMessage::User("My name is Ada.".to_string())));
    assert!(second_call.contains(&ModelMessage::Assistant {
        content: Some("Nice to meet you, Ada.".to_string()),
        tool_calls: Vec::new(),
    }));
    assert_eq!(
        second_call
            .iter()
            .filter(|message| matches!(message, ModelMessage::System(_)))
            .count(),
        1
    );
    assert_eq!(session.history_len().await, 5);
}

#[tokio::test]
async fn exceeding_max_turns_fails_the_exchange() {
    let model = ScriptedModel::new(vec![
        call_tool("call_1", "get_weather", json!({"city": "Oslo"})),
        call_tool("call_2", "get_weather", json!({"city": "Bergen"})),
    ]);
    let session = client(&model)
        .create_session(SessionConfig::default().tool(weather_tool()).max_turns(2))
        .expect("session");
    let (_subscription, events) = record(&session);

    let err = session.send_and_wait("loop").await.expect_err("max turns");
    assert!(matches!(err, SessionError::MaxTurnsReached { max_turns: 2 }));
    assert_eq!(kinds(&events).last(), Some(&EventKind::SessionError));
}

#[test]
fn invalid_session_config_is_rejected() {
    let model = ScriptedModel::new(Vec::new());
    let client = client(&model);

    assert!(matches!(
        client.create_session(SessionConfig::new("  ")),
        Err(SessionError::Config(_))
    ));
    assert!(matches!(
        client.create_session(SessionConfig::default().max_turns(0)),
        Err(SessionError::Config(_))
    ));
    assert!(matches!(
        client.create_session(SessionConfig::default().tool(weather_tool()).tool(weather_tool())),
        Err(SessionError::Config(_))
    ));
}
