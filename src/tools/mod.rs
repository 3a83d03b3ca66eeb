pub mod browser;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::{SchemaError, SessionError, ToolError};
use crate::llm::{ModelToolCall, ModelToolDefinition};

/// Outcome of one tool call, in the single shape every tool returns.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Text handed back to the backend.
    pub fn render(&self) -> String {
        let message = if self.success {
            self.message.clone()
        } else {
            format!("Error: {}", self.message)
        };
        match &self.data {
            Some(data) => format!("{message}\n{data}"),
            None => message,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterType {
    fn schema_name(self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParameterType,
    pub description: String,
    pub required: bool,
}

impl ToolParameter {
    pub fn required(
        name: impl Into<String>,
        kind: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        kind: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

type DynResource = Arc<dyn Any + Send + Sync>;
type ToolHandler =
    dyn Fn(Value, &ToolContext) -> BoxFuture<'static, Result<ToolResult, ToolError>> + Send + Sync;

/// Resources handed to tools at session-build time, looked up by type or name.
#[derive(Clone, Default, Debug)]
pub struct ToolContext {
    typed: Arc<RwLock<HashMap<TypeId, DynResource>>>,
    named: Arc<RwLock<HashMap<String, DynResource>>>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T>(&self, value: T)
    where
        T: Send + Sync + 'static,
    {
        let mut typed = self.typed.write().unwrap_or_else(PoisonError::into_inner);
        typed.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let typed = self.typed.read().ok()?;
        let value = typed.get(&TypeId::of::<T>())?.clone();
        Arc::downcast::<T>(value).ok()
    }

    pub fn require<T>(&self) -> Result<Arc<T>, ToolError>
    where
        T: Send + Sync + 'static,
    {
        self.get::<T>()
            .ok_or(ToolError::MissingResource(std::any::type_name::<T>()))
    }

    pub fn insert_named<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        let mut named = self.named.write().unwrap_or_else(PoisonError::into_inner);
        named.insert(key.into(), Arc::new(value));
    }

    pub fn get_named<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let named = self.named.read().ok()?;
        let value = named.get(key)?.clone();
        Arc::downcast::<T>(value).ok()
    }
}

/// A named, described tool with a parameter schema and an async handler.
#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
    json_schema: Value,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            json_schema: json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false,
            }),
            handler: Arc::new(|_args: Value, _ctx: &ToolContext| {
                async { Err(ToolError::Execution("tool handler not configured".to_string())) }
                    .boxed()
            }),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.parameters.clear();
        self.json_schema = schema;
        Ok(self)
    }

    /// Declares parameters in order; the JSON schema is derived from them.
    pub fn with_parameters(mut self, parameters: Vec<ToolParameter>) -> Result<Self, SchemaError> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for parameter in &parameters {
            let property = json!({
                "type": parameter.kind.schema_name(),
                "description": parameter.description,
            });
            if properties.insert(parameter.name.clone(), property).is_some() {
                return Err(SchemaError::DuplicateParameter(parameter.name.clone()));
            }
            if parameter.required {
                required.push(Value::String(parameter.name.clone()));
            }
        }

        self.json_schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        });
        self.parameters = parameters;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, &ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args: Value, ctx: &ToolContext| handler(args, ctx).boxed());
        self
    }

    /// Like [`ToolSpec::with_handler`], but deserializes the arguments first.
    pub fn with_typed_handler<A, F, Fut>(mut self, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(A, &ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, ToolError>> + Send + 'static,
    {
        let tool = self.name.clone();
        self.handler = Arc::new(move |args: Value, ctx: &ToolContext| match serde_json::from_value::<A>(args) {
            Ok(parsed) => handler(parsed, ctx).boxed(),
            Err(err) => {
                let tool = tool.clone();
                async move {
                    Err(ToolError::InvalidArguments {
                        tool,
                        message: err.to_string(),
                    })
                }
                .boxed()
            }
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub async fn execute(&self, args: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        validate_arguments(self.name(), &self.json_schema, &args)?;
        (self.handler)(args, context).await
    }
}

/// The fixed tool set of one session.
///
/// Invocations are serialized through a single gate, so tools sharing a
/// resource never run against it concurrently.
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
    by_name: HashMap<String, usize>,
    context: ToolContext,
    gate: Mutex<()>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolSpec>, context: ToolContext) -> Result<Self, SessionError> {
        let mut by_name = HashMap::new();
        for (index, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name().to_string(), index).is_some() {
                return Err(SessionError::Config(format!(
                    "duplicate tool registered: {}",
                    tool.name()
                )));
            }
        }

        Ok(Self {
            tools,
            by_name,
            context,
            gate: Mutex::new(()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.by_name.get(name).map(|index| &self.tools[*index])
    }

    pub fn definitions(&self) -> Vec<ModelToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ModelToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.json_schema().clone(),
            })
            .collect()
    }

    /// Runs a requested call. Never fails: handler errors and panics come back
    /// as failure results.
    pub async fn invoke(&self, call: &ModelToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "backend requested an undeclared tool");
            return ToolResult::failure(format!("Unknown tool '{}'.", call.name));
        };

        let _serialized = self.gate.lock().await;
        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(call.arguments.clone(), &self.context))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(tool = %call.name, error = %err, "tool returned an error");
                ToolResult::failure(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(tool = %call.name, panic = %message, "tool panicked");
                ToolResult::failure(format!("tool '{}' panicked: {message}", call.name))
            }
        };

        debug!(
            tool = %call.name,
            success = result.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool call finished"
        );
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    let root_type = schema_obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::RootTypeMustBeObject)?;

    if root_type != "object" {
        return Err(SchemaError::RootTypeMustBeObject);
    }

    if let Some(required) = schema_obj.get("required") {
        let required_arr = required.as_array().ok_or(SchemaError::InvalidRequired)?;
        if required_arr.iter().any(|item| !item.is_string()) {
            return Err(SchemaError::InvalidRequired);
        }
    }

    Ok(())
}

fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: tool_name.to_string(),
        message,
    };

    let args_obj = args
        .as_object()
        .ok_or_else(|| invalid("arguments must be a JSON object".to_string()))?;

    let schema_obj = schema
        .as_object()
        .ok_or_else(|| invalid("tool schema must be a JSON object".to_string()))?;

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for field_name in required.iter().filter_map(Value::as_str) {
            if !args_obj.contains_key(field_name) {
                return Err(invalid(format!("missing required field: {field_name}")));
            }
        }
    }

    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if schema_obj
        .get("additionalProperties")
        .and_then(Value::as_bool)
        == Some(false)
    {
        if let Some(key) = args_obj.keys().find(|key| !properties.contains_key(*key)) {
            return Err(invalid(format!("unknown field: {key}")));
        }
    }

    for (key, value) in args_obj {
        let expected = properties
            .get(key)
            .and_then(|field_schema| field_schema.get("type"))
            .and_then(Value::as_str);
        if let Some(type_name) = expected {
            if !value_matches_type(value, type_name) {
                return Err(invalid(format!("field '{key}' must be of type {type_name}")));
            }
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.as_f64().is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
