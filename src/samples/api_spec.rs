use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{InputError, ToolError};
use crate::tools::{ParameterType, ToolParameter, ToolResult, ToolSpec};

const HTTP_METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecSource {
    Url(String),
    File(PathBuf),
}

impl SpecSource {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            SpecSource::Url(value.to_string())
        } else {
            SpecSource::File(PathBuf::from(value))
        }
    }

    fn describe(&self) -> String {
        match self {
            SpecSource::Url(url) => url.clone(),
            SpecSource::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Focus {
    Security,
    Documentation,
    Design,
    #[default]
    All,
}

impl Focus {
    fn instructions(self) -> &'static str {
        match self {
            Focus::Security => "Review authentication, authorization, input validation and data exposure.",
            Focus::Documentation => "Review descriptions, examples and error documentation for completeness.",
            Focus::Design => "Review naming, resource modelling, status codes and consistency.",
            Focus::All => "Review security, documentation quality and API design.",
        }
    }
}

impl FromStr for Focus {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "security" => Ok(Focus::Security),
            "documentation" | "docs" => Ok(Focus::Documentation),
            "design" => Ok(Focus::Design),
            "all" => Ok(Focus::All),
            _ => Err(InputError::Unsupported {
                kind: "focus (expected security, documentation, design or all)",
                value: value.to_string(),
            }),
        }
    }
}

/// A loaded OpenAPI (or Swagger) document.
#[derive(Debug)]
pub struct ApiSpec {
    pub source: String,
    pub document: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

impl ApiSpec {
    /// Downloads or reads the document. JSON and YAML are both accepted.
    pub async fn load(source: &SpecSource) -> Result<Self, InputError> {
        let load_error = |message: String| InputError::Load {
            source_name: source.describe(),
            message,
        };

        let text = match source {
            SpecSource::Url(url) => {
                debug!(%url, "downloading api spec");
                let response = reqwest::get(url)
                    .await
                    .map_err(|err| load_error(err.to_string()))?;
                if !response.status().is_success() {
                    return Err(load_error(format!("HTTP {}", response.status())));
                }
                response
                    .text()
                    .await
                    .map_err(|err| load_error(err.to_string()))?
            }
            SpecSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|err| load_error(err.to_string()))?,
        };

        Self::parse(source.describe(), &text)
    }

    pub fn parse(source: String, text: &str) -> Result<Self, InputError> {
        let document = match serde_json::from_str::<Value>(text) {
            Ok(document) => document,
            Err(_) => serde_yaml::from_str::<Value>(text).map_err(|err| InputError::Load {
                source_name: source.clone(),
                message: format!("not valid JSON or YAML: {err}"),
            })?,
        };

        if document.get("openapi").is_none() && document.get("swagger").is_none() {
            return Err(InputError::Load {
                source_name: source,
                message: "document has no `openapi` or `swagger` version field".to_string(),
            });
        }
        Ok(Self { source, document })
    }

    pub fn title(&self) -> &str {
        self.document
            .pointer("/info/title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled API")
    }

    pub fn version(&self) -> &str {
        self.document
            .pointer("/info/version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        let Some(paths) = self.document.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut endpoints = Vec::new();
        for (path, item) in paths {
            for method in HTTP_METHODS {
                let Some(operation) = item.get(method) else {
                    continue;
                };
                endpoints.push(Endpoint {
                    method: method.to_ascii_uppercase(),
                    path: path.clone(),
                    summary: operation
                        .get("summary")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    tags: operation
                        .get("tags")
                        .and_then(Value::as_array)
                        .map(|tags| {
                            tags.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                });
            }
        }
        endpoints
    }
}

pub fn list_endpoints_tool() -> ToolSpec {
    #[derive(Deserialize)]
    struct Args {
        method: Option<String>,
        tag: Option<String>,
    }

    ToolSpec::new("list_endpoints", "List the endpoints defined in the API specification")
        .with_parameters(vec![
            ToolParameter::optional("method", ParameterType::String, "Only this HTTP method, e.g. POST"),
            ToolParameter::optional("tag", ParameterType::String, "Only endpoints with this tag"),
        ])
        .expect("valid parameters")
        .with_typed_handler(|args: Args, ctx| {
            let spec = ctx.require::<ApiSpec>();
            async move {
                let spec = spec?;
                let endpoints = spec
                    .endpoints()
                    .into_iter()
                    .filter(|endpoint| {
                        args.method
                            .as_deref()
                            .is_none_or(|method| endpoint.method.eq_ignore_ascii_case(method.trim()))
                    })
                    .filter(|endpoint| {
                        args.tag
                            .as_deref()
                            .is_none_or(|tag| endpoint.tags.iter().any(|t| t.eq_ignore_ascii_case(tag.trim())))
                    })
                    .collect::<Vec<_>>();

                let listing = endpoints
                    .iter()
                    .map(|endpoint| match &endpoint.summary {
                        Some(summary) => format!("{} {} - {summary}", endpoint.method, endpoint.path),
                        None => format!("{} {}", endpoint.method, endpoint.path),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                let data = serde_json::to_value(&endpoints)
                    .map_err(|err| ToolError::Execution(err.to_string()))?;

                Ok(ToolResult::success(format!("{} endpoints\n{listing}", endpoints.len()))
                    .with_data(json!({ "endpoints": data })))
            }
        })
}

pub fn build_prompt(spec: &ApiSpec, focus: Focus) -> String {
    format!(
        "Analyse the API specification \"{}\" (version {}) loaded from {}. It defines {} endpoints.\n\
{}\nUse list_endpoints to inspect the endpoints. Finish with a prioritised list of concrete recommendations.",
        spec.title(),
        spec.version(),
        spec.source,
        spec.endpoints().len(),
        focus.instructions()
    )
}
