use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{InputError, ToolError};
use crate::tools::{ParameterType, ToolParameter, ToolResult, ToolSpec};

const DEFAULT_MAX_MATCHES: usize = 50;

static LEVEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(FATAL|ERROR|WARN(?:ING)?|INFO|DEBUG|TRACE)\b").ok());

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Analysis {
    Errors,
    Performance,
    Security,
    #[default]
    Summary,
}

impl Analysis {
    pub fn instructions(self) -> &'static str {
        match self {
            Analysis::Errors => {
                "Find the errors and failures, group them by likely root cause, and suggest fixes."
            }
            Analysis::Performance => {
                "Look for slow operations, timeouts, retries and resource pressure, and say where time is going."
            }
            Analysis::Security => {
                "Look for authentication failures, suspicious access patterns and leaked secrets."
            }
            Analysis::Summary => {
                "Summarise what the system was doing, the notable events, and anything that needs attention."
            }
        }
    }
}

impl FromStr for Analysis {
    type Err = InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "errors" | "error" => Ok(Analysis::Errors),
            "performance" | "perf" => Ok(Analysis::Performance),
            "security" => Ok(Analysis::Security),
            "summary" => Ok(Analysis::Summary),
            _ => Err(InputError::Unsupported {
                kind: "analysis (expected errors, performance, security or summary)",
                value: value.to_string(),
            }),
        }
    }
}

/// A log file loaded for the analysis tools.
#[derive(Debug)]
pub struct LogFile {
    pub path: PathBuf,
    lines: Vec<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct LogStatistics {
    pub total_lines: usize,
    pub levels: BTreeMap<String, usize>,
    pub first_line: Option<String>,
    pub last_line: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct LogMatch {
    pub line_number: usize,
    pub text: String,
}

impl LogFile {
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let contents = super::read_input(path)?;
        Ok(Self::from_contents(path, &contents))
    }

    pub fn from_contents(path: &Path, contents: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: contents.lines().map(str::to_string).collect(),
        }
    }

    pub fn statistics(&self) -> LogStatistics {
        let mut levels = BTreeMap::new();
        if let Some(level) = LEVEL.as_ref() {
            for line in &self.lines {
                if let Some(found) = level.captures(line).and_then(|caps| caps.get(1)) {
                    let name = match found.as_str() {
                        "WARNING" => "WARN",
                        other => other,
                    };
                    *levels.entry(name.to_string()).or_insert(0) += 1;
                }
            }
        }

        LogStatistics {
            total_lines: self.lines.len(),
            levels,
            first_line: self.lines.first().cloned(),
            last_line: self.lines.last().cloned(),
        }
    }

    /// Case-insensitive regex search, at most `limit` matches.
    pub fn search(&self, pattern: &str, limit: usize) -> Result<Vec<LogMatch>, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| regex.is_match(line))
            .take(limit)
            .map(|(index, line)| LogMatch {
                line_number: index + 1,
                text: line.clone(),
            })
            .collect())
    }

    /// The first `max_lines` lines, for embedding in a prompt.
    pub fn excerpt(&self, max_lines: usize) -> String {
        self.lines
            .iter()
            .take(max_lines)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn log_tools() -> Vec<ToolSpec> {
    vec![statistics_tool(), search_tool()]
}

fn statistics_tool() -> ToolSpec {
    ToolSpec::new(
        "get_log_statistics",
        "Count lines and log levels in the log file being analysed",
    )
    .with_handler(|_args, ctx| {
        let log = ctx.require::<LogFile>();
        async move {
            let log = log?;
            let stats = log.statistics();
            let summary = stats
                .levels
                .iter()
                .map(|(level, count)| format!("{level}: {count}"))
                .collect::<Vec<_>>()
                .join(", ");
            let data = serde_json::to_value(&stats)
                .map_err(|err| ToolError::Execution(err.to_string()))?;
            Ok(ToolResult::success(format!(
                "{} lines ({})",
                stats.total_lines,
                if summary.is_empty() { "no levels found" } else { summary.as_str() }
            ))
            .with_data(data))
        }
    })
}

fn search_tool() -> ToolSpec {
    #[derive(Deserialize)]
    struct Args {
        pattern: String,
        max_results: Option<u64>,
    }

    ToolSpec::new("search_log", "Search the log file with a regular expression")
        .with_parameters(vec![
            ToolParameter::required("pattern", ParameterType::String, "Regular expression, case-insensitive"),
            ToolParameter::optional(
                "max_results",
                ParameterType::Integer,
                "Maximum number of matching lines (default 50)",
            ),
        ])
        .expect("valid parameters")
        .with_typed_handler(|args: Args, ctx| {
            let log = ctx.require::<LogFile>();
            async move {
                if args.pattern.trim().is_empty() {
                    return Ok(ToolResult::failure("pattern must not be empty"));
                }
                let log = log?;
                let limit = args
                    .max_results
                    .map_or(DEFAULT_MAX_MATCHES, |max| max.clamp(1, 500) as usize);

                let matches = match log.search(&args.pattern, limit) {
                    Ok(matches) => matches,
                    Err(err) => return Ok(ToolResult::failure(format!("invalid pattern: {err}"))),
                };
                let listing = matches
                    .iter()
                    .map(|found| format!("{}: {}", found.line_number, found.text))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ToolResult::success(format!(
                    "{} matching lines\n{listing}",
                    matches.len()
                ))
                .with_data(json!({ "count": matches.len() })))
            }
        })
}

pub fn build_prompt(log: &LogFile, analysis: Analysis) -> String {
    format!(
        "You are analysing the log file `{}`. {}\n\
Use get_log_statistics for an overview and search_log to dig into specific patterns \
before drawing conclusions. Here are the first lines for orientation:\n\n{}",
        log.path.display(),
        analysis.instructions(),
        log.excerpt(40)
    )
}
