//! Plumbing shared by the sample binaries: argument parsing with the usage
//! and exit-code policy, logging, backend connection, console output and
//! file output.

pub mod api_spec;
pub mod chat;
pub mod code_review;
pub mod log_analysis;
pub mod test_data;
pub mod test_gen;
pub mod weather;

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::error::InputError;
use crate::llm::AnthropicProvider;
use crate::session::{AgentClient, DEFAULT_MODEL, EventHandler, SessionConfig};
use crate::tools::ToolResult;

/// Flags every sample accepts.
#[derive(clap::Args, Debug, Clone)]
pub struct CommonArgs {
    /// Model identifier sent to the backend.
    #[arg(long, env = "AGENT_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Seconds to wait for one exchange before giving up.
    #[arg(long, env = "AGENT_TIMEOUT_SECS", default_value_t = 300)]
    pub timeout_secs: u64,
}

impl CommonArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.model.clone())
            .exchange_timeout(Some(Duration::from_secs(self.timeout_secs)))
    }
}

/// What to print, and the exit code, when arguments cannot be used.
#[derive(Debug, PartialEq, Eq)]
pub struct UsageExit {
    pub code: i32,
    pub text: String,
}

pub fn parse_from<T, I, S>(args: I) -> Result<T, UsageExit>
where
    T: Parser,
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    T::try_parse_from(args).map_err(|err| {
        let code = match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
            _ => 1,
        };
        UsageExit {
            code,
            text: err.render().to_string(),
        }
    })
}

/// Loads `.env`, parses the process arguments, and on failure prints usage
/// to stdout and exits: 0 for `--help`, 1 otherwise.
pub fn parse_or_exit<T: Parser>() -> T {
    let _ = dotenvy::dotenv();
    match parse_from(std::env::args_os()) {
        Ok(args) => args,
        Err(exit) => {
            print!("{}", exit.text);
            let _ = io::stdout().flush();
            std::process::exit(exit.code);
        }
    }
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// A client for the Anthropic backend, configured from the environment.
pub fn connect() -> anyhow::Result<AgentClient> {
    let provider = AnthropicProvider::from_env()?;
    Ok(AgentClient::new(provider))
}

pub fn read_input(path: &Path) -> Result<String, InputError> {
    if !path.is_file() {
        return Err(InputError::FileNotFound(path.display().to_string()));
    }
    std::fs::read_to_string(path).map_err(|err| InputError::Unreadable {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Writes generated output, replacing any existing file.
pub fn write_output(path: &Path, contents: &str) -> io::Result<()> {
    if path.exists() {
        debug!(path = %path.display(), "overwriting existing file");
    }
    std::fs::write(path, contents)?;
    info!(path = %path.display(), bytes = contents.len(), "output written");
    Ok(())
}

static CODE_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\n(.*?)```").ok());

/// The body of the first fenced code block, or the whole reply when there is
/// none.
pub fn extract_code_block(reply: &str) -> String {
    CODE_FENCE
        .as_ref()
        .and_then(|fence| fence.captures(reply))
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().to_string())
        .unwrap_or_else(|| format!("{}\n", reply.trim()))
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Prints session events to a console. Assistant text is printed exactly
/// once: as deltas on streaming sessions, whole otherwise.
pub struct ConsolePrinter<W = io::Stdout> {
    out: W,
    show_tools: bool,
    mid_message: bool,
}

impl ConsolePrinter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsolePrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            show_tools: true,
            mid_message: false,
        }
    }

    pub fn show_tools(mut self, show: bool) -> Self {
        self.show_tools = show;
        self
    }
}

impl<W: Write + Send> EventHandler for ConsolePrinter<W> {
    fn on_message_delta(&mut self, delta: &str) {
        let _ = write!(self.out, "{delta}");
        let _ = self.out.flush();
        self.mid_message = true;
    }

    fn on_assistant_message(&mut self, content: &str) {
        if self.mid_message {
            let _ = writeln!(self.out);
        } else {
            let _ = writeln!(self.out, "{content}");
        }
        self.mid_message = false;
    }

    fn on_tool_start(&mut self, _tool_call_id: &str, tool: &str, arguments: &Value) {
        if self.show_tools {
            let _ = writeln!(self.out, "[tool] {tool} {}", truncate(&arguments.to_string(), 120));
        }
    }

    fn on_tool_complete(&mut self, _tool_call_id: &str, tool: &str, result: &ToolResult) {
        if self.show_tools {
            let status = if result.success { "ok" } else { "failed" };
            let _ = writeln!(self.out, "[tool] {tool} {status}: {}", truncate(&result.message, 160));
        }
    }

    fn on_idle(&mut self) {
        if self.mid_message {
            let _ = writeln!(self.out);
            self.mid_message = false;
        }
        let _ = self.out.flush();
    }

    /// The failure itself reaches the caller through the pending exchange.
    fn on_error(&mut self, message: &str) {
        if self.mid_message {
            let _ = writeln!(self.out);
            self.mid_message = false;
        }
        debug!(error = message, "exchange failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::session::SessionEvent;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Parser, Debug)]
    #[command(name = "test_generator")]
    struct DemoArgs {
        file: String,
        framework: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    }

    #[test]
    fn missing_positional_is_usage_with_exit_one() {
        let exit = parse_from::<DemoArgs, _, _>(["test_generator"]).expect_err("missing file");
        assert_eq!(exit.code, 1);
        assert!(exit.text.contains("Usage: test_generator"));
    }

    #[test]
    fn help_exits_zero() {
        let exit = parse_from::<DemoArgs, _, _>(["test_generator", "--help"]).expect_err("help");
        assert_eq!(exit.code, 0);
        assert!(exit.text.contains("--model"));
    }

    #[test]
    fn positionals_and_flags_parse() {
        let args = parse_from::<DemoArgs, _, _>([
            "test_generator",
            "src/lib.rs",
            "--model",
            "claude-haiku-4-5",
        ])
        .expect("valid args");
        assert_eq!(args.file, "src/lib.rs");
        assert_eq!(args.framework, None);
        assert_eq!(args.common.model, "claude-haiku-4-5");
    }

    #[test]
    fn printer_prints_non_streamed_text_once() {
        let buf = SharedBuf::default();
        let mut printer = ConsolePrinter::new(buf.clone());
        printer.handle(&SessionEvent::AssistantMessage {
            content: "4".to_string(),
        });
        printer.handle(&SessionEvent::SessionIdle);
        assert_eq!(buf.text(), "4\n");
    }

    #[test]
    fn printer_does_not_repeat_streamed_text() {
        let buf = SharedBuf::default();
        let mut printer = ConsolePrinter::new(buf.clone());
        for delta in ["The answer", " is 4."] {
            printer.handle(&SessionEvent::MessageDelta {
                delta: delta.to_string(),
            });
        }
        printer.handle(&SessionEvent::AssistantMessage {
            content: "The answer is 4.".to_string(),
        });
        printer.handle(&SessionEvent::SessionIdle);
        assert_eq!(buf.text(), "The answer is 4.\n");
    }

    #[test]
    fn printer_reports_tool_calls() {
        let buf = SharedBuf::default();
        let mut printer = ConsolePrinter::new(buf.clone());
        printer.handle(&SessionEvent::ToolExecutionStart {
            tool_call_id: "call_1".to_string(),
            tool: "get_weather".to_string(),
            arguments: json!({"city": "Seattle"}),
        });
        printer.handle(&SessionEvent::ToolExecutionComplete {
            tool_call_id: "call_1".to_string(),
            tool: "get_weather".to_string(),
            result: ToolResult::failure("service unavailable"),
        });
        let text = buf.text();
        assert!(text.contains("[tool] get_weather {\"city\":\"Seattle\"}"));
        assert!(text.contains("[tool] get_weather failed: service unavailable"));
    }

    #[test]
    fn code_block_extraction() {
        let reply = "Here you go:\n```rust\nfn main() {}\n```\nand more\n```\nsecond\n```";
        assert_eq!(extract_code_block(reply), "fn main() {}\n");
        assert_eq!(extract_code_block("  plain text  "), "plain text\n");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn read_input_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.rs");
        assert!(matches!(
            read_input(&missing),
            Err(InputError::FileNotFound(_))
        ));

        let present = dir.path().join("lib.rs");
        write_output(&present, "pub fn add() {}\n").unwrap();
        write_output(&present, "pub fn sub() {}\n").unwrap();
        assert_eq!(read_input(&present).unwrap(), "pub fn sub() {}\n");
    }
}
