use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use agent_session_samples::session::SystemMessageMode;
use clap::Parser;

const APPENDED: &str = "Always finish with a one-line summary that starts with 'TL;DR:'.";
const REPLACEMENT: &str = "You are a pirate. Answer every question in pirate speak, briefly.";

/// Customise the system prompt by appending to or replacing the default.
#[derive(Parser, Debug)]
#[command(name = "system_message")]
struct Args {
    /// How to apply the system message: append or replace.
    mode: SystemMessageMode,

    #[arg(default_value = "Explain what a hash map is.")]
    prompt: String,

    /// System message content; a built-in example is used when omitted.
    #[arg(long)]
    content: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let content = args.content.unwrap_or_else(|| {
        match args.mode {
            SystemMessageMode::Append => APPENDED,
            SystemMessageMode::Replace => REPLACEMENT,
        }
        .to_string()
    });
    println!("System message ({:?}): {content}\n", args.mode);

    let client = samples::connect()?;
    let session = client.create_session(
        args.common
            .session_config()
            .streaming(true)
            .system_message(args.mode, content),
    )?;
    let _subscription = session.on_events(ConsolePrinter::stdout());

    session.send_and_wait(args.prompt).await?;
    Ok(())
}
