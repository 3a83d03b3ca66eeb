use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use clap::Parser;

/// Ask one question and print the answer.
#[derive(Parser, Debug)]
#[command(name = "hello")]
struct Args {
    /// Question to ask.
    #[arg(default_value = "What is 2+2?")]
    prompt: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let client = samples::connect()?;
    let session = client.create_session(args.common.session_config())?;
    let _subscription = session.on_events(ConsolePrinter::stdout());

    session.send_and_wait(args.prompt).await?;
    Ok(())
}
