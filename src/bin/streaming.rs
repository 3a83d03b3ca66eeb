use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use clap::Parser;

/// Stream a reply token by token as it is generated.
#[derive(Parser, Debug)]
#[command(name = "streaming")]
struct Args {
    #[arg(default_value = "Write a short poem about the Rust borrow checker.")]
    prompt: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let client = samples::connect()?;
    let session = client.create_session(args.common.session_config().streaming(true))?;
    let _subscription = session.on_events(ConsolePrinter::stdout());

    let outcome = session.send_and_wait(args.prompt).await?;
    tracing::info!(turns = outcome.turns, "done");
    Ok(())
}
