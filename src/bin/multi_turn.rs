use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use clap::Parser;

const PROMPTS: [&str; 3] = [
    "Hi! My name is Ada and I'm learning Rust.",
    "Suggest a good first project for me, in two sentences.",
    "Remind me, what's my name and what am I learning?",
];

/// Send several prompts on one session; later answers rely on earlier ones.
#[derive(Parser, Debug)]
#[command(name = "multi_turn")]
struct Args {
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

    for prompt in PROMPTS {
        println!("> {prompt}");
        session.send_and_wait(prompt).await?;
        println!();
    }
    Ok(())
}
