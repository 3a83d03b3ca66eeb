use agent_session_samples::samples::weather::get_weather_tool;
use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use clap::Parser;

/// Let the model call a `get_weather` tool.
#[derive(Parser, Debug)]
#[command(name = "weather_tool")]
struct Args {
    /// City to ask about.
    #[arg(default_value = "Seattle")]
    city: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let client = samples::connect()?;
    let session = client.create_session(
        args.common
            .session_config()
            .streaming(true)
            .tool(get_weather_tool()),
    )?;
    let _subscription = session.on_events(ConsolePrinter::stdout());

    session
        .send_and_wait(format!(
            "What's the weather like in {}? Should I bring an umbrella?",
            args.city
        ))
        .await?;
    Ok(())
}
