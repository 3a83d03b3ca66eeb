use std::path::PathBuf;

use agent_session_samples::samples::log_analysis::{Analysis, LogFile, build_prompt, log_tools};
use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use clap::Parser;

/// Analyse a log file with the help of statistics and search tools.
#[derive(Parser, Debug)]
#[command(name = "log_analyzer")]
struct Args {
    /// Log file to analyse.
    log: PathBuf,

    /// Kind of analysis: errors, performance, security or summary.
    #[arg(default_value = "summary")]
    analysis: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let analysis: Analysis = args.analysis.parse()?;
    let log = LogFile::load(&args.log)?;
    let prompt = build_prompt(&log, analysis);

    let client = samples::connect()?;
    let session = client.create_session(
        args.common
            .session_config()
            .streaming(true)
            .tools(log_tools())
            .resource(log),
    )?;
    let _subscription = session.on_events(ConsolePrinter::stdout());

    session.send_and_wait(prompt).await?;
    Ok(())
}
