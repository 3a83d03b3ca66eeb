use agent_session_samples::samples::code_review::{build_prompt, git_diff};
use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use clap::Parser;

/// Review the uncommitted changes of the current git repository.
#[derive(Parser, Debug)]
#[command(name = "code_review")]
struct Args {
    /// What to pay particular attention to, e.g. "error handling".
    focus: Option<String>,

    /// Review staged changes instead of the working tree.
    #[arg(long)]
    staged: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let cwd = std::env::current_dir()?;
    let Some(diff) = git_diff(&cwd, args.staged).await else {
        println!("No changes to review");
        return Ok(());
    };

    let client = samples::connect()?;
    let session = client.create_session(args.common.session_config().streaming(true))?;
    let _subscription = session.on_events(ConsolePrinter::stdout());

    session
        .send_and_wait(build_prompt(&diff, args.focus.as_deref()))
        .await?;
    Ok(())
}
