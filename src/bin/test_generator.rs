use std::path::PathBuf;

use agent_session_samples::samples::test_gen::{build_prompt, infer_framework, output_path};
use agent_session_samples::samples::{self, CommonArgs};
use anyhow::Context;
use clap::Parser;

/// Generate unit tests for a source file and write them next to it.
#[derive(Parser, Debug)]
#[command(name = "test_generator")]
struct Args {
    /// Source file to test.
    file: PathBuf,

    /// Test framework; inferred from the file extension when omitted.
    framework: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let source = samples::read_input(&args.file)?;
    let framework = match &args.framework {
        Some(framework) => framework.clone(),
        None => infer_framework(&args.file)?.to_string(),
    };
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let client = samples::connect()?;
    let session = client.create_session(args.common.session_config())?;

    println!("Generating {framework} tests for {}...", args.file.display());
    let outcome = session
        .send_and_wait(build_prompt(&file_name, &source, &framework))
        .await?;
    let reply = outcome.message.context("the model returned no text")?;

    let output = output_path(&args.file);
    samples::write_output(&output, &samples::extract_code_block(&reply))?;
    println!("Tests written to {}", output.display());
    Ok(())
}
