use agent_session_samples::samples::test_data::{
    DEFAULT_COUNT, Format, Schema, build_prompt, output_path, parse_count,
};
use agent_session_samples::samples::{self, CommonArgs};
use anyhow::Context;
use clap::Parser;

/// Generate realistic test data for a built-in schema.
#[derive(Parser, Debug)]
#[command(name = "test_data_generator")]
struct Args {
    /// Schema to generate: user, product or order.
    schema: String,

    /// Output format: json, csv or sql.
    #[arg(default_value = "json")]
    format: String,

    /// Number of records, 1 to 1000.
    count: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let schema: Schema = args.schema.parse()?;
    let format: Format = args.format.parse()?;
    let count = match &args.count {
        Some(count) => parse_count(count)?,
        None => DEFAULT_COUNT,
    };

    let client = samples::connect()?;
    let session = client.create_session(args.common.session_config())?;

    println!("Generating {count} {} records as {format}...", schema.name());
    let outcome = session
        .send_and_wait(build_prompt(schema, format, count))
        .await?;
    let reply = outcome.message.context("the model returned no text")?;

    let output = output_path(schema, format);
    samples::write_output(&output, &samples::extract_code_block(&reply))?;
    println!("Test data written to {}", output.display());
    Ok(())
}
