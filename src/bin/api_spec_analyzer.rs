use agent_session_samples::samples::api_spec::{
    ApiSpec, Focus, SpecSource, build_prompt, list_endpoints_tool,
};
use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use clap::Parser;

/// Review an OpenAPI specification loaded from a URL or a file.
#[derive(Parser, Debug)]
#[command(name = "api_spec_analyzer")]
struct Args {
    /// URL or path of the specification (JSON or YAML).
    source: String,

    /// Review focus: security, documentation, design or all.
    #[arg(default_value = "all")]
    focus: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let focus: Focus = args.focus.parse()?;
    let spec = ApiSpec::load(&SpecSource::parse(&args.source)).await?;
    println!(
        "Loaded {} {} ({} endpoints)\n",
        spec.title(),
        spec.version(),
        spec.endpoints().len()
    );
    let prompt = build_prompt(&spec, focus);

    let client = samples::connect()?;
    let session = client.create_session(
        args.common
            .session_config()
            .streaming(true)
            .tool(list_endpoints_tool())
            .resource(spec),
    )?;
    let _subscription = session.on_events(ConsolePrinter::stdout());

    session.send_and_wait(prompt).await?;
    Ok(())
}
