use agent_session_samples::browser::{SharedPage, WebDriverBrowser, WebDriverConfig, share_page};
use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use agent_session_samples::session::{AgentClient, SystemMessageMode};
use agent_session_samples::tools::browser::browser_tools;
use clap::Parser;
use tracing::warn;

const BROWSER_INSTRUCTIONS: &str = "You control a web browser through tools. Start by calling \
get_page_content to see the page. Use click and fill to interact, and navigate to follow links. \
Report what you found, citing the page content.";

/// Let the model browse a website through a WebDriver-controlled browser.
#[derive(Parser, Debug)]
#[command(name = "browser_agent")]
struct Args {
    /// Page to start from.
    url: String,

    /// What to do on the site.
    #[arg(default_value = "Summarise the main content of this page.")]
    task: String,

    /// WebDriver server to connect to.
    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:4444")]
    webdriver_url: String,

    /// Show the browser window.
    #[arg(long)]
    headed: bool,

    #[command(flatten)]
    common: CommonArgs,
}

async fn run(client: &AgentClient, args: &Args, page: &SharedPage) -> anyhow::Result<()> {
    {
        let mut page = page.lock().await;
        page.navigate(&args.url).await?;
        if let Err(err) = page.wait_for_network_idle(std::time::Duration::from_secs(15)).await {
            warn!(error = %err, "start page did not settle");
        }
    }

    let session = client.create_session(
        args.common
            .session_config()
            .streaming(true)
            .system_message(SystemMessageMode::Append, BROWSER_INSTRUCTIONS)
            .tools(browser_tools())
            .resource(page.clone()),
    )?;
    let _subscription = session.on_events(ConsolePrinter::stdout());

    session
        .send_and_wait(format!("The browser is open at {}. Task: {}", args.url, args.task))
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();
    let client = samples::connect()?;

    let headless = !args.headed && WebDriverConfig::from_env().headless;
    let browser = WebDriverBrowser::launch(WebDriverConfig {
        endpoint: args.webdriver_url.clone(),
        headless,
    })
    .await?;
    let page = share_page(browser);

    let result = run(&client, &args, &page).await;

    if let Err(err) = page.lock().await.close().await {
        warn!(error = %err, "failed to close browser");
    }
    result
}
