//! Tools that drive the session's [`SharedPage`].
//!
//! Every tool locks the page for the whole call and reports engine failures
//! as `success: false` results.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{ParameterType, ToolContext, ToolParameter, ToolResult, ToolSpec};
use crate::browser::SharedPage;
use crate::error::{BrowserError, ToolError};

const NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_CONTENT_CHARS: usize = 8_000;

const TITLE_SCRIPT: &str = "return document.title;";
const CONTENT_SCRIPT: &str = "return document.body ? document.body.innerText : '';";

/// The browser tool set. The page itself comes from the session context, so
/// configure the session with a [`SharedPage`] resource.
pub fn browser_tools() -> Vec<ToolSpec> {
    vec![
        navigate_tool(),
        page_content_tool(),
        click_tool(),
        fill_tool(),
        screenshot_tool(),
    ]
}

fn page(ctx: &ToolContext) -> Result<SharedPage, ToolError> {
    ctx.require::<SharedPage>().map(|page| (*page).clone())
}

fn engine_failure(action: &str, err: BrowserError) -> ToolResult {
    warn!(action, error = %err, "browser action failed");
    ToolResult::failure(format!("Failed to {action}: {err}"))
}

fn string_parameter(name: &str, description: &str) -> ToolParameter {
    ToolParameter::required(name, ParameterType::String, description)
}

fn navigate_tool() -> ToolSpec {
    #[derive(Deserialize)]
    struct Args {
        url: String,
    }

    ToolSpec::new("navigate", "Open a URL in the browser and wait for the page to load")
        .with_parameters(vec![string_parameter("url", "Absolute URL to open")])
        .expect("valid parameters")
        .with_typed_handler(|args: Args, ctx| {
            let page = page(ctx);
            async move {
                let url = args.url.trim().to_string();
                if url.is_empty() {
                    return Ok(ToolResult::failure("url must not be empty"));
                }

                let page = page?;
                let mut page = page.lock().await;
                if let Err(err) = page.navigate(&url).await {
                    return Ok(engine_failure("navigate", err));
                }
                if let Err(err) = page.wait_for_network_idle(NETWORK_IDLE_TIMEOUT).await {
                    warn!(url = %url, error = %err, "page did not settle; continuing");
                }
                let title = page.evaluate(TITLE_SCRIPT).await.unwrap_or_default();

                Ok(ToolResult::success(format!("Navigated to {url}"))
                    .with_data(json!({ "url": url, "title": title })))
            }
        })
}

fn page_content_tool() -> ToolSpec {
    ToolSpec::new("get_page_content", "Read the visible text of the current page").with_handler(
        |_args, ctx| {
            let page = page(ctx);
            async move {
                let page = page?;
                let mut page = page.lock().await;
                let text = match page.evaluate(CONTENT_SCRIPT).await {
                    Ok(text) => text,
                    Err(err) => return Ok(engine_failure("read page content", err)),
                };

                let length = text.chars().count();
                let truncated = length > MAX_CONTENT_CHARS;
                let content = if truncated {
                    text.chars().take(MAX_CONTENT_CHARS).collect()
                } else {
                    text
                };
                Ok(ToolResult::success(content)
                    .with_data(json!({ "length": length, "truncated": truncated })))
            }
        },
    )
}

fn click_tool() -> ToolSpec {
    #[derive(Deserialize)]
    struct Args {
        target: String,
    }

    ToolSpec::new("click", "Click an element by CSS selector or by its visible text")
        .with_parameters(vec![string_parameter("target", "CSS selector or visible text of the element")])
        .expect("valid parameters")
        .with_typed_handler(|args: Args, ctx| {
            let page = page(ctx);
            async move {
                let target = args.target.trim().to_string();
                if target.is_empty() {
                    return Ok(ToolResult::failure("target must not be empty"));
                }

                let page = page?;
                let mut page = page.lock().await;
                match page.click(&target).await {
                    Ok(()) => Ok(ToolResult::success(format!("Clicked {target}"))),
                    Err(err) => Ok(engine_failure("click", err)),
                }
            }
        })
}

fn fill_tool() -> ToolSpec {
    #[derive(Deserialize)]
    struct Args {
        selector: String,
        value: String,
    }

    ToolSpec::new("fill", "Type a value into an input field")
        .with_parameters(vec![
            string_parameter("selector", "CSS selector of the input"),
            string_parameter("value", "Text to type; empty clears the field"),
        ])
        .expect("valid parameters")
        .with_typed_handler(|args: Args, ctx| {
            let page = page(ctx);
            async move {
                let selector = args.selector.trim().to_string();
                if selector.is_empty() {
                    return Ok(ToolResult::failure("selector must not be empty"));
                }

                let page = page?;
                let mut page = page.lock().await;
                match page.fill(&selector, &args.value).await {
                    Ok(()) => Ok(ToolResult::success(format!("Filled {selector}"))),
                    Err(err) => Ok(engine_failure("fill", err)),
                }
            }
        })
}

fn screenshot_tool() -> ToolSpec {
    #[derive(Deserialize)]
    struct Args {
        filename: String,
    }

    ToolSpec::new("screenshot", "Save a PNG screenshot of the current page")
        .with_parameters(vec![string_parameter("filename", "File to write, e.g. homepage.png")])
        .expect("valid parameters")
        .with_typed_handler(|args: Args, ctx| {
            let page = page(ctx);
            async move {
                let filename = args.filename.trim();
                if filename.is_empty() {
                    return Ok(ToolResult::failure("filename must not be empty"));
                }
                let mut path = PathBuf::from(filename);
                if path.extension().is_none() {
                    path.set_extension("png");
                }

                let page = page?;
                let mut page = page.lock().await;
                match page.screenshot(&path).await {
                    Ok(()) => Ok(ToolResult::success(format!("Saved screenshot to {}", path.display()))
                        .with_data(json!({ "path": path.display().to_string() }))),
                    Err(err) => Ok(engine_failure("take screenshot", err)),
                }
            }
        })
}
