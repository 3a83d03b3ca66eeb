use std::io::Write;

use agent_session_samples::samples::chat::ChatCommand;
use agent_session_samples::samples::{self, CommonArgs, ConsolePrinter};
use agent_session_samples::session::{AgentClient, Session, SessionConfig, Subscription};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Chat on the terminal. `clear` starts a fresh conversation, `exit` or
/// `quit` leaves.
#[derive(Parser, Debug)]
#[command(name = "interactive_chat")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

fn open(client: &AgentClient, config: &SessionConfig) -> anyhow::Result<(Session, Subscription)> {
    let session = client.create_session(config.clone())?;
    let subscription = session.on_events(ConsolePrinter::stdout());
    Ok((session, subscription))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = samples::parse_or_exit();
    samples::init_logging();

    let client = samples::connect()?;
    let config = args.common.session_config().streaming(true);
    let (mut session, mut subscription) = open(&client, &config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Chat started. Type 'clear' to reset, 'exit' to quit.");
    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match ChatCommand::parse(&line) {
            ChatCommand::Exit => break,
            ChatCommand::Empty => continue,
            ChatCommand::Clear => {
                subscription.dispose();
                session.dispose();
                (session, subscription) = open(&client, &config)?;
                println!("Conversation cleared.");
            }
            ChatCommand::Prompt(prompt) => {
                print!("Assistant: ");
                std::io::stdout().flush()?;
                if let Err(err) = session.send_and_wait(prompt).await {
                    eprintln!("Error: {err}");
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}
