/// One line of interactive chat input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    /// Start over with a fresh session and handler.
    Clear,
    Empty,
    Prompt(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_ascii_lowercase().as_str() {
            "" => ChatCommand::Empty,
            "exit" | "quit" => ChatCommand::Exit,
            "clear" => ChatCommand::Clear,
            _ => ChatCommand::Prompt(line.to_string()),
        }
    }
}
