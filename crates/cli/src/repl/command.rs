//! Parsing of chat-loop input into commands or messages.

/// A command typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Quit,
    New(Option<String>),
    List,
    Switch(String),
    Delete(String),
    Clear,
    Debug,
    Stats,
    Model,
    Save(String),
    Load(String),
    Stream,
}

/// One line of operator input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Nothing but whitespace.
    Blank,
    Command(ChatCommand),
    /// A command keyword missing its argument.
    Usage(&'static str),
    /// Anything else goes to the model.
    Message(String),
}

impl Input {
    /// Classify a line. The keyword is matched case-insensitively.
    ///
    /// Argument-less commands only match when typed alone, and commands taking
    /// an id or name only match with exactly one argument, so "help me with X"
    /// or "delete the second paragraph" are chat messages. A multi-word name
    /// for `new` must be quoted.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Blank;
        }

        let mut words = trimmed.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = words.collect();

        let command = match (keyword.as_str(), args.as_slice()) {
            ("help", []) => ChatCommand::Help,
            ("quit" | "exit", []) => ChatCommand::Quit,
            ("list", []) => ChatCommand::List,
            ("clear", []) => ChatCommand::Clear,
            ("debug", []) => ChatCommand::Debug,
            ("stats", []) => ChatCommand::Stats,
            ("model", []) => ChatCommand::Model,
            ("stream", []) => ChatCommand::Stream,
            ("new", []) => ChatCommand::New(None),
            ("new", [name]) => ChatCommand::New(Some(quoted(name).unwrap_or(name).to_string())),
            ("new", rest) => match quoted(&rest.join(" ")) {
                Some(name) => ChatCommand::New(Some(name.to_string())),
                None => return Self::Message(trimmed.to_string()),
            },
            ("switch", [id]) => ChatCommand::Switch((*id).to_string()),
            ("delete", [id]) => ChatCommand::Delete((*id).to_string()),
            ("save", [name]) => ChatCommand::Save((*name).to_string()),
            ("load", [name]) => ChatCommand::Load((*name).to_string()),
            ("switch", []) => return Self::Usage("switch <conversation_id>"),
            ("delete", []) => return Self::Usage("delete <conversation_id>"),
            ("save", []) => return Self::Usage("save <name>"),
            ("load", []) => return Self::Usage("load <name>"),
            _ => return Self::Message(trimmed.to_string()),
        };
        Self::Command(command)
    }
}

/// The text between a pair of enclosing double quotes, if non-empty.
fn quoted(text: &str) -> Option<&str> {
    text.strip_prefix('"')?
        .strip_suffix('"')
        .map(str::trim)
        .filter(|inner| !inner.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(line: &str) -> ChatCommand {
        match Input::parse(line) {
            Input::Command(c) => c,
            other => panic!("{line:?} parsed as {other:?}"),
        }
    }

    #[test]
    fn bare_keywords() {
        assert_eq!(cmd("help"), ChatCommand::Help);
        assert_eq!(cmd("  QUIT "), ChatCommand::Quit);
        assert_eq!(cmd("exit"), ChatCommand::Quit);
        assert_eq!(cmd("Stream"), ChatCommand::Stream);
        assert_eq!(cmd("stats"), ChatCommand::Stats);
    }

    #[test]
    fn arguments_keep_their_case() {
        assert_eq!(cmd("switch conv_AB12"), ChatCommand::Switch("conv_AB12".into()));
        assert_eq!(cmd("SAVE Work"), ChatCommand::Save("Work".into()));
        assert_eq!(cmd("new"), ChatCommand::New(None));
        assert_eq!(cmd("new Research"), ChatCommand::New(Some("Research".into())));
        assert_eq!(cmd("new \"Research\""), ChatCommand::New(Some("Research".into())));
        assert_eq!(
            cmd("new \"Trip to Lisbon\""),
            ChatCommand::New(Some("Trip to Lisbon".into()))
        );
    }

    #[test]
    fn keywords_in_sentences_are_messages() {
        for line in [
            "help me with Rust lifetimes",
            "model the data as a tree",
            "delete the second paragraph",
            "list three prime numbers",
            "new features in rust are great",
            "new \"unbalanced quote",
        ] {
            assert_eq!(Input::parse(line), Input::Message(line.into()));
        }
    }

    #[test]
    fn missing_argument_is_usage() {
        assert_eq!(Input::parse("save"), Input::Usage("save <name>"));
        assert_eq!(Input::parse("switch"), Input::Usage("switch <conversation_id>"));
    }

    #[test]
    fn blank_lines() {
        assert_eq!(Input::parse(""), Input::Blank);
        assert_eq!(Input::parse("   \t"), Input::Blank);
    }
}
