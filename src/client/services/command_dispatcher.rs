// Slash commands typed into the message input: suggestion list while typing,
// dispatch on submit.
use log::debug;
use crate::common::error::ChatError;
use crate::common::invite;

pub const COMMAND_PREFIX: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Text inserted into the input when the suggestion is accepted
    pub name: &'static str,
    /// Label shown in the suggestion list
    pub usage: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "/join",
        usage: "/join <code>",
        description: "Join a private group using an invite code",
    },
    CommandSpec {
        name: "/help",
        usage: "/help",
        description: "List available commands",
    },
];

/// Keys the dispatcher reacts to while the input is focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    Up,
    Down,
    Tab,
    Enter,
    Escape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The key moved the highlight or closed the list
    Handled,
    /// A suggestion was accepted; the input must become this text
    Completed(String),
    /// Enter outside of suggesting: submit the input
    Submit,
    Ignored,
}

/// What a submitted input line means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Empty,
    Join { code: String },
    Help,
    Post { content: String },
}

#[derive(Debug, Clone, Default)]
pub struct CommandDispatcher {
    suggestions: Vec<&'static CommandSpec>,
    selected: usize,
    active: bool,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-filters the command table for the current input text. Resets the highlight.
    pub fn on_input(&mut self, input: &str) {
        self.selected = 0;
        match input.strip_prefix(COMMAND_PREFIX) {
            Some(query) if typing_argument(query) => {
                self.active = false;
                self.suggestions.clear();
            }
            Some(query) => {
                self.active = true;
                self.suggestions = filter_commands(query);
            }
            None => {
                self.active = false;
                self.suggestions.clear();
            }
        }
    }

    pub fn is_suggesting(&self) -> bool {
        self.active && !self.suggestions.is_empty()
    }

    pub fn suggestions(&self) -> &[&'static CommandSpec] {
        if self.active { &self.suggestions[..] } else { &[] }
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&'static CommandSpec> {
        if !self.is_suggesting() {
            return None;
        }
        self.suggestions.get(self.selected).copied()
    }

    pub fn move_up(&mut self) {
        if self.is_suggesting() {
            let len = self.suggestions.len();
            self.selected = (self.selected + len - 1) % len;
        }
    }

    pub fn move_down(&mut self) {
        if self.is_suggesting() {
            self.selected = (self.selected + 1) % self.suggestions.len();
        }
    }

    /// Accepts the highlighted command: returns the replacement input text and closes the list.
    pub fn accept(&mut self) -> Option<String> {
        let cmd = self.selected()?;
        self.dismiss();
        Some(format!("{} ", cmd.name))
    }

    pub fn dismiss(&mut self) {
        self.active = false;
        self.selected = 0;
    }

    pub fn handle_key(&mut self, key: InputKey) -> KeyOutcome {
        if !self.is_suggesting() {
            return match key {
                InputKey::Enter => KeyOutcome::Submit,
                _ => KeyOutcome::Ignored,
            };
        }
        match key {
            InputKey::Up => {
                self.move_up();
                KeyOutcome::Handled
            }
            InputKey::Down => {
                self.move_down();
                KeyOutcome::Handled
            }
            InputKey::Tab | InputKey::Enter => match self.accept() {
                Some(text) => KeyOutcome::Completed(text),
                None => KeyOutcome::Ignored,
            },
            InputKey::Escape => {
                self.dismiss();
                KeyOutcome::Handled
            }
        }
    }
}

/// Case-insensitive match of the text after `/` against name or description.
pub fn filter_commands(query: &str) -> Vec<&'static CommandSpec> {
    let needle = query.to_lowercase();
    COMMANDS
        .iter()
        .filter(|c| {
            c.usage.to_lowercase().contains(&needle) || c.description.to_lowercase().contains(&needle)
        })
        .collect()
}

// "join AB1": the command is chosen and its argument is being typed.
fn typing_argument(query: &str) -> bool {
    match query.split_once(char::is_whitespace) {
        Some((name, _)) => COMMANDS
            .iter()
            .any(|c| c.name.trim_start_matches(COMMAND_PREFIX).eq_ignore_ascii_case(name)),
        None => false,
    }
}

/// Interprets a submitted input line. A `/join` with a code of the wrong length
/// fails here, before any lookup is issued.
pub fn parse_submission(input: &str) -> Result<Submission, ChatError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Submission::Empty);
    }
    if let Some(rest) = command_argument(trimmed, "/join") {
        let code = rest.trim();
        if !invite::has_valid_shape(code) {
            debug!("[CMD] Rejected invite code of length {}", code.chars().count());
            return Err(ChatError::InvalidInviteCode(code.to_string()));
        }
        return Ok(Submission::Join { code: code.to_string() });
    }
    if trimmed == "/help" {
        return Ok(Submission::Help);
    }
    Ok(Submission::Post { content: trimmed.to_string() })
}

// "/join" alone or "/join <arg>"; "/joinx" is plain text.
fn command_argument<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(command)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}
