use crate::commands::CommandDispatcher;
use crate::core::error::QllamaError;

use console::style;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::history::FileHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, Context, EditMode, Editor, Helper};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Completes slash commands, and file names everywhere else (attachment paths).
pub struct ChatCompleter {
    filename_completer: FilenameCompleter,
    commands: CommandDispatcher,
}

impl ChatCompleter {
    pub fn new(commands: CommandDispatcher) -> Self {
        Self {
            filename_completer: FilenameCompleter::new(),
            commands,
        }
    }
}

fn command_matches(commands: &CommandDispatcher, typed: &str) -> Vec<String> {
    commands
        .get_command_names()
        .into_iter()
        .filter(|cmd| cmd.starts_with(typed))
        .collect()
}

impl Completer for ChatCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if let Some(typed) = line[..pos].strip_prefix('/') {
            if !typed.contains(char::is_whitespace) {
                let matches: Vec<Pair> = command_matches(&self.commands, typed)
                    .into_iter()
                    .map(|cmd| Pair {
                        display: cmd.clone(),
                        replacement: cmd,
                    })
                    .collect();

                if !matches.is_empty() {
                    return Ok((1, matches));
                }
            }
        }

        self.filename_completer.complete(line, pos, ctx)
    }
}

/// Hints the rest of a uniquely-prefixed slash command, otherwise from history.
pub struct ChatHinter {
    history_hinter: HistoryHinter,
    commands: CommandDispatcher,
}

impl ChatHinter {
    pub fn new(commands: CommandDispatcher) -> Self {
        Self {
            history_hinter: HistoryHinter {},
            commands,
        }
    }
}

impl Hinter for ChatHinter {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        if pos == line.len() {
            if let Some(typed) = line.strip_prefix('/') {
                if !typed.is_empty() {
                    if let [only] = command_matches(&self.commands, typed).as_slice() {
                        return Some(only[typed.len()..].to_string()).filter(|h| !h.is_empty());
                    }
                }
            }
        }

        self.history_hinter.hint(line, pos, ctx)
    }
}

/// Helper struct that combines the rustyline components
pub struct ChatHelper {
    completer: ChatCompleter,
    hinter: ChatHinter,
}

impl ChatHelper {
    pub fn new(commands: CommandDispatcher) -> Self {
        Self {
            completer: ChatCompleter::new(commands.clone()),
            hinter: ChatHinter::new(commands),
        }
    }
}

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for ChatHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(style(hint).dim().to_string())
    }
}

impl Validator for ChatHelper {}

pub type ChatEditor = Editor<ChatHelper, FileHistory>;

/// What the prompt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// Ctrl-C at the prompt.
    Interrupted,
    /// Ctrl-D, or stdin closed.
    Eof,
}

/// Line editor plus the file its history is appended to.
pub struct LineReader {
    editor: ChatEditor,
    history_path: PathBuf,
}

impl LineReader {
    pub fn new(commands: CommandDispatcher, history_path: PathBuf) -> Result<Self, QllamaError> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .build();

        let mut editor: ChatEditor = Editor::with_config(config)
            .map_err(|e| QllamaError::Input(format!("Failed to create line editor: {}", e)))?;
        editor.set_helper(Some(ChatHelper::new(commands)));

        if let Some(parent) = history_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Could not create {}: {}", parent.display(), e);
            }
        }
        if history_path.exists() {
            if let Err(e) = editor.load_history(&history_path) {
                tracing::warn!("Could not load input history {}: {}", history_path.display(), e);
            }
        }

        Ok(Self {
            editor,
            history_path,
        })
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Reads one line. Non-empty lines are appended to the history file right away.
    pub fn read(&mut self) -> Result<InputEvent, QllamaError> {
        let prompt = if cfg!(windows) && std::env::var("PSModulePath").is_ok() {
            "> ".to_string()
        } else {
            style("> ").bold().cyan().to_string()
        };

        match self.editor.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.remember(&line);
                }
                Ok(InputEvent::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(InputEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(InputEvent::Eof),
            Err(err) => Err(QllamaError::Input(format!("Input error: {}", err))),
        }
    }

    fn remember(&mut self, line: &str) {
        if let Err(e) = self.editor.add_history_entry(line) {
            tracing::warn!("Failed to add history entry: {}", e);
            return;
        }
        if let Err(e) = self.editor.append_history(&self.history_path) {
            tracing::warn!(
                "Failed to append to input history {}: {}",
                self.history_path.display(),
                e
            );
        }
    }
}
