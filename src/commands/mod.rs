pub mod dispatcher;
pub mod handler;
pub mod registry;

pub use dispatcher::{CommandDispatcher, create_command_registry};

/// A slash command split into its name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
}

/// `/name arg ...` → `SlashCommand`; anything else → `None`.
pub fn split_command(line: &str) -> Option<SlashCommand<'_>> {
    let rest = line.trim().strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next()?;
    Some(SlashCommand {
        name,
        args: parts.collect(),
    })
}
