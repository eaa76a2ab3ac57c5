//! Built-in command tree.
//!
//! Small enough to be useful out of the box; applications replace the
//! factory with their own tree.

use {
    async_trait::async_trait,
    clap::{Arg, ArgMatches, Command},
};

use botwire_command::{CommandHandler, CommandNode, ExecutionContext};

/// Build a fresh built-in tree: `/help`, `/echo`, `/reset`.
pub fn builtin_tree() -> CommandNode {
    CommandNode::new(Command::new("bot"))
        .subcommand(CommandNode::new(Command::new("help")).handler(HelpCommand))
        .subcommand(
            CommandNode::new(
                Command::new("echo")
                    .about("Repeat the given text back")
                    .arg(Arg::new("text").num_args(0..)),
            )
            .handler(EchoCommand),
        )
        .subcommand(
            CommandNode::new(Command::new("reset").about("Clear conversation context"))
                .handler(ResetCommand),
        )
}

struct HelpCommand;

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn run(&self, ctx: &mut ExecutionContext, _matches: &ArgMatches) -> anyhow::Result<()> {
        ctx.out()
            .write_line(
                "available commands:\n\
                 /help           show this help\n\
                 /echo <text>    repeat the given text back\n\
                 /reset          clear conversation context",
            )
            .await;
        Ok(())
    }
}

struct EchoCommand;

#[async_trait]
impl CommandHandler for EchoCommand {
    async fn run(&self, ctx: &mut ExecutionContext, matches: &ArgMatches) -> anyhow::Result<()> {
        let text = matches
            .get_many::<String>("text")
            .map(|words| words.cloned().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        if text.is_empty() {
            ctx.out().write_line("nothing to echo").await;
        } else {
            ctx.out().write_line(text).await;
        }
        Ok(())
    }
}

struct ResetCommand;

#[async_trait]
impl CommandHandler for ResetCommand {
    async fn run(&self, ctx: &mut ExecutionContext, _matches: &ArgMatches) -> anyhow::Result<()> {
        ctx.values.clear();
        ctx.save_values()?;
        ctx.out().write_line("conversation context cleared").await;
        Ok(())
    }
}
