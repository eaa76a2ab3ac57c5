use std::sync::Arc;

use {
    async_trait::async_trait,
    clap::{ArgMatches, Command},
};

use crate::context::ExecutionContext;

/// The work behind one command node.
///
/// Handlers stream output through `ctx.out()` and read parsed flags from
/// `matches`. Returning an error turns into an execution-error chunk for the
/// user; it does not abort the stream.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, ctx: &mut ExecutionContext, matches: &ArgMatches) -> anyhow::Result<()>;
}

/// One node of a per-request command tree: a clap spec plus an optional
/// handler and child nodes.
pub struct CommandNode {
    spec: Command,
    handler: Option<Arc<dyn CommandHandler>>,
    children: Vec<CommandNode>,
}

/// Constructor invoked once per request to build a fresh command tree.
///
/// Sharing one tree between concurrent requests would race on parsed flag
/// state; the factory guarantees per-request isolation.
pub type CommandFactory = Arc<dyn Fn() -> CommandNode + Send + Sync>;

impl CommandNode {
    pub fn new(spec: Command) -> Self {
        Self {
            spec,
            handler: None,
            children: Vec::new(),
        }
    }

    /// Attach the handler that runs when this node is selected.
    pub fn handler(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Attach a child command.
    pub fn subcommand(mut self, child: CommandNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        self.spec.get_name()
    }

    pub(crate) fn handler_ref(&self) -> Option<Arc<dyn CommandHandler>> {
        self.handler.clone()
    }

    /// Build the full clap command, wiring child specs in recursively.
    pub(crate) fn assemble(&self) -> Command {
        let mut cmd = self.spec.clone();
        for child in &self.children {
            cmd = cmd.subcommand(child.assemble());
        }
        cmd
    }

    /// Walk the parsed subcommand chain down to the selected node.
    pub(crate) fn resolve<'a>(&'a self, matches: &'a ArgMatches) -> (&'a CommandNode, &'a ArgMatches) {
        let mut node = self;
        let mut current = matches;
        while let Some((name, sub)) = current.subcommand() {
            match node.children.iter().find(|c| c.name() == name) {
                Some(child) => {
                    node = child;
                    current = sub;
                },
                None => break,
            }
        }
        (node, current)
    }
}

#[cfg(test)]
mod tests {
    use clap::Arg;

    use super::*;

    fn tree() -> CommandNode {
        CommandNode::new(Command::new("bot"))
            .subcommand(CommandNode::new(
                Command::new("echo").arg(Arg::new("text").num_args(0..)),
            ))
            .subcommand(
                CommandNode::new(Command::new("config"))
                    .subcommand(CommandNode::new(Command::new("get"))),
            )
    }

    #[test]
    fn assemble_includes_nested_children() {
        let cmd = tree().assemble();
        let names: Vec<_> = cmd.get_subcommands().map(Command::get_name).collect();
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"config"));
    }

    #[test]
    fn resolve_walks_to_leaf() {
        let root = tree();
        let matches = root
            .assemble()
            .no_binary_name(true)
            .try_get_matches_from(["config", "get"])
            .unwrap();
        let (node, _) = root.resolve(&matches);
        assert_eq!(node.name(), "get");
    }

    #[test]
    fn resolve_stays_on_root_without_subcommand() {
        let root = tree();
        let matches = root
            .assemble()
            .no_binary_name(true)
            .try_get_matches_from(Vec::<String>::new())
            .unwrap();
        let (node, _) = root.resolve(&matches);
        assert_eq!(node.name(), "bot");
    }
}
