use std::sync::Arc;

use {
    botwire_core::{
        ActiveResponder, CHUNK_CHANNEL_CAPACITY, ChunkReceiver, ChunkSender, PipelineInvoker,
        StreamChunk, Update,
    },
    clap::error::ErrorKind,
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

use crate::{
    context::{ExecutionContext, SignalSender},
    io::ChunkWriter,
    llm::LlmProvider,
    parser::Parser,
    store::{ContextValues, ConversationStore},
    tree::CommandFactory,
};

/// Per-request command executor.
///
/// Implements [`PipelineInvoker`]: each trigger parses the update text,
/// builds a fresh command tree from the factory, and runs the selected
/// handler on a detached task, streaming its output back as chunks.
pub struct CommandManager {
    factory: CommandFactory,
    parser: Parser,
    store: Option<Arc<dyn ConversationStore>>,
    llm: Option<Arc<dyn LlmProvider>>,
    responder: Option<Arc<dyn ActiveResponder>>,
}

impl CommandManager {
    pub fn new(factory: impl Fn() -> crate::tree::CommandNode + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            parser: Parser::new(),
            store: None,
            llm: None,
            responder: None,
        }
    }

    /// Override the default "/"-prefixed parser.
    pub fn with_parser(mut self, parser: Parser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn ActiveResponder>) -> Self {
        self.responder = Some(responder);
        self
    }
}

impl PipelineInvoker for CommandManager {
    fn trigger(&self, update: Update, stream_id: &str) -> Option<ChunkReceiver> {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let invocation = Invocation {
            update,
            stream_id: stream_id.to_string(),
            factory: Arc::clone(&self.factory),
            parser: self.parser.clone(),
            store: self.store.clone(),
            llm: self.llm.clone(),
            responder: self.responder.clone(),
            tx,
        };
        tokio::spawn(invocation.run());
        Some(rx)
    }
}

/// Everything one invocation needs, detached from the manager's lifetime.
struct Invocation {
    update: Update,
    stream_id: String,
    factory: CommandFactory,
    parser: Parser,
    store: Option<Arc<dyn ConversationStore>>,
    llm: Option<Arc<dyn LlmProvider>>,
    responder: Option<Arc<dyn ActiveResponder>>,
    tx: ChunkSender,
}

impl Invocation {
    async fn run(self) {
        let parsed = self.parser.parse(&self.update.text);
        if !parsed.is_command {
            let content = if self.update.text.trim().is_empty() {
                "please input a command (e.g. /help)".to_string()
            } else {
                format!("unknown command: {}, try /help", parsed.raw)
            };
            let _ = self.tx.send(StreamChunk::final_text(content)).await;
            return;
        }

        let root = (self.factory)();
        let writer = ChunkWriter::new(self.tx.clone());
        let signal = SignalSender::new(self.tx.clone());

        let key = format!("{}:{}", self.update.chat_id, self.update.sender_id);
        let values = match &self.store {
            Some(store) => match store.load(&key) {
                Ok(values) => values,
                Err(error) => {
                    warn!(key, %error, "conversation context load failed");
                    ContextValues::new()
                },
            },
            None => ContextValues::new(),
        };

        let mut ctx = ExecutionContext::new(
            self.update.clone(),
            self.stream_id.clone(),
            values,
            self.store.clone(),
            self.llm.clone(),
            self.responder.clone(),
            writer.clone(),
            signal.clone(),
        );

        // Drop a leading token equal to the root command's name so
        // "/bot echo hi" and "/echo hi" both route to the echo node.
        let mut args = parsed.tokens;
        if let Some(first) = args.first()
            && first.eq_ignore_ascii_case(root.name())
        {
            args.remove(0);
        }
        debug!(?args, sender = %self.update.sender_id, "executing command");

        let cmd = root
            .assemble()
            .no_binary_name(true)
            .disable_help_subcommand(true);
        match cmd.try_get_matches_from(&args) {
            Ok(matches) => {
                let (node, leaf) = root.resolve(&matches);
                match node.handler_ref() {
                    Some(handler) => {
                        if let Err(error) = handler.run(&mut ctx, leaf).await {
                            warn!(%error, "command execution error");
                            writer.write(format!("❌ execution error: {error}\n")).await;
                        }
                    },
                    // A group node without a handler answers with its help.
                    None => {
                        let help = node.assemble().render_help().to_string();
                        writer.write(help).await;
                    },
                }
            },
            Err(error) => match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    writer.write(error.to_string()).await;
                },
                _ => {
                    writer.write(format!("❌ execution error: {error}")).await;
                },
            },
        }

        // Fallback terminator for the normal-completion path; a no-op when a
        // payload or silent signal already fired.
        signal.fire(StreamChunk::finished()).await;
    }
}

#[cfg(test)]
mod tests {
    use {
        async_trait::async_trait,
        botwire_core::ChunkPayload,
        clap::{Arg, ArgMatches, Command},
    };

    use super::*;
    use crate::{
        store::MemoryStore,
        tree::{CommandHandler, CommandNode},
    };

    struct EchoHandler;

    #[async_trait]
    impl CommandHandler for EchoHandler {
        async fn run(&self, ctx: &mut ExecutionContext, matches: &ArgMatches) -> anyhow::Result<()> {
            let tag = matches
                .get_one::<String>("tag")
                .cloned()
                .unwrap_or_default();
            let words: Vec<String> = matches
                .get_many::<String>("text")
                .map(|v| v.cloned().collect())
                .unwrap_or_default();
            for word in words {
                // Yield between writes so concurrent invocations interleave.
                tokio::task::yield_now().await;
                ctx.out().write(format!("{tag}:{word} ")).await;
            }
            Ok(())
        }
    }

    struct FailHandler;

    #[async_trait]
    impl CommandHandler for FailHandler {
        async fn run(&self, _ctx: &mut ExecutionContext, _m: &ArgMatches) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    struct CardHandler;

    #[async_trait]
    impl CommandHandler for CardHandler {
        async fn run(&self, ctx: &mut ExecutionContext, _m: &ArgMatches) -> anyhow::Result<()> {
            ctx.set_response_payload(serde_json::json!({"msgtype": "text"}))
                .await;
            Ok(())
        }
    }

    struct SilentHandler;

    #[async_trait]
    impl CommandHandler for SilentHandler {
        async fn run(&self, ctx: &mut ExecutionContext, _m: &ArgMatches) -> anyhow::Result<()> {
            ctx.set_no_response().await;
            Ok(())
        }
    }

    struct RememberHandler;

    #[async_trait]
    impl CommandHandler for RememberHandler {
        async fn run(&self, ctx: &mut ExecutionContext, matches: &ArgMatches) -> anyhow::Result<()> {
            let value = matches.get_one::<String>("value").cloned().unwrap_or_default();
            ctx.values.insert("note".into(), value);
            ctx.save_values()?;
            ctx.out().write("saved").await;
            Ok(())
        }
    }

    fn factory() -> CommandNode {
        CommandNode::new(Command::new("bot"))
            .subcommand(
                CommandNode::new(
                    Command::new("echo")
                        .arg(Arg::new("tag").long("tag"))
                        .arg(Arg::new("text").num_args(0..)),
                )
                .handler(EchoHandler),
            )
            .subcommand(CommandNode::new(Command::new("fail")).handler(FailHandler))
            .subcommand(CommandNode::new(Command::new("card")).handler(CardHandler))
            .subcommand(CommandNode::new(Command::new("quiet")).handler(SilentHandler))
            .subcommand(
                CommandNode::new(Command::new("remember").arg(Arg::new("value")))
                    .handler(RememberHandler),
            )
            .subcommand(
                CommandNode::new(Command::new("config"))
                    .subcommand(CommandNode::new(Command::new("get"))),
            )
    }

    fn update(text: &str) -> Update {
        Update {
            id: "m1".into(),
            sender_id: "alice".into(),
            chat_id: "room".into(),
            text: text.into(),
            ..Default::default()
        }
    }

    async fn collect(mut rx: ChunkReceiver) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn empty_text_yields_instructional_final_chunk() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("   "), "s1").unwrap();
        let chunks = collect(rx).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_final);
        assert!(chunks[0].content.contains("please input a command"));
    }

    #[tokio::test]
    async fn non_command_text_yields_unknown_hint() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("hello there"), "s1").unwrap();
        let chunks = collect(rx).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_final);
        assert!(chunks[0].content.contains("unknown command: hello there"));
        assert!(chunks[0].content.contains("/help"));
    }

    #[tokio::test]
    async fn echo_streams_output_then_terminates() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("/echo hi there"), "s1").unwrap();
        let chunks = collect(rx).await;

        let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(text, ":hi :there ");
        let last = chunks.last().unwrap();
        assert!(last.is_final);
        assert!(last.content.is_empty());
    }

    #[tokio::test]
    async fn root_token_is_stripped() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("/bot echo hi"), "s1").unwrap();
        let chunks = collect(rx).await;
        let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(text, ":hi ");
    }

    #[tokio::test]
    async fn unknown_subcommand_reports_execution_error() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("/nosuch"), "s1").unwrap();
        let chunks = collect(rx).await;
        assert!(chunks[0].content.starts_with("❌ execution error:"));
        assert!(chunks.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn handler_error_reports_execution_error() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("/fail"), "s1").unwrap();
        let chunks = collect(rx).await;
        assert!(chunks[0].content.contains("❌ execution error: boom"));
        assert!(chunks.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn group_node_without_handler_prints_help() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("/config"), "s1").unwrap();
        let chunks = collect(rx).await;
        assert!(chunks[0].content.contains("get"));
        assert!(chunks.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn payload_signal_is_the_only_final_chunk() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("/card"), "s1").unwrap();
        let chunks = collect(rx).await;

        let finals: Vec<_> = chunks.iter().filter(|c| c.is_final).collect();
        assert_eq!(finals.len(), 1);
        match &finals[0].payload {
            Some(ChunkPayload::Object(value)) => {
                assert_eq!(value["msgtype"], "text");
            },
            other => panic!("expected payload chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_signal_suppresses_default_terminator() {
        let manager = CommandManager::new(factory);
        let rx = manager.trigger(update("/quiet"), "s1").unwrap();
        let chunks = collect(rx).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_silent());
        assert!(chunks[0].is_final);
    }

    #[tokio::test]
    async fn values_round_trip_through_store() {
        let store = Arc::new(MemoryStore::new());
        let manager = CommandManager::new(factory).with_store(store.clone());

        let rx = manager.trigger(update("/remember hello"), "s1").unwrap();
        collect(rx).await;

        let loaded = store.load("room:alice").unwrap();
        assert_eq!(loaded.get("note").map(String::as_str), Some("hello"));
    }

    #[tokio::test]
    async fn concurrent_invocations_do_not_share_flag_state() {
        let manager = Arc::new(CommandManager::new(factory));

        let a = manager.trigger(update("/echo --tag A one two three"), "sa").unwrap();
        let b = manager.trigger(update("/echo --tag B one two three"), "sb").unwrap();

        let (chunks_a, chunks_b) = tokio::join!(collect(a), collect(b));

        for chunk in chunks_a.iter().filter(|c| !c.content.is_empty()) {
            assert!(chunk.content.starts_with("A:"), "cross-talk: {chunk:?}");
            assert!(!chunk.content.contains('B'));
        }
        for chunk in chunks_b.iter().filter(|c| !c.content.is_empty()) {
            assert!(chunk.content.starts_with("B:"), "cross-talk: {chunk:?}");
            assert!(!chunk.content.contains('A'));
        }
    }
}
