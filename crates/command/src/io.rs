use botwire_core::{ChunkSender, StreamChunk};

/// Forwards command output into the chunk sequence.
///
/// Plays the role of stdout/stderr for a command tree: every write becomes a
/// non-final text chunk, so handlers can print incrementally and the user
/// sees the output stream in.
#[derive(Clone)]
pub struct ChunkWriter {
    tx: ChunkSender,
}

impl ChunkWriter {
    pub(crate) fn new(tx: ChunkSender) -> Self {
        Self { tx }
    }

    /// Send one piece of output as a non-final chunk. Empty writes are
    /// dropped; a send on a closed sequence is ignored.
    pub async fn write(&self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        let _ = self.tx.send(StreamChunk::text(text)).await;
    }

    /// [`write`](Self::write) with a trailing newline.
    pub async fn write_line(&self, text: impl AsRef<str>) {
        self.write(format!("{}\n", text.as_ref())).await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn writes_become_incremental_chunks() {
        let (tx, mut rx) = mpsc::channel(8);
        let writer = ChunkWriter::new(tx);

        writer.write("Hello").await;
        writer.write(" World").await;

        let first = rx.try_recv().unwrap();
        assert_eq!(first.content, "Hello");
        assert!(!first.is_final);

        // The second chunk carries only the incremental content.
        let second = rx.try_recv().unwrap();
        assert_eq!(second.content, " World");
        assert!(!second.is_final);
    }

    #[tokio::test]
    async fn empty_writes_are_dropped() {
        let (tx, mut rx) = mpsc::channel(8);
        let writer = ChunkWriter::new(tx);

        writer.write("").await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn write_line_appends_newline() {
        let (tx, mut rx) = mpsc::channel(8);
        let writer = ChunkWriter::new(tx);

        writer.write_line("done").await;
        assert_eq!(rx.try_recv().unwrap().content, "done\n");
    }
}
