//! Newline-delimited stream source over a file, stdin or any async reader.
//!
//! The sequence number of a record is its zero-based line index. Committed
//! positions are optionally persisted in an [`OffsetStore`] and resumed from
//! when the same consumer reopens the same stream.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info};

use crate::app::ports::{StreamPoll, StreamSource};
use crate::domain::RawRecord;
use crate::error::{IngestError, Result};
use crate::infra::offset_store::OffsetStore;

#[derive(Debug, Clone)]
pub struct LineSourceOptions {
    /// Keep polling at end of input instead of reporting end of stream.
    pub follow: bool,
    pub idle_wait: Duration,
}

impl Default for LineSourceOptions {
    fn default() -> Self {
        Self {
            follow: false,
            idle_wait: Duration::from_millis(crate::constants::DEFAULT_IDLE_POLL_MS),
        }
    }
}

struct Checkpoint {
    store: OffsetStore,
    consumer: String,
}

pub struct LineStreamSource {
    name: String,
    reader: Option<Box<dyn tokio::io::AsyncBufRead + Unpin + Send>>,
    next_sequence: u64,
    partial: Vec<u8>,
    options: LineSourceOptions,
    checkpoint: Option<Checkpoint>,
}

impl LineStreamSource {
    pub fn from_reader<R>(name: impl Into<String>, reader: R, options: LineSourceOptions) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self {
            name: name.into(),
            reader: Some(Box::new(BufReader::new(reader))),
            next_sequence: 0,
            partial: Vec::new(),
            options,
            checkpoint: None,
        }
    }

    pub fn stdin(options: LineSourceOptions) -> Self {
        Self::from_reader("stdin", tokio::io::stdin(), options)
    }

    pub async fn open_file<P: AsRef<Path>>(path: P, options: LineSourceOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            IngestError::Transport(format!("cannot open stream '{}': {}", path.display(), e))
        })?;
        Ok(Self::from_reader(path.display().to_string(), file, options))
    }

    /// Resumes after the last position committed by `consumer`, and persists
    /// future commits there.
    pub async fn with_checkpoint(mut self, store: OffsetStore, consumer: impl Into<String>) -> Result<Self> {
        let consumer = consumer.into();
        let resume_at = store.next_sequence(&consumer, &self.name)?;
        if resume_at > 0 {
            info!(stream = %self.name, consumer = %consumer, resume_at, "Resuming from committed position");
            self.skip_lines(resume_at).await?;
        }
        self.checkpoint = Some(Checkpoint { store, consumer });
        Ok(self)
    }

    async fn skip_lines(&mut self, count: u64) -> Result<()> {
        while self.next_sequence < count {
            match self.read_line().await? {
                Some(_) => self.next_sequence += 1,
                None => break,
            }
        }
        Ok(())
    }

    /// Reads one complete line. `None` means no complete line is available.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| IngestError::Transport("stream source is closed".to_string()))?;
        reader
            .read_until(b'\n', &mut self.partial)
            .await
            .map_err(|e| IngestError::Transport(format!("read failed: {}", e)))?;

        // read_until only stops short of the delimiter at end of input. In
        // follow mode the writer may still finish the line; otherwise the
        // unterminated tail is the last line.
        let complete = self.partial.last() == Some(&b'\n');
        let flush_tail = !self.options.follow && !self.partial.is_empty();
        if !(complete || flush_tail) {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        Ok(Some(line))
    }
}

#[async_trait]
impl StreamSource for LineStreamSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<StreamPoll> {
        match self.read_line().await? {
            Some(line) => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                if line.trim().is_empty() {
                    return Ok(StreamPoll::Empty);
                }
                Ok(StreamPoll::Record(RawRecord::from_wire(sequence, &line)))
            }
            None if self.options.follow => {
                tokio::time::sleep(self.options.idle_wait).await;
                Ok(StreamPoll::Empty)
            }
            None => Ok(StreamPoll::EndOfStream),
        }
    }

    async fn commit(&mut self, sequence: u64) -> Result<()> {
        if let Some(cp) = &self.checkpoint {
            cp.store
                .commit(&cp.consumer, &self.name, sequence + 1)
                .map_err(|e| IngestError::Stream(format!("offset commit failed: {}", e)))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!(stream = %self.name, "Stream source closed");
        }
        Ok(())
    }
}
