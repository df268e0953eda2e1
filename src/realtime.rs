//! Persistent-connection replication: length-prefixed frames.
//!
//! Instead of one HTTP request per page, a realtime server multiplexes
//! the minute feed onto one long-lived byte stream. Each frame is two
//! length-prefixed blocks:
//!
//! ```text
//! <decimal-length>\n
//! <state block: key=value lines, as in state.txt>
//! <decimal-length>\n
//! <gzip-compressed osmChange diff>
//! ```
//!
//! repeated indefinitely. The diff block is parsed exactly as the minute
//! cursor parses a page, followed by one [`Event::Finished`] per frame.
//! No backoff or pacing is needed — the server paces the stream.
//! Cancellation is simply closing the connection; the peer hanging up
//! surfaces as [`ReplicationError::ConnectionClosed`].

use std::io::Cursor as IoCursor;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::debug;

use crate::error::{ReplicationError, Result};
use crate::fetch::gunzip;
use crate::metrics;
use crate::model::{Action, Element, Event, Finished, Timestamp};
use crate::parser::ChangeReader;
use crate::state::StatePointer;

type FrameIter = Box<dyn Iterator<Item = Result<(Action, Element)>> + Send>;

/// Pull-based reader over one realtime replication connection.
pub struct RealtimeFrameReader<R> {
    reader: R,
    parse_timestamps: bool,
    page: Option<FrameIter>,
    finished: Option<Finished>,
}

impl<R: AsyncBufRead + Unpin> RealtimeFrameReader<R> {
    /// Wrap an established connection (anything buffered and readable:
    /// a `BufReader<TcpStream>`, a unix socket, an in-memory slice in
    /// tests).
    pub fn new(reader: R, parse_timestamps: bool) -> Self {
        Self {
            reader,
            parse_timestamps,
            page: None,
            finished: None,
        }
    }

    /// Produce the next event, reading a new frame off the connection
    /// when the current one is drained.
    pub async fn next_event(&mut self) -> Result<Event> {
        loop {
            if let Some(iter) = self.page.as_mut() {
                match iter.next() {
                    Some(Ok((action, element))) => return Ok(Event::Change(action, element)),
                    Some(Err(e)) => return Err(e),
                    None => {
                        self.page = None;
                        if let Some(finished) = self.finished.take() {
                            return Ok(Event::Finished(finished));
                        }
                    }
                }
            } else {
                self.read_frame().await?;
            }
        }
    }

    /// Read one `(state block, diff block)` frame off the wire.
    async fn read_frame(&mut self) -> Result<()> {
        let state_len = self.read_length().await?;
        let state_block = self.read_block(state_len).await?;
        let pointer = StatePointer::from_state_txt(&String::from_utf8_lossy(&state_block))?;

        let diff_len = self.read_length().await?;
        let diff = self.read_block(diff_len).await?;
        let xml = gunzip(&diff)?;

        debug!(
            sequence = pointer.sequence,
            diff_bytes = diff.len(),
            "realtime frame received"
        );
        metrics::record_frame(diff.len());

        self.finished = Some(Finished {
            sequence: pointer.sequence,
            timestamp: pointer.timestamp.map(Timestamp::Utc),
        });
        self.page = Some(Box::new(ChangeReader::new(
            IoCursor::new(xml),
            self.parse_timestamps,
        )));
        Ok(())
    }

    /// Read a decimal byte count on its own line.
    async fn read_length(&mut self) -> Result<usize> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(ReplicationError::ConnectionClosed);
        }
        let trimmed = line.trim();
        trimmed
            .parse::<usize>()
            .map_err(|_| ReplicationError::InvalidValue {
                attribute: "frame length".to_string(),
                value: trimmed.to_string(),
            })
    }

    /// Read exactly `len` bytes; the peer closing mid-block is a
    /// connection loss, not corrupt data.
    async fn read_block(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ReplicationError::ConnectionClosed
            } else {
                ReplicationError::Io(e)
            }
        })?;
        Ok(buf)
    }
}
