//! Line reader for tool output.
//!
//! yt-dlp and ffmpeg redraw their status line with carriage returns. When
//! their output is piped those `\r` updates are not newline-terminated, so
//! `AsyncBufReadExt::lines()` would hold them back until the next `\n`. This
//! reader splits on either delimiter.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Lines longer than this are emitted in pieces.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Yields trimmed, non-empty lines delimited by `\n` or `\r`.
pub struct ToolOutputReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    eof: bool,
}

impl<R> ToolOutputReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Returns the next line, or `None` at end of stream.
    ///
    /// Invalid UTF-8 is replaced rather than treated as an error.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(idx) = self.pending.iter().position(|b| matches!(b, b'\n' | b'\r')) {
                let line = self.take_line(idx, 1);
                if !line.is_empty() {
                    return Ok(Some(line));
                }
                continue;
            }

            if self.pending.len() >= MAX_LINE_BYTES {
                let line = self.take_line(MAX_LINE_BYTES, 0);
                if !line.is_empty() {
                    return Ok(Some(line));
                }
                continue;
            }

            if self.eof {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let len = self.pending.len();
                let line = self.take_line(len, 0);
                return Ok((!line.is_empty()).then_some(line));
            }

            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                self.eof = true;
                continue;
            }
            let n = buf.len();
            self.pending.extend_from_slice(buf);
            self.reader.consume(n);
        }
    }

    /// Remove `len` bytes of content plus `delimiter` bytes from the buffer.
    fn take_line(&mut self, len: usize, delimiter: usize) -> String {
        let bytes: Vec<u8> = self.pending.drain(..len + delimiter).collect();
        String::from_utf8_lossy(&bytes[..len]).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn collect(input: &'static [u8]) -> Vec<String> {
        let (mut tx, rx) = tokio::io::duplex(16);
        tokio::spawn(async move {
            let _ = tx.write_all(input).await;
        });

        let mut reader = ToolOutputReader::new(rx);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn splits_on_cr_and_lf() {
        let lines = collect(b"[download]  1.0%\r[download]  2.0%\r\nout_time_us=5\nlast").await;
        assert_eq!(
            lines,
            vec!["[download]  1.0%", "[download]  2.0%", "out_time_us=5", "last"]
        );
    }

    #[tokio::test]
    async fn skips_blank_lines_and_replaces_invalid_utf8() {
        let lines = collect(b"\r\n\n  \nbad \xff byte\n").await;
        assert_eq!(lines, vec!["bad \u{fffd} byte"]);
    }

    #[tokio::test]
    async fn empty_stream_ends_immediately() {
        assert!(collect(b"").await.is_empty());
    }
}
