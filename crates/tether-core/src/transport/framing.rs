//! Content-Length framing
//!
//! Every message is `Content-Length: <n>\r\n\r\n` followed by exactly `n`
//! bytes of UTF-8 JSON. Header names are matched case-insensitively and
//! unknown headers are skipped.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{TetherError, TetherResult};

/// Header carrying the body length
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Largest body a reader accepts
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Reads framed message bodies from a byte stream
pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Read the next frame body.
    ///
    /// Returns `Ok(None)` on a clean end of stream between frames. A header
    /// block without a usable length yields a `Protocol` error; the header
    /// block has been consumed at that point so the caller may keep reading.
    /// A stream that ends mid-frame yields `ConnectionClosed`. A length above
    /// [`MAX_FRAME_LEN`] yields a `Connection` error: the stream cannot be
    /// resynchronised, so the caller should stop reading.
    pub async fn read_frame(&mut self) -> TetherResult<Option<Vec<u8>>> {
        let mut content_length: Option<usize> = None;
        let mut malformed: Option<String> = None;
        let mut saw_header = false;

        loop {
            self.line.clear();
            let bytes_read = self.reader.read_line(&mut self.line).await?;
            if bytes_read == 0 {
                if saw_header {
                    return Err(TetherError::ConnectionClosed);
                }
                return Ok(None);
            }

            let line = self.line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if !saw_header {
                    // Stray blank line between frames
                    continue;
                }
                break;
            }
            saw_header = true;

            let Some((name, value)) = line.split_once(':') else {
                malformed = Some(format!("header line without a colon: {:?}", line));
                continue;
            };
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                match value.trim().parse::<usize>() {
                    Ok(len) => content_length = Some(len),
                    Err(_) => malformed = Some(format!("invalid Content-Length: {:?}", value.trim())),
                }
            }
        }

        if let Some(reason) = malformed {
            if content_length.is_none() {
                return Err(TetherError::protocol(reason));
            }
        }
        let len = content_length
            .ok_or_else(|| TetherError::protocol("frame is missing a Content-Length header"))?;

        if len > MAX_FRAME_LEN {
            return Err(TetherError::connection(format!(
                "frame of {} bytes exceeds the {} byte limit",
                len, MAX_FRAME_LEN
            )));
        }

        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await?;
        Ok(Some(body))
    }
}

/// Writes framed message bodies to a byte stream
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write header and body, then flush.
    pub async fn write_frame(&mut self, body: &[u8]) -> std::io::Result<()> {
        let header = format!("{}: {}\r\n\r\n", CONTENT_LENGTH, body.len());
        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body).await?;
        self.writer.flush().await
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }

    /// The underlying stream, for writing bytes outside the framing
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}
