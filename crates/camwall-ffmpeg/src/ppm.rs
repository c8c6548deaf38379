//! Incremental reader for a stream of binary PPM (`P6`) images, as written by
//! `ffmpeg -f image2pipe -c:v ppm`.

use std::io::{self, BufReader, Read};

use camwall_stream::{Frame, PixelFormat};
use thiserror::Error;

/// Upper bound on either dimension; anything larger is a corrupt header.
pub const MAX_DIMENSION: u32 = 16_384;

#[derive(Error, Debug)]
pub enum PpmError {
    #[error("Expected P6 magic, found {0:?}")]
    BadMagic(String),

    #[error("Malformed PPM header: {0}")]
    BadHeader(String),

    #[error("Unsupported PPM maxval {0}, only 255 is accepted")]
    UnsupportedMaxval(u32),

    #[error("Implausible frame size {width}x{height}")]
    TooLarge { width: u32, height: u32 },

    #[error("Stream ended inside a frame")]
    Truncated,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct PpmReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> PpmReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }

    /// Next frame, or `None` on a clean end of stream between frames.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, PpmError> {
        let magic = match self.token()? {
            Some(magic) => magic,
            None => return Ok(None),
        };
        if magic != "P6" {
            return Err(PpmError::BadMagic(magic));
        }

        let width = self.number("width")?;
        let height = self.number("height")?;
        let maxval = self.number("maxval")?;
        if maxval != 255 {
            return Err(PpmError::UnsupportedMaxval(maxval));
        }
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(PpmError::TooLarge { width, height });
        }

        let mut data = vec![0u8; Frame::expected_len(width, height, PixelFormat::Rgb24)];
        self.inner.read_exact(&mut data).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => PpmError::Truncated,
            _ => PpmError::Io(e),
        })?;
        Ok(Some(Frame::new(data, width, height, PixelFormat::Rgb24)))
    }

    fn byte(&mut self) -> Result<Option<u8>, PpmError> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One whitespace-delimited header token. Consumes exactly one trailing
    /// whitespace byte, so the raster starts right after the maxval token.
    fn token(&mut self) -> Result<Option<String>, PpmError> {
        let mut token = String::new();
        loop {
            let Some(b) = self.byte()? else {
                return if token.is_empty() {
                    Ok(None)
                } else {
                    Err(PpmError::Truncated)
                };
            };
            match b {
                b'#' if token.is_empty() => {
                    while let Some(c) = self.byte()? {
                        if c == b'\n' || c == b'\r' {
                            break;
                        }
                    }
                }
                b if b.is_ascii_whitespace() => {
                    if !token.is_empty() {
                        return Ok(Some(token));
                    }
                }
                b => {
                    if token.len() >= 16 {
                        return Err(PpmError::BadHeader("token too long".into()));
                    }
                    token.push(b as char);
                }
            }
        }
    }

    fn number(&mut self, field: &str) -> Result<u32, PpmError> {
        let token = self.token()?.ok_or(PpmError::Truncated)?;
        token
            .parse()
            .map_err(|_| PpmError::BadHeader(format!("{field} is {token:?}")))
    }
}
