//! SLIP (RFC 1055) framing.
//!
//! Used by the ESP family ROM loaders. Frames are delimited by `END` on both
//! sides; `END` and `ESC` inside a frame are escaped:
//!
//! ```text
//! 0xC0 (END) -> 0xDB 0xDC
//! 0xDB (ESC) -> 0xDB 0xDD
//! ```

use {
    crate::error::{Error, Result},
    std::io::{ErrorKind as IoErrorKind, Read},
};

/// Frame delimiter.
pub const END: u8 = 0xC0;
/// Escape introducer.
pub const ESC: u8 = 0xDB;
/// Escaped `END`.
pub const ESC_END: u8 = 0xDC;
/// Escaped `ESC`.
pub const ESC_ESC: u8 = 0xDD;

/// Encode one frame, including both delimiters.
pub fn encode(frame: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.len() + 2);
    out.push(END);
    for &b in frame {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(b),
        }
    }
    out.push(END);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Escape,
    /// Dropping bytes until the next `END` after a framing error.
    Error,
}

/// Incremental SLIP decoder.
#[derive(Debug)]
pub struct SlipDecoder {
    buf: Vec<u8>,
    state: State,
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlipDecoder {
    /// Create a decoder waiting for the start of a frame.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            state: State::Normal,
        }
    }

    /// Feed one byte. Returns a frame when `byte` completes one.
    ///
    /// An invalid escape sequence fails the current frame; the decoder then
    /// skips input until the next `END`.
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        match self.state {
            State::Normal => match byte {
                END if self
                    .buf
                    .is_empty() => {},
                END => return Ok(Some(std::mem::take(&mut self.buf))),
                ESC => self.state = State::Escape,
                _ => self
                    .buf
                    .push(byte),
            },
            State::Escape => {
                let decoded = match byte {
                    ESC_END => END,
                    ESC_ESC => ESC,
                    _ => {
                        self.buf
                            .clear();
                        self.state = State::Error;
                        return Err(Error::Slip(format!(
                            "invalid escape sequence 0xdb {byte:#04x}"
                        )));
                    },
                };
                self.buf
                    .push(decoded);
                self.state = State::Normal;
            },
            State::Error => {
                if byte == END {
                    self.state = State::Normal;
                }
            },
        }
        Ok(None)
    }

    /// Feed a slice and collect every frame it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut frames = Vec::new();
        for &b in bytes {
            if let Some(frame) = self.push(b)? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Read from `reader` until one frame is complete.
    pub fn read_frame<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<Vec<u8>> {
        let mut byte = [0u8; 1];
        let mut got = 0;
        loop {
            match reader.read(&mut byte) {
                Ok(0) => {
                    return Err(Error::ShortRead {
                        wanted: got + 1,
                        got,
                    });
                },
                Ok(_) => {
                    got += 1;
                    if let Some(frame) = self.push(byte[0])? {
                        return Ok(frame);
                    }
                },
                Err(e) if e.kind() == IoErrorKind::Interrupted => {},
                Err(e) if e.kind() == IoErrorKind::TimedOut => {
                    return Err(Error::Timeout(format!("SLIP frame after {got} bytes")));
                },
                Err(e) => return Err(e.into()),
            }
        }
    }
}
