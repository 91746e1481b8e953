//! Byte cursor over descriptor text with trivia skipping and error construction.

use crate::layout::error::LayoutError;

const FRAGMENT_LEN: usize = 16;

pub(super) struct Cursor<'src> {
    bytes: &'src [u8],
    pos: usize,
}

impl<'src> Cursor<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    #[inline(always)]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline(always)]
    pub fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    pub fn rest(&self) -> &'src [u8] {
        &self.bytes[self.pos.min(self.bytes.len())..]
    }

    pub fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    pub fn advance(&mut self, len: usize) {
        self.pos = (self.pos + len).min(self.bytes.len());
    }

    pub fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> &'src str {
        // callers only slice ASCII runs they have already validated
        std::str::from_utf8(&self.bytes[start..end]).unwrap_or("")
    }

    /// Skips whitespace and `#` line comments, rejecting any other non-printable byte.
    pub fn skip_trivia(&mut self) -> Result<(), LayoutError> {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b'#' => {
                    while let Some(next) = self.bump() {
                        if next == b'\n' {
                            break;
                        }
                    }
                }
                0x21..=0x7e => break,
                _ => return Err(self.error("non-printable character", self.pos)),
            }
        }
        Ok(())
    }

    pub fn at_whitespace(&self) -> bool {
        matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r' | b'#'))
    }

    pub fn error(&self, reason: impl Into<String>, start: usize) -> LayoutError {
        LayoutError::invalid(reason, self.fragment(start), start)
    }

    /// Offending substring starting at `start`, clipped for readability.
    pub fn fragment(&self, start: usize) -> String {
        let start = start.min(self.bytes.len());
        let end = (start + FRAGMENT_LEN).min(self.bytes.len());
        String::from_utf8_lossy(&self.bytes[start..end]).into_owned()
    }
}
