//! Bounded little-endian word access.

use crate::error::{WireError, WireResult};

/// Size in bytes of one protocol word.
pub const WORD_SIZE: usize = 4;

/// Sequential reader of little-endian `i32` words.
///
/// All reads are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct WordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WordReader<'a> {
    /// Creates a reader over a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub const fn remaining_bytes(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns the number of complete unread words.
    #[must_use]
    pub const fn remaining_words(&self) -> usize {
        self.remaining_bytes() / WORD_SIZE
    }

    /// Returns `true` if every byte has been consumed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining_bytes() == 0
    }

    /// Returns the current byte position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Reads one word.
    pub fn read_i32(&mut self) -> WireResult<i32> {
        let bytes = self.take(WORD_SIZE)?;
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(word))
    }

    /// Reads `count` words into `out`, replacing its contents.
    pub fn read_words_into(&mut self, count: usize, out: &mut Vec<i32>) -> WireResult<()> {
        let needed = count.checked_mul(WORD_SIZE).ok_or(WireError::UnexpectedEof {
            needed: usize::MAX,
            available: self.remaining_bytes(),
        })?;
        let bytes = self.take(needed)?;
        out.clear();
        out.extend(bytes.chunks_exact(WORD_SIZE).map(|chunk| {
            let mut word = [0u8; WORD_SIZE];
            word.copy_from_slice(chunk);
            i32::from_le_bytes(word)
        }));
        Ok(())
    }

    /// Skips `count` words without decoding them.
    pub fn skip_words(&mut self, count: usize) -> WireResult<()> {
        let needed = count.checked_mul(WORD_SIZE).ok_or(WireError::UnexpectedEof {
            needed: usize::MAX,
            available: self.remaining_bytes(),
        })?;
        self.take(needed).map(|_| ())
    }

    fn take(&mut self, len: usize) -> WireResult<&'a [u8]> {
        if len > self.remaining_bytes() {
            return Err(WireError::UnexpectedEof {
                needed: len,
                available: self.remaining_bytes(),
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }
}

/// Sequential writer of little-endian `i32` words into a caller buffer.
#[derive(Debug)]
pub struct WordWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> WordWriter<'a> {
    /// Creates a writer over the output buffer.
    #[must_use]
    pub fn new(out: &'a mut [u8]) -> Self {
        Self { out, pos: 0 }
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Writes one word.
    pub fn write_i32(&mut self, value: i32) -> WireResult<()> {
        self.reserve(WORD_SIZE)?;
        self.out[self.pos..self.pos + WORD_SIZE].copy_from_slice(&value.to_le_bytes());
        self.pos += WORD_SIZE;
        Ok(())
    }

    /// Writes a run of words.
    pub fn write_words(&mut self, words: &[i32]) -> WireResult<()> {
        self.reserve(words.len() * WORD_SIZE)?;
        for word in words {
            self.out[self.pos..self.pos + WORD_SIZE].copy_from_slice(&word.to_le_bytes());
            self.pos += WORD_SIZE;
        }
        Ok(())
    }

    /// Overwrites a word that was written earlier, at byte offset `at`.
    pub fn patch_i32(&mut self, at: usize, value: i32) -> WireResult<()> {
        if at + WORD_SIZE > self.pos {
            return Err(WireError::OutputTooSmall {
                needed: at + WORD_SIZE,
                available: self.pos,
            });
        }
        self.out[at..at + WORD_SIZE].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Finishes writing and returns the number of bytes written.
    #[must_use]
    pub const fn finish(self) -> usize {
        self.pos
    }

    fn reserve(&self, len: usize) -> WireResult<()> {
        let needed = self.pos + len;
        if needed > self.out.len() {
            return Err(WireError::OutputTooSmall {
                needed,
                available: self.out.len(),
            });
        }
        Ok(())
    }
}
