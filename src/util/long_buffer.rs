use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::constants::{BYTES_IN_LONG, MAX_CHUNK_LEN};

/// A FIFO of 64-bit values that spills to disk
///
/// Values are appended into an in-memory chunk of `chunk_len` values. A full
/// chunk is written out to an anonymous temporary file, so at most two chunks
/// (the write tail and one read window) are resident no matter how long the
/// buffer grows.
///
/// The buffer is either being written or being replayed. `rewind_for_reading`
/// switches from the former to the latter, `reset` empties the buffer and
/// releases its backing file.
#[derive(Debug)]
pub struct LongBuffer {
    chunk_len: usize,
    spill_dir: Option<PathBuf>,
    tail: Vec<u64>,
    file: Option<File>,
    spilled: u64,
    len: u64,
    reading: bool,
    cursor: ReadCursor,
}

#[derive(Debug, Default)]
struct ReadCursor {
    pos: u64,
    window: Vec<u64>,
    window_start: u64,
}

impl LongBuffer {
    pub fn new(chunk_len: usize, spill_dir: Option<&Path>) -> Self {
        assert!(chunk_len > 0, "LongBuffer chunk length must be positive");
        LongBuffer {
            chunk_len,
            spill_dir: spill_dir.map(Path::to_path_buf),
            tail: vec![],
            file: None,
            spilled: 0,
            len: 0,
            reading: false,
            cursor: ReadCursor::default(),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Number of values currently living in the backing file
    pub fn spilled(&self) -> u64 {
        self.spilled
    }

    pub fn is_reading(&self) -> bool {
        self.reading
    }

    pub fn append(&mut self, value: u64) -> io::Result<()> {
        assert!(!self.reading, "Cannot append to a LongBuffer being replayed");
        if self.tail.capacity() == 0 {
            self.tail.reserve_exact(self.chunk_len);
        }
        self.tail.push(value);
        self.len += 1;
        if self.tail.len() == self.chunk_len {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            let file = match &self.spill_dir {
                Some(dir) => tempfile::tempfile_in(dir)?,
                None => tempfile::tempfile()?,
            };
            self.file = Some(file);
        }
        let mut bytes = Vec::with_capacity(self.tail.len() * BYTES_IN_LONG);
        for v in &self.tail {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        if let Some(file) = &self.file {
            file.write_all_at(&bytes, self.spilled * BYTES_IN_LONG as u64)?;
        }
        self.spilled += self.tail.len() as u64;
        self.tail.clear();
        Ok(())
    }

    /// Switch to replay mode, positioned at the first value
    pub fn rewind_for_reading(&mut self) {
        self.reading = true;
        self.cursor = ReadCursor::default();
    }

    /// The next value in insertion order, `None` once the buffer is drained
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> io::Result<Option<u64>> {
        debug_assert!(self.reading, "LongBuffer must be rewound before reading");
        let mut cursor = std::mem::take(&mut self.cursor);
        let ret = self.read_at_cursor(&mut cursor);
        self.cursor = cursor;
        ret
    }

    /// Whether there is anything left to do with this buffer: unread values
    /// while replaying, any values at all while writing
    pub fn has_pending(&self) -> bool {
        if self.reading {
            self.cursor.pos < self.len
        } else {
            self.len > 0
        }
    }

    /// Drop all values and the backing file, and go back to write mode
    pub fn reset(&mut self) {
        self.tail = vec![];
        self.file = None;
        self.spilled = 0;
        self.len = 0;
        self.reading = false;
        self.cursor = ReadCursor::default();
    }

    /// An independent replay of all values, leaving the buffer untouched
    pub fn replay(&self) -> Replay<'_> {
        Replay {
            buffer: self,
            cursor: ReadCursor::default(),
        }
    }

    fn read_at_cursor(&self, cursor: &mut ReadCursor) -> io::Result<Option<u64>> {
        let pos = cursor.pos;
        if pos >= self.len {
            return Ok(None);
        }
        let value = if pos >= self.spilled {
            self.tail[(pos - self.spilled) as usize]
        } else {
            let window_end = cursor.window_start + cursor.window.len() as u64;
            if cursor.window.is_empty() || pos < cursor.window_start || pos >= window_end {
                self.load_window(cursor)?;
            }
            cursor.window[(pos - cursor.window_start) as usize]
        };
        cursor.pos += 1;
        Ok(Some(value))
    }

    fn load_window(&self, cursor: &mut ReadCursor) -> io::Result<()> {
        let chunk_len = self.chunk_len as u64;
        let start = cursor.pos / chunk_len * chunk_len;
        let count = chunk_len.min(self.spilled - start) as usize;
        let mut bytes = vec![0u8; count * BYTES_IN_LONG];
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "spill file is missing"))?;
        file.read_exact_at(&mut bytes, start * BYTES_IN_LONG as u64)?;
        cursor.window.clear();
        cursor.window.extend(
            bytes
                .chunks_exact(BYTES_IN_LONG)
                .map(|b| {
                    let mut word = [0u8; BYTES_IN_LONG];
                    word.copy_from_slice(b);
                    u64::from_be_bytes(word)
                }),
        );
        cursor.window_start = start;
        Ok(())
    }

    /// Serialize the buffer: chunk length, mode, read position, length, then
    /// every value in insertion order, all big-endian
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&(self.chunk_len as u64).to_be_bytes())?;
        out.write_all(&[self.reading as u8])?;
        out.write_all(&self.cursor.pos.to_be_bytes())?;
        out.write_all(&self.len.to_be_bytes())?;
        for v in self.replay() {
            out.write_all(&v?.to_be_bytes())?;
        }
        Ok(())
    }

    /// Restore a buffer written by `write_to`, including its read position
    pub fn read_from<R: Read>(input: &mut R, spill_dir: Option<&Path>) -> io::Result<Self> {
        let chunk_len = read_u64(input)?;
        if chunk_len == 0 || chunk_len > MAX_CHUNK_LEN as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid LongBuffer chunk length {}", chunk_len),
            ));
        }
        let mut mode = [0u8; 1];
        input.read_exact(&mut mode)?;
        let pos = read_u64(input)?;
        let len = read_u64(input)?;
        if pos > len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("LongBuffer read position {} past its length {}", pos, len),
            ));
        }
        let mut buffer = LongBuffer::new(chunk_len as usize, spill_dir);
        for _ in 0..len {
            buffer.append(read_u64(input)?)?;
        }
        if mode[0] != 0 {
            buffer.rewind_for_reading();
            buffer.cursor.pos = pos;
        }
        Ok(buffer)
    }
}

pub(crate) fn read_u64<R: Read>(input: &mut R) -> io::Result<u64> {
    let mut bytes = [0u8; BYTES_IN_LONG];
    input.read_exact(&mut bytes)?;
    Ok(u64::from_be_bytes(bytes))
}

/// Iterator over the values of a `LongBuffer`, see `LongBuffer::replay`
pub struct Replay<'a> {
    buffer: &'a LongBuffer,
    cursor: ReadCursor,
}

impl Iterator for Replay<'_> {
    type Item = io::Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.read_at_cursor(&mut self.cursor).transpose()
    }
}
