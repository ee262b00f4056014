//! Fixed-size chunking
//!
//! A payload is cut into contiguous chunks of exactly `chunk_size` bytes,
//! the last one possibly shorter. Chunk boundaries depend only on the chunk
//! size, so the same payload always produces the same chunks (and digests).
//!
//! `FixedChunker` is a one-shot iterator over any `Read`: it holds a single
//! chunk in memory at a time and cannot be rewound. To walk a file twice,
//! open it twice.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use ddrop_core::{DropError, DropResult};

/// One fixed-size slice of the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position; defines ordering, key derivation and nonce prefix
    pub index: u64,
    /// Byte offset within the payload
    pub offset: u64,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Streaming fixed-size chunker over a byte source
pub struct FixedChunker<R> {
    reader: R,
    chunk_size: usize,
    next_index: u64,
    offset: u64,
    done: bool,
}

impl<R: Read> FixedChunker<R> {
    pub fn new(reader: R, chunk_size: usize) -> DropResult<Self> {
        if chunk_size == 0 {
            return Err(DropError::Config("chunk size must be > 0".into()));
        }
        Ok(Self {
            reader,
            chunk_size,
            next_index: 0,
            offset: 0,
            done: false,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fill `buf` until it is full or the source hits EOF.
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for FixedChunker<R> {
    type Item = DropResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.chunk_size];
        let n = match self.fill(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(DropError::io(
                    format!("reading chunk {} at offset {}", self.next_index, self.offset),
                    e,
                )));
            }
        };

        if n == 0 {
            self.done = true;
            return None;
        }
        if n < self.chunk_size {
            // short read means EOF: this is the last chunk
            self.done = true;
            buf.truncate(n);
        }

        let chunk = Chunk {
            index: self.next_index,
            offset: self.offset,
            data: buf,
        };
        self.next_index += 1;
        self.offset += n as u64;
        Some(Ok(chunk))
    }
}

/// Number of chunks a payload of `total` bytes splits into.
pub fn chunk_count(total: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total.div_ceil(chunk_size as u64)
}

/// Open a file and chunk it lazily.
pub fn chunk_file(path: &Path, chunk_size: usize) -> DropResult<FixedChunker<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| DropError::io(format!("opening {} for chunking", path.display()), e))?;
    FixedChunker::new(BufReader::new(file), chunk_size)
}

/// Chunk an in-memory slice. Useful for tests and small payloads.
pub fn chunk_slice(data: &[u8], chunk_size: usize) -> DropResult<Vec<Chunk>> {
    FixedChunker::new(data, chunk_size)?.collect()
}
