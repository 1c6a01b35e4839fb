//! Streaming encryption and decryption over `std::io`.
//!
//! `Crypt4ghWriter` is a byte sink: it writes the header up front, buffers
//! plaintext to 64 KiB segment boundaries and seals each full segment as it
//! goes. `finish` flushes the final short segment, if any. `Crypt4ghReader`
//! is the inverse byte source, opening one segment at a time and applying a
//! data edit list when the header carried one.

use std::io::{self, Read, Write};

use rand::RngCore;
use tracing::debug;

use crate::error::{Crypt4ghError, Result};
use crate::header::{self, DataEditList};
use crate::keys::SecretKey;
use crate::segment;

/// Encrypting adapter around a byte sink.
pub struct Crypt4ghWriter<W: Write> {
    inner: W,
    data_key: SecretKey,
    buffer: Vec<u8>,
}

impl<W: Write> Crypt4ghWriter<W> {
    /// Write the header for the given recipients and return the writer.
    ///
    /// A fresh data key is drawn from the system RNG for every file. The
    /// optional edit list is addressed to every recipient, like the data
    /// key itself.
    pub fn new(
        mut inner: W,
        writer_secret: &[u8; 32],
        recipient_publics: &[[u8; 32]],
        edit_list: Option<&DataEditList>,
    ) -> Result<Self> {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let data_key = SecretKey::new(key);

        let header = header::build(writer_secret, recipient_publics, &data_key, edit_list)?;
        inner.write_all(&header)?;
        debug!(recipients = recipient_publics.len(), "wrote container header");

        Ok(Self {
            inner,
            data_key,
            buffer: Vec::with_capacity(segment::UNENCRYPTED_SEGMENT_SIZE),
        })
    }

    fn seal_buffer(&mut self) -> Result<()> {
        let sealed = segment::seal(&self.data_key, &self.buffer)?;
        self.buffer.clear();
        self.inner.write_all(&sealed)?;
        Ok(())
    }

    /// Seal whatever is buffered and hand back the inner sink.
    ///
    /// An empty buffer writes nothing: a zero-length trailing segment is
    /// never emitted.
    pub fn finish(mut self) -> Result<W> {
        if !self.buffer.is_empty() {
            self.seal_buffer()?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for Crypt4ghWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;
        while consumed < buf.len() {
            let room = segment::UNENCRYPTED_SEGMENT_SIZE - self.buffer.len();
            let take = room.min(buf.len() - consumed);
            self.buffer.extend_from_slice(&buf[consumed..consumed + take]);
            consumed += take;
            if self.buffer.len() == segment::UNENCRYPTED_SEGMENT_SIZE {
                self.seal_buffer().map_err(io::Error::from)?;
            }
        }
        Ok(buf.len())
    }

    /// Flushes the inner sink. Buffered plaintext stays buffered; partial
    /// segments are only written by `finish`.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Tracks progress through an edit list's alternating skip/keep runs.
struct EditFilter {
    pending: std::collections::VecDeque<u64>,
    keeping: bool,
    remaining: u64,
    /// What to do with bytes after the list is exhausted: a list ending in
    /// a skip run keeps the rest, one ending in a keep run drops it.
    tail_keeps: bool,
}

impl EditFilter {
    fn new(edit_list: DataEditList) -> Self {
        let tail_keeps = edit_list.lengths.len() % 2 == 1;
        Self {
            pending: edit_list.lengths.into(),
            keeping: true,
            remaining: 0,
            tail_keeps,
        }
    }

    fn apply(&mut self, data: &[u8], out: &mut Vec<u8>) {
        let mut index = 0;
        while index < data.len() {
            if self.remaining == 0 {
                match self.pending.pop_front() {
                    Some(next) => {
                        self.keeping = !self.keeping;
                        self.remaining = next;
                        continue;
                    }
                    None => {
                        if self.tail_keeps {
                            out.extend_from_slice(&data[index..]);
                        }
                        return;
                    }
                }
            }
            let take = (self.remaining).min((data.len() - index) as u64) as usize;
            if self.keeping {
                out.extend_from_slice(&data[index..index + take]);
            }
            index += take;
            self.remaining -= take as u64;
        }
    }
}

/// Decrypting adapter around a byte source.
pub struct Crypt4ghReader<R: Read> {
    inner: R,
    data_key: SecretKey,
    edits: Option<EditFilter>,
    plaintext: Vec<u8>,
    position: usize,
    finished: bool,
}

impl<R: Read> Crypt4ghReader<R> {
    /// Parse and decrypt the header, leaving the source positioned at the
    /// first segment.
    pub fn new(mut inner: R, reader_secret: &[u8; 32]) -> Result<Self> {
        let decrypted = header::parse(&mut inner, reader_secret)?;
        Ok(Self {
            inner,
            data_key: decrypted.data_key,
            edits: decrypted.edit_list.map(EditFilter::new),
            plaintext: Vec::new(),
            position: 0,
            finished: false,
        })
    }

    /// Read one wire segment. `None` on clean EOF at a segment boundary;
    /// `TruncatedStream` when the source ends inside the nonce/tag minimum.
    fn read_wire_segment(&mut self) -> Result<Option<Vec<u8>>> {
        let mut wire = vec![0u8; segment::ENCRYPTED_SEGMENT_SIZE];
        let mut filled = 0;
        while filled < wire.len() {
            let n = self.inner.read(&mut wire[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < segment::NONCE_SIZE + segment::TAG_SIZE {
            return Err(Crypt4ghError::TruncatedStream);
        }
        wire.truncate(filled);
        Ok(Some(wire))
    }

    /// Decrypt segments until some plaintext survives the edit filter, or
    /// the stream ends.
    fn refill(&mut self) -> Result<()> {
        loop {
            let Some(wire) = self.read_wire_segment()? else {
                self.finished = true;
                return Ok(());
            };
            let opened = segment::open(&self.data_key, &wire)?;
            self.position = 0;
            match &mut self.edits {
                Some(filter) => {
                    self.plaintext.clear();
                    filter.apply(&opened, &mut self.plaintext);
                }
                None => self.plaintext = opened,
            }
            if !self.plaintext.is_empty() {
                return Ok(());
            }
        }
    }
}

impl<R: Read> Read for Crypt4ghReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.position == self.plaintext.len() {
            if self.finished {
                return Ok(0);
            }
            self.refill().map_err(io::Error::from)?;
            if self.position == self.plaintext.len() {
                return Ok(0);
            }
        }
        let take = buf.len().min(self.plaintext.len() - self.position);
        buf[..take].copy_from_slice(&self.plaintext[self.position..self.position + take]);
        self.position += take;
        Ok(take)
    }
}
