#![forbid(unsafe_code)]

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, ErrorKind, Read},
    path::Path,
};

#[cfg(test)]
use std::io::Write;

use crate::types::{ConvertError, Result};

/// Buffer size for format readers and writers.
pub const IO_BUFFER_BYTES: usize = 1 << 20;

/// Opens `path` for buffered reading.
pub fn open_read(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|source| ConvertError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::with_capacity(IO_BUFFER_BYTES, file))
}

/// Creates (or truncates) `path` for buffered writing.
pub fn create_write(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|source| ConvertError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::with_capacity(IO_BUFFER_BYTES, file))
}

/// Reads until `dst` is full or the stream ends; returns the bytes read.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, mut dst: &mut [u8]) -> io::Result<usize> {
    let mut total = 0usize;
    while !dst.is_empty() {
        match reader.read(dst) {
            Ok(0) => break,
            Ok(read) => {
                total += read;
                dst = &mut dst[read..];
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}

/// One data line returned by [`next_data_line`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataLine<'a> {
    /// The line with surrounding whitespace trimmed.
    Text(&'a str),
    /// The line is not valid UTF-8.
    Invalid,
}

impl<'a> DataLine<'a> {
    /// The trimmed text, or `None` for an undecodable line.
    pub fn text(self) -> Option<&'a str> {
        match self {
            DataLine::Text(text) => Some(text),
            DataLine::Invalid => None,
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    &bytes[start..end]
}

/// Returns the next non-blank, non-comment line, or `None` at end of stream.
/// Lines starting with `#` or `%` are comments. Lines that are not valid
/// UTF-8 come back as [`DataLine::Invalid`] so callers can skip and count them.
pub fn next_data_line<'a, R: BufRead + ?Sized>(
    reader: &mut R,
    buf: &'a mut Vec<u8>,
) -> io::Result<Option<DataLine<'a>>> {
    loop {
        buf.clear();
        if reader.read_until(b'\n', buf)? == 0 {
            return Ok(None);
        }
        match trim_ascii(buf).first() {
            None | Some(b'#') | Some(b'%') => continue,
            Some(_) => break,
        }
    }
    Ok(Some(match std::str::from_utf8(trim_ascii(buf)) {
        Ok(text) => DataLine::Text(text),
        Err(_) => DataLine::Invalid,
    }))
}

/// Reads one header line holding a single unsigned integer.
pub fn read_header_u64<R: BufRead + ?Sized>(
    reader: &mut R,
    path: &Path,
    what: &str,
) -> Result<u64> {
    let mut line = Vec::new();
    let value = next_data_line(reader, &mut line)?
        .ok_or_else(|| ConvertError::header(path, format!("missing {what}")))?
        .text()
        .ok_or_else(|| ConvertError::header(path, format!("{what} is not valid UTF-8")))?;
    value
        .parse::<u64>()
        .map_err(|_| ConvertError::header(path, format!("{what} is not an unsigned integer: {value:?}")))
}

/// Writer that accepts `limit` bytes and then fails every call.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct FailAfter<W> {
    inner: W,
    remaining: usize,
}

#[cfg(test)]
impl<W: Write> FailAfter<W> {
    /// Wraps `inner`, failing once `limit` bytes have been written.
    pub(crate) fn new(inner: W, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
impl<W: Write> Write for FailAfter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(ErrorKind::Other, "injected write failure"));
        }
        let take = buf.len().min(self.remaining);
        let written = self.inner.write(&buf[..take])?;
        self.remaining -= written;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
