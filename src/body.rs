//! Request body carried by `http::Request<Body>`.

use std::fmt;
use std::io::{self, Cursor, Read};

/// A readable HTTP request body.
///
/// Bodies built from in-memory bytes know their length; bodies built from an
/// arbitrary reader do not. Reading consumes the body, and dropping it drops
/// (closes) the underlying reader.
pub struct Body {
    reader: Box<dyn Read + Send>,
    len: Option<u64>,
}

impl Body {
    /// An empty body of known length zero.
    pub fn empty() -> Self {
        Self::from(Vec::new())
    }

    /// Wrap a reader of unknown length.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            len: None,
        }
    }

    /// Length in bytes, when known up front.
    pub fn size_hint(&self) -> Option<u64> {
        self.len
    }

    /// Read the whole body into memory.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len.unwrap_or(0) as usize);
        self.reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").field("len", &self.len).finish_non_exhaustive()
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            len: Some(bytes.len() as u64),
            reader: Box::new(Cursor::new(bytes)),
        }
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self {
            len: Some(bytes.len() as u64),
            reader: Box::new(bytes),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::from(s.into_bytes())
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::from(s.as_bytes())
    }
}
