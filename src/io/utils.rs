use std::io;

use sha1::{Digest, Sha1};

/// A stream that knows how many bytes have been written through it
pub(crate) trait ByteCounter {
    fn bytes_written(&self) -> u64;
}

/// A [`io::Write`] wrapper that computes the SHA-1 digest of everything written through it
/// and keeps a running count of the bytes written.
pub(crate) struct HashingStream<T: io::Write> {
    pub stream: T,
    context: Sha1,
    bytes_written: u64,
}

impl<T: io::Write> HashingStream<T> {
    pub fn new(stream: T) -> HashingStream<T> {
        Self {
            stream,
            context: Sha1::new(),
            bytes_written: 0,
        }
    }

    /// The lowercase hexadecimal digest of all bytes written so far
    pub fn digest_hex(&self) -> String {
        let digest = self.context.clone().finalize();
        base16ct::lower::encode_string(&digest)
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: io::Write> ByteCounter for HashingStream<T> {
    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<T: io::Write> io::Write for HashingStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.context.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// A [`io::Write`] wrapper that only counts the bytes written through it
pub(crate) struct CountingStream<T: io::Write> {
    pub stream: T,
    bytes_written: u64,
}

impl<T: io::Write> CountingStream<T> {
    pub fn new(stream: T) -> CountingStream<T> {
        Self {
            stream,
            bytes_written: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: io::Write> ByteCounter for CountingStream<T> {
    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<T: io::Write> io::Write for CountingStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
