use crate::error::Result;

/// A byte link to a device under test.
///
/// Reads never block indefinitely: an implementation returns whatever bytes
/// arrived within its own read timeout, which may be none at all.
pub trait DutTransport {
    /// Write the whole of `bytes`, failing if the link accepted fewer.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read between 0 and `max_len` bytes.
    ///
    /// An empty result means the read timed out with nothing available.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>>;

    /// Discard anything buffered in either direction.
    fn purge(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: DutTransport + ?Sized> DutTransport for &mut T {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        (**self).read(max_len)
    }

    fn purge(&mut self) -> Result<()> {
        (**self).purge()
    }
}

impl<T: DutTransport + ?Sized> DutTransport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        (**self).read(max_len)
    }

    fn purge(&mut self) -> Result<()> {
        (**self).purge()
    }
}
