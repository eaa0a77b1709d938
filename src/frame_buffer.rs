//! Elastic frame buffer.
//!
//! A fixed ring of `N` bytes between the serial receiver (producer) and the
//! bit generator (consumer). Each side owns one cursor and the scheduler
//! orders their accesses, so there is no locking.
//!
//! The writer is never checked against the reader. If the producer laps the
//! consumer the buffer reads as empty again and roughly one buffer's worth of
//! data is skipped. This is the documented fail-soft behavior; adding a
//! bounds check here would also add a data-dependent branch to every
//! quantum.

/// Fixed-capacity byte ring with independent read and write cursors
#[derive(Debug)]
pub struct FrameBuffer<const N: usize> {
    data: [u8; N],
    write: usize,
    read: usize,
}

impl<const N: usize> FrameBuffer<N> {
    /// Create an empty buffer with both cursors at the origin
    pub const fn new() -> Self {
        Self {
            data: [0; N],
            write: 0,
            read: 0,
        }
    }

    /// Buffer capacity in bytes
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Store a byte at the write cursor.
    ///
    /// Never fails and never checks the read cursor.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.data[self.write] = byte;
        self.write += 1;
        if self.write == N {
            self.write = 0;
        }
    }

    /// Take the byte at the read cursor, if any
    #[inline]
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.data[self.read];
        self.read += 1;
        if self.read == N {
            self.read = 0;
        }
        Some(byte)
    }

    /// Returns `true` when both cursors coincide
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Number of buffered bytes (modulo capacity once overrun)
    pub const fn len(&self) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            N - self.read + self.write
        }
    }

    /// Move both cursors back to the start of the ring.
    ///
    /// Anything still buffered is discarded.
    pub fn reset_to_origin(&mut self) {
        self.write = 0;
        self.read = 0;
    }

    /// Current write cursor position
    pub const fn write_cursor(&self) -> usize {
        self.write
    }

    /// Current read cursor position
    pub const fn read_cursor(&self) -> usize {
        self.read
    }
}

impl<const N: usize> Default for FrameBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
