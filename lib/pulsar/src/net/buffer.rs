use slice_deque::SliceDeque;
use std::cmp::min;
use std::io;

type ByteDeque = SliceDeque<u8>;

// Buffer sizes are multiples of the page friendly increment
pub const BUF_SIZE_INCREMENT: usize = 65536;

/// Outcome of draining a reader into the buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Ingress {
    /// The reader would block, everything available has been read.
    Drained(usize),
    /// The buffer reached its nominal size before the reader was drained.
    Full(usize),
    /// The reader reached end of stream.
    Closed(usize),
}

/// A double ended byte FIFO. Data is appended at the tail and consumed from the head. Reads
/// from a socket are capped at the nominal size, appends may grow the buffer beyond it.
pub struct Buffer {
    data: ByteDeque,
    size: usize,
}

impl Buffer {
    #[inline]
    pub fn new(size: usize) -> Buffer {
        if size == 0 || size % BUF_SIZE_INCREMENT != 0 {
            panic!(
                "Buffer size must be divisible by {}, got {}",
                BUF_SIZE_INCREMENT, size
            );
        }

        let mut data = ByteDeque::new();
        data.reserve(size);
        Buffer { data, size }
    }

    /// The number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Room left below the nominal size.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.size.saturating_sub(self.data.len())
    }

    /// Discard `count` bytes from the head.
    #[inline]
    pub fn move_head(&mut self, count: usize) {
        assert!(count <= self.data.len(), "Moving head past the tail");
        unsafe { self.data.move_head(count as isize) }
    }

    /// Slice containing data.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Append bytes at the tail, growing the buffer if needed.
    #[inline]
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write the contents of the buffer to the supplied writer until it would block, advancing
    /// the head. Returns the number of bytes written.
    #[inline]
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.data.len();

        while !self.data.is_empty() {
            match writer.write(&self.data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => self.move_head(count),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(orig_len - self.data.len())
    }

    /// Read data from the supplied reader until it would block, the reader is exhausted or the
    /// buffer is full.
    #[inline]
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<Ingress> {
        let mut count = 0;

        loop {
            let free = self.free_capacity();

            if free == 0 {
                return Ok(Ingress::Full(count));
            }

            let result = unsafe {
                let slice = self.data.tail_head_slice();
                let limit = min(free, slice.len());
                reader.read(&mut slice[..limit])
            };

            match result {
                Ok(0) => return Ok(Ingress::Closed(count)),
                Ok(read_count) => {
                    unsafe { self.data.move_tail(read_count as isize) };
                    count += read_count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(Ingress::Drained(count)),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}
