use bytes::Bytes;
use nimble_error::{NimbleResult, nimble_bail};

/// A bounds-checked little-endian reader over a shared [`Bytes`] buffer.
///
/// Slices handed out by [`read_bytes`](ByteCursor::read_bytes) are zero-copy
/// views into the same reference-counted allocation, so decoded state can
/// outlive the cursor but not the buffer.
#[derive(Clone)]
pub struct ByteCursor {
    buf: Bytes,
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $T:ty) => {
        #[doc = concat!("Read a little-endian `", stringify!($T), "`.")]
        pub fn $name(&mut self) -> NimbleResult<$T> {
            const N: usize = size_of::<$T>();
            let bytes = self.read_array::<N>()?;
            Ok(<$T>::from_le_bytes(bytes))
        }
    };
}

impl ByteCursor {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn read_array<const N: usize>(&mut self) -> NimbleResult<[u8; N]> {
        if self.remaining() < N {
            nimble_bail!(
                MalformedEncoding: "truncated payload: need {} bytes, {} remain",
                N,
                self.remaining()
            );
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    read_le!(read_u8, u8);
    read_le!(read_u16, u16);
    read_le!(read_u32, u32);
    read_le!(read_u64, u64);
    read_le!(read_i8, i8);
    read_le!(read_i16, i16);
    read_le!(read_i32, i32);
    read_le!(read_i64, i64);
    read_le!(read_f32, f32);
    read_le!(read_f64, f64);

    /// Read `len` bytes as a zero-copy slice of the underlying buffer.
    pub fn read_bytes(&mut self, len: usize) -> NimbleResult<Bytes> {
        if self.remaining() < len {
            nimble_bail!(
                MalformedEncoding: "truncated payload: need {} bytes, {} remain",
                len,
                self.remaining()
            );
        }
        let out = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    /// Read a `u32`-length-prefixed byte string.
    pub fn read_string(&mut self) -> NimbleResult<Bytes> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// The unread remainder as a zero-copy slice.
    pub fn rest(&self) -> Bytes {
        self.buf.slice(self.pos..)
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> NimbleResult<()> {
        if self.remaining() < len {
            nimble_bail!(
                MalformedEncoding: "truncated payload: cannot skip {} bytes, {} remain",
                len,
                self.remaining()
            );
        }
        self.pos += len;
        Ok(())
    }
}

/// Append a `u32`-length-prefixed byte string.
pub fn write_string(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_reads() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0xA1u8.to_le_bytes());
        buf.extend_from_slice(&0xBEEFu16.to_le_bytes());
        buf.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        buf.extend_from_slice(&(-5i64).to_le_bytes());
        buf.extend_from_slice(&1.5f64.to_le_bytes());

        let mut cursor = ByteCursor::new(Bytes::from(buf));
        assert_eq!(cursor.read_u8().unwrap(), 0xA1);
        assert_eq!(cursor.read_u16().unwrap(), 0xBEEF);
        assert_eq!(cursor.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(cursor.read_i64().unwrap(), -5);
        assert_eq!(cursor.read_f64().unwrap(), 1.5);
        assert!(cursor.is_empty());
    }

    #[test]
    fn truncation_detected() {
        let mut cursor = ByteCursor::new(Bytes::from_static(&[1, 2]));
        assert!(cursor.read_u32().is_err());
        // A failed read consumes nothing.
        assert_eq!(cursor.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn string_round_trip() {
        let mut out = Vec::new();
        write_string(b"hello", &mut out);
        write_string(b"", &mut out);
        let mut cursor = ByteCursor::new(Bytes::from(out));
        assert_eq!(cursor.read_string().unwrap().as_ref(), b"hello");
        assert_eq!(cursor.read_string().unwrap().as_ref(), b"");
    }
}
