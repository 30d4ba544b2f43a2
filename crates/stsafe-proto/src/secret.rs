//! Frame buffers that wipe themselves.
//!
//! Host keys and envelope plaintext pass through frame payloads. Buffers built
//! with [`sealed`] are zeroed when the last [`Bytes`] handle to them drops, so
//! no copy is left behind in freed memory.

use bytes::{Bytes, BytesMut};
use zeroize::{Zeroize, Zeroizing};

struct Sealed(Zeroizing<Vec<u8>>);

impl AsRef<[u8]> for Sealed {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Copy `data` into a buffer that is zeroed on drop.
pub fn sealed(data: &[u8]) -> Bytes {
    Bytes::from_owner(Sealed(Zeroizing::new(data.to_vec())))
}

/// Move `buf` into a sealed buffer and wipe the original.
pub(crate) fn seal(mut buf: BytesMut) -> Bytes {
    let bytes = sealed(&buf);
    buf[..].zeroize();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_bytes_read_like_any_other() {
        let bytes = sealed(&[1, 2, 3, 4]);
        assert_eq!(bytes.as_ref(), &[1, 2, 3, 4]);
        assert_eq!(bytes.slice(1..3).as_ref(), &[2, 3]);
    }

    #[test]
    fn seal_keeps_contents() {
        let bytes = seal(BytesMut::from(&[9u8, 8, 7][..]));
        assert_eq!(bytes.as_ref(), &[9, 8, 7]);
    }
}
