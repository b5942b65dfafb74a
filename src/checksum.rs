//! Transfer checksums

use crate::protocol::Checksum;

/// Rolling MD5 over the raw body of one transfer
pub struct Md5Stream {
    ctx: md5::Context,
    bytes: u64,
}

impl Md5Stream {
    pub fn new() -> Self {
        Self {
            ctx: md5::Context::new(),
            bytes: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.ctx.consume(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> Checksum {
        self.ctx.compute().0
    }
}

impl Default for Md5Stream {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte-for-byte comparison of two digests
pub fn verify_checksum(local: &Checksum, remote: &Checksum) -> bool {
    local == remote
}

/// One-shot digest of an in-memory buffer
pub fn checksum_of(data: &[u8]) -> Checksum {
    md5::compute(data).0
}

/// Hex rendering for logs
pub fn to_hex(sum: &Checksum) -> String {
    sum.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_matches_one_shot() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut stream = Md5Stream::new();
        for chunk in data.chunks(7) {
            stream.update(chunk);
        }
        assert_eq!(stream.bytes(), data.len() as u64);
        let sum = stream.finish();
        assert_eq!(sum, checksum_of(data));
        assert_eq!(to_hex(&sum), "9e107d9d372bb6826bd81d3542a419d6");
    }

    #[test]
    fn test_empty_digest() {
        assert_eq!(to_hex(&Md5Stream::new().finish()), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_single_byte_difference_detected() {
        let mut a = vec![7u8; 4096];
        let good = checksum_of(&a);
        a[2048] ^= 0x01;
        assert!(!verify_checksum(&good, &checksum_of(&a)));
        assert!(verify_checksum(&good, &good));
    }
}
