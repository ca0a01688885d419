// Licensed under the Apache-2.0 license

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

/// CRC-32/ISO-HDLC: reflected polynomial 0xEDB88320, seed and final XOR
/// 0xFFFFFFFF. The lookup table is built at compile time.
pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One-shot CRC32 of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Streaming CRC32 for data that does not fit in memory at once, such as an
/// image body read out of flash in chunks.
pub struct Crc32 {
    digest: Digest<'static, u32>,
}

impl Crc32 {
    pub fn new() -> Self {
        Crc32 {
            digest: CRC32.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}
