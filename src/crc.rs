/// CRC Integrity Codes
///
/// CRC8 guards structured block headers; CRC16 and CRC32 are available for
/// host-side framing. Each width has a one-shot form over a buffer and a
/// streaming hasher that accumulates chunk by chunk, emitting a fixed-width
/// big-endian buffer (1/2/4 bytes).
use byteorder::{BigEndian, ByteOrder};

/// CRC-8, polynomial 0x07, init 0x00, no reflection.
const CRC8_POLY: u8 = 0x07;

/// CRC-16/CCITT-FALSE, polynomial 0x1021, init 0xFFFF.
const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xFFFF;

const fn build_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ CRC8_POLY } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ CRC16_POLY } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC8_TABLE: [u8; 256] = build_crc8_table();
static CRC16_TABLE: [u16; 256] = build_crc16_table();

/// CRC8 of a buffer.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }
    crc
}

/// CRC16 of a buffer.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;
    for &byte in data {
        crc = (crc << 8) ^ CRC16_TABLE[(((crc >> 8) as u8) ^ byte) as usize];
    }
    crc
}

/// CRC32 of a buffer.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// CRC8 as a 1-byte buffer.
pub fn crc8_buffer(data: &[u8]) -> [u8; 1] {
    [crc8(data)]
}

/// CRC16 as a 2-byte big-endian buffer.
pub fn crc16_buffer(data: &[u8]) -> [u8; 2] {
    let mut out = [0u8; 2];
    BigEndian::write_u16(&mut out, crc16(data));
    out
}

/// CRC32 as a 4-byte big-endian buffer.
pub fn crc32_buffer(data: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    BigEndian::write_u32(&mut out, crc32(data));
    out
}

pub fn verify_crc8(data: &[u8], expected: u8) -> bool {
    crc8(data) == expected
}

pub fn verify_crc16(data: &[u8], expected: u16) -> bool {
    crc16(data) == expected
}

pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

/// Streaming CRC8 accumulator.
pub struct Crc8Hasher {
    crc: u8,
}

impl Crc8Hasher {
    pub fn new() -> Self {
        Self { crc: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.crc = CRC8_TABLE[(self.crc ^ byte) as usize];
        }
    }

    pub fn finalize(self) -> [u8; 1] {
        [self.crc]
    }

    pub fn value(&self) -> u8 {
        self.crc
    }
}

impl Default for Crc8Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming CRC16 accumulator.
pub struct Crc16Hasher {
    crc: u16,
}

impl Crc16Hasher {
    pub fn new() -> Self {
        Self { crc: CRC16_INIT }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.crc = (self.crc << 8) ^ CRC16_TABLE[(((self.crc >> 8) as u8) ^ byte) as usize];
        }
    }

    pub fn finalize(self) -> [u8; 2] {
        let mut out = [0u8; 2];
        BigEndian::write_u16(&mut out, self.crc);
        out
    }

    pub fn value(&self) -> u16 {
        self.crc
    }
}

impl Default for Crc16Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming CRC32 accumulator.
pub struct Crc32Hasher {
    inner: crc32fast::Hasher,
}

impl Crc32Hasher {
    pub fn new() -> Self {
        Self { inner: crc32fast::Hasher::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> [u8; 4] {
        let mut out = [0u8; 4];
        BigEndian::write_u32(&mut out, self.inner.finalize());
        out
    }
}

impl Default for Crc32Hasher {
    fn default() -> Self {
        Self::new()
    }
}
