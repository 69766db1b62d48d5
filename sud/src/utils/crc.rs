//! CRC-16 checksums for SUD chunks.
//!
//! Two checksums protect every chunk: a data CRC over the payload and a header
//! CRC over header bytes `[2, 18)`. The data CRC runs over 16-bit words, so
//! payloads are always padded to an even length before it is computed.
//!
//! Note: the checksum used by existing recorders is not documented. The
//! algorithm is therefore pluggable through [`Algorithm`]; the defaults below
//! are CRC-16/CCITT-FALSE and can be swapped without touching the framing code.

/// CRC algorithm parameters: polynomial and initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Algorithm<T> {
    pub poly: T,
    pub init: T,
}

/// CRC-16 algorithm for chunk payloads.
pub const CRC_SUD_DATA_ALG: Algorithm<u16> = Algorithm {
    poly: 0x1021,
    init: 0xFFFF,
};

/// CRC-16 algorithm for chunk headers.
pub const CRC_SUD_HEADER_ALG: Algorithm<u16> = Algorithm {
    poly: 0x1021,
    init: 0xFFFF,
};

/// Shifts `value` (placed in the top byte) through `len` rounds of the polynomial.
#[inline(always)]
pub const fn crc16(poly: u16, mut value: u16, len: usize) -> u16 {
    value <<= 8;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 15) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc16(poly, i as u16, 8);
        i += 1;
    }

    table
}

#[derive(Debug, Clone)]
pub struct Crc16 {
    pub poly: u16,
    pub init: u16,
    table: [u16; 256],
}

impl Crc16 {
    pub const fn new(algorithm: &Algorithm<u16>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc16_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u16) -> u16 {
        self.table[(index & 0xFF) as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u16, bytes: &[u8]) -> u16 {
        let mut i = 0;

        while i < bytes.len() {
            crc = (crc << 8) ^ self.table_entry((crc >> 8) ^ bytes[i] as u16);
            i += 1;
        }

        crc
    }

    /// Checksum of `bytes` taken in stream order.
    pub const fn checksum(&self, bytes: &[u8]) -> u16 {
        self.update(self.init, bytes)
    }

    /// Checksum of `bytes` taken as little-endian 16-bit words, high byte
    /// first. A trailing odd byte is ignored.
    pub const fn checksum_words(&self, bytes: &[u8]) -> u16 {
        let mut crc = self.init;
        let mut i = 0;

        while i + 1 < bytes.len() {
            crc = (crc << 8) ^ self.table_entry((crc >> 8) ^ bytes[i + 1] as u16);
            crc = (crc << 8) ^ self.table_entry((crc >> 8) ^ bytes[i] as u16);
            i += 2;
        }

        crc
    }
}

/// The checksum pair used for chunk framing.
#[derive(Debug, Clone)]
pub struct Checksums {
    pub data: Crc16,
    pub header: Crc16,
}

impl Checksums {
    pub const fn new(data: &Algorithm<u16>, header: &Algorithm<u16>) -> Self {
        Self {
            data: Crc16::new(data),
            header: Crc16::new(header),
        }
    }

    /// CRC over a chunk payload.
    pub fn data_crc(&self, payload: &[u8]) -> u16 {
        self.data.checksum_words(payload)
    }

    /// CRC over `length` header bytes starting at `offset`.
    pub fn header_crc(&self, header: &[u8], length: usize, offset: usize) -> u16 {
        self.header.checksum(&header[offset..offset + length])
    }
}

impl Default for Checksums {
    fn default() -> Self {
        Self::new(&CRC_SUD_DATA_ALG, &CRC_SUD_HEADER_ALG)
    }
}

#[test]
fn check_values() {
    let crc = Crc16::new(&CRC_SUD_DATA_ALG);
    assert_eq!(crc.checksum(b"123456789"), 0x29B1);

    let xmodem = Crc16::new(&Algorithm {
        poly: 0x1021,
        init: 0x0000,
    });
    assert_eq!(xmodem.checksum(b"123456789"), 0x31C3);
    assert_eq!(xmodem.checksum(&[]), 0);
}

#[test]
fn word_checksum_matches_swapped_bytes() {
    let crc = Crc16::new(&CRC_SUD_DATA_ALG);
    let data = b"0123456789abcdef".to_vec();

    let mut swapped = data.clone();
    crate::endian::swap_byte_pairs(&mut swapped);

    assert_eq!(crc.checksum_words(&swapped), crc.checksum(&data));
    assert_ne!(crc.checksum_words(&data), crc.checksum(&data));
}

#[test]
fn header_crc_covers_requested_range() {
    let checksums = Checksums::default();
    let mut header = [0u8; 20];
    header[2] = 0x02;
    let base = checksums.header_crc(&header, 16, 2);

    header[0] = 0xFF;
    header[19] = 0xFF;
    assert_eq!(checksums.header_crc(&header, 16, 2), base);

    header[17] = 0x01;
    assert_ne!(checksums.header_crc(&header, 16, 2), base);
}
