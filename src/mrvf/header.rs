//! The fixed-size frame around an MRVF payload.
use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use super::Error;
use crate::{crc::CrcStandard, ring::RingWidth};

/// Marker at the start of every MRVF file.
pub const BOF: [u8; 8] = *b"MRVF_BOF";
/// Marker at the end of every MRVF file.
pub const EOF: [u8; 8] = *b"MRVF_EOF";
/// Upper bound on the element count of a stored vector.
pub const MAX_ELEMENTS: u64 = 1 << 50;
/// File extension of MRVF files (without the dot).
pub const EXTENSION: &str = "mrvf";
/// Size of the checksum field.
pub const CHECKSUM_LEN: usize = 8;
/// The smallest well-formed file: an empty version 1 vector.
pub const MIN_FILE_LEN: usize = BOF.len() + 3 + 4 + CHECKSUM_LEN + EOF.len();

/// MRVF format version. Versions differ in the width of the element count field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Version {
    /// 4-byte element count.
    V1 = 0x01,
    /// 8-byte element count.
    #[default]
    V2 = 0x02,
}

impl Version {
    /// The version written by default.
    pub const CURRENT: Version = Version::V2;

    /// The version byte.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Width of the element count field in bytes.
    pub const fn count_bytes(self) -> usize {
        match self {
            Version::V1 => 4,
            Version::V2 => 8,
        }
    }

    /// The largest element count this version can store.
    pub const fn max_elements(self) -> u64 {
        match self {
            Version::V1 => u32::MAX as u64,
            Version::V2 => MAX_ELEMENTS,
        }
    }
}

impl TryFrom<u8> for Version {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x01 => Ok(Version::V1),
            0x02 => Ok(Version::V2),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }
}

/// Metadata of a stored vector: everything between the head marker and the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version.
    pub version: Version,
    /// Standard of the trailing checksum.
    pub crc: CrcStandard,
    /// Width of the stored ring.
    pub width: RingWidth,
    /// Number of stored elements.
    pub count: u64,
}

impl Header {
    /// Fails with [`Error::ElementCountTooLarge`] if the version cannot store `count`.
    pub fn check_count(&self) -> Result<(), Error> {
        let max = self.version.max_elements();
        if self.count > max {
            return Err(Error::ElementCountTooLarge {
                count: self.count,
                max,
            });
        }
        Ok(())
    }

    /// Number of payload bytes.
    pub fn payload_len(&self) -> u64 {
        self.count * self.width.bytes() as u64
    }

    /// Total number of bytes of the file described by this header.
    pub fn file_len(&self) -> u64 {
        (BOF.len() + 3 + self.version.count_bytes() + CHECKSUM_LEN + EOF.len()) as u64
            + self.payload_len()
    }

    /// The metadata bytes covered by the checksum, in file order.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.version.count_bytes());
        out.extend([self.version.tag(), self.crc.tag(), self.width.tag()]);
        match self.version {
            // fits: checked by `check_count`
            Version::V1 => out.extend((self.count as u32).to_le_bytes()),
            Version::V2 => out.extend(self.count.to_le_bytes()),
        }
        out
    }
}

/// Reads into `buf`, reporting a premature end of input as `on_eof`.
pub(crate) fn read_or<Rd: Read>(
    reader: &mut Rd,
    buf: &mut [u8],
    on_eof: Error,
) -> Result<(), Error> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(on_eof),
        Err(err) => Err(Error::Io(err)),
    }
}

/// Reads and validates the head marker and metadata of an MRVF stream, leaving the
/// reader at the first payload byte.
///
/// The ring width is only checked for being a known width; use
/// [`MrvfHandler`](super::MrvfHandler) to check it against a ring type.
pub fn read_header<Rd: Read>(mut reader: Rd) -> Result<Header, Error> {
    let mut magic = [0; 8];
    read_or(&mut reader, &mut magic, Error::InvalidBof)?;
    if magic != BOF {
        return Err(Error::InvalidBof);
    }
    let mut tags = [0; 3];
    read_or(&mut reader, &mut tags, Error::InvalidEof)?;
    let [version, crc, width] = tags;
    let version = Version::try_from(version)?;
    let crc = CrcStandard::try_from(crc)?;
    let width = RingWidth::from_tag(width).ok_or(Error::UnknownRingWidth(width))?;
    let count = match version {
        Version::V1 => {
            let mut count = [0; 4];
            read_or(&mut reader, &mut count, Error::InvalidEof)?;
            u32::from_le_bytes(count) as u64
        }
        Version::V2 => {
            let mut count = [0; 8];
            read_or(&mut reader, &mut count, Error::InvalidEof)?;
            u64::from_le_bytes(count)
        }
    };
    let header = Header {
        version,
        crc,
        width,
        count,
    };
    header.check_count()?;
    Ok(header)
}
