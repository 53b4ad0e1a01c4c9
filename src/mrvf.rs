//! MRVF, the versioned and checksummed file format for ring vectors.
//!
//! Layout (all multi-byte fields little-endian):
//!
//! | field       | bytes               |
//! |-------------|---------------------|
//! | head marker | 8 (`MRVF_BOF`)      |
//! | version     | 1                   |
//! | CRC tag     | 1                   |
//! | width tag   | 1 (bit width)       |
//! | count       | 4 (v1) or 8 (v2)    |
//! | payload     | count × element size |
//! | checksum    | 8                   |
//! | tail marker | 8 (`MRVF_EOF`)      |
//!
//! The CRC-64 checksum covers everything from the version byte to the end of the
//! payload. Loading never returns a partially read vector: any failure is an [`Error`].
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    contract::ContractViolation,
    crc::{self, Crc64, CrcStandard, Digest},
    ring::{Ring, RingWidth},
    rvector::{AllocError, Lease, RVector},
};

mod header;

pub use header::{
    BOF, CHECKSUM_LEN, EOF, EXTENSION, Header, MAX_ELEMENTS, MIN_FILE_LEN, Version,
    read_header,
};
use header::read_or;

/// Errors occurring while saving or loading MRVF files.
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be opened or created.
    #[error("unable to open {}", .path.display())]
    Open {
        /// The path that could not be opened.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
    /// Reading or writing failed.
    #[error("I/O error")]
    Io(#[from] io::Error),
    /// The file is shorter than the smallest well-formed MRVF file.
    #[error("file of {len} bytes is too short to be an MRVF file")]
    TooShort {
        /// Length of the file in bytes.
        len: u64,
    },
    /// The head marker is missing or corrupted.
    #[error("invalid head marker, not an MRVF file")]
    InvalidBof,
    /// The tail marker is missing or corrupted, or the file ends before it.
    #[error("invalid or missing tail marker")]
    InvalidEof,
    /// The version byte names no known format version.
    #[error("unsupported MRVF version {0:#04x}")]
    UnsupportedVersion(u8),
    /// The CRC tag names no known standard.
    #[error(transparent)]
    UnknownCrcStandard(#[from] crc::Error),
    /// The width tag names no supported ring.
    #[error("unknown ring width tag {0}")]
    UnknownRingWidth(u8),
    /// The file stores a different ring than requested.
    #[error("file stores elements with width tag {found}, expected a {expected}")]
    RingSizeMismatch {
        /// Width of the requested ring.
        expected: RingWidth,
        /// Width tag found in the file.
        found: u8,
    },
    /// The stored checksum does not match the contents.
    #[error("CRC-64 check failed: stored {stored:#018x}, computed {computed:#018x}")]
    Crc64CheckFailed {
        /// Checksum stored in the file.
        stored: u64,
        /// Checksum of the metadata and payload as read.
        computed: u64,
    },
    /// The element count exceeds what the format (version) supports.
    #[error("element count {count} exceeds the maximum of {max}")]
    ElementCountTooLarge {
        /// The element count.
        count: u64,
        /// The maximum element count.
        max: u64,
    },
    /// The file length disagrees with the length its header implies.
    #[error("header implies a file of {expected} bytes, but it has {actual}")]
    LengthMismatch {
        /// Length implied by the header.
        expected: u64,
        /// Actual length of the file.
        actual: u64,
    },
    /// A stored element is not a valid ring element (a bit other than 0 or 1).
    #[error("element {index} is not a valid ring element")]
    InvalidElement {
        /// Position of the first invalid element.
        index: usize,
    },
    /// The vector could not be allocated.
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// The vector to save was unavailable (e.g. its buffer is checked out).
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

/// Options of an [`MrvfHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Load files through a read-only memory map instead of buffered reads.
    pub use_memory_map: bool,
    /// Verify the checksum on load. Disabling it logs a warning on every load.
    pub verify_checksum: bool,
    /// Checksum standard used when saving.
    pub crc: CrcStandard,
    /// Format version written when saving.
    pub version: Version,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_memory_map: false,
            verify_checksum: true,
            crc: CrcStandard::default(),
            version: Version::CURRENT,
        }
    }
}

/// Saves and loads [`RVector`]s of one ring as MRVF files.
///
/// Files are read with whatever checksum standard and version they declare; the
/// [`Config`] only determines what is written.
#[derive(Debug, Clone, Default)]
pub struct MrvfHandler<R> {
    config: Config,
    ring: PhantomData<fn() -> R>,
}

impl<R: Ring> MrvfHandler<R> {
    /// A handler with the default [`Config`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A handler with the given [`Config`].
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ring: PhantomData,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Writes `vector` to `writer`.
    ///
    /// The buffer of `vector` is checked out for the duration of the write and always
    /// checked back in, even if writing fails. A vector holding an invalid element is
    /// rejected before anything is written.
    #[instrument(level = "debug", skip_all, fields(ring = %R::WIDTH, count = vector.len()))]
    pub fn save<W: Write>(&self, writer: W, vector: &mut RVector<R>) -> Result<(), Error> {
        let mut lease = vector.check_out()?;
        let result = self.write_lease(writer, &mut lease);
        vector.check_in(lease)?;
        let checksum = result?;
        debug!(checksum = format_args!("{checksum:#018x}"), "saved ring vector");
        Ok(())
    }

    fn write_lease<W: Write>(&self, mut writer: W, lease: &mut Lease<R>) -> Result<u64, Error> {
        let header = Header {
            version: self.config.version,
            crc: self.config.crc,
            width: R::WIDTH,
            count: lease.len() as u64,
        };
        header.check_count()?;
        if let Some(index) = lease.iter().position(|x| !x.is_canonical()) {
            return Err(Error::InvalidElement { index });
        }
        let metadata = header.encode();
        let mut digest = Crc64::new(header.crc).digest();
        digest.update(&metadata);

        writer.write_all(&BOF)?;
        writer.write_all(&metadata)?;
        to_le(lease);
        digest.update(lease.as_bytes());
        let written = writer.write_all(lease.as_bytes());
        from_le(lease);
        written?;
        let checksum = digest.finalize();
        writer.write_all(&checksum.to_le_bytes())?;
        writer.write_all(&EOF)?;
        writer.flush()?;
        Ok(checksum)
    }

    /// Reads a vector from `reader`, which must be positioned at the head marker.
    ///
    /// Bytes following the tail marker are not read.
    #[instrument(level = "debug", skip_all, fields(ring = %R::WIDTH))]
    pub fn load<Rd: Read>(&self, mut reader: Rd) -> Result<RVector<R>, Error> {
        let header = read_header(&mut reader)?;
        let len = self.check_header(&header)?;
        let mut digest = Crc64::new(header.crc).digest();
        digest.update(&header.encode());

        let data = read_payload::<R, _>(&mut reader, len, &mut digest)?;

        let mut stored = [0; CHECKSUM_LEN];
        read_or(&mut reader, &mut stored, Error::InvalidEof)?;
        let stored = u64::from_le_bytes(stored);
        let computed = digest.finalize();
        if self.config.verify_checksum {
            if stored != computed {
                return Err(Error::Crc64CheckFailed { stored, computed });
            }
        } else {
            warn!("loading ring vector without checksum verification");
        }

        let mut magic = [0; 8];
        read_or(&mut reader, &mut magic, Error::InvalidEof)?;
        if magic != EOF {
            return Err(Error::InvalidEof);
        }
        if let Some(index) = data.iter().position(|x| !x.is_canonical()) {
            return Err(Error::InvalidElement { index });
        }
        debug!(count = len, version = ?header.version, crc = ?header.crc, "loaded ring vector");
        Ok(RVector::from_lease(Lease::from(data)))
    }

    /// Reads a vector from a complete in-memory MRVF file.
    ///
    /// Unlike [`MrvfHandler::load`], the length of `bytes` must match the header exactly.
    pub fn load_from_bytes(&self, bytes: &[u8]) -> Result<RVector<R>, Error> {
        let actual = bytes.len() as u64;
        if bytes.len() < MIN_FILE_LEN {
            return Err(Error::TooShort { len: actual });
        }
        let header = read_header(bytes)?;
        self.check_header(&header)?;
        check_file_len(&header, actual)?;
        self.load(bytes)
    }

    /// Saves `vector` to `path`.
    ///
    /// The file is written to a temporary file in the same directory and moved into
    /// place only once it is complete, so a failed save leaves no partial file behind.
    pub fn save_to_path(
        &self,
        path: impl AsRef<Path>,
        vector: &mut RVector<R>,
    ) -> Result<(), Error> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let file = NamedTempFile::new_in(dir).map_err(|source| Error::Open {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        self.save(&mut writer, vector)?;
        let file = writer.into_inner().map_err(|err| err.into_error())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;
        debug!(path = %path.display(), "persisted ring vector");
        Ok(())
    }

    /// Loads the vector stored at `path`.
    ///
    /// The file length is checked against the header before the payload is allocated.
    pub fn load_from_path(&self, path: impl AsRef<Path>) -> Result<RVector<R>, Error> {
        let path = path.as_ref();
        let mut file = open(path)?;
        if self.config.use_memory_map {
            let len = file.metadata()?.len();
            if len < MIN_FILE_LEN as u64 {
                return Err(Error::TooShort { len });
            }
            // Safety: the map is read-only and dropped before returning. Modifying the
            // file while it is being loaded is not supported.
            #[allow(unsafe_code)]
            let map = unsafe { Mmap::map(&file) }?;
            return self.load_from_bytes(&map);
        }

        let actual = file.metadata()?.len();
        if actual < MIN_FILE_LEN as u64 {
            return Err(Error::TooShort { len: actual });
        }
        let header = read_header(BufReader::new(&file))?;
        self.check_header(&header)?;
        check_file_len(&header, actual)?;
        file.rewind()?;
        self.load(BufReader::new(file))
    }

    /// Checks that `header` describes a vector of `R` and returns its length.
    fn check_header(&self, header: &Header) -> Result<usize, Error> {
        if header.width != R::WIDTH {
            return Err(Error::RingSizeMismatch {
                expected: R::WIDTH,
                found: header.width.tag(),
            });
        }
        usize::try_from(header.count).map_err(|_| Error::ElementCountTooLarge {
            count: header.count,
            max: usize::MAX as u64,
        })
    }
}

/// Reads the ring width of the MRVF file at `path` without loading its payload.
pub fn read_ring_width(path: impl AsRef<Path>) -> Result<RingWidth, Error> {
    let file = open(path.as_ref())?;
    Ok(read_header(BufReader::new(file))?.width)
}

fn open(path: &Path) -> Result<File, Error> {
    File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn check_file_len(header: &Header, actual: u64) -> Result<(), Error> {
    let expected = header.file_len();
    if expected != actual {
        return Err(Error::LengthMismatch { expected, actual });
    }
    Ok(())
}

/// Elements read per step of a load. The header of a stream is untrusted, so memory is
/// committed only as the payload actually arrives.
const READ_CHUNK: usize = 1 << 20;

fn read_payload<R: Ring, Rd: Read>(
    reader: &mut Rd,
    len: usize,
    digest: &mut Digest,
) -> Result<Vec<R>, Error> {
    let mut data: Vec<R> = Vec::new();
    while data.len() < len {
        let start = data.len();
        let chunk = READ_CHUNK.min(len - start);
        data.try_reserve(chunk).map_err(|source| AllocError {
            requested: len,
            source,
        })?;
        data.resize(start + chunk, R::ZERO);
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut data[start..]);
        read_or(reader, bytes, Error::InvalidEof)?;
        digest.update(bytes);
    }
    from_le(&mut data);
    Ok(data)
}

fn to_le<R: Ring>(values: &mut [R]) {
    if cfg!(target_endian = "big") {
        values.iter_mut().for_each(|x| *x = x.to_le());
    }
}

fn from_le<R: Ring>(values: &mut [R]) {
    if cfg!(target_endian = "big") {
        values.iter_mut().for_each(|x| *x = x.from_le());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{Ring1, Ring16, Ring64};

    fn encoded_vector<R: Ring>(handler: &MrvfHandler<R>, vector: &mut RVector<R>) -> Vec<u8> {
        let mut bytes = Vec::new();
        handler.save(&mut bytes, vector).unwrap();
        bytes
    }

    fn encoded<R: Ring>(handler: &MrvfHandler<R>, values: &[R]) -> Vec<u8> {
        encoded_vector(handler, &mut RVector::from_slice(values).unwrap())
    }

    #[test]
    fn file_layout() {
        let handler = MrvfHandler::<Ring16>::new();
        let bytes = encoded(&handler, &[Ring16(0x0102), Ring16(0x0304)]);
        assert_eq!(bytes.len(), 8 + 3 + 8 + 4 + 8 + 8);
        assert_eq!(&bytes[..8], b"MRVF_BOF");
        assert_eq!(bytes[8..11], [0x02, 0x00, 16]);
        assert_eq!(bytes[11..19], 2_u64.to_le_bytes());
        assert_eq!(bytes[19..23], [0x02, 0x01, 0x04, 0x03]);
        let checksum = Crc64::new(CrcStandard::Ecma182).compute(&bytes[8..23]);
        assert_eq!(bytes[23..31], checksum.to_le_bytes());
        assert_eq!(&bytes[31..], b"MRVF_EOF");
    }

    #[test]
    fn save_checks_the_buffer_back_in() {
        let handler = MrvfHandler::<Ring64>::new();
        let mut vector = RVector::from_slice(&[Ring64(1), Ring64(2)]).unwrap();
        let mut bytes = Vec::new();
        handler.save(&mut bytes, &mut vector).unwrap();
        assert!(!vector.is_checked_out());
        assert_eq!(vector.as_slice(), &[Ring64(1), Ring64(2)]);
    }

    #[test]
    fn failed_write_still_checks_in() {
        struct Full;
        impl Write for Full {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut vector = RVector::from_slice(&[Ring64(7)]).unwrap();
        let err = MrvfHandler::new().save(Full, &mut vector).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!vector.is_checked_out());
        assert_eq!(vector[0], Ring64(7));
    }

    #[test]
    #[cfg_attr(
        any(debug_assertions, feature = "panic-on-contract-violation"),
        should_panic(expected = "the buffer is already checked out")
    )]
    fn saving_a_lent_vector_is_rejected() {
        let mut vector = RVector::from_slice(&[Ring64(7)]).unwrap();
        let _lease = vector.check_out().unwrap();
        let err = MrvfHandler::new().save(Vec::new(), &mut vector).unwrap_err();
        assert!(matches!(
            err,
            Error::Contract(ContractViolation::AlreadyCheckedOut)
        ));
    }

    #[test]
    fn invalid_bits_are_rejected() {
        let handler = MrvfHandler::<Ring1>::with_config(Config {
            verify_checksum: false,
            ..Config::default()
        });
        let mut bytes = encoded(&handler, &[Ring1::TRUE, Ring1::FALSE, Ring1::TRUE]);
        bytes[8 + 3 + 8 + 1] = 2;
        assert!(matches!(
            handler.load_from_bytes(&bytes),
            Err(Error::InvalidElement { index: 1 })
        ));
    }

    #[test]
    fn invalid_bits_are_not_saved() {
        let handler = MrvfHandler::<Ring1>::new();
        let mut bits = RVector::filled(3, Ring1::TRUE).unwrap();
        bytemuck::cast_slice_mut::<Ring1, u8>(bits.as_mut_slice())[1] = 2;
        let mut bytes = Vec::new();
        assert!(matches!(
            handler.save(&mut bytes, &mut bits),
            Err(Error::InvalidElement { index: 1 })
        ));
        assert!(bytes.is_empty());
        assert!(!bits.is_checked_out());
    }

    #[test]
    fn bits_written_through_a_lease_round_trip() {
        let handler = MrvfHandler::<Ring1>::new();
        let mut bits = RVector::filled(3, Ring1::TRUE).unwrap();
        let mut lease = bits.check_out().unwrap();
        lease.as_bytes_mut()[1] = 2;
        bits.check_in(lease).unwrap();
        let bytes = encoded_vector(&handler, &mut bits);
        let loaded = handler.load_from_bytes(&bytes).unwrap();
        assert_eq!(loaded.as_slice(), &[Ring1::TRUE, Ring1::FALSE, Ring1::TRUE]);
        assert_eq!(loaded, bits);
    }

    #[test]
    fn skipping_verification_accepts_wrong_checksum() {
        let mut bytes = encoded(&MrvfHandler::new(), &[Ring16(5)]);
        bytes[8 + 3 + 8] ^= 0x10;
        let strict = MrvfHandler::<Ring16>::new();
        assert!(matches!(
            strict.load_from_bytes(&bytes),
            Err(Error::Crc64CheckFailed { .. })
        ));
        let lax = MrvfHandler::<Ring16>::with_config(Config {
            verify_checksum: false,
            ..Config::default()
        });
        assert_eq!(lax.load_from_bytes(&bytes).unwrap().as_slice(), &[Ring16(0x15)]);
    }

    #[test]
    fn length_is_checked_before_loading() {
        let handler = MrvfHandler::<Ring16>::new();
        let mut bytes = encoded(&handler, &[Ring16(1), Ring16(2)]);
        bytes.push(0);
        assert!(matches!(
            handler.load_from_bytes(&bytes),
            Err(Error::LengthMismatch {
                expected: 39,
                actual: 40
            })
        ));
        assert!(matches!(
            handler.load_from_bytes(&bytes[..20]),
            Err(Error::TooShort { len: 20 })
        ));
        // streaming loads stop at the tail marker
        assert_eq!(handler.load(&bytes[..]).unwrap().len(), 2);
    }

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert!(config.verify_checksum);
        assert!(!config.use_memory_map);
        assert_eq!(config.crc, CrcStandard::Ecma182);
        assert_eq!(config.version, Version::V2);
    }
}
