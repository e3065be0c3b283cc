//! Entry files: header, payload and codec handling

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};
use omx_core::{Codec, CoreError, EntryHeader};

use super::durable::AtomicFile;
use crate::error::{Error, Result};

/// Handle to one entry file on disk
#[derive(Debug, Clone)]
pub struct EntryFile {
    path: PathBuf,
    header: EntryHeader,
}

impl EntryFile {
    /// Open an existing entry, validating its header against the file size
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let header = read_header(&mut file)?;

        let stored_end = header
            .payload_offset
            .checked_add(header.payload_size)
            .ok_or(Error::Core(CoreError::ArraySizeOverflow))?;
        if file.metadata()?.len() < stored_end {
            return Err(Error::Core(CoreError::CorruptedData));
        }

        Ok(Self { path, header })
    }

    /// Read only the header of an entry
    pub fn read_header<P: AsRef<Path>>(path: P) -> Result<EntryHeader> {
        let mut file = File::open(path)?;
        read_header(&mut file)
    }

    /// Write a complete entry, replacing any previous file at `path`
    ///
    /// `payload` is the decoded payload; it is compressed when `codec` asks for it.
    pub fn write<P: AsRef<Path>>(
        path: P,
        mut header: EntryHeader,
        payload: &[u8],
        codec: Codec,
        level: i32,
    ) -> Result<Self> {
        if payload.len() as u64 != header.decoded_size {
            return Err(Error::Core(CoreError::CorruptedData));
        }

        let stored: Cow<'_, [u8]> = match codec {
            Codec::None => Cow::Borrowed(payload),
            Codec::Zstd => Cow::Owned(zstd::encode_all(payload, level)?),
        };
        header.set_payload(codec, level, stored.len() as u64);

        let path = path.as_ref().to_path_buf();
        let mut file = AtomicFile::create(&path)?;
        file.write_all(&header.to_bytes())?;
        file.write_all(&stored)?;
        file.commit()?;

        Ok(Self { path, header })
    }

    /// Write an entry whose payload is all zeros
    pub fn write_zeroed<P: AsRef<Path>>(
        path: P,
        mut header: EntryHeader,
        codec: Codec,
        level: i32,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = AtomicFile::create(&path)?;

        match codec {
            Codec::None => {
                header.set_payload(codec, level, header.decoded_size);
                file.write_all(&header.to_bytes())?;
                // Sparse extension; the filesystem supplies the zeros
                file.set_len(header.payload_offset + header.decoded_size)?;
            }
            Codec::Zstd => {
                let zeros = io::repeat(0).take(header.decoded_size);
                let stored = zstd::encode_all(zeros, level)?;
                header.set_payload(codec, level, stored.len() as u64);
                file.write_all(&header.to_bytes())?;
                file.write_all(&stored)?;
            }
        }
        file.commit()?;

        Ok(Self { path, header })
    }

    pub fn header(&self) -> &EntryHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decoded payload bytes
    pub fn read_payload(&self) -> Result<Payload> {
        let header = &self.header;
        if header.decoded_size == 0 {
            return Ok(Payload::Decoded(Vec::new()));
        }
        let stored_len = usize::try_from(header.payload_size)
            .map_err(|_| Error::Core(CoreError::ArraySizeOverflow))?;

        let file = File::open(&self.path)?;
        // SAFETY: read-only mapping; the range was checked against the file
        // size on open and entries are only ever replaced by rename, which
        // leaves this inode intact
        let map = unsafe {
            MmapOptions::new()
                .offset(header.payload_offset)
                .len(stored_len)
                .map(&file)?
        };

        match header.codec {
            Codec::None => Ok(Payload::Mapped(map)),
            Codec::Zstd => {
                let decoded = zstd::decode_all(&map[..])?;
                if decoded.len() as u64 != header.decoded_size {
                    return Err(Error::Core(CoreError::CorruptedData));
                }
                Ok(Payload::Decoded(decoded))
            }
        }
    }

    /// Open the payload for in-place updates
    ///
    /// Uncompressed entries are mapped writable; compressed entries are
    /// decoded into memory and rewritten whole on every flush.
    pub fn writer(&self) -> Result<EntryWriter> {
        match self.header.codec {
            Codec::None => {
                let len = usize::try_from(self.header.decoded_size)
                    .map_err(|_| Error::Core(CoreError::ArraySizeOverflow))?;
                let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
                // SAFETY: single writer per container; the mapped range lies
                // inside the file as validated on open
                let map = unsafe {
                    MmapOptions::new()
                        .offset(self.header.payload_offset)
                        .len(len)
                        .map_mut(&file)?
                };
                Ok(EntryWriter::Mapped {
                    map,
                    header: self.header,
                })
            }
            Codec::Zstd => {
                let payload = self.read_payload()?.to_vec();
                Ok(EntryWriter::Buffered {
                    path: self.path.clone(),
                    header: self.header,
                    payload,
                })
            }
        }
    }
}

fn read_header(file: &mut File) -> Result<EntryHeader> {
    let mut bytes = [0u8; EntryHeader::SIZE];
    file.read_exact(&mut bytes).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Core(CoreError::InsufficientBuffer),
        _ => Error::Io(e),
    })?;
    EntryHeader::from_bytes(&bytes).map_err(Error::Core)
}

/// Decoded payload, mapped when stored uncompressed
pub enum Payload {
    Mapped(Mmap),
    Decoded(Vec<u8>),
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Payload::Mapped(map) => &map[..],
            Payload::Decoded(bytes) => &bytes[..],
        }
    }
}

/// In-place access to an entry payload
pub enum EntryWriter {
    Mapped {
        map: MmapMut,
        header: EntryHeader,
    },
    Buffered {
        path: PathBuf,
        header: EntryHeader,
        payload: Vec<u8>,
    },
}

impl EntryWriter {
    pub fn header(&self) -> &EntryHeader {
        match self {
            EntryWriter::Mapped { header, .. } | EntryWriter::Buffered { header, .. } => header,
        }
    }

    /// Whether writes reach the file before `flush`
    pub fn is_mapped(&self) -> bool {
        matches!(self, EntryWriter::Mapped { .. })
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            EntryWriter::Mapped { map, .. } => &map[..],
            EntryWriter::Buffered { payload, .. } => &payload[..],
        }
    }

    /// Decoded payload bytes, writable
    pub fn payload_mut(&mut self) -> &mut [u8] {
        match self {
            EntryWriter::Mapped { map, .. } => &mut map[..],
            EntryWriter::Buffered { payload, .. } => &mut payload[..],
        }
    }

    /// Make every change so far durable, returning the entry's header
    pub fn flush(&mut self) -> Result<EntryHeader> {
        match self {
            EntryWriter::Mapped { map, header } => {
                map.flush()?;
                Ok(*header)
            }
            EntryWriter::Buffered {
                path,
                header,
                payload,
            } => {
                let mut next = *header;
                next.generation = next.generation.wrapping_add(1);
                let level = next.level;
                let written = EntryFile::write(&*path, next, &payload[..], Codec::Zstd, level)?;
                *header = *written.header();
                Ok(*header)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omx_core::{DataType, EntryKind};
    use tempfile::tempdir;

    fn matrix_header(dims: &[u64]) -> EntryHeader {
        EntryHeader::new(EntryKind::Matrix, DataType::U32, dims).unwrap()
    }

    #[test]
    fn test_write_and_read_uncompressed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.omxm");
        let values = [1u32, 2, 3, 4, 5, 6];

        EntryFile::write(&path, matrix_header(&[2, 3]), bytemuck::cast_slice(&values), Codec::None, 5)
            .unwrap();

        let entry = EntryFile::open(&path).unwrap();
        assert_eq!(entry.header().codec, Codec::None);
        assert_eq!(entry.header().level, 0);
        let payload = entry.read_payload().unwrap();
        assert!(matches!(payload, Payload::Mapped(_)));
        assert_eq!(&payload[..], bytemuck::cast_slice::<u32, u8>(&values));
    }

    #[test]
    fn test_zstd_payload_is_compressed_and_restored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.omxm");
        let values = vec![7u32; 4096];

        let written = EntryFile::write(
            &path,
            matrix_header(&[64, 64]),
            bytemuck::cast_slice(&values),
            Codec::Zstd,
            5,
        )
        .unwrap();
        assert!(written.header().payload_size < written.header().decoded_size);

        let payload = EntryFile::open(&path).unwrap().read_payload().unwrap();
        assert_eq!(&payload[..], bytemuck::cast_slice::<u32, u8>(&values));
    }

    #[test]
    fn test_zeroed_entries() {
        let dir = tempdir().unwrap();
        for codec in [Codec::None, Codec::Zstd] {
            let path = dir.path().join(format!("{codec}.omxm"));
            EntryFile::write_zeroed(&path, matrix_header(&[3, 5]), codec, 3).unwrap();

            let payload = EntryFile::open(&path).unwrap().read_payload().unwrap();
            assert_eq!(payload.len(), 3 * 5 * 4);
            assert!(payload.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_writer_updates_in_place() {
        let dir = tempdir().unwrap();
        for codec in [Codec::None, Codec::Zstd] {
            let path = dir.path().join(format!("w-{codec}.omxm"));
            let entry = EntryFile::write_zeroed(&path, matrix_header(&[2, 2]), codec, 3).unwrap();

            let mut writer = entry.writer().unwrap();
            writer.payload_mut()[4..8].copy_from_slice(&9u32.to_ne_bytes());
            writer.flush().unwrap();

            let payload = EntryFile::open(&path).unwrap().read_payload().unwrap();
            assert_eq!(bytemuck::pod_collect_to_vec::<u8, u32>(&payload), vec![0, 9, 0, 0]);
        }
    }

    #[test]
    fn test_truncated_entry_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.omxm");
        EntryFile::write_zeroed(&path, matrix_header(&[4, 4]), Codec::None, 0).unwrap();

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(EntryHeader::SIZE as u64 + 10).unwrap();

        assert!(matches!(
            EntryFile::open(&path),
            Err(Error::Core(CoreError::CorruptedData))
        ));
    }

    #[test]
    fn test_payload_size_must_match_header() {
        let dir = tempdir().unwrap();
        let result = EntryFile::write(
            dir.path().join("m.omxm"),
            matrix_header(&[2, 2]),
            &[0u8; 3],
            Codec::None,
            0,
        );
        assert!(matches!(result, Err(Error::Core(CoreError::CorruptedData))));
    }
}
