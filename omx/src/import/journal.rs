//! Undo journal for chunked imports
//!
//! Before a chunk touches any destination, the bytes it is about to
//! overwrite are saved to `import.journal` in the container root. The
//! journal is removed once every destination and the root attributes are
//! durable. A journal found on open belongs to a chunk that never
//! completed; putting its bytes back rolls that chunk back.
//!
//! Layout: `[magic "OMXJ"][body length u64][crc32 u32][body]`, with the body
//!
//! ```text
//! chunk u64 | cell count u64 | cells u64... | destination count u32 |
//!   per destination: name length u16 | name | element size u8 | bytes
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use omx_core::{CoreError, EntryKind};
use tracing::warn;

use crate::container::entry_path_in;
use crate::error::{Error, Result};
use crate::storage::{self, EntryFile};

pub(crate) const JOURNAL_FILE: &str = "import.journal";
const JOURNAL_MAGIC: [u8; 4] = *b"OMXJ";

/// Bytes of one destination that a chunk overwrites
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Preimage {
    pub(crate) matrix: String,
    pub(crate) element_size: usize,
    pub(crate) bytes: Vec<u8>,
}

impl Preimage {
    /// Copy the current value of every cell in `cells`
    pub(crate) fn capture(
        matrix: &str,
        payload: &[u8],
        cells: &[usize],
        element_size: usize,
    ) -> Result<Self> {
        let mut bytes = Vec::with_capacity(cells.len() * element_size);
        for &cell in cells {
            let range = cell_range(payload.len(), cell, element_size)?;
            bytes.extend_from_slice(&payload[range]);
        }
        Ok(Self {
            matrix: matrix.to_string(),
            element_size,
            bytes,
        })
    }

    /// Write the saved values back into `payload`
    pub(crate) fn restore(&self, payload: &mut [u8], cells: &[usize]) -> Result<()> {
        let size = self.element_size;
        if self.bytes.len() != cells.len() * size {
            return Err(Error::Core(CoreError::CorruptedData));
        }
        for (&cell, saved) in cells.iter().zip(self.bytes.chunks_exact(size)) {
            let range = cell_range(payload.len(), cell, size)?;
            payload[range].copy_from_slice(saved);
        }
        Ok(())
    }
}

fn cell_range(len: usize, cell: usize, size: usize) -> Result<std::ops::Range<usize>> {
    let start = cell
        .checked_mul(size)
        .ok_or(Error::Core(CoreError::ArraySizeOverflow))?;
    let end = start + size;
    if end > len {
        return Err(Error::Core(CoreError::CorruptedData));
    }
    Ok(start..end)
}

/// Everything needed to undo one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkJournal {
    pub(crate) chunk: u64,
    pub(crate) cells: Vec<usize>,
    pub(crate) preimages: Vec<Preimage>,
}

impl ChunkJournal {
    /// Persist the journal; destinations may be written only after this returns
    pub(crate) fn write(&self, root: &Path) -> Result<()> {
        storage::write_atomic(&journal_path(root), &self.encode())?;
        Ok(())
    }

    /// The journal left in `root`, if any
    pub(crate) fn read(root: &Path) -> Result<Option<Self>> {
        match fs::read(journal_path(root)) {
            Ok(bytes) => Self::decode(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.chunk.to_le_bytes());
        body.extend_from_slice(&(self.cells.len() as u64).to_le_bytes());
        for &cell in &self.cells {
            body.extend_from_slice(&(cell as u64).to_le_bytes());
        }
        body.extend_from_slice(&(self.preimages.len() as u32).to_le_bytes());
        for preimage in &self.preimages {
            // Entry names are at most 255 bytes
            let name = preimage.matrix.as_bytes();
            body.extend_from_slice(&(name.len() as u16).to_le_bytes());
            body.extend_from_slice(name);
            body.push(preimage.element_size as u8);
            body.extend_from_slice(&preimage.bytes);
        }

        let mut out = Vec::with_capacity(body.len() + 16);
        out.extend_from_slice(&JOURNAL_MAGIC);
        out.extend_from_slice(&(body.len() as u64).to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut frame = Reader::new(bytes);
        if frame.take(4)? != JOURNAL_MAGIC.as_slice() {
            return Err(Error::Core(CoreError::InvalidHeader));
        }
        let len = frame.u64()?;
        let checksum = frame.u32()?;
        let body = frame.rest();
        if body.len() as u64 != len || crc32fast::hash(body) != checksum {
            return Err(Error::Core(CoreError::CorruptedData));
        }

        let mut body = Reader::new(body);
        let chunk = body.u64()?;
        let count = body.usize()?;
        let cells = (0..count)
            .map(|_| body.usize())
            .collect::<Result<Vec<_>>>()?;

        let destinations = body.u32()?;
        let mut preimages = Vec::with_capacity(destinations as usize);
        for _ in 0..destinations {
            let name_len = body.u16()? as usize;
            let matrix = std::str::from_utf8(body.take(name_len)?)
                .map_err(|_| Error::Core(CoreError::CorruptedData))?
                .to_string();
            let element_size = body.take(1)?[0] as usize;
            let byte_len = count
                .checked_mul(element_size)
                .ok_or(Error::Core(CoreError::ArraySizeOverflow))?;
            preimages.push(Preimage {
                matrix,
                element_size,
                bytes: body.take(byte_len)?.to_vec(),
            });
        }

        Ok(Self {
            chunk,
            cells,
            preimages,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(Error::Core(CoreError::InsufficientBuffer))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }

    fn u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn usize(&mut self) -> Result<usize> {
        usize::try_from(self.u64()?).map_err(|_| Error::Core(CoreError::ArraySizeOverflow))
    }
}

fn journal_path(root: &Path) -> PathBuf {
    root.join(JOURNAL_FILE)
}

/// Whether an unfinished chunk is recorded in `root`
pub(crate) fn pending(root: &Path) -> bool {
    journal_path(root).is_file()
}

/// Remove the journal, making the chunk it guards permanent
pub(crate) fn clear(root: &Path) -> Result<()> {
    match fs::remove_file(journal_path(root)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    storage::sync_dir(root)?;
    Ok(())
}

/// Roll back the chunk an interrupted import left unfinished
///
/// Returns whether a journal was found.
pub(crate) fn recover(root: &Path) -> Result<bool> {
    let Some(journal) = ChunkJournal::read(root)? else {
        return Ok(false);
    };

    for preimage in &journal.preimages {
        let entry = EntryFile::open(entry_path_in(root, EntryKind::Matrix, &preimage.matrix))?;
        let mut writer = entry.writer()?;
        preimage.restore(writer.payload_mut(), &journal.cells)?;
        writer.flush()?;
    }
    clear(root)?;

    warn!(
        chunk = journal.chunk,
        destinations = journal.preimages.len(),
        "rolled back unfinished import chunk"
    );
    Ok(true)
}
