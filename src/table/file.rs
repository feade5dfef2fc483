//! File-backed ReadWriter
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                         │
//! │   Magic: "UNTB" (4) | Version: u16 (2)                   │
//! ├──────────────────────────────────────────────────────────┤
//! │ Meta Section                                             │
//! │   [Len: u32][bincode TableMeta]                          │
//! ├──────────────────────────────────────────────────────────┤
//! │ Directory Section                                        │
//! │   [Len: u32][bincode Vec<ColumnEntry>]                   │
//! ├──────────────────────────────────────────────────────────┤
//! │ Column Sections, one per field                           │
//! │   [bincode Vec<(key, value)>] ...                        │
//! ├──────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                         │
//! │   CRC32 over meta and directory sections                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! Each directory entry locates one column section and carries its own
//! CRC32, so a scan reads and verifies only the columns it needs.
//!
//! Tables are written to `NAME.tbl.tmp` and renamed into place. The
//! tombstone of a table lives next to it in `NAME.tomb` and is replaced
//! the same way; the data file is never rewritten.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::{ReadWriter, TableMeta};
use crate::area::AreaSet;
use crate::error::{Result, StoreError};
use crate::range::RangeSet;
use crate::scanner::{column_from_vec, TableScan};
use crate::shared::Shared;
use crate::types::{Key, Value};

// =============================================================================
// Format Constants
// =============================================================================

const MAGIC: &[u8; 4] = b"UNTB";
const VERSION: u16 = 2;
const HEADER_SIZE: usize = 6;
const FOOTER_SIZE: i64 = 4;

const DATA_EXT: &str = "tbl";
const TOMBSTONE_EXT: &str = "tomb";
const TMP_SUFFIX: &str = ".tmp";

type StoredColumns = Vec<(String, Vec<(Key, Value)>)>;

/// Location of one column section, relative to the end of the directory
#[derive(Debug, Serialize, Deserialize)]
struct ColumnEntry {
    field: String,
    offset: u64,
    len: u32,
    crc: u32,
}

/// Everything in front of the column sections
struct TableIndex {
    meta: TableMeta,
    columns: Vec<ColumnEntry>,
    data_start: u64,
}

pub struct FileReadWriter {
    dir: PathBuf,
    shared: Arc<Shared>,
    /// Serializes read-modify-write of tombstone files
    tombstone_lock: Mutex<()>,
}

impl FileReadWriter {
    pub fn open(dir: impl AsRef<Path>, shared: Arc<Shared>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            shared,
            tombstone_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Writing
    // =========================================================================

    fn write_table(&self, path: &Path, meta: &TableMeta, columns: &StoredColumns) -> Result<()> {
        let meta_bytes = bincode::serialize(meta)?;

        let mut blocks = Vec::with_capacity(columns.len());
        let mut directory = Vec::with_capacity(columns.len());
        let mut offset = 0u64;
        for (field, cells) in columns {
            let bytes = bincode::serialize(cells)?;
            let len = section_len(&bytes)?;
            directory.push(ColumnEntry {
                field: field.clone(),
                offset,
                len,
                crc: crc32fast::hash(&bytes),
            });
            offset += u64::from(len);
            blocks.push(bytes);
        }
        let directory_bytes = bincode::serialize(&directory)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&meta_bytes);
        hasher.update(&directory_bytes);
        let crc = hasher.finalize();

        write_atomic(path, |writer| {
            writer.write_all(MAGIC)?;
            writer.write_all(&VERSION.to_le_bytes())?;
            write_section(writer, &meta_bytes)?;
            write_section(writer, &directory_bytes)?;
            for block in &blocks {
                writer.write_all(block)?;
            }
            writer.write_all(&crc.to_le_bytes())
        })
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Meta and directory, checksum verified. Leaves the reader somewhere
    /// past the directory.
    fn read_index<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<TableIndex> {
        read_header(reader, path)?;
        let meta_bytes = read_section(reader, path)?;
        let directory_bytes = read_section(reader, path)?;
        let data_start = reader.stream_position()?;

        reader.seek(SeekFrom::End(-FOOTER_SIZE))?;
        let mut footer = [0u8; 4];
        reader.read_exact(&mut footer)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&meta_bytes);
        hasher.update(&directory_bytes);
        if hasher.finalize() != u32::from_le_bytes(footer) {
            return Err(StoreError::Integrity(format!(
                "checksum mismatch in index of {}",
                path.display()
            )));
        }

        Ok(TableIndex {
            meta: bincode::deserialize(&meta_bytes)?,
            columns: bincode::deserialize(&directory_bytes)?,
            data_start,
        })
    }

    fn read_column<R: Read + Seek>(
        reader: &mut R,
        path: &Path,
        index: &TableIndex,
        entry: &ColumnEntry,
    ) -> Result<Vec<(Key, Value)>> {
        reader.seek(SeekFrom::Start(index.data_start + entry.offset))?;
        let bytes = read_exact_len(reader, entry.len, path)?;
        if crc32fast::hash(&bytes) != entry.crc {
            return Err(StoreError::Integrity(format!(
                "checksum mismatch in column {} of {}",
                entry.field,
                path.display()
            )));
        }
        Ok(bincode::deserialize(&bytes)?)
    }

    fn read_tombstone(path: &Path) -> Result<AreaSet> {
        match fs::read(path) {
            Ok(bytes) => Ok(bincode::deserialize(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(AreaSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn data_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", table, DATA_EXT))
    }

    fn tombstone_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", table, TOMBSTONE_EXT))
    }

    fn check_name(table: &str) -> Result<()> {
        if table.is_empty() || table.contains(['/', '\\', '.']) {
            return Err(StoreError::InvalidArgument(format!(
                "invalid table name: {:?}",
                table
            )));
        }
        Ok(())
    }
}

impl ReadWriter for FileReadWriter {
    fn name(&self) -> &str {
        "file"
    }

    fn flush(&self, table: &str, meta: &TableMeta, data: TableScan) -> Result<()> {
        Self::check_name(table)?;
        let mut columns = StoredColumns::with_capacity(data.len());
        for (field, scanner) in data {
            let cells = scanner.collect::<Result<Vec<_>>>()?;
            verify_column(table, meta, &field, &cells)?;
            columns.push((field, cells));
        }
        if let Some(missing) = meta
            .counts
            .iter()
            .find(|(field, count)| **count > 0 && !columns.iter().any(|(f, _)| f == *field))
        {
            return Err(StoreError::Integrity(format!(
                "table {} declares field {} but holds no data for it",
                table, missing.0
            )));
        }

        let mut stored_meta = meta.clone();
        stored_meta.tombstone = AreaSet::new();

        let path = self.data_path(table);
        self.write_table(&path, &stored_meta, &columns)?;
        remove_if_exists(&self.tombstone_path(table))?;
        self.shared.cache().refresh(&path, stored_meta);

        debug!(table, fields = columns.len(), "Table written");
        Ok(())
    }

    fn read_meta(&self, table: &str) -> Result<Arc<TableMeta>> {
        let path = self.data_path(table);
        self.shared.cache().get_or_load(&path, || {
            let mut reader = BufReader::new(File::open(&path)?);
            let mut meta = Self::read_index(&mut reader, &path)?.meta;
            meta.tombstone = Self::read_tombstone(&self.tombstone_path(table))?;
            Ok(meta)
        })
    }

    /// Only sections of requested fields whose span meets `ranges` are read
    fn scan_data(
        &self,
        table: &str,
        fields: &BTreeSet<String>,
        ranges: &RangeSet,
    ) -> Result<TableScan> {
        let path = self.data_path(table);
        let mut reader = BufReader::new(File::open(&path)?);
        let index = Self::read_index(&mut reader, &path)?;

        let mut scan = TableScan::new();
        for entry in &index.columns {
            let wanted = fields.contains(&entry.field)
                && index
                    .meta
                    .ranges
                    .get(&entry.field)
                    .is_some_and(|span| ranges.intersects(span));
            if !wanted {
                continue;
            }
            let cells = Self::read_column(&mut reader, &path, &index, entry)?
                .into_iter()
                .filter(|(key, _)| ranges.contains(*key))
                .collect();
            scan.insert(entry.field.clone(), column_from_vec(cells));
        }
        trace!(table, read = scan.len(), stored = index.columns.len(), "Columns read");
        Ok(scan)
    }

    fn delete(&self, table: &str, areas: &AreaSet) -> Result<()> {
        if areas.is_empty() {
            return Ok(());
        }
        let _guard = self.tombstone_lock.lock();
        let meta = self.read_meta(table)?.with_tombstone(areas);

        let bytes = bincode::serialize(&meta.tombstone)?;
        write_atomic(&self.tombstone_path(table), |writer| writer.write_all(&bytes))?;
        self.shared.cache().refresh(&self.data_path(table), meta);

        debug!(table, "Tombstone persisted");
        Ok(())
    }

    fn delete_table(&self, table: &str) -> Result<()> {
        let path = self.data_path(table);
        remove_if_exists(&path)?;
        remove_if_exists(&self.tombstone_path(table))?;
        self.shared.cache().invalidate(&path);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for table in self.table_names()? {
            self.delete_table(&table)?;
        }
        Ok(())
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(DATA_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn reload(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_tmp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TMP_SUFFIX));
            if is_tmp {
                info!(path = %path.display(), "Removing leftover temporary file");
                fs::remove_file(&path)?;
            }
        }
        for table in self.table_names()? {
            self.shared.cache().invalidate(&self.data_path(&table));
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Declared metadata must describe the data exactly
fn verify_column(table: &str, meta: &TableMeta, field: &str, cells: &[(Key, Value)]) -> Result<()> {
    let integrity = |what: String| {
        Err(StoreError::Integrity(format!(
            "table {} field {}: {}",
            table, field, what
        )))
    };

    let Some(&data_type) = meta.schema.get(field) else {
        return integrity("not declared in schema".to_string());
    };
    if let Some((key, value)) = cells.iter().find(|(_, v)| v.data_type() != data_type) {
        return integrity(format!(
            "cell at {} is {}, declared {}",
            key,
            value.data_type(),
            data_type
        ));
    }
    if cells.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
        return integrity("keys not strictly ascending".to_string());
    }
    let declared_count = meta.counts.get(field).copied().unwrap_or(0);
    if declared_count != cells.len() as u64 {
        return integrity(format!(
            "declared {} cells, holds {}",
            declared_count,
            cells.len()
        ));
    }
    let actual = cells
        .first()
        .zip(cells.last())
        .map(|((start, _), (end, _))| (*start, *end));
    let declared = meta.ranges.get(field).map(|r| (r.start, r.end));
    if actual != declared {
        return integrity(format!(
            "declared key span {:?}, holds {:?}",
            declared, actual
        ));
    }
    Ok(())
}

fn section_len(bytes: &[u8]) -> io::Result<u32> {
    u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "section exceeds 4 GiB"))
}

fn write_section(writer: &mut impl Write, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(&section_len(bytes)?.to_le_bytes())?;
    writer.write_all(bytes)
}

fn read_header(reader: &mut impl Read, path: &Path) -> Result<()> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;
    if &header[0..4] != MAGIC {
        return Err(StoreError::Integrity(format!(
            "invalid table magic in {}: {:?}",
            path.display(),
            &header[0..4]
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(StoreError::Integrity(format!(
            "unsupported table version {} in {}",
            version,
            path.display()
        )));
    }
    Ok(())
}

fn read_section(reader: &mut impl Read, path: &Path) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    read_exact_len(reader, u32::from_le_bytes(len), path)
}

/// Read `len` bytes without trusting `len` for the allocation
fn read_exact_len(reader: &mut impl Read, len: u32, path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.by_ref().take(u64::from(len)).read_to_end(&mut bytes)?;
    if bytes.len() != len as usize {
        return Err(StoreError::Integrity(format!(
            "truncated section in {}",
            path.display()
        )));
    }
    Ok(bytes)
}

/// Write to `path.tmp`, sync, then rename over `path`
fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    let mut writer = BufWriter::new(file);
    let written = write(&mut writer).and_then(|_| writer.flush());
    if let Err(e) = written {
        drop(writer);
        if let Err(cleanup) = fs::remove_file(&tmp) {
            warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temporary file");
        }
        return Err(e.into());
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
