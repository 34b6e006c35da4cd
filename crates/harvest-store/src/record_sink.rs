use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use harvest_core::models::{AppendOutcome, Identity, Record};
use harvest_core::traits::RecordSink;
use harvest_core::AppError;

use crate::row::{COLUMNS, RecordRow, is_record_header};

/// Record sink backed by an append-only CSV row store and a JSON snapshot
/// rebuilt from it.
///
/// Appends from one process are serialised by an in-process mutex; appends
/// from other processes are serialised by an exclusive lock on the row
/// store. The identity index is rebuilt whenever the row store's length
/// differs from the length it was last scanned at.
#[derive(Clone)]
pub struct CsvRecordSink {
    inner: Arc<Inner>,
}

struct Inner {
    rows_path: PathBuf,
    snapshot_path: PathBuf,
    index: Mutex<RowIndex>,
}

#[derive(Default)]
struct RowIndex {
    identities: HashSet<Identity>,
    /// Header of the row store, `None` while it is empty.
    header: Option<csv::StringRecord>,
    /// Length of the complete rows the identity set reflects. A torn tail
    /// is never counted, so the next append rescans and repairs it.
    scanned_len: Option<u64>,
}

impl RowIndex {
    fn rescan(&mut self, complete: &[u8]) {
        self.identities = scan_identities(complete);
        self.header = read_header(complete);
        self.scanned_len = Some(complete.len() as u64);
    }
}

impl CsvRecordSink {
    pub fn new(rows_path: impl Into<PathBuf>, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                rows_path: rows_path.into(),
                snapshot_path: snapshot_path.into(),
                index: Mutex::new(RowIndex::default()),
            }),
        }
    }

    pub fn rows_path(&self) -> &Path {
        &self.inner.rows_path
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.inner.snapshot_path
    }

    /// Identities in the row store, rescanning if another writer touched it.
    pub async fn identities(&self) -> Result<HashSet<Identity>, AppError> {
        let mut index = self.inner.index.lock().await;
        let path = self.inner.rows_path.clone();
        let mut state = std::mem::take(&mut *index);
        let (state, result) = run_blocking(move || {
            let result = refresh_shared(&path, &mut state);
            (state, result)
        })
        .await?;
        *index = state;
        result?;
        Ok(index.identities.clone())
    }

    pub async fn contains(&self, identity: &Identity) -> Result<bool, AppError> {
        Ok(self.identities().await?.contains(identity))
    }

    /// Append one row, unless its identity is already stored.
    ///
    /// The existence check and the write happen under the same exclusive
    /// file lock, so two writers can never both store the same identity.
    pub async fn append(&self, record: &Record) -> Result<AppendOutcome, AppError> {
        let mut index = self.inner.index.lock().await;
        let path = self.inner.rows_path.clone();
        let identity = record.identity.clone();
        let row = RecordRow::from(record);
        let mut state = std::mem::take(&mut *index);
        let (state, result) = run_blocking(move || {
            let result = append_locked(&path, &mut state, &identity, row);
            (state, result)
        })
        .await?;
        *index = state;
        result
    }

    /// Every successful row in the row store, first occurrence per identity.
    pub async fn read_all(&self) -> Result<Vec<Record>, AppError> {
        let _index = self.inner.index.lock().await;
        let path = self.inner.rows_path.clone();
        run_blocking(move || read_records(&path)).await?
    }

    /// Rebuild the snapshot from the row store. Returns the record count.
    pub async fn snapshot(&self) -> Result<usize, AppError> {
        let _index = self.inner.index.lock().await;
        let rows = self.inner.rows_path.clone();
        let snapshot = self.inner.snapshot_path.clone();
        run_blocking(move || {
            let records = read_records(&rows)?;
            write_snapshot(&snapshot, &records)?;
            tracing::debug!(
                path = %snapshot.display(),
                records = records.len(),
                "Snapshot written"
            );
            Ok(records.len())
        })
        .await?
    }

    /// Records in the current snapshot. A missing snapshot reads as empty.
    pub async fn read_snapshot(&self) -> Result<Vec<Record>, AppError> {
        let path = self.inner.snapshot_path.clone();
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(sink_error(&path, e)),
        }
    }
}

// -- Trait implementation --

impl RecordSink for CsvRecordSink {
    async fn identities(&self) -> Result<HashSet<Identity>, AppError> {
        self.identities().await
    }

    async fn contains(&self, identity: &Identity) -> Result<bool, AppError> {
        self.contains(identity).await
    }

    async fn append(&self, record: &Record) -> Result<AppendOutcome, AppError> {
        self.append(record).await
    }

    async fn snapshot(&self) -> Result<usize, AppError> {
        self.snapshot().await
    }
}

// -- Blocking file work --

async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::SinkError(format!("file task failed: {e}")))
}

fn sink_error(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::SinkError(format!("{}: {e}", path.display()))
}

fn append_locked(
    path: &Path,
    index: &mut RowIndex,
    identity: &Identity,
    row: RecordRow,
) -> Result<AppendOutcome, AppError> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| sink_error(path, e))?;
    file.lock().map_err(|e| sink_error(path, e))?;

    let result = (|| -> Result<AppendOutcome, AppError> {
        let len = file.metadata().map_err(|e| sink_error(path, e))?.len();
        if index.scanned_len != Some(len) {
            let bytes = read_from_start(&mut file).map_err(|e| sink_error(path, e))?;
            let complete = complete_prefix(&bytes);
            if complete < bytes.len() {
                tracing::warn!(
                    path = %path.display(),
                    dropped = bytes.len() - complete,
                    "Truncating partially written row"
                );
                file.set_len(complete as u64)
                    .map_err(|e| sink_error(path, e))?;
            }
            index.rescan(&bytes[..complete]);
        }

        if index.identities.contains(identity) {
            return Ok(AppendOutcome::AlreadyExists);
        }

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut file);
            match &index.header {
                None => {
                    writer.write_record(COLUMNS).map_err(|e| sink_error(path, e))?;
                    writer.serialize(&row).map_err(|e| sink_error(path, e))?;
                }
                Some(header) if header.iter().eq(COLUMNS) => {
                    writer.serialize(&row).map_err(|e| sink_error(path, e))?;
                }
                Some(header) if is_record_header(header) => {
                    let cells = row.cells_for(header).map_err(|e| sink_error(path, e))?;
                    writer.write_record(&cells).map_err(|e| sink_error(path, e))?;
                }
                Some(header) => {
                    let columns = header.iter().collect::<Vec<_>>().join(",");
                    return Err(sink_error(
                        path,
                        format!("not a product row store (columns: {columns})"),
                    ));
                }
            }
            writer.flush().map_err(|e| sink_error(path, e))?;
        }
        file.sync_data().map_err(|e| sink_error(path, e))?;

        index
            .header
            .get_or_insert_with(|| csv::StringRecord::from(COLUMNS.to_vec()));
        index.identities.insert(identity.clone());
        index.scanned_len = Some(file.metadata().map_err(|e| sink_error(path, e))?.len());
        Ok(AppendOutcome::Written)
    })();

    if let Err(e) = file.unlock() {
        tracing::warn!(path = %path.display(), error = %e, "Failed to release row store lock");
    }
    result
}

/// Rescan under a shared lock if the row store changed size.
fn refresh_shared(path: &Path, index: &mut RowIndex) -> Result<(), AppError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            index.rescan(&[]);
            return Ok(());
        }
        Err(e) => return Err(sink_error(path, e)),
    };
    file.lock_shared().map_err(|e| sink_error(path, e))?;

    let result = (|| -> Result<(), AppError> {
        let len = file.metadata().map_err(|e| sink_error(path, e))?.len();
        if index.scanned_len != Some(len) {
            let bytes = read_from_start(&mut file).map_err(|e| sink_error(path, e))?;
            index.rescan(&bytes[..complete_prefix(&bytes)]);
        }
        Ok(())
    })();

    if let Err(e) = file.unlock() {
        tracing::warn!(path = %path.display(), error = %e, "Failed to release row store lock");
    }
    result
}

fn read_from_start(file: &mut File) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Length of the prefix ending in a newline; anything after it is a row
/// cut off mid-write.
fn complete_prefix(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

fn parse_rows(bytes: &[u8]) -> impl Iterator<Item = Record> + '_ {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes)
        .into_deserialize::<RecordRow>()
        .enumerate()
        .filter_map(|(line, row)| match row {
            Ok(row) => row.into_record(),
            Err(e) => {
                tracing::warn!(row = line + 1, error = %e, "Skipping unreadable row");
                None
            }
        })
}

fn read_header(bytes: &[u8]) -> Option<csv::StringRecord> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes)
        .headers()
        .ok()
        .filter(|header| !header.is_empty())
        .cloned()
}

fn scan_identities(bytes: &[u8]) -> HashSet<Identity> {
    parse_rows(bytes).map(|r| r.identity).collect()
}

fn read_records(path: &Path) -> Result<Vec<Record>, AppError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(sink_error(path, e)),
    };
    file.lock_shared().map_err(|e| sink_error(path, e))?;
    let bytes = read_from_start(&mut file);
    if let Err(e) = file.unlock() {
        tracing::warn!(path = %path.display(), error = %e, "Failed to release row store lock");
    }
    let bytes = bytes.map_err(|e| sink_error(path, e))?;

    let mut seen = HashSet::new();
    Ok(parse_rows(&bytes[..complete_prefix(&bytes)])
        .filter(|r| seen.insert(r.identity.clone()))
        .collect())
}

/// Write `value` as pretty JSON via a temp file renamed into place.
pub(crate) fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), AppError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| sink_error(dir, e))?;
    let tmp = NamedTempFile::new_in(dir).map_err(|e| sink_error(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(|e| sink_error(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| sink_error(path, e))?;
    tmp.persist(path).map_err(|e| sink_error(path, e.error))?;
    Ok(())
}

fn write_snapshot(path: &Path, records: &[Record]) -> Result<(), AppError> {
    write_json_atomic(path, records)
}
