//! Local CSV file sink.

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use papertriage_core::record::is_header_row;
use papertriage_core::{AnalysisRecord, RecordSink, SINK_HEADERS, SinkError};

fn csv_err(e: csv::Error) -> SinkError {
    SinkError::Io(io::Error::from(e))
}

/// Appends one row per record to a CSV file with a fixed header.
///
/// Every append is flushed and synced before it reports success. If the file
/// is deleted or truncated while running, the header is written again on the
/// next append.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl CsvSink {
    /// Open (or create) the store at `path`, writing the header if the file is
    /// missing or empty.
    ///
    /// Fails with [`SinkError::HeaderMismatch`] if the file already starts
    /// with a different row.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        ensure_header(&path)?;
        tracing::info!(path = %path.display(), "CSV sink ready");
        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_header(file: &mut File) -> Result<(), SinkError> {
    let mut writer = csv::Writer::from_writer(&mut *file);
    writer.write_record(SINK_HEADERS).map_err(csv_err)?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;
    Ok(())
}

/// Make sure the file starts with [`SINK_HEADERS`].
fn ensure_header(path: &Path) -> Result<(), SinkError> {
    let len = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e.into()),
    };

    if len == 0 {
        tracing::info!(path = %path.display(), "creating CSV file with header");
        let mut file = File::create(path)?;
        return write_header(&mut file);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    match reader.records().next() {
        Some(Ok(first)) => {
            let found: Vec<String> = first.iter().map(str::to_string).collect();
            if is_header_row(&found) {
                Ok(())
            } else {
                Err(SinkError::HeaderMismatch { found })
            }
        }
        Some(Err(e)) => Err(csv_err(e)),
        // Only blank lines so far.
        None => {
            let mut file = OpenOptions::new().append(true).open(path)?;
            write_header(&mut file)
        }
    }
}

/// Whether the file is non-empty and its last byte is not a newline.
fn lacks_trailing_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn append_row(path: &Path, row: &[String]) -> Result<(), SinkError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        Ok(_) => {
            tracing::warn!(path = %path.display(), "CSV file was emptied, rewriting header");
            ensure_header(path)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "CSV file disappeared, recreating it");
            ensure_header(path)?;
        }
        Err(e) => return Err(e.into()),
    }

    let mut file = OpenOptions::new().read(true).append(true).open(path)?;
    if lacks_trailing_newline(&mut file)? {
        file.write_all(b"\n")?;
    }

    let mut writer = csv::Writer::from_writer(&mut file);
    writer.write_record(row).map_err(csv_err)?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;
    Ok(())
}

impl RecordSink for CsvSink {
    fn name(&self) -> &str {
        "CSV"
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn append<'a>(
        &'a self,
        record: &'a AnalysisRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        let row = record.to_row();
        let path = self.path.clone();
        let lock = self.write_lock.clone();
        let filename = record.filename.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                append_row(&path, &row)
            })
            .await
            .map_err(|e| SinkError::Io(io::Error::other(e.to_string())))??;
            tracing::info!(file = %filename, "wrote analysis row to CSV");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_newline_detection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");

        std::fs::write(&path, b"").unwrap();
        let mut f = OpenOptions::new().read(true).append(true).open(&path).unwrap();
        assert!(!lacks_trailing_newline(&mut f).unwrap());

        std::fs::write(&path, b"a,b\n").unwrap();
        let mut f = OpenOptions::new().read(true).append(true).open(&path).unwrap();
        assert!(!lacks_trailing_newline(&mut f).unwrap());

        std::fs::write(&path, b"a,b").unwrap();
        let mut f = OpenOptions::new().read(true).append(true).open(&path).unwrap();
        assert!(lacks_trailing_newline(&mut f).unwrap());
    }

    #[test]
    fn blank_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, b"\n\n").unwrap();

        ensure_header(&path).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .unwrap();
        let first = reader.records().next().unwrap().unwrap();
        assert_eq!(first.iter().collect::<Vec<_>>(), SINK_HEADERS.to_vec());
    }
}
