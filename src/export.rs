//! CSV export of the persisted dataset.
//!
//! The core only produces text. Where it ends up (clipboard, file, stdout) is
//! decided by a `TextSink`.

use crate::codec;
use crate::error::{ExportError, StorageError};
use crate::storage::FeatureStore;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Destination for exported text
pub trait TextSink {
    fn put_text(&mut self, text: &str) -> io::Result<()>;
}

/// Writes the export to a file, replacing any previous content
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TextSink for FileSink {
    fn put_text(&mut self, text: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, text)
    }
}

/// Writes the export to standard output
pub struct StdoutSink;

impl TextSink for StdoutSink {
    fn put_text(&mut self, text: &str) -> io::Result<()> {
        use std::io::Write;
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

fn render(store: &dyn FeatureStore) -> Result<Option<(usize, String)>, StorageError> {
    let rows = store.select_all_for_export()?;
    if rows.is_empty() {
        log::info!("No data to export");
        return Ok(None);
    }

    log::info!("Exporting {} row(s)", rows.len());
    Ok(Some((rows.len(), codec::to_csv(&rows)?)))
}

/// Render every stored row, oldest first. `None` when there is nothing to export.
pub fn export_csv(store: &dyn FeatureStore) -> Result<Option<String>, StorageError> {
    Ok(render(store)?.map(|(_, csv)| csv))
}

/// Export and hand the text to `sink`. Returns the number of data rows delivered.
pub fn export_to(store: &dyn FeatureStore, sink: &mut dyn TextSink) -> Result<usize, ExportError> {
    let Some((rows, csv)) = render(store)? else {
        return Ok(0);
    };

    sink.put_text(&csv).map_err(ExportError::Sink)?;
    Ok(rows)
}
