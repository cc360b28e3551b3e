//! Record sinks: a local CSV file or a Google spreadsheet.

use std::sync::Arc;

use papertriage_core::{RecordSink, SinkError, SinkSettings};

mod auth;
pub mod csv_file;
pub mod sheets;

pub use csv_file::CsvSink;
pub use sheets::SheetsSink;

/// Open the sink selected by `settings`.
///
/// Both variants validate their store up front (header row, credentials), so
/// a misconfigured sink fails at startup instead of on the first paper.
pub async fn open_sink(settings: &SinkSettings) -> Result<Arc<dyn RecordSink>, SinkError> {
    match settings {
        SinkSettings::Csv { path } => Ok(Arc::new(CsvSink::open(path.clone())?)),
        SinkSettings::Sheets {
            credentials_path,
            sheet_name,
        } => Ok(Arc::new(
            SheetsSink::connect(credentials_path, sheet_name).await?,
        )),
    }
}
