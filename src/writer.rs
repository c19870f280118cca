//! The single-consumer output sink.
//!
//! All results funnel through one writer task per run, so output can never
//! interleave regardless of worker count. The channel carries
//! `Option<DetectionRecord>`; `None` is the shutdown sentinel. Disk writes
//! run on the blocking pool.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::detector::DetectionRecord;
use crate::error::{Error, Result};

/// Output container for the result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON record per line
    Jsonl,
    /// Tabular text, fixed column order
    Csv,
    /// Spreadsheet workbook, saved on shutdown
    Xlsx,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Jsonl
    }
}

/// One record flattened to the fixed tabular column set. Field order is the
/// column order; success and failure records produce the same columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRow {
    pub original_url: String,
    pub final_url: String,
    pub timestamp: String,
    pub hubspot_detected: bool,
    pub tracking: bool,
    pub cms_hosting: bool,
    pub confidence: String,
    pub forms: bool,
    pub chat: bool,
    pub ctas_legacy: bool,
    pub meetings: bool,
    pub video: bool,
    pub email_tracking: bool,
    /// Comma-separated tenant ids
    pub hub_ids: String,
    pub hub_id_count: usize,
    pub evidence_count: usize,
    pub http_status: Option<u16>,
    pub page_title: String,
    pub page_description: String,
}

/// Tabular column names, in output order.
pub const FLAT_COLUMNS: [&str; 19] = [
    "original_url",
    "final_url",
    "timestamp",
    "hubspot_detected",
    "tracking",
    "cms_hosting",
    "confidence",
    "forms",
    "chat",
    "ctas_legacy",
    "meetings",
    "video",
    "email_tracking",
    "hub_ids",
    "hub_id_count",
    "evidence_count",
    "http_status",
    "page_title",
    "page_description",
];

/// Flatten a record for tabular output.
pub fn flatten_record(record: &DetectionRecord) -> FlatRow {
    let summary = &record.summary;
    let features = &summary.features;
    let metadata = record.page_metadata.as_ref();

    FlatRow {
        original_url: record.original_url.clone(),
        final_url: record.final_url.clone(),
        timestamp: record.timestamp.clone(),
        hubspot_detected: record.hubspot_detected,
        tracking: summary.tracking,
        cms_hosting: summary.cms_hosting,
        confidence: summary.confidence.as_str().to_string(),
        forms: features.forms,
        chat: features.chat,
        ctas_legacy: features.ctas_legacy,
        meetings: features.meetings,
        video: features.video,
        email_tracking: features.email_tracking_indicators,
        hub_ids: record
            .hub_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(","),
        hub_id_count: record.hub_ids.len(),
        evidence_count: record.evidence.len(),
        http_status: record.http_status,
        page_title: metadata
            .and_then(|m| m.title.clone())
            .unwrap_or_default(),
        page_description: metadata
            .and_then(|m| m.description.clone())
            .unwrap_or_default(),
    }
}

/// Drain the result channel into the configured container until the
/// sentinel arrives. Returns the number of records written.
pub async fn run_writer(
    rx: mpsc::Receiver<Option<DetectionRecord>>,
    destination: Option<PathBuf>,
    format: OutputFormat,
    pretty: bool,
) -> Result<u64> {
    match format {
        OutputFormat::Jsonl => run_jsonl_writer(rx, destination, pretty).await,
        OutputFormat::Csv => run_csv_writer(rx, destination).await,
        #[cfg(feature = "xlsx")]
        OutputFormat::Xlsx => run_xlsx_writer(rx, destination).await,
        #[cfg(not(feature = "xlsx"))]
        OutputFormat::Xlsx => Err(Error::Config(
            "spreadsheet output requires the xlsx feature".into(),
        )),
    }
}

enum TextSink {
    File(std::fs::File),
    Stdout,
}

impl TextSink {
    fn open(destination: Option<PathBuf>) -> Result<Arc<Mutex<Self>>> {
        let sink = match destination {
            Some(path) => TextSink::File(
                std::fs::File::create(&path)
                    .map_err(|e| Error::Output(format!("cannot create {}: {e}", path.display())))?,
            ),
            None => TextSink::Stdout,
        };
        Ok(Arc::new(Mutex::new(sink)))
    }

    fn write_flush(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match self {
            TextSink::File(file) => {
                file.write_all(chunk)?;
                file.flush()
            }
            TextSink::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(chunk)?;
                out.flush()
            }
        }
    }
}

async fn write_chunk(sink: &Arc<Mutex<TextSink>>, chunk: Vec<u8>) -> Result<()> {
    let sink = Arc::clone(sink);
    tokio::task::spawn_blocking(move || {
        let mut sink = sink.lock().expect("writer sink mutex poisoned");
        sink.write_flush(&chunk)
    })
    .await
    .map_err(|e| Error::Internal(format!("writer task failed: {e}")))?
    .map_err(|e| Error::Output(e.to_string()))
}

async fn run_jsonl_writer(
    mut rx: mpsc::Receiver<Option<DetectionRecord>>,
    destination: Option<PathBuf>,
    pretty: bool,
) -> Result<u64> {
    let sink = TextSink::open(destination)?;
    let mut written = 0u64;

    while let Some(message) = rx.recv().await {
        let Some(record) = message else { break };
        let mut line = if pretty {
            serde_json::to_string_pretty(&record)?
        } else {
            serde_json::to_string(&record)?
        };
        line.push('\n');
        write_chunk(&sink, line.into_bytes()).await?;
        written += 1;
    }
    Ok(written)
}

async fn run_csv_writer(
    mut rx: mpsc::Receiver<Option<DetectionRecord>>,
    destination: Option<PathBuf>,
) -> Result<u64> {
    let sink = TextSink::open(destination)?;
    let mut written = 0u64;

    // Header row goes out once, before any record.
    let mut header = Vec::new();
    {
        let mut w = csv::Writer::from_writer(&mut header);
        w.write_record(FLAT_COLUMNS)
            .map_err(|e| Error::Output(e.to_string()))?;
        w.flush().map_err(|e| Error::Output(e.to_string()))?;
    }
    write_chunk(&sink, header).await?;

    while let Some(message) = rx.recv().await {
        let Some(record) = message else { break };
        let row = flatten_record(&record);
        let mut chunk = Vec::new();
        {
            let mut w = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut chunk);
            w.serialize(&row).map_err(|e| Error::Output(e.to_string()))?;
            w.flush().map_err(|e| Error::Output(e.to_string()))?;
        }
        write_chunk(&sink, chunk).await?;
        written += 1;
    }
    Ok(written)
}

#[cfg(feature = "xlsx")]
async fn run_xlsx_writer(
    mut rx: mpsc::Receiver<Option<DetectionRecord>>,
    destination: Option<PathBuf>,
) -> Result<u64> {
    use rust_xlsxwriter::{Format, Workbook};

    let Some(path) = destination else {
        return Err(Error::Config(
            "xlsx output requires a file destination".into(),
        ));
    };

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name("HubSpot Detection Results")
            .map_err(|e| Error::Output(e.to_string()))?;
        for (col, name) in FLAT_COLUMNS.iter().enumerate() {
            worksheet
                .write_string_with_format(0, col as u16, *name, &bold)
                .map_err(|e| Error::Output(e.to_string()))?;
        }
    }

    let mut written = 0u64;
    while let Some(message) = rx.recv().await {
        let Some(record) = message else { break };
        let row = flatten_record(&record);
        let worksheet = workbook
            .worksheet_from_index(0)
            .map_err(|e| Error::Output(e.to_string()))?;
        let r = (written + 1) as u32;
        let xerr = |e: rust_xlsxwriter::XlsxError| Error::Output(e.to_string());
        worksheet.write_string(r, 0, &row.original_url).map_err(xerr)?;
        worksheet.write_string(r, 1, &row.final_url).map_err(xerr)?;
        worksheet.write_string(r, 2, &row.timestamp).map_err(xerr)?;
        worksheet.write_boolean(r, 3, row.hubspot_detected).map_err(xerr)?;
        worksheet.write_boolean(r, 4, row.tracking).map_err(xerr)?;
        worksheet.write_boolean(r, 5, row.cms_hosting).map_err(xerr)?;
        worksheet.write_string(r, 6, &row.confidence).map_err(xerr)?;
        worksheet.write_boolean(r, 7, row.forms).map_err(xerr)?;
        worksheet.write_boolean(r, 8, row.chat).map_err(xerr)?;
        worksheet.write_boolean(r, 9, row.ctas_legacy).map_err(xerr)?;
        worksheet.write_boolean(r, 10, row.meetings).map_err(xerr)?;
        worksheet.write_boolean(r, 11, row.video).map_err(xerr)?;
        worksheet.write_boolean(r, 12, row.email_tracking).map_err(xerr)?;
        worksheet.write_string(r, 13, &row.hub_ids).map_err(xerr)?;
        worksheet
            .write_number(r, 14, row.hub_id_count as f64)
            .map_err(xerr)?;
        worksheet
            .write_number(r, 15, row.evidence_count as f64)
            .map_err(xerr)?;
        if let Some(status) = row.http_status {
            worksheet
                .write_number(r, 16, status as f64)
                .map_err(xerr)?;
        }
        worksheet.write_string(r, 17, &row.page_title).map_err(xerr)?;
        worksheet
            .write_string(r, 18, &row.page_description)
            .map_err(xerr)?;
        written += 1;
    }

    // The workbook only hits disk once, at shutdown.
    tokio::task::spawn_blocking(move || workbook.save(&path))
        .await
        .map_err(|e| Error::Internal(format!("xlsx save task failed: {e}")))?
        .map_err(|e| Error::Output(e.to_string()))?;

    Ok(written)
}
