use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use chrono::Local;

use crate::domain::Ean;
use crate::progress::{Progress, Tally};
use crate::services::EanLookup;

pub const OUTPUT_COLUMNS: [&str; 4] = ["billiger", "eBay", "Timestamp", "Status"];

const EAN_COLUMN_HINTS: [&str; 3] = ["ean", "gtin", "barcode"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct BatchOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub ean_column: Option<String>,
    pub start_row: usize,
    pub limit: usize,
    pub save_interval: usize,
}

impl BatchOptions {
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => {
                let stem = self
                    .input
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "prices".to_string());
                self.input.with_file_name(format!("{}_output.csv", stem))
            }
        }
    }
}

/// The spreadsheet held in memory during a run: one header row plus the data
/// rows, every row padded to header width.
struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    fn load(path: &Path) -> anyhow::Result<Sheet> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .context("failed to read the header row")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = vec![];
        for record in reader.records() {
            let record = record.context("failed to read a data row")?;
            let mut row: Vec<String> = record.iter().map(|f| f.to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Sheet { headers, rows })
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to write {}", path.display()))?;

        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append any of the four output columns that are not present yet and pad
    /// every row accordingly.
    fn ensure_output_columns(&mut self) {
        for column in OUTPUT_COLUMNS {
            if !self.headers.iter().any(|h| h == column) {
                self.headers.push(column.to_string());
            }
        }
        for row in &mut self.rows {
            row.resize(self.headers.len(), String::new());
        }
    }

    fn column(&self, name: &str) -> anyhow::Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("output column '{}' missing", name))
    }
}

/// Pick the column holding the EAN codes: an explicit request wins, then a
/// header-name hint (ean/gtin/barcode), then the first column.
pub fn detect_ean_column(headers: &[String], requested: Option<&str>) -> anyhow::Result<usize> {
    if let Some(name) = requested {
        return headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .with_context(|| format!("column '{}' not found in the input file", name));
    }

    let found = headers.iter().position(|h| {
        let lowered = h.to_lowercase();
        EAN_COLUMN_HINTS.iter().any(|hint| lowered.contains(hint))
    });

    Ok(found.unwrap_or(0))
}

/// Rows that already carry a status are done; a rerun must not hit the site
/// for them again.
pub fn is_processed(status: &str) -> bool {
    let trimmed = status.trim();
    !trimmed.is_empty() && trimmed != "None"
}

/// Drive the engine over every pending row of the input file. Progress is
/// saved every `save_interval` processed rows and once at the end; an armed
/// cancellation flag stops the run between lookups. Engine errors abort the
/// batch after a final save.
pub async fn run_batch(
    options: &BatchOptions,
    lookup: &mut dyn EanLookup,
    observer: &mut dyn Progress,
    cancel: &AtomicBool,
) -> anyhow::Result<Tally> {
    let mut sheet = Sheet::load(&options.input)?;
    sheet.ensure_output_columns();

    let ean_idx = detect_ean_column(&sheet.headers, options.ean_column.as_deref())?;
    log::info!("EAN column: {}", sheet.headers[ean_idx]);

    let billiger_idx = sheet.column("billiger")?;
    let ebay_idx = sheet.column("eBay")?;
    let timestamp_idx = sheet.column("Timestamp")?;
    let status_idx = sheet.column("Status")?;

    let output = options.output_path();
    let total = sheet.rows.len();
    let end_row = if options.limit > 0 {
        (options.start_row + options.limit).min(total)
    } else {
        total
    };

    observer.begin(end_row.saturating_sub(options.start_row));

    let mut tally = Tally::default();
    let mut run_error = None;

    for idx in options.start_row..end_row {
        if cancel.load(Ordering::Relaxed) {
            observer.warn("Cancellation requested - saving progress and stopping");
            break;
        }

        let code = sheet.rows[idx][ean_idx].trim().to_string();
        let ean = match Ean::parse(&code) {
            Ok(ean) => ean,
            Err(reason) => {
                log::debug!("Row {}: {}", idx + 1, reason);
                sheet.rows[idx][status_idx] = "Invalid EAN".to_string();
                sheet.rows[idx][timestamp_idx] = Local::now().format(TIMESTAMP_FORMAT).to_string();
                tally.record_invalid();
                continue;
            }
        };

        if is_processed(&sheet.rows[idx][status_idx]) {
            continue;
        }

        observer.log(&format!("[{}/{}] EAN: {}", idx + 1, end_row, ean));

        let quote = match lookup.get_price(&ean).await {
            Ok(quote) => quote,
            Err(e) => {
                observer.warn(&format!("Engine failure on row {}: {}", idx + 1, e));
                run_error = Some(e);
                break;
            }
        };

        sheet.rows[idx][billiger_idx] = quote
            .billiger_price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_default();
        sheet.rows[idx][ebay_idx] = quote
            .ebay_price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_default();
        sheet.rows[idx][status_idx] = quote.status.as_cell().to_string();
        sheet.rows[idx][timestamp_idx] = Local::now().format(TIMESTAMP_FORMAT).to_string();
        tally.record(quote.status);

        if options.save_interval > 0 && tally.processed % options.save_interval == 0 {
            sheet.save(&output)?;
            observer.log(&format!(
                "Progress saved ({}/{} found)",
                tally.found, tally.processed
            ));
        }
    }

    sheet.save(&output)?;
    observer.finish(&tally);
    log::info!("Output: {}", output.display());

    match run_error {
        Some(e) => Err(e),
        None => Ok(tally),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{pick_lowest, PriceQuote};
    use crate::progress::NullProgress;
    use async_trait::async_trait;

    struct StubLookup {
        calls: Vec<String>,
        quote: PriceQuote,
    }

    impl StubLookup {
        fn returning(quote: PriceQuote) -> Self {
            StubLookup {
                calls: vec![],
                quote,
            }
        }
    }

    #[async_trait]
    impl EanLookup for StubLookup {
        async fn get_price(&mut self, ean: &Ean) -> anyhow::Result<PriceQuote> {
            self.calls.push(ean.as_ref().to_string());
            Ok(self.quote.clone())
        }
    }

    fn write_input(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn options(input: PathBuf) -> BatchOptions {
        let output = input.with_extension("out.csv");
        BatchOptions {
            input,
            output: Some(output),
            ean_column: None,
            start_row: 0,
            limit: 0,
            save_interval: 10,
        }
    }

    #[test]
    fn ean_column_detection_prefers_header_hints() {
        let headers: Vec<String> = ["Artikel", "GTIN Code", "Preis"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(detect_ean_column(&headers, None).unwrap(), 1);

        let headers: Vec<String> = ["Code", "Preis"].iter().map(|s| s.to_string()).collect();
        assert_eq!(detect_ean_column(&headers, None).unwrap(), 0);

        assert_eq!(detect_ean_column(&headers, Some("preis")).unwrap(), 1);
        assert!(detect_ean_column(&headers, Some("missing")).is_err());
    }

    #[test]
    fn processed_rows_are_recognized() {
        assert!(is_processed("Found"));
        assert!(is_processed("NOT FOUND"));
        assert!(is_processed("Invalid EAN"));
        assert!(!is_processed(""));
        assert!(!is_processed("  "));
        assert!(!is_processed("None"));
    }

    #[tokio::test]
    async fn invalid_codes_never_reach_the_engine() {
        let input = write_input(
            "spotter_invalid.csv",
            "EAN\n123\n4006381333931\n",
        );
        let opts = options(input);

        let mut lookup = StubLookup::returning(pick_lowest(&[12.0], &[]));
        let mut progress = NullProgress;
        let cancel = AtomicBool::new(false);

        let tally = run_batch(&opts, &mut lookup, &mut progress, &cancel)
            .await
            .unwrap();

        assert_eq!(lookup.calls, vec!["4006381333931"]);
        assert_eq!(tally.invalid, 1);
        assert_eq!(tally.found, 1);

        let saved = std::fs::read_to_string(opts.output_path()).unwrap();
        assert!(saved.contains("Invalid EAN"));
        assert!(saved.contains("12.00"));
    }

    #[tokio::test]
    async fn rows_with_a_status_are_skipped_on_rerun() {
        let input = write_input(
            "spotter_resume.csv",
            "EAN,billiger,eBay,Timestamp,Status\n\
             4006381333931,9.99,,2026-01-01 10:00:00,Found\n\
             4006381333948,,,,\n",
        );
        let opts = options(input);

        let mut lookup = StubLookup::returning(PriceQuote::not_found());
        let mut progress = NullProgress;
        let cancel = AtomicBool::new(false);

        let tally = run_batch(&opts, &mut lookup, &mut progress, &cancel)
            .await
            .unwrap();

        // Only the pending second row hits the engine.
        assert_eq!(lookup.calls, vec!["4006381333948"]);
        assert_eq!(tally.processed, 1);
        assert_eq!(tally.not_found, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_lookup() {
        let input = write_input(
            "spotter_cancel.csv",
            "EAN\n4006381333931\n4006381333948\n",
        );
        let opts = options(input);

        let mut lookup = StubLookup::returning(PriceQuote::not_found());
        let mut progress = NullProgress;
        let cancel = AtomicBool::new(true);

        let tally = run_batch(&opts, &mut lookup, &mut progress, &cancel)
            .await
            .unwrap();

        assert!(lookup.calls.is_empty());
        assert_eq!(tally.processed, 0);
    }

    #[tokio::test]
    async fn output_columns_are_appended_when_missing() {
        let input = write_input("spotter_columns.csv", "EAN,Preis\n4006381333931,\n");
        let opts = options(input);

        let mut lookup = StubLookup::returning(pick_lowest(&[], &[15.5]));
        let mut progress = NullProgress;
        let cancel = AtomicBool::new(false);

        run_batch(&opts, &mut lookup, &mut progress, &cancel)
            .await
            .unwrap();

        let saved = std::fs::read_to_string(opts.output_path()).unwrap();
        let header = saved.lines().next().unwrap();
        assert_eq!(header, "EAN,Preis,billiger,eBay,Timestamp,Status");
        assert!(saved.contains("15.50"));
        assert!(saved.contains("Found"));
    }
}
