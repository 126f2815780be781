//! CSV file adapter: reads `<SYMBOL>.csv` bar files and writes trade logs.

use crate::domain::error::VedaError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::trade::TradeRecord;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn column<'r>(record: &'r csv::StringRecord, idx: usize, name: &str, row: usize) -> Result<&'r str, VedaError> {
    record.get(idx).map(str::trim).ok_or_else(|| VedaError::Data {
        reason: format!("row {}: missing {} column", row, name),
    })
}

fn number(record: &csv::StringRecord, idx: usize, name: &str, row: usize) -> Result<f64, VedaError> {
    column(record, idx, name, row)?
        .parse()
        .map_err(|e| VedaError::Data {
            reason: format!("row {}: invalid {} value: {}", row, name, e),
        })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<OhlcvBar>, VedaError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| VedaError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (i, result) in rdr.records().enumerate() {
            // header is row 1
            let row = i + 2;
            let record = result.map_err(|e| VedaError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let date_str = column(&record, 0, "date", row)?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| VedaError::Data {
                reason: format!("row {}: invalid date format: {}", row, e),
            })?;

            bars.push(OhlcvBar {
                date,
                open: number(&record, 1, "open", row)?,
                high: number(&record, 2, "high", row)?,
                low: number(&record, 3, "low", row)?,
                close: number(&record, 4, "close", row)?,
                volume: number(&record, 5, "volume", row)?,
            });
        }

        bars.sort_by_key(|b| b.date);
        debug!(symbol, bars = bars.len(), path = %path.display(), "loaded bars");
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, VedaError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| VedaError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

/// Write trades as CSV with header
/// `sequence,action,message,quantity,reference_price`. Absent message and
/// quantity are written as empty fields.
pub fn write_trades<W: Write>(writer: W, trades: &[TradeRecord]) -> Result<(), VedaError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["sequence", "action", "message", "quantity", "reference_price"])
        .map_err(std::io::Error::from)?;
    for trade in trades {
        wtr.write_record([
            trade.sequence.to_string(),
            trade.action.to_string(),
            trade.message.clone().unwrap_or_default(),
            trade.quantity.map(|q| q.to_string()).unwrap_or_default(),
            trade.reference_price.to_string(),
        ])
        .map_err(std::io::Error::from)?;
    }
    wtr.flush()?;
    Ok(())
}
