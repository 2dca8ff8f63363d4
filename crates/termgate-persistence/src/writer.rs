//! JSON Lines file writer for reconciled trade records.
//!
//! Daily-rotated append-only files (`trades_YYYY-MM-DD.jsonl`) under a
//! base directory. Closed trades are rare events, so every record is
//! flushed to disk immediately; there is no batching buffer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::PersistenceResult;
use termgate_core::{TradeRecord, TradeSink};

/// Active writer state for the current daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

struct WriterState {
    /// Open until date rotation.
    active: Option<ActiveWriter>,
}

/// JSON Lines writer for trade records.
///
/// Append mode is safe for interrupted writes; each line is independent.
/// Interior mutex makes it usable as a shared `TradeSink` from concurrent
/// reconciliation tasks.
pub struct JsonlTradeWriter {
    base_dir: String,
    state: Mutex<WriterState>,
}

impl JsonlTradeWriter {
    /// Create a new writer rooted at `base_dir`.
    pub fn new(base_dir: &str) -> Self {
        if let Err(e) = std::fs::create_dir_all(base_dir) {
            warn!(?e, "Failed to create directory: {}", base_dir);
        }

        Self {
            base_dir: base_dir.to_string(),
            state: Mutex::new(WriterState { active: None }),
        }
    }

    /// Write one record, rotating the daily file if the date changed.
    pub fn write_record(&self, record: &TradeRecord) -> PersistenceResult<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut state = self.state.lock();

        let needs_rotation = state
            .active
            .as_ref()
            .map(|w| w.date != today)
            .unwrap_or(false);
        if needs_rotation {
            self.close_active(&mut state);
        }

        if state.active.is_none() {
            state.active = Some(self.open_writer(&today)?);
        }

        let active = state.active.as_mut().expect("active writer opened above");
        let json = serde_json::to_string(record)?;
        writeln!(active.writer, "{}", json)?;
        active.writer.flush()?;
        active.records_written += 1;

        Ok(())
    }

    /// Flush and drop the active file handle.
    pub fn close(&self) {
        let mut state = self.state.lock();
        self.close_active(&mut state);
    }

    fn close_active(&self, state: &mut WriterState) {
        if let Some(mut active) = state.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed trade record writer"
            );
        }
    }

    fn open_writer(&self, date: &str) -> PersistenceResult<ActiveWriter> {
        let filename = format!("{}/trades_{}.jsonl", self.base_dir, date);
        info!(filename = %filename, "Opening trade record writer (append mode)");

        // Append mode - never truncates existing data.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;

        Ok(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        })
    }
}

impl TradeSink for JsonlTradeWriter {
    fn record(&self, record: &TradeRecord) {
        if let Err(e) = self.write_record(record) {
            warn!(
                ticket = %record.ticket,
                error = %e,
                "Failed to persist trade record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;
    use termgate_core::{AccountKey, AccuracyGrade, PositionSide, TicketId};

    fn sample_record(ticket: u64) -> TradeRecord {
        TradeRecord {
            account: AccountKey::new(100, "Broker-Demo", "user-a"),
            ticket: TicketId::new(ticket),
            symbol: "EURUSD".to_string(),
            side: PositionSide::Buy,
            volume: dec!(1),
            entry_price: dec!(1.1000),
            entry_time: Utc::now(),
            exit_price: dec!(1.1040),
            exit_time: Utc::now(),
            gross_profit: dec!(400),
            commission: dec!(-7),
            swap: dec!(-1.2),
            net_profit: dec!(391.8),
            stop_loss: Some(dec!(1.0950)),
            take_profit: None,
            accuracy: AccuracyGrade::Exact,
            risk_amount: Some(dec!(500)),
            r_multiple: Some(dec!(0.8)),
            risk_reward: None,
            recorded_at: Utc::now(),
        }
    }

    fn read_lines(dir: &TempDir) -> Vec<String> {
        let mut entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        let mut lines = Vec::new();
        for path in entries {
            let content = std::fs::read_to_string(path).unwrap();
            lines.extend(content.lines().map(String::from));
        }
        lines
    }

    #[test]
    fn test_records_written_as_json_lines() {
        let dir = TempDir::new().unwrap();
        let writer = JsonlTradeWriter::new(dir.path().to_str().unwrap());

        writer.write_record(&sample_record(1)).unwrap();
        writer.write_record(&sample_record(2)).unwrap();
        writer.close();

        let lines = read_lines(&dir);
        assert_eq!(lines.len(), 2);

        let parsed: TradeRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed.ticket, TicketId::new(1));
        assert_eq!(parsed.accuracy, AccuracyGrade::Exact);
        assert_eq!(parsed.net_profit, dec!(391.8));
    }

    #[test]
    fn test_append_across_writer_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap().to_string();

        {
            let writer = JsonlTradeWriter::new(&path);
            writer.write_record(&sample_record(1)).unwrap();
            writer.close();
        }
        {
            let writer = JsonlTradeWriter::new(&path);
            writer.write_record(&sample_record(2)).unwrap();
            writer.close();
        }

        assert_eq!(read_lines(&dir).len(), 2);
    }

    #[test]
    fn test_sink_swallows_errors() {
        // Unwritable base dir: the sink logs and carries on.
        let writer = JsonlTradeWriter::new("/proc/termgate-does-not-exist/out");
        writer.record(&sample_record(1));
    }

    #[test]
    fn test_files_carry_date_in_name() {
        let dir = TempDir::new().unwrap();
        let writer = JsonlTradeWriter::new(dir.path().to_str().unwrap());
        writer.write_record(&sample_record(1)).unwrap();
        writer.close();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let expected = dir.path().join(format!("trades_{today}.jsonl"));
        assert!(expected.exists());
    }

    #[test]
    fn test_decimal_zero_roundtrip() {
        let dir = TempDir::new().unwrap();
        let writer = JsonlTradeWriter::new(dir.path().to_str().unwrap());
        let mut record = sample_record(3);
        record.commission = Decimal::ZERO;
        writer.write_record(&record).unwrap();
        writer.close();

        let lines = read_lines(&dir);
        let parsed: TradeRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed.commission, Decimal::ZERO);
    }
}
