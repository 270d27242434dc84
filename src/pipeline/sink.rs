//! Row-oriented output for summary batches.
//!
//! Every sink writes exactly the declared columns, in declared order.

use crate::error::{Result, ScrapeError};
use crate::pipeline::table::{Column, SummaryRow};
use indexmap::IndexMap;
use std::io::Write;

pub trait RowSink: Send {
    /// Called once before any rows
    fn write_header(&mut self, columns: &[Column]) -> Result<()>;

    fn write_rows(&mut self, rows: &[SummaryRow]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// CSV with a header row and every value quoted
pub struct CsvSink<W: Write + Send> {
    writer: csv::Writer<W>,
    columns: Vec<String>,
}

impl<W: Write + Send> CsvSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .quote_style(csv::QuoteStyle::Always)
                .from_writer(inner),
            columns: Vec::new(),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| ScrapeError::Io(e.into_error()))
    }
}

impl<W: Write + Send> RowSink for CsvSink<W> {
    fn write_header(&mut self, columns: &[Column]) -> Result<()> {
        self.columns = columns.iter().map(|c| c.name.clone()).collect();
        self.writer.write_record(&self.columns)?;
        Ok(())
    }

    fn write_rows(&mut self, rows: &[SummaryRow]) -> Result<()> {
        for row in rows {
            let record: Vec<&str> = self
                .columns
                .iter()
                .map(|name| row.values.get(name).map(String::as_str).unwrap_or(""))
                .collect();
            self.writer.write_record(&record)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One JSON object per row, keys in declared column order
pub struct JsonLinesSink<W: Write + Send> {
    inner: W,
    columns: Vec<String>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            columns: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> RowSink for JsonLinesSink<W> {
    fn write_header(&mut self, columns: &[Column]) -> Result<()> {
        self.columns = columns.iter().map(|c| c.name.clone()).collect();
        Ok(())
    }

    fn write_rows(&mut self, rows: &[SummaryRow]) -> Result<()> {
        for row in rows {
            let object: IndexMap<&str, &str> = self
                .columns
                .iter()
                .map(|name| (name.as_str(), row.values.get(name).map(String::as_str).unwrap_or("")))
                .collect();
            serde_json::to_writer(&mut self.inner, &object)?;
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
