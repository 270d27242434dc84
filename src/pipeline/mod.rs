//! Streaming summarization over pluggable item sources

pub mod runner;
pub mod sink;
pub mod source;
pub mod summarizer;
pub mod table;

pub use runner::ConcurrentTaskRunner;
pub use sink::{CsvSink, JsonLinesSink, RowSink};
pub use source::{ItemSource, SourceItem, content_hash};
pub use summarizer::{StreamOptions, SummaryEvent, SummaryReport, Summarizer, summarize_batch};
pub use table::{Column, ColumnType, INDEX_COLUMN, SummaryBatch, SummaryRow, parse_summary_table, validate_columns};
