//! Download export
//!
//! A download button defers the statement that follows it. When the link is
//! followed, the statements before it are replayed to rebuild the filter
//! bindings and the deferred statement is streamed, without a row cap, into a
//! CSV or XLSX file.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::SecondsFormat;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::config::EngineConfig;
use crate::execute::normalize::{bytes_text, interval_millis};
use crate::execute::{replay_bindings, statements, BuildRequest, DashboardSource};
use crate::reader::{Cell, Flow, RawColumn, Reader, RowSink};
use crate::tags::TagResolver;
use crate::{Result, ShaperError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFormat {
    Csv,
    Xlsx,
}

impl DownloadFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DownloadFormat::Csv => "csv",
            DownloadFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            DownloadFormat::Csv => "text/csv",
            DownloadFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

impl fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DownloadFormat {
    type Err = ShaperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(DownloadFormat::Csv),
            "xlsx" => Ok(DownloadFormat::Xlsx),
            other => Err(ShaperError::ValidationError(format!(
                "Unknown download format '{}'",
                other
            ))),
        }
    }
}

/// `10d 5h 30m 15.068s`, leading zero units omitted
pub fn format_interval(months: i32, days: i32, micros: i64) -> String {
    let total = interval_millis(months, days, micros);
    let sign = if total < 0 { "-" } else { "" };
    let mut ms = total.unsigned_abs();

    let d = ms / 86_400_000;
    ms %= 86_400_000;
    let h = ms / 3_600_000;
    ms %= 3_600_000;
    let m = ms / 60_000;
    ms %= 60_000;

    let seconds = if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        let text = format!("{}.{:03}", ms / 1000, ms % 1000);
        format!("{}s", text.trim_end_matches('0'))
    };

    let mut parts = Vec::new();
    if d > 0 {
        parts.push(format!("{}d", d));
    }
    if d > 0 || h > 0 {
        parts.push(format!("{}h", h));
    }
    if d > 0 || h > 0 || m > 0 {
        parts.push(format!("{}m", m));
    }
    parts.push(seconds);
    format!("{}{}", sign, parts.join(" "))
}

/// Text of a cell in an exported file
///
/// Binary cells are read as text; [`column_text`] formats `UUID` columns.
pub fn export_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Timestamp(ts) => ts.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Cell::Interval {
            months,
            days,
            micros,
        } => format_interval(*months, *days, *micros),
        Cell::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Cell::List(items) => items
            .iter()
            .map(export_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Text of a cell in a column of type `db_type`
pub fn column_text(cell: &Cell, db_type: &str) -> String {
    match cell {
        Cell::Bytes(bytes) => bytes_text(bytes, db_type),
        other => export_text(other),
    }
}

fn db_types(columns: &[RawColumn]) -> Vec<String> {
    columns.iter().map(|c| c.db_type.clone()).collect()
}

fn db_type(types: &[String], index: usize) -> &str {
    types.get(index).map_or("", String::as_str)
}

// =============================================================================
// Sinks
// =============================================================================

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    types: Vec<String>,
    rows: usize,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
            types: Vec::new(),
            rows: 0,
        }
    }

    /// Flush and return the number of data rows written
    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .map_err(|e| ShaperError::WriterError(format!("Failed to flush CSV: {}", e)))?;
        Ok(self.rows)
    }
}

fn csv_error(e: csv::Error) -> ShaperError {
    ShaperError::WriterError(format!("Failed to write CSV: {}", e))
}

impl<W: Write> RowSink for CsvSink<W> {
    fn columns(&mut self, columns: &[RawColumn]) -> Result<()> {
        self.types = db_types(columns);
        self.writer
            .write_record(columns.iter().map(|c| c.name.as_str()))
            .map_err(csv_error)
    }

    fn row(&mut self, row: Vec<Cell>) -> Result<Flow> {
        self.writer
            .write_record(
                row.iter()
                    .enumerate()
                    .map(|(index, cell)| column_text(cell, db_type(&self.types, index))),
            )
            .map_err(csv_error)?;
        self.rows += 1;
        Ok(Flow::Continue)
    }
}

/// Largest row index a worksheet accepts
const XLSX_MAX_ROW: u32 = 1_048_575;

fn xlsx_error(e: XlsxError) -> ShaperError {
    ShaperError::WriterError(format!("Failed to write XLSX: {}", e))
}

/// Single-sheet workbook with a bold, frozen, filterable header row
pub struct XlsxSink {
    sheet: Worksheet,
    header: Format,
    types: Vec<String>,
    columns: u16,
    next_row: u32,
}

impl XlsxSink {
    pub fn new() -> Self {
        Self {
            sheet: Worksheet::new(),
            header: Format::new().set_bold(),
            types: Vec::new(),
            columns: 0,
            next_row: 1,
        }
    }

    /// Assemble the workbook and write it to `out`
    pub fn finish(mut self, out: &mut dyn Write) -> Result<usize> {
        let rows = (self.next_row - 1) as usize;
        if self.columns > 0 {
            self.sheet
                .autofilter(0, 0, self.next_row - 1, self.columns - 1)
                .map_err(xlsx_error)?;
        }

        let mut workbook = Workbook::new();
        workbook.push_worksheet(self.sheet);
        let buffer = workbook.save_to_buffer().map_err(xlsx_error)?;
        out.write_all(&buffer)
            .map_err(|e| ShaperError::WriterError(format!("Failed to write XLSX: {}", e)))?;
        Ok(rows)
    }
}

impl Default for XlsxSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RowSink for XlsxSink {
    fn columns(&mut self, columns: &[RawColumn]) -> Result<()> {
        self.columns = u16::try_from(columns.len())
            .map_err(|_| ShaperError::WriterError("Too many columns for XLSX".to_string()))?;
        self.types = db_types(columns);
        for (index, column) in columns.iter().enumerate() {
            self.sheet
                .write_string_with_format(0, index as u16, &column.name, &self.header)
                .map_err(xlsx_error)?;
        }
        self.sheet.set_freeze_panes(1, 0).map_err(xlsx_error)?;
        Ok(())
    }

    fn row(&mut self, row: Vec<Cell>) -> Result<Flow> {
        if self.next_row > XLSX_MAX_ROW {
            return Err(ShaperError::WriterError(
                "Result exceeds the XLSX row limit".to_string(),
            ));
        }
        let r = self.next_row;
        for (index, cell) in row.iter().enumerate() {
            let c = index as u16;
            match cell {
                Cell::Null => {}
                Cell::Bool(b) => {
                    self.sheet.write_boolean(r, c, *b).map_err(xlsx_error)?;
                }
                Cell::Int(i) => {
                    self.sheet.write_number(r, c, *i as f64).map_err(xlsx_error)?;
                }
                Cell::Float(f) if f.is_finite() => {
                    self.sheet.write_number(r, c, *f).map_err(xlsx_error)?;
                }
                other => {
                    self.sheet
                        .write_string(r, c, column_text(other, db_type(&self.types, index)))
                        .map_err(xlsx_error)?;
                }
            }
        }
        self.next_row += 1;
        Ok(Flow::Continue)
    }
}

// =============================================================================
// Export
// =============================================================================

/// Stream the result of statement `statement_index` of `source` into `out`
///
/// Returns the number of data rows written.
#[allow(clippy::too_many_arguments)]
pub fn export(
    reader: &dyn Reader,
    resolver: &dyn TagResolver,
    source: &DashboardSource,
    statement_index: usize,
    format: DownloadFormat,
    request: &BuildRequest,
    config: &EngineConfig,
    out: &mut dyn Write,
) -> Result<usize> {
    let statements = statements(source)?;
    let target = statements.get(statement_index).ok_or_else(|| {
        ShaperError::ValidationError(format!(
            "Dashboard '{}' has no statement {}",
            source.id, statement_index
        ))
    })?;
    if target.is_side_effect() {
        return Err(ShaperError::ValidationError(format!(
            "Statement {} of dashboard '{}' returns no rows",
            statement_index, source.id
        )));
    }

    tracing::info!(
        dashboard = %source.id,
        index = statement_index,
        %format,
        "Exporting statement"
    );

    let executor = replay_bindings(
        reader,
        resolver,
        &statements,
        statement_index,
        request,
        config,
    )?;

    let rows = match format {
        DownloadFormat::Csv => {
            let mut sink = CsvSink::new(&mut *out);
            executor.stream(target, &mut sink)?;
            sink.finish()?
        }
        DownloadFormat::Xlsx => {
            let mut sink = XlsxSink::new();
            executor.stream(target, &mut sink)?;
            sink.finish(out)?
        }
    };

    tracing::debug!(dashboard = %source.id, rows, "Export finished");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::QueryParams;
    use crate::reader::testing::{text, ScriptedReader};
    use crate::tags::CastAliasResolver;
    use chrono::NaiveDate;

    fn run(
        reader: &ScriptedReader,
        script: &str,
        index: usize,
        format: DownloadFormat,
        request: &BuildRequest,
    ) -> Result<Vec<u8>> {
        let source = DashboardSource::new("d1", "Test", script);
        let mut out = Vec::new();
        export(
            reader,
            &CastAliasResolver,
            &source,
            index,
            format,
            request,
            &EngineConfig::default(),
            &mut out,
        )?;
        Ok(out)
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0, 10, 19_815_068_000), "10d 5h 30m 15.068s");
        assert_eq!(format_interval(0, 0, 90_000_000), "1m 30s");
        assert_eq!(format_interval(0, 0, 0), "0s");
        assert_eq!(format_interval(0, 0, 1_500_000), "1.5s");
        assert_eq!(format_interval(1, 0, 0), "30d 0h 0m 0s");
        assert_eq!(format_interval(0, 0, -2_000_000), "-2s");
    }

    #[test]
    fn test_export_text() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(export_text(&Cell::Timestamp(ts)), "2024-05-01T12:00:00Z");
        assert_eq!(export_text(&Cell::Null), "");
        let id: Vec<u8> = (0u8..16).collect();
        assert_eq!(
            column_text(&Cell::Bytes(id), "UUID"),
            "00010203-0405-0607-0809-0a0b0c0d0e0f"
        );
        let blob = b"abcdefghijklmnop".to_vec();
        assert_eq!(column_text(&Cell::Bytes(blob.clone()), "BLOB"), "abcdefghijklmnop");
        assert_eq!(export_text(&Cell::Bytes(blob)), "abcdefghijklmnop");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<DownloadFormat>().unwrap(), DownloadFormat::Csv);
        assert_eq!("xlsx".parse::<DownloadFormat>().unwrap(), DownloadFormat::Xlsx);
        assert!("pdf".parse::<DownloadFormat>().is_err());
    }

    #[test]
    fn test_csv_export_replays_bindings() {
        let reader = ScriptedReader::new();
        reader
            .push(&[("region", "VARCHAR")], vec![vec![text("EU")], vec![text("US")]])
            .push(
                &[(r#"CAST('sales' AS "DOWNLOAD_CSV")"#, "VARCHAR")],
                vec![vec![text("sales")]],
            )
            .push(
                &[("name", "VARCHAR"), ("amount", "INTEGER")],
                vec![
                    vec![text("a,b"), Cell::Int(1)],
                    vec![text("c"), Cell::Null],
                ],
            );

        let script = "SELECT r::DROPDOWN AS region FROM regions;\n\
                      SELECT 'sales'::DOWNLOAD_CSV;\n\
                      SELECT name, amount FROM sales WHERE region = getvariable('region')";
        let request = BuildRequest::new().with_params(QueryParams::from_query_string("region=US"));
        let out = run(&reader, script, 2, DownloadFormat::Csv, &request).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "name,amount\n\"a,b\",1\nc,\n");
        let log = reader.statements();
        assert!(log.contains(&"SET VARIABLE \"region\" = 'US';\n".to_string()));
        assert_eq!(log.last().map(String::as_str), Some("RESET VARIABLE \"region\";\n"));
    }

    #[test]
    fn test_xlsx_export_is_a_zip() {
        let reader = ScriptedReader::new();
        reader.push(&[("n", "INTEGER")], vec![vec![Cell::Int(1)], vec![Cell::Int(2)]]);

        let out = run(&reader, "SELECT n FROM t", 0, DownloadFormat::Xlsx, &BuildRequest::new())
            .unwrap();
        assert_eq!(&out[..2], b"PK");
    }

    #[test]
    fn test_missing_statement() {
        let reader = ScriptedReader::new();
        let err = run(&reader, "SELECT 1", 3, DownloadFormat::Csv, &BuildRequest::new())
            .unwrap_err();
        assert!(matches!(err, ShaperError::ValidationError(_)));
        assert!(reader.statements().is_empty());
    }
}
