// 🔗 CSV Correlator - Recover full descriptions from the bank's CSV export
//
// Chase's CSV download of the same account keeps the whole description, while
// the QFX truncates it into NAME (32 chars) + MEMO. For every STMTTRN we look
// for the CSV row with:
//   1. the same posted date (QFX YYYYMMDD → CSV MM/DD/YYYY)
//   2. the same amount (decimal equality)
//   3. lowercase(NAME + MEMO) without whitespace as a PREFIX of the CSV
//      description without whitespace
// First row satisfying all three wins. No row → no match (not an error).
// A candidate whose CSV text is itself a strict prefix of the QFX text means
// the CSV lost characters, which breaks the whole model: fatal.

use crate::error::{FixerError, Result};
use crate::statement::{self, Field, FieldMap, RecordId, StatementVisitor};
use crate::tree::Tree;
use chrono::NaiveDate;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// YYYYMMDD, optional HHMMSS[.XXX], optional [offset:TZ]
static QFX_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{8})(?:\d{6}(?:\.\d{1,3})?)?(?:\[[+-]?\d+(?:\.\d+)?(?::\w+)?\])?$").unwrap()
});

// ============================================================================
// CSV SOURCE
// ============================================================================

/// Header names of the columns we need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvColumns {
    pub date: String,
    pub description: String,
    pub amount: String,
}

impl Default for CsvColumns {
    fn default() -> Self {
        CsvColumns {
            date: "Post Date".to_string(),
            description: "Description".to_string(),
            amount: "Amount".to_string(),
        }
    }
}

/// One row of the CSV export
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    /// Line in the CSV file (header is line 1)
    pub line: usize,
    pub date: String,
    pub description: String,
    pub amount: Decimal,
}

/// All rows of the CSV export, in file order. Read-only after loading.
#[derive(Debug, Clone, Default)]
pub struct CsvSource {
    pub rows: Vec<CsvRow>,
}

impl CsvSource {
    pub fn from_path(path: &Path, columns: &CsvColumns) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, columns)
    }

    /// Load rows; a missing column fails before any row is read
    pub fn from_reader<R: Read>(reader: R, columns: &CsvColumns) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let column_index = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| FixerError::Schema(format!("CSV file is missing expected field '{}'", name)))
        };

        let date_idx = column_index(&columns.date)?;
        let desc_idx = column_index(&columns.description)?;
        let amount_idx = column_index(&columns.amount)?;

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let line = idx + 2; // 1-indexed + header row

            let amount_text = record.get(amount_idx).unwrap_or("").trim();
            let amount = Decimal::from_str(amount_text).map_err(|_| {
                FixerError::Schema(format!(
                    "CSV line {}: '{}' is not a valid amount",
                    line, amount_text
                ))
            })?;

            rows.push(CsvRow {
                line,
                date: record.get(date_idx).unwrap_or("").trim().to_string(),
                description: record.get(desc_idx).unwrap_or("").to_string(),
                amount,
            });
        }

        debug!("Loaded {} CSV rows", rows.len());
        Ok(CsvSource { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// MATCH RESULT
// ============================================================================

/// Borrowed association RecordId → CSV row (or nothing)
#[derive(Debug, Clone, Default)]
pub struct MatchResult<'a> {
    rows: Vec<Option<&'a CsvRow>>,
}

impl<'a> MatchResult<'a> {
    pub fn row(&self, id: RecordId) -> Option<&'a CsvRow> {
        self.rows.get(id.0).copied().flatten()
    }

    pub fn matched_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }

    /// Number of records seen (matched or not)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn record(&mut self, id: RecordId, row: Option<&'a CsvRow>) {
        if self.rows.len() <= id.0 {
            self.rows.resize(id.0 + 1, None);
        }
        self.rows[id.0] = row;
    }
}

// ============================================================================
// CORRELATOR
// ============================================================================

pub struct Correlator<'a> {
    source: &'a CsvSource,
    matches: MatchResult<'a>,
}

impl<'a> Correlator<'a> {
    pub fn new(source: &'a CsvSource) -> Self {
        Correlator {
            source,
            matches: MatchResult::default(),
        }
    }

    /// Walk all records of the tree and return their matches
    pub fn build(tree: &mut Tree, source: &'a CsvSource) -> Result<MatchResult<'a>> {
        let mut correlator = Correlator::new(source);
        statement::walk(tree, &mut correlator)?;
        Ok(correlator.into_matches())
    }

    pub fn into_matches(self) -> MatchResult<'a> {
        self.matches
    }

    /// First row agreeing on date, amount and description prefix
    pub fn find_row(
        &self,
        date: &str,
        amount: Decimal,
        name: &str,
        memo: &str,
    ) -> Result<Option<&'a CsvRow>> {
        let source = self.source;
        let qfx_text = squash(&format!("{}{}", name, memo));
        let qfx_len = qfx_text.chars().count();

        for row in &source.rows {
            if row.date != date || row.amount != amount {
                continue;
            }

            let csv_text = squash(&row.description);
            if csv_text.starts_with(&qfx_text) {
                return Ok(Some(row));
            }

            // CSV is supposed to hold the untruncated text, never less
            if qfx_len > csv_text.chars().count() && qfx_text.starts_with(&csv_text) {
                return Err(FixerError::Invariant(format!(
                    "QFX text {:?} is longer than the CSV description on line {} ({:?})",
                    name.to_string() + memo,
                    row.line,
                    row.description
                )));
            }
        }

        Ok(None)
    }
}

impl<'a> StatementVisitor for Correlator<'a> {
    fn visit(&mut self, id: RecordId, fields: &mut FieldMap) -> Result<()> {
        let Some(posted) = fields.get(Field::DtPosted) else {
            warn!("Transaction #{} has no DTPOSTED, skipping CSV lookup", id.0);
            self.matches.record(id, None);
            return Ok(());
        };

        let date = qfx_date_to_csv(posted).ok_or_else(|| FixerError::InvalidField {
            record: id.0,
            field: Field::DtPosted.tag(),
            value: posted.to_string(),
        })?;

        let amount = match fields.get(Field::TrnAmt) {
            Some(text) => Decimal::from_str(text.trim()).map_err(|_| FixerError::InvalidField {
                record: id.0,
                field: Field::TrnAmt.tag(),
                value: text.to_string(),
            })?,
            None => Decimal::ZERO,
        };

        let row = self.find_row(
            &date,
            amount,
            fields.get_or_empty(Field::Name),
            fields.get_or_empty(Field::Memo),
        )?;

        match row {
            Some(row) => debug!("Transaction #{} matched CSV line {}", id.0, row.line),
            None => debug!("Transaction #{} ({} {}) has no CSV match", id.0, date, amount),
        }

        self.matches.record(id, row);
        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// "20140131120000[0:GMT]" → "01/31/2014"
pub fn qfx_date_to_csv(qfx_date: &str) -> Option<String> {
    let caps = QFX_DATE_RE.captures(qfx_date.trim())?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()?;
    Some(date.format("%m/%d/%Y").to_string())
}

/// Lowercase with all whitespace removed
fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
