// 🚀 Pipeline - One complete fixer run
//
//   read bytes → decode (Windows-1252) → parse → version check
//   → correlate with CSV (optional) → fix NAME/MEMO
//   → intermediate JSON (optional pause for manual edits)
//   → serialize → encode → write
//
// Sequential and all in memory. Any error aborts the run; nothing is
// written to the output unless every step succeeded.

use crate::config::{IoTarget, RunConfig};
use crate::correlator::{Correlator, CsvSource, MatchResult};
use crate::error::Result as FixerResult;
use crate::fixer::DescriptionFixer;
use crate::statement;
use crate::tree::Tree;
use anyhow::{Context, Result};
use encoding_rs::WINDOWS_1252;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// STMTTRN records found
    pub records: usize,

    /// Records matched to a CSV row (None when no CSV was given)
    pub correlated: Option<usize>,

    /// How each record was handled: rule id, "bank-split" or "unchanged"
    pub outcomes: BTreeMap<String, usize>,

    /// Intermediate tree file, if one was kept
    pub intermediate: Option<PathBuf>,
}

impl RunSummary {
    pub fn summary(&self) -> String {
        let fixed: usize = self
            .outcomes
            .iter()
            .filter(|(k, _)| k.as_str() != "unchanged")
            .map(|(_, v)| v)
            .sum();
        match self.correlated {
            Some(matched) => format!(
                "{} transactions, {} matched in CSV, {} rewritten",
                self.records, matched, fixed
            ),
            None => format!("{} transactions, {} rewritten", self.records, fixed),
        }
    }
}

// ============================================================================
// CORE (in memory)
// ============================================================================

/// Correlate (when a CSV source is given) and fix every record in place
pub fn fix_tree(tree: &mut Tree, csv: Option<&CsvSource>) -> FixerResult<RunSummary> {
    let matches = match csv {
        Some(source) => Correlator::build(tree, source)?,
        None => MatchResult::default(),
    };
    let correlated = csv.map(|_| matches.matched_count());

    let mut fixer = DescriptionFixer::new(matches);
    let records = statement::walk(tree, &mut fixer)?;

    Ok(RunSummary {
        records,
        correlated,
        outcomes: fixer.tally(),
        intermediate: None,
    })
}

/// Warn (never fail) when the header VERSION is not the validated one
pub fn check_version(tree: &Tree, expected: &str) -> bool {
    match tree.metadata_value("VERSION") {
        Some(version) if version.trim() == expected => true,
        Some(version) => {
            warn!(
                "QFX header VERSION is {}, only {} has been validated; continuing",
                version, expected
            );
            false
        }
        None => {
            warn!("QFX header has no VERSION, only {} has been validated; continuing", expected);
            false
        }
    }
}

// ============================================================================
// RUN
// ============================================================================

pub fn run(config: &RunConfig) -> Result<RunSummary> {
    info!("Reading QFX from {}", config.input);
    let raw = read_input(&config.input)?;
    let text = decode(&raw);

    let mut tree = Tree::parse(&text)
        .with_context(|| format!("Failed to parse QFX file {}", config.input))?;
    check_version(&tree, &config.expected_version);

    let csv = match &config.csv {
        Some(path) => {
            let source = CsvSource::from_path(path, &config.csv_columns)
                .with_context(|| format!("Failed to load CSV file {}", path.display()))?;
            info!("Loaded {} CSV rows from {}", source.len(), path.display());
            Some(source)
        }
        None => None,
    };

    let mut summary = fix_tree(&mut tree, csv.as_ref())
        .with_context(|| format!("Failed to fix transactions in {}", config.input))?;
    info!("{}", summary.summary());

    if config.wants_intermediate() {
        let (tree_back, kept) = round_trip_intermediate(tree, config)?;
        tree = tree_back;
        summary.intermediate = kept;
    }

    let (bytes, lossy) = encode(&tree.to_markup());
    if lossy {
        warn!("Some characters are not representable in Windows-1252 and were written as character references");
    }
    write_output(&config.output, &bytes)?;
    info!("Wrote fixed QFX to {}", config.output);

    Ok(summary)
}

/// Write the tree as JSON, optionally wait for manual edits, and read it back
fn round_trip_intermediate(tree: Tree, config: &RunConfig) -> Result<(Tree, Option<PathBuf>)> {
    // The tempfile guard must outlive the reload; it deletes the file on drop
    let (path, _guard) = match &config.temp {
        Some(path) => (path.clone(), None),
        None => {
            let file = tempfile::Builder::new()
                .prefix("fixqfx-")
                .suffix(".json")
                .tempfile()
                .context("Failed to create temporary file")?;
            (file.path().to_path_buf(), Some(file))
        }
    };

    save_intermediate(&tree, &path)?;

    if !config.pause {
        return Ok((tree, Some(path)));
    }

    pause_for_edit(&path)?;
    let edited = load_intermediate(&path)?;
    let kept = config.temp.as_ref().map(|_| path);
    Ok((edited, kept))
}

pub fn save_intermediate(tree: &Tree, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create intermediate file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, tree)
        .with_context(|| format!("Failed to write intermediate file: {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

pub fn load_intermediate(path: &Path) -> Result<Tree> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open intermediate file: {}", path.display()))?;
    let tree: Tree = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse intermediate file: {}", path.display()))?;
    Ok(tree)
}

fn pause_for_edit(path: &Path) -> Result<()> {
    eprintln!("Temporary file located at: {}", path.display());
    eprint!("Pausing in case you want to modify it with other tools. Press enter to continue...");
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

// ============================================================================
// I/O + ENCODING
// ============================================================================

fn read_input(input: &IoTarget) -> Result<Vec<u8>> {
    match input {
        IoTarget::Std => {
            let mut bytes = Vec::new();
            io::stdin()
                .read_to_end(&mut bytes)
                .context("Failed to read QFX from stdin")?;
            Ok(bytes)
        }
        IoTarget::Path(path) => {
            fs::read(path).with_context(|| format!("Failed to open file: {}", path.display()))
        }
    }
}

fn write_output(output: &IoTarget, bytes: &[u8]) -> Result<()> {
    match output {
        IoTarget::Std => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            lock.write_all(bytes).context("Failed to write to stdout")?;
            lock.flush()?;
        }
        IoTarget::Path(path) => {
            fs::write(path, bytes)
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
        }
    }
    Ok(())
}

/// The export is Windows-1252; every byte maps to a char, so this cannot fail
pub fn decode(bytes: &[u8]) -> String {
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Returns the bytes and whether any char needed a numeric reference
pub fn encode(text: &str) -> (Vec<u8>, bool) {
    let (bytes, _, lossy) = WINDOWS_1252.encode(text);
    (bytes.into_owned(), lossy)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::CsvColumns;
    use crate::statement::locate;
    use tempfile::TempDir;

    const QFX: &str = "OFXHEADER:100\r
DATA:OFXSGML\r
VERSION:102\r
\r
<OFX>\r
<BANKMSGSRSV1>\r
<STMTTRNRS>\r
<TRNUID>1\r
<STMTRS>\r
<CURDEF>USD\r
<BANKTRANLIST>\r
<STMTTRN>\r
<TRNTYPE>DEBIT\r
<DTPOSTED>20140131120000[0:GMT]\r
<TRNAMT>-40.00\r
<FITID>1\r
<NAME>ATM WITHDRAWAL\r
<MEMO>123456  01/3110550 NE 8TH ST B\r
</STMTTRN>\r
<STMTTRN>\r
<TRNTYPE>DEBIT\r
<DTPOSTED>20140130120000[0:GMT]\r
<TRNAMT>-75.25\r
<FITID>2\r
<NAME>Online Payment 1234567890 To Acm\r
<MEMO>e Corporation Of America\r
</STMTTRN>\r
<STMTTRN>\r
<TRNTYPE>DEBIT\r
<DTPOSTED>20140129120000[0:GMT]\r
<TRNAMT>-5.00\r
<FITID>3\r
<NAME>CAF&amp;Eacute; NOIR\r
<MEMO>SEATTLE WA\r
</STMTTRN>\r
</BANKTRANLIST>\r
</STMTRS>\r
</STMTTRNRS>\r
</BANKMSGSRSV1>\r
</OFX>\r
";

    const CSV: &str = "Post Date,Description,Amount
01/31/2014,\"ATM WITHDRAWAL                       123456  01/3110550 NE 8TH ST BELLEVUE WA\",-40.00
01/30/2014,\"Online Payment 1234567890 To Acme Corporation Of America 01/30\",-75.25
";

    fn names(tree: &Tree) -> Vec<(String, String)> {
        locate(tree)
            .iter()
            .map(|r| {
                (
                    r.leaf_text("NAME").unwrap_or("").to_string(),
                    r.leaf_text("MEMO").unwrap_or("").to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_fix_tree_without_csv() {
        let mut tree = Tree::parse(QFX).unwrap();
        let summary = fix_tree(&mut tree, None).unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.correlated, None);
        assert_eq!(summary.outcomes.get("atm-withdrawal"), Some(&1));
        assert_eq!(summary.outcomes.get("unchanged"), Some(&2));

        let fixed = names(&tree);
        assert_eq!(fixed[0].0, "ATM Withdrawal");
        assert_eq!(fixed[0].1, "123456 01/31 10550 NE 8TH ST B");
        // truncated bill pay can't be fixed without the CSV text
        assert_eq!(fixed[1].0, "Online Payment 1234567890 To Acm");
    }

    #[test]
    fn test_run_summary_json() {
        let mut tree = Tree::parse(QFX).unwrap();
        let summary = fix_tree(&mut tree, None).unwrap();

        let json = serde_json::to_string(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["records"], 3);
        assert!(value["correlated"].is_null());
        assert_eq!(value["outcomes"]["unchanged"], 2);

        let back: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_fix_tree_with_csv() {
        let mut tree = Tree::parse(QFX).unwrap();
        let csv = CsvSource::from_reader(CSV.as_bytes(), &CsvColumns::default()).unwrap();
        let summary = fix_tree(&mut tree, Some(&csv)).unwrap();

        assert_eq!(summary.correlated, Some(2));

        let fixed = names(&tree);
        assert_eq!(fixed[0].1, "123456 01/31 10550 NE 8TH ST BELLEVUE WA");
        assert_eq!(
            fixed[1],
            (
                "Acme Corporation Of America".to_string(),
                "Online payment 1234567890 on 01/30".to_string()
            )
        );
        assert_eq!(fixed[2].0, "CAF&Eacute; NOIR");

        println!("✅ Pipeline test passed: {}", summary.summary());
    }

    #[test]
    fn test_untouched_structure_survives() {
        let mut tree = Tree::parse(QFX).unwrap();
        fix_tree(&mut tree, None).unwrap();
        let out = tree.to_markup();

        assert!(out.starts_with("OFXHEADER:100\r\nDATA:OFXSGML\r\nVERSION:102\r\n\r\n<OFX>\r\n"));
        assert!(out.contains("<FITID>3\r\n<NAME>CAF&amp;Eacute; NOIR\r\n<MEMO>SEATTLE WA\r\n"));
        assert!(out.contains("<NAME>ATM Withdrawal\r\n"));
    }

    #[test]
    fn test_check_version() {
        let tree = Tree::parse(QFX).unwrap();
        assert!(check_version(&tree, "102"));
        assert!(!check_version(&tree, "103"));

        let bare = Tree::parse("<OFX>\n</OFX>\n").unwrap();
        assert!(!check_version(&bare, "102"));
    }

    #[test]
    fn test_windows_1252_round_trip() {
        let bytes = b"<NAME>CAF\xC9 \x80\n";
        let text = decode(bytes);
        assert_eq!(text, "<NAME>CAFÉ €\n");

        let (back, lossy) = encode(&text);
        assert_eq!(back, bytes.to_vec());
        assert!(!lossy);

        let (_, lossy) = encode("日本");
        assert!(lossy);
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = TempDir::new().unwrap();
        let qfx_path = dir.path().join("JPMC.QFX");
        let csv_path = dir.path().join("JPMC.CSV");
        let out_path = dir.path().join("JPMC_fixed.QFX");
        let temp_path = dir.path().join("JPMC.json");
        fs::write(&qfx_path, QFX).unwrap();
        fs::write(&csv_path, CSV).unwrap();

        let config = RunConfig::new(IoTarget::Path(qfx_path))
            .with_output(IoTarget::Path(out_path.clone()))
            .with_csv(csv_path)
            .with_temp(temp_path.clone());

        let summary = run(&config).unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.intermediate, Some(temp_path.clone()));

        let written = decode(&fs::read(&out_path).unwrap());
        let reparsed = Tree::parse(&written).unwrap();
        assert_eq!(names(&reparsed)[1].0, "Acme Corporation Of America");

        // the intermediate file holds the fixed tree
        let intermediate = load_intermediate(&temp_path).unwrap();
        assert_eq!(intermediate, reparsed);
    }

    #[test]
    fn test_run_fails_without_output_on_bad_markup() {
        let dir = TempDir::new().unwrap();
        let qfx_path = dir.path().join("broken.qfx");
        let out_path = dir.path().join("out.qfx");
        fs::write(&qfx_path, "<OFX>\n<STMTRS>\n</OFX>\n").unwrap();

        let config = RunConfig::new(IoTarget::Path(qfx_path))
            .with_output(IoTarget::Path(out_path.clone()));

        let err = run(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("tag mismatch"));
        assert!(!out_path.exists());
    }

    #[test]
    fn test_run_fails_on_missing_csv_column() {
        let dir = TempDir::new().unwrap();
        let qfx_path = dir.path().join("JPMC.QFX");
        let csv_path = dir.path().join("JPMC.CSV");
        fs::write(&qfx_path, QFX).unwrap();
        fs::write(&csv_path, "Date,Description,Amount\n").unwrap();

        let config = RunConfig::new(IoTarget::Path(qfx_path))
            .with_output(IoTarget::Path(dir.path().join("out.qfx")))
            .with_csv(csv_path);

        let err = run(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("Post Date"));
    }
}
