// ⚙️ Run Configuration
// Everything one fixer run needs to know, independent of how it was invoked.

use crate::correlator::CsvColumns;
use std::fmt;
use std::path::{Path, PathBuf};

/// Only header VERSION we have checked the dialect against
pub const VALIDATED_VERSION: &str = "102";

/// A file, or stdin/stdout when given as "-"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoTarget {
    Std,
    Path(PathBuf),
}

impl IoTarget {
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            IoTarget::Std
        } else {
            IoTarget::Path(PathBuf::from(arg))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            IoTarget::Std => None,
            IoTarget::Path(path) => Some(path),
        }
    }
}

impl fmt::Display for IoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoTarget::Std => write!(f, "-"),
            IoTarget::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// QFX file to read (usually JPMC.QFX)
    pub input: IoTarget,

    /// Where the fixed QFX goes (default: stdout)
    pub output: IoTarget,

    /// Optional CSV export of the same transactions (usually JPMC.CSV)
    pub csv: Option<PathBuf>,

    /// Where to keep the intermediate tree (JSON); kept after the run
    pub temp: Option<PathBuf>,

    /// Stop before writing output so the intermediate file can be edited
    pub pause: bool,

    pub csv_columns: CsvColumns,

    pub expected_version: String,
}

impl RunConfig {
    pub fn new(input: IoTarget) -> Self {
        RunConfig {
            input,
            output: IoTarget::Std,
            csv: None,
            temp: None,
            pause: false,
            csv_columns: CsvColumns::default(),
            expected_version: VALIDATED_VERSION.to_string(),
        }
    }

    /// Builder pattern: output destination
    pub fn with_output(mut self, output: IoTarget) -> Self {
        self.output = output;
        self
    }

    /// Builder pattern: CSV export to correlate against
    pub fn with_csv(mut self, csv: PathBuf) -> Self {
        self.csv = Some(csv);
        self
    }

    /// Builder pattern: fixed intermediate file location
    pub fn with_temp(mut self, temp: PathBuf) -> Self {
        self.temp = Some(temp);
        self
    }

    pub fn with_pause(mut self, pause: bool) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_csv_columns(mut self, columns: CsvColumns) -> Self {
        self.csv_columns = columns;
        self
    }

    /// An intermediate file is only written when someone may look at it
    pub fn wants_intermediate(&self) -> bool {
        self.pause || self.temp.is_some()
    }
}
