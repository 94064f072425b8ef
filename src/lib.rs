// Chase QFX Fixer - Core Library
// Parser/serializer for the QFX dialect, statement walker, CSV correlator
// and the NAME/MEMO description fixer. The binary is a thin shell over
// `pipeline::run`.

pub mod error;
pub mod markup;
pub mod tree;
pub mod statement;
pub mod correlator;
pub mod fixer;
pub mod config;
pub mod pipeline;

// Re-export commonly used types
pub use error::FixerError;
pub use markup::{MarkupEvent, MarkupWalker, CONTAINER_TAGS};
pub use tree::{LineEnding, Node, Tree};
pub use statement::{Field, FieldMap, FieldValue, RecordId, StatementVisitor};
pub use correlator::{Correlator, CsvColumns, CsvRow, CsvSource, MatchResult};
pub use fixer::{fix, Correction, DescriptionFixer, FixOutcome, BANK_NAME_WIDTH};
pub use config::{IoTarget, RunConfig, VALIDATED_VERSION};
pub use pipeline::{fix_tree, run, RunSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
