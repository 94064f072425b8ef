// 🏷️ Markup Walker - QFX (OFX 1.x SGML) line tokenizer
// One structural event per non-blank line, with a tag stack for balance checks.
//
// Line grammar:
//   key:value      → Metadata
//   <TAG>          → Open   (TAG is a container)
//   <TAG>text      → Leaf   (any other TAG, self-closes on the same line)
//   </TAG>         → Close  (must match the innermost open container)

use crate::error::{FixerError, Result};
use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// TAG CLASSIFICATION
// ============================================================================

/// Tags that introduce nesting and need a matching close tag.
/// Everything else is a leaf. This is fixed knowledge of the Chase dialect.
pub const CONTAINER_TAGS: [&str; 13] = [
    "AVAILBAL",
    "BANKACCTFROM",
    "BANKMSGSRSV1",
    "BANKTRANLIST",
    "FI",
    "LEDGERBAL",
    "OFX",
    "SIGNONMSGSRSV1",
    "SONRS",
    "STATUS",
    "STMTRS",
    "STMTTRN",
    "STMTTRNRS",
];

pub fn is_container(tag: &str) -> bool {
    CONTAINER_TAGS.contains(&tag)
}

static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^:<]+):(.*)$").unwrap());
static START_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<([^/>]+)>(.*)$").unwrap());
static END_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^</([^/>]+)>$").unwrap());

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    Metadata { key: String, value: String },
    Open { tag: String },
    Leaf { tag: String, text: String },
    Close { tag: String },
}

/// An event plus the 1-based line it came from (for diagnostics)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    pub line: usize,
    pub event: MarkupEvent,
}

// ============================================================================
// WALKER
// ============================================================================

/// Parser context for one document. Owns the open-container stack;
/// nothing is shared between documents.
#[derive(Debug, Default)]
pub struct MarkupWalker {
    stack: Vec<String>,
    line_number: usize,
}

impl MarkupWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently open containers, outermost first
    pub fn open_tags(&self) -> &[String] {
        &self.stack
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Feed one physical line. Blank lines yield `None`.
    ///
    /// Text is passed through raw (still escaped); the tree builder unescapes.
    pub fn handle_line(&mut self, raw: &str) -> Result<Option<MarkupEvent>> {
        self.line_number += 1;

        let line = raw.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let event = if let Some(caps) = META_RE.captures(line) {
            MarkupEvent::Metadata {
                key: caps[1].to_string(),
                value: caps[2].to_string(),
            }
        } else if let Some(caps) = START_TAG_RE.captures(line) {
            let tag = caps[1].to_string();
            if is_container(&tag) {
                if !caps[2].trim().is_empty() {
                    trace!(
                        "line {}: discarding text after container <{}>",
                        self.line_number,
                        tag
                    );
                }
                self.stack.push(tag.clone());
                MarkupEvent::Open { tag }
            } else {
                MarkupEvent::Leaf {
                    tag,
                    text: caps[2].to_string(),
                }
            }
        } else if let Some(caps) = END_TAG_RE.captures(line) {
            let tag = caps[1].to_string();
            match self.stack.pop() {
                Some(open) if open == tag => MarkupEvent::Close { tag },
                Some(open) => {
                    return Err(FixerError::format(
                        self.line_number,
                        format!("tag mismatch, cannot close <{}> with </{}>", open, tag),
                    ))
                }
                None => {
                    return Err(FixerError::format(
                        self.line_number,
                        format!("close tag </{}> with no open container", tag),
                    ))
                }
            }
        } else {
            return Err(FixerError::format(
                self.line_number,
                format!("unrecognized line: {:?}", line),
            ));
        };

        trace!("line {}: {:?}", self.line_number, event);
        Ok(Some(event))
    }

    /// End of input: every container must have been closed
    pub fn finish(self) -> Result<()> {
        match self.stack.last() {
            None => Ok(()),
            Some(open) => Err(FixerError::format(
                self.line_number,
                format!("unexpected end of document, <{}> is still open", open),
            )),
        }
    }
}

/// Tokenize a whole document
pub fn tokenize(text: &str) -> Result<Vec<LineEvent>> {
    let mut walker = MarkupWalker::new();
    let mut events = Vec::new();

    for raw in text.lines() {
        if let Some(event) = walker.handle_line(raw)? {
            events.push(LineEvent {
                line: walker.line_number(),
                event,
            });
        }
    }

    walker.finish()?;
    Ok(events)
}

// ============================================================================
// INLINE ESCAPING
// ============================================================================

/// Decode character references exactly once.
/// "&amp;lt;" becomes "&lt;", never "<". Unknown entities are kept verbatim.
pub fn unescape(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Escape text for output: `&`, `<` and `>` only, as the export does
pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

// ============================================================================
// TESTS
// ============================================================================
