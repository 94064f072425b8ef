// 📒 Statement Walker - Locate STMTTRN records and edit their fields in place
//
// Fixed path from the top-level container:
//   OFX / BANKMSGSRSV1 / STMTTRNRS / STMTRS / BANKTRANLIST / STMTTRN
//
// Visitors never see nodes. They get a FieldMap, and the walker reconciles
// the map back into the record afterwards.

use crate::error::Result;
use crate::tree::{Node, Tree};
use serde::{Deserialize, Serialize};

pub const STATEMENT_PATH: [&str; 5] = [
    "BANKMSGSRSV1",
    "STMTTRNRS",
    "STMTRS",
    "BANKTRANLIST",
    "STMTTRN",
];

// ============================================================================
// FIELDS
// ============================================================================

/// Known leaf fields of a STMTTRN record. Any other leaf is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    TrnType,
    DtPosted,
    DtUser,
    DtAvail,
    TrnAmt,
    FitId,
    CorrectFitId,
    CorrectAction,
    SrvrTid,
    CheckNum,
    RefNum,
    Sic,
    PayeeId,
    Name,
    Memo,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Field::TrnType,
        Field::DtPosted,
        Field::DtUser,
        Field::DtAvail,
        Field::TrnAmt,
        Field::FitId,
        Field::CorrectFitId,
        Field::CorrectAction,
        Field::SrvrTid,
        Field::CheckNum,
        Field::RefNum,
        Field::Sic,
        Field::PayeeId,
        Field::Name,
        Field::Memo,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Field::TrnType => "TRNTYPE",
            Field::DtPosted => "DTPOSTED",
            Field::DtUser => "DTUSER",
            Field::DtAvail => "DTAVAIL",
            Field::TrnAmt => "TRNAMT",
            Field::FitId => "FITID",
            Field::CorrectFitId => "CORRECTFITID",
            Field::CorrectAction => "CORRECTACTION",
            Field::SrvrTid => "SRVRTID",
            Field::CheckNum => "CHECKNUM",
            Field::RefNum => "REFNUM",
            Field::Sic => "SIC",
            Field::PayeeId => "PAYEEID",
            Field::Name => "NAME",
            Field::Memo => "MEMO",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.tag() == tag)
    }
}

/// State of one field in a FieldMap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FieldValue {
    /// Record has no such leaf (and nobody asked to add one)
    #[default]
    Absent,
    Present(String),
    /// A visitor asked for the leaf to be removed
    Cleared,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Present(text) => Some(text),
            _ => None,
        }
    }
}

/// Ordered mapping over the closed Field set (ordering = Field ordering)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMap {
    values: Vec<(Field, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        FieldMap {
            values: Field::ALL.iter().map(|f| (*f, FieldValue::Absent)).collect(),
        }
    }

    /// Load from a record's leaf children. First occurrence of a tag wins.
    pub fn from_record(record: &Node) -> Self {
        let mut map = FieldMap::new();
        for child in record.children() {
            if let Node::Leaf { tag, text } = child {
                if let Some(field) = Field::from_tag(tag) {
                    if map.value(field) == &FieldValue::Absent {
                        map.set(field, text.clone());
                    }
                }
            }
        }
        map
    }

    pub fn value(&self, field: Field) -> &FieldValue {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
            .unwrap_or(&FieldValue::Absent)
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.value(field).as_str()
    }

    /// Like `get`, but a missing field reads as ""
    pub fn get_or_empty(&self, field: Field) -> &str {
        self.get(field).unwrap_or("")
    }

    pub fn set(&mut self, field: Field, text: impl Into<String>) {
        self.put(field, FieldValue::Present(text.into()));
    }

    pub fn clear(&mut self, field: Field) {
        self.put(field, FieldValue::Cleared);
    }

    fn put(&mut self, field: Field, value: FieldValue) {
        match self.values.iter_mut().find(|(f, _)| *f == field) {
            Some((_, slot)) => *slot = value,
            None => {
                self.values.push((field, value));
                self.values.sort_by_key(|(f, _)| *f);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &FieldValue)> {
        self.values.iter().map(|(f, v)| (*f, v))
    }

    /// Write the map back into the record.
    ///
    /// Present → update the first leaf with that tag, or append one.
    /// Cleared → remove the first leaf with that tag.
    /// Absent  → nothing.
    pub fn apply_to(&self, record: &mut Node) {
        let Some(children) = record.children_mut() else {
            return;
        };

        for (field, value) in self.iter() {
            let position = children
                .iter()
                .position(|c| matches!(c, Node::Leaf { tag, .. } if tag == field.tag()));

            match (value, position) {
                (FieldValue::Present(new_text), Some(idx)) => {
                    if let Node::Leaf { text, .. } = &mut children[idx] {
                        text.clone_from(new_text);
                    }
                }
                (FieldValue::Present(new_text), None) => {
                    children.push(Node::leaf(field.tag(), new_text));
                }
                (FieldValue::Cleared, Some(idx)) => {
                    children.remove(idx);
                }
                (FieldValue::Cleared, None) | (FieldValue::Absent, _) => {}
            }
        }
    }
}

// ============================================================================
// VISITOR SEAM
// ============================================================================

/// Index of a record in document order. Stable for the whole run
/// because records are never added, removed, or reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub usize);

/// Something that looks at (and may edit) each transaction once per walk
pub trait StatementVisitor {
    fn visit(&mut self, id: RecordId, fields: &mut FieldMap) -> Result<()>;
}

// ============================================================================
// LOCATOR / WALKER
// ============================================================================

/// All transaction records, in document order
pub fn locate(tree: &Tree) -> Vec<&Node> {
    let mut level: Vec<&Node> = tree.body().into_iter().collect();
    for name in STATEMENT_PATH {
        level = level
            .into_iter()
            .flat_map(|node| node.children().iter())
            .filter(|child| child.is_container_named(name))
            .collect();
    }
    level
}

pub fn locate_mut(tree: &mut Tree) -> Vec<&mut Node> {
    let mut level: Vec<&mut Node> = tree.body_mut().into_iter().collect();
    for name in STATEMENT_PATH {
        level = level
            .into_iter()
            .filter_map(|node| node.children_mut())
            .flat_map(|children| children.iter_mut())
            .filter(|child| child.is_container_named(name))
            .collect();
    }
    level
}

/// Visit every record once, writing each visitor's edits back immediately.
/// Stops at the first visitor error.
pub fn walk<V: StatementVisitor + ?Sized>(tree: &mut Tree, visitor: &mut V) -> Result<usize> {
    let records = locate_mut(tree);
    let count = records.len();

    for (idx, record) in records.into_iter().enumerate() {
        let mut fields = FieldMap::from_record(record);
        visitor.visit(RecordId(idx), &mut fields)?;
        fields.apply_to(record);
    }

    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================
