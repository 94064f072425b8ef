// 🌳 Markup Tree - Builder and Serializer
// Materializes walker events into an ordered tree and writes it back out.
//
// Root layout (synthetic, never serialized as a tag):
//   [Metadata, Metadata, ..., Container(OFX)]

use crate::error::{FixerError, Result};
use crate::markup::{self, LineEvent, MarkupEvent};
use serde::{Deserialize, Serialize};

// ============================================================================
// NODES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    /// Nesting tag, children are containers or leaves
    Container { tag: String, children: Vec<Node> },

    /// Single-line tag with inline (unescaped) text
    Leaf { tag: String, text: String },

    /// `key:value` header pseudo-node, only ever at the root
    Metadata { key: String, value: String },
}

impl Node {
    pub fn container(tag: &str, children: Vec<Node>) -> Self {
        Node::Container {
            tag: tag.to_string(),
            children,
        }
    }

    pub fn leaf(tag: &str, text: &str) -> Self {
        Node::Leaf {
            tag: tag.to_string(),
            text: text.to_string(),
        }
    }

    /// Tag name (metadata nodes answer with their key)
    pub fn tag(&self) -> &str {
        match self {
            Node::Container { tag, .. } | Node::Leaf { tag, .. } => tag,
            Node::Metadata { key, .. } => key,
        }
    }

    pub fn is_container_named(&self, name: &str) -> bool {
        matches!(self, Node::Container { tag, .. } if tag == name)
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Container { children, .. } => children,
            _ => &[],
        }
    }

    /// Mutable children; `None` for leaves and metadata (they have none)
    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Container { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Text of the first leaf child with this tag
    pub fn leaf_text(&self, name: &str) -> Option<&str> {
        self.children().iter().find_map(|child| match child {
            Node::Leaf { tag, text } if tag == name => Some(text.as_str()),
            _ => None,
        })
    }
}

// ============================================================================
// TREE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Whatever the first line of the document uses
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(pos) if pos > 0 && text.as_bytes()[pos - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Metadata pseudo-nodes followed by exactly one top-level container
    pub root: Vec<Node>,
    #[serde(default)]
    pub line_ending: LineEnding,
}

impl Tree {
    /// Walk + build in one call
    pub fn parse(text: &str) -> Result<Tree> {
        let events = markup::tokenize(text)?;
        let mut tree = build(events)?;
        tree.line_ending = LineEnding::detect(text);
        Ok(tree)
    }

    /// Header values in encounter order
    pub fn metadata(&self) -> impl Iterator<Item = (&str, &str)> {
        self.root.iter().filter_map(|node| match node {
            Node::Metadata { key, value } => Some((key.as_str(), value.as_str())),
            _ => None,
        })
    }

    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata().find(|(key, _)| *key == name).map(|(_, v)| v)
    }

    /// The single top-level container (OFX)
    pub fn body(&self) -> Option<&Node> {
        self.root.iter().find(|n| matches!(n, Node::Container { .. }))
    }

    pub fn body_mut(&mut self) -> Option<&mut Node> {
        self.root
            .iter_mut()
            .find(|n| matches!(n, Node::Container { .. }))
    }

    /// Serialize back to markup
    pub fn to_markup(&self) -> String {
        let eol = self.line_ending.as_str();
        let mut out = String::new();

        let mut has_metadata = false;
        for (key, value) in self.metadata() {
            out.push_str(key);
            out.push(':');
            out.push_str(&markup::escape(value));
            out.push_str(eol);
            has_metadata = true;
        }

        // OFX header/body separator
        if has_metadata {
            out.push_str(eol);
        }

        if let Some(body) = self.body() {
            write_node(body, eol, &mut out);
        }

        out
    }
}

fn write_node(node: &Node, eol: &str, out: &mut String) {
    match node {
        Node::Container { tag, children } => {
            out.push('<');
            out.push_str(tag);
            out.push('>');
            out.push_str(eol);
            for child in children {
                write_node(child, eol, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
            out.push_str(eol);
        }
        Node::Leaf { tag, text } => {
            out.push('<');
            out.push_str(tag);
            out.push('>');
            out.push_str(&markup::escape(text));
            out.push_str(eol);
        }
        // Only valid at the root, written by to_markup
        Node::Metadata { .. } => {}
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Build a tree from walker events.
///
/// Shape rules: metadata only before the body, exactly one top-level
/// container, no leaves outside it.
pub fn build(events: Vec<LineEvent>) -> Result<Tree> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<(String, Vec<Node>)> = Vec::new();
    let mut seen_body = false;
    let mut last_line = 0;

    for LineEvent { line, event } in events {
        last_line = line;
        match event {
            MarkupEvent::Metadata { key, value } => {
                if seen_body || !stack.is_empty() {
                    return Err(FixerError::format(
                        line,
                        format!("header line {}:{} inside the document body", key, value),
                    ));
                }
                root.push(Node::Metadata {
                    key,
                    value: markup::unescape(&value),
                });
            }
            MarkupEvent::Open { tag } => {
                if stack.is_empty() && seen_body {
                    return Err(FixerError::format(
                        line,
                        format!("second top-level container <{}>", tag),
                    ));
                }
                stack.push((tag, Vec::new()));
            }
            MarkupEvent::Leaf { tag, text } => match stack.last_mut() {
                Some((_, children)) => children.push(Node::Leaf {
                    tag,
                    text: markup::unescape(&text),
                }),
                None => {
                    return Err(FixerError::format(
                        line,
                        format!("leaf <{}> outside of any container", tag),
                    ))
                }
            },
            MarkupEvent::Close { tag } => {
                let (open, children) = stack.pop().ok_or_else(|| {
                    FixerError::format(line, format!("close tag </{}> with no open container", tag))
                })?;
                if open != tag {
                    return Err(FixerError::format(
                        line,
                        format!("tag mismatch, cannot close <{}> with </{}>", open, tag),
                    ));
                }

                let node = Node::Container { tag, children };
                match stack.last_mut() {
                    Some((_, parent)) => parent.push(node),
                    None => {
                        root.push(node);
                        seen_body = true;
                    }
                }
            }
        }
    }

    if let Some((open, _)) = stack.last() {
        return Err(FixerError::format(
            last_line,
            format!("unexpected end of document, <{}> is still open", open),
        ));
    }
    if !seen_body {
        return Err(FixerError::format(last_line, "document has no top-level container"));
    }

    Ok(Tree {
        root,
        line_ending: LineEnding::Lf,
    })
}

// ============================================================================
// TESTS
// ============================================================================
