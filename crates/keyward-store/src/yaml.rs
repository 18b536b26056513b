//! Anchor-preserving YAML node codec.
//!
//! The key-access document cross-references key entries from rule key groups
//! through YAML anchors (`- &user_alice age1...`) and aliases
//! (`- *user_alice`). Generic serde YAML loses anchor names, so the document
//! is read into a small node tree that keeps anchors, aliases, scalar styles
//! and mapping order, and written back by a deterministic emitter.
//!
//! The emitter uses a fixed layout: mapping entries indented by two spaces,
//! sequence dashes indented by two spaces under their parent key and item
//! content by four:
//!
//! ```yaml
//! keys:
//!   - &host_h1 age1...
//! creation_rules:
//!   - path_regex: secrets/hosts/h1\.yaml$
//!     key_groups:
//!       - age:
//!           - *host_h1
//! ```
//!
//! Comments and tags are not retained.

use std::collections::{HashMap, VecDeque};

use yaml_rust2::parser::{Event, EventReceiver, Parser};
use yaml_rust2::scanner::{Scanner, TScalarStyle, TokenType};

use crate::error::{Result, StoreError};

/// How a scalar is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

/// A scalar with its presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    pub value: String,
    pub style: ScalarStyle,
    pub anchor: Option<String>,
}

impl Scalar {
    /// A string scalar, plain when that reads back as the same string,
    /// single-quoted otherwise.
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        let style = if plain_is_string(&value) {
            ScalarStyle::Plain
        } else {
            ScalarStyle::SingleQuoted
        };
        Self {
            value,
            style,
            anchor: None,
        }
    }

    /// Attach an anchor.
    pub fn anchored(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }
}

/// A YAML node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(Scalar),
    /// Reference to an anchor defined earlier in the document.
    Alias(String),
    Sequence {
        items: Vec<Node>,
        anchor: Option<String>,
    },
    /// Mappings with scalar keys only, in document order.
    Mapping {
        entries: Vec<(String, Node)>,
        anchor: Option<String>,
    },
}

impl Node {
    /// An empty, unanchored mapping.
    pub fn empty_mapping() -> Self {
        Node::Mapping {
            entries: Vec::new(),
            anchor: None,
        }
    }

    /// An unanchored sequence.
    pub fn sequence(items: Vec<Node>) -> Self {
        Node::Sequence {
            items,
            anchor: None,
        }
    }

    /// An unanchored mapping.
    pub fn mapping(entries: Vec<(String, Node)>) -> Self {
        Node::Mapping {
            entries,
            anchor: None,
        }
    }

    /// Short description of the node kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "scalar",
            Node::Alias(_) => "alias",
            Node::Sequence { .. } => "sequence",
            Node::Mapping { .. } => "mapping",
        }
    }

    /// Look up a mapping entry by key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping { entries, .. } => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(s)
            if s.style == ScalarStyle::Plain && matches!(s.value.as_str(), "" | "~" | "null" | "Null" | "NULL"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a single YAML document.
///
/// An empty document (or an explicit null) loads as an empty mapping.
pub fn parse(text: &str) -> Result<Node> {
    let mut builder = TreeBuilder::new(anchor_names(text));
    Parser::new(text.chars())
        .load(&mut builder, false)
        .map_err(|e| StoreError::Yaml(e.to_string()))?;

    if let Some(err) = builder.error {
        return Err(err);
    }
    match builder.root {
        Some(node) if !node.is_null() => Ok(node),
        _ => Ok(Node::empty_mapping()),
    }
}

/// Anchor names in order of appearance. The parser only reports numeric
/// anchor ids, one fresh id per anchor definition, in the same order.
fn anchor_names(text: &str) -> VecDeque<String> {
    Scanner::new(text.chars())
        .filter_map(|token| match token.1 {
            TokenType::Anchor(name) => Some(name),
            _ => None,
        })
        .collect()
}

enum Frame {
    Sequence {
        items: Vec<Node>,
        anchor: Option<String>,
    },
    Mapping {
        entries: Vec<(String, Node)>,
        key: Option<String>,
        anchor: Option<String>,
    },
}

struct TreeBuilder {
    pending_anchors: VecDeque<String>,
    anchors: HashMap<usize, String>,
    stack: Vec<Frame>,
    root: Option<Node>,
    error: Option<StoreError>,
}

impl TreeBuilder {
    fn new(pending_anchors: VecDeque<String>) -> Self {
        Self {
            pending_anchors,
            anchors: HashMap::new(),
            stack: Vec::new(),
            root: None,
            error: None,
        }
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(StoreError::Yaml(message));
        }
    }

    fn define_anchor(&mut self, id: usize) -> Option<String> {
        if id == 0 {
            return None;
        }
        match self.pending_anchors.pop_front() {
            Some(name) => {
                self.anchors.insert(id, name.clone());
                Some(name)
            }
            None => {
                self.fail(format!("anchor #{id} has no name"));
                None
            }
        }
    }

    fn push(&mut self, node: Node) {
        let problem = match self.stack.last_mut() {
            None if self.root.is_some() => Some("multiple root nodes".to_string()),
            None => {
                self.root = Some(node);
                None
            }
            Some(Frame::Sequence { items, .. }) => {
                items.push(node);
                None
            }
            Some(Frame::Mapping { entries, key, .. }) => match (key.take(), node) {
                (Some(k), node) => {
                    entries.push((k, node));
                    None
                }
                (None, Node::Scalar(scalar)) => {
                    *key = Some(scalar.value);
                    None
                }
                (None, other) => Some(format!("unsupported {} as mapping key", other.kind())),
            },
        };
        if let Some(message) = problem {
            self.fail(message);
        }
    }
}

impl EventReceiver for TreeBuilder {
    fn on_event(&mut self, event: Event) {
        if self.error.is_some() {
            return;
        }
        match event {
            Event::Scalar(value, style, anchor_id, ..) => {
                let anchor = self.define_anchor(anchor_id);
                let style = match style {
                    TScalarStyle::Plain => ScalarStyle::Plain,
                    TScalarStyle::SingleQuoted => ScalarStyle::SingleQuoted,
                    TScalarStyle::DoubleQuoted => ScalarStyle::DoubleQuoted,
                    TScalarStyle::Literal => ScalarStyle::Literal,
                    _ => ScalarStyle::Folded,
                };
                self.push(Node::Scalar(Scalar {
                    value,
                    style,
                    anchor,
                }));
            }
            Event::Alias(id) => match self.anchors.get(&id).cloned() {
                Some(name) => self.push(Node::Alias(name)),
                None => self.fail(format!("alias to unknown anchor #{id}")),
            },
            Event::SequenceStart(anchor_id, ..) => {
                let anchor = self.define_anchor(anchor_id);
                self.stack.push(Frame::Sequence {
                    items: Vec::new(),
                    anchor,
                });
            }
            Event::MappingStart(anchor_id, ..) => {
                let anchor = self.define_anchor(anchor_id);
                self.stack.push(Frame::Mapping {
                    entries: Vec::new(),
                    key: None,
                    anchor,
                });
            }
            Event::SequenceEnd | Event::MappingEnd => match self.stack.pop() {
                Some(Frame::Sequence { items, anchor }) => {
                    self.push(Node::Sequence { items, anchor })
                }
                Some(Frame::Mapping {
                    entries, anchor, ..
                }) => self.push(Node::Mapping { entries, anchor }),
                None => self.fail("unbalanced collection end".to_string()),
            },
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emitting
// ─────────────────────────────────────────────────────────────────────────────

/// Emit a node as a YAML document.
pub fn emit(node: &Node) -> String {
    let mut out = String::new();
    match node {
        Node::Mapping { entries, anchor } if !entries.is_empty() => {
            if let Some(anchor) = anchor {
                out.push('&');
                out.push_str(anchor);
                out.push('\n');
            }
            emit_entries(entries, 0, &mut out);
        }
        Node::Sequence { items, anchor } if !items.is_empty() => {
            if let Some(anchor) = anchor {
                out.push('&');
                out.push_str(anchor);
                out.push('\n');
            }
            emit_items(items, 0, &mut out);
        }
        other => {
            emit_inline(other, 0, &mut out);
        }
    }
    out
}

fn indent(out: &mut String, width: usize) {
    out.extend(std::iter::repeat(' ').take(width));
}

/// Mapping entries, each starting on a fresh line at column `col`.
fn emit_entries(entries: &[(String, Node)], col: usize, out: &mut String) {
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            indent(out, col);
        }
        emit_entry(key, value, col, out);
    }
}

/// One `key: value` entry, the cursor already at column `col`.
fn emit_entry(key: &str, value: &Node, col: usize, out: &mut String) {
    out.push_str(&format_scalar(&Scalar::string(key)));
    out.push(':');
    match value {
        Node::Mapping { entries, anchor } if !entries.is_empty() => {
            push_anchor_suffix(anchor, out);
            out.push('\n');
            indent(out, col + 2);
            emit_entries(entries, col + 2, out);
        }
        Node::Sequence { items, anchor } if !items.is_empty() => {
            push_anchor_suffix(anchor, out);
            out.push('\n');
            indent(out, col + 2);
            emit_items(items, col + 2, out);
        }
        other => {
            out.push(' ');
            emit_inline(other, col + 2, out);
        }
    }
}

/// Sequence items, each dash at column `col`.
fn emit_items(items: &[Node], col: usize, out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            indent(out, col);
        }
        out.push_str("- ");
        emit_inline(item, col + 2, out);
    }
}

/// A node written where the cursor already sits at column `col`.
fn emit_inline(node: &Node, col: usize, out: &mut String) {
    match node {
        Node::Scalar(scalar) => {
            if let Some(anchor) = &scalar.anchor {
                out.push('&');
                out.push_str(anchor);
                out.push(' ');
            }
            out.push_str(&format_scalar(scalar));
            out.push('\n');
        }
        Node::Alias(name) => {
            out.push('*');
            out.push_str(name);
            out.push('\n');
        }
        Node::Sequence { items, anchor } => {
            if let Some(anchor) = anchor {
                out.push('&');
                out.push_str(anchor);
                if items.is_empty() {
                    out.push(' ');
                } else {
                    out.push('\n');
                    indent(out, col);
                }
            }
            if items.is_empty() {
                out.push_str("[]\n");
            } else {
                emit_items(items, col, out);
            }
        }
        Node::Mapping { entries, anchor } => {
            if let Some(anchor) = anchor {
                out.push('&');
                out.push_str(anchor);
                if entries.is_empty() {
                    out.push(' ');
                } else {
                    out.push('\n');
                    indent(out, col);
                }
            }
            if entries.is_empty() {
                out.push_str("{}\n");
            } else {
                emit_entries(entries, col, out);
            }
        }
    }
}

fn push_anchor_suffix(anchor: &Option<String>, out: &mut String) {
    if let Some(anchor) = anchor {
        out.push_str(" &");
        out.push_str(anchor);
    }
}

fn format_scalar(scalar: &Scalar) -> String {
    let value = scalar.value.as_str();
    if value.contains(['\n', '\r', '\t']) || value.chars().any(char::is_control) {
        return double_quoted(value);
    }
    match scalar.style {
        ScalarStyle::Plain if plain_syntax_ok(value) => value.to_string(),
        ScalarStyle::DoubleQuoted => double_quoted(value),
        _ => format!("'{}'", value.replace('\'', "''")),
    }
}

fn double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Whether `value` can be written as a plain scalar at all.
fn plain_syntax_ok(value: &str) -> bool {
    const INDICATORS: &[char] = &[
        '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@',
        '`',
    ];

    let Some(first) = value.chars().next() else {
        return false;
    };
    if INDICATORS.contains(&first) || first.is_whitespace() {
        return false;
    }
    if value.ends_with(char::is_whitespace) || value.ends_with(':') {
        return false;
    }
    !(value.contains(": ") || value.contains(" #"))
}

/// Whether `value` written plain reads back as the same string (and not as
/// a null, boolean or number).
fn plain_is_string(value: &str) -> bool {
    if !plain_syntax_ok(value) {
        return false;
    }
    let lower = value.to_ascii_lowercase();
    if matches!(
        lower.as_str(),
        "~" | "null" | "true" | "false" | "yes" | "no" | "on" | "off" | "y" | "n"
    ) {
        return false;
    }
    let numeric = value.trim_start_matches(['+', '-']);
    if numeric.parse::<f64>().is_ok() || lower.starts_with("0x") || lower.starts_with("0o") {
        return false;
    }
    !matches!(lower.as_str(), ".inf" | "-.inf" | "+.inf" | ".nan")
}
