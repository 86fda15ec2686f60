//! Atlassian Document Format flattening.
//!
//! Jira returns rich text as a JSON node tree. [`AdfNode::from_value`] turns
//! that JSON into a typed tree without ever failing, and [`extract_text`]
//! walks it depth-first into plain text:
//!
//! | Node                                   | Contribution                   |
//! |----------------------------------------|--------------------------------|
//! | `text`                                 | its `text`                     |
//! | block types (`paragraph`, `heading`..) | children, newline separated    |
//! | `hardBreak`                            | `\n`                           |
//! | `mention`, `emoji`, `inlineCard`       | attribute text                 |
//! | anything else                          | children, concatenated         |
//! | malformed                              | nothing, counted               |

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdfKind {
    Doc,
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    ListItem,
    Blockquote,
    CodeBlock,
    Panel,
    Table,
    TableRow,
    TableHeader,
    TableCell,
    TaskList,
    TaskItem,
    DecisionList,
    DecisionItem,
    Rule,
    Text,
    HardBreak,
    Mention,
    Emoji,
    InlineCard,
    /// A type this crate does not know. Traversed as a plain container.
    Unknown(String),
    /// Not an object, or an object without a string `type`.
    Malformed,
}

impl AdfKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "doc" => Self::Doc,
            "paragraph" => Self::Paragraph,
            "heading" => Self::Heading,
            "bulletList" => Self::BulletList,
            "orderedList" => Self::OrderedList,
            "listItem" => Self::ListItem,
            "blockquote" => Self::Blockquote,
            "codeBlock" => Self::CodeBlock,
            "panel" => Self::Panel,
            "table" => Self::Table,
            "tableRow" => Self::TableRow,
            "tableHeader" => Self::TableHeader,
            "tableCell" => Self::TableCell,
            "taskList" => Self::TaskList,
            "taskItem" => Self::TaskItem,
            "decisionList" => Self::DecisionList,
            "decisionItem" => Self::DecisionItem,
            "rule" => Self::Rule,
            "text" => Self::Text,
            "hardBreak" => Self::HardBreak,
            "mention" => Self::Mention,
            "emoji" => Self::Emoji,
            "inlineCard" => Self::InlineCard,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Block nodes start on their own line.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Self::Paragraph
                | Self::Heading
                | Self::ListItem
                | Self::Blockquote
                | Self::CodeBlock
                | Self::Panel
                | Self::TableRow
                | Self::TaskItem
                | Self::DecisionItem
                | Self::Rule
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdfNode {
    pub kind: AdfKind,
    pub text: Option<String>,
    pub attrs: Option<Value>,
    pub content: Vec<AdfNode>,
}

impl AdfNode {
    pub fn new(kind: AdfKind) -> Self {
        Self {
            kind,
            text: None,
            attrs: None,
            content: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(AdfKind::Text)
        }
    }

    pub fn with_children(kind: AdfKind, content: Vec<AdfNode>) -> Self {
        Self {
            content,
            ..Self::new(kind)
        }
    }

    /// Build a node tree from Jira JSON. Never fails: anything that does not
    /// look like a node becomes [`AdfKind::Malformed`].
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::new(AdfKind::Malformed);
        };
        let Some(tag) = obj.get("type").and_then(Value::as_str) else {
            return Self::new(AdfKind::Malformed);
        };

        let content = obj
            .get("content")
            .and_then(Value::as_array)
            .map(|children| children.iter().map(Self::from_value).collect())
            .unwrap_or_default();

        Self {
            kind: AdfKind::from_tag(tag),
            text: obj.get("text").and_then(Value::as_str).map(str::to_string),
            attrs: obj.get("attrs").cloned(),
            content,
        }
    }

    fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.as_ref()?.get(key)?.as_str()
    }
}

/// Flattened text plus the number of nodes that had to be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extraction {
    pub text: String,
    pub malformed: usize,
}

pub fn extract_text(root: &AdfNode) -> Extraction {
    let mut walker = Walker::default();
    walker.visit(root);
    if walker.malformed > 0 {
        tracing::warn!(
            malformed = walker.malformed,
            "description contained malformed document nodes"
        );
    }
    Extraction {
        text: walker.out.trim_matches('\n').to_string(),
        malformed: walker.malformed,
    }
}

/// Flatten a raw Jira description: ADF objects are walked, plain strings
/// are used as-is.
pub fn extract_value(value: &Value) -> Extraction {
    match value {
        Value::String(s) => Extraction {
            text: s.clone(),
            malformed: 0,
        },
        other => extract_text(&AdfNode::from_value(other)),
    }
}

#[derive(Default)]
struct Walker {
    out: String,
    malformed: usize,
}

impl Walker {
    fn visit(&mut self, node: &AdfNode) {
        match &node.kind {
            AdfKind::Text => match &node.text {
                Some(text) => self.out.push_str(text),
                None => self.skip(node, "text node without text"),
            },
            AdfKind::HardBreak => self.out.push('\n'),
            AdfKind::Mention | AdfKind::Emoji => {
                let label = node
                    .attr_str("text")
                    .or_else(|| node.attr_str("shortName"));
                if let Some(label) = label {
                    self.out.push_str(label);
                }
            }
            AdfKind::InlineCard => {
                if let Some(url) = node.attr_str("url") {
                    self.out.push_str(url);
                }
            }
            AdfKind::Malformed => self.skip(node, "not a typed node"),
            kind if kind.is_block() => {
                self.line_break();
                self.children(node);
                self.line_break();
            }
            _ => self.children(node),
        }
    }

    fn children(&mut self, node: &AdfNode) {
        for child in &node.content {
            self.visit(child);
        }
    }

    fn line_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn skip(&mut self, node: &AdfNode, reason: &str) {
        self.malformed += 1;
        tracing::warn!(kind = ?node.kind, reason, "skipping malformed document node");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn para(text: &str) -> AdfNode {
        AdfNode::with_children(AdfKind::Paragraph, vec![AdfNode::text(text)])
    }

    #[test]
    fn test_paragraphs_separated_by_single_newline() {
        let doc = AdfNode::with_children(AdfKind::Doc, vec![para("Hello"), para("World")]);
        assert_eq!(extract_text(&doc).text, "Hello\nWorld");
    }

    #[test]
    fn test_unknown_type_passes_children_through() {
        let node = AdfNode::with_children(
            AdfKind::Unknown("futureWidget".into()),
            vec![AdfNode::text("X")],
        );
        let out = extract_text(&node);
        assert_eq!(out.text, "X");
        assert_eq!(out.malformed, 0);
    }

    #[test]
    fn test_repeated_extraction_is_identical() {
        let doc = AdfNode::from_value(&json!({
            "type": "doc",
            "content": [
                {"type": "heading", "attrs": {"level": 2}, "content": [{"type": "text", "text": "Bug"}]},
                {"type": "bulletList", "content": [
                    {"type": "listItem", "content": [para_json("one")]},
                    {"type": "listItem", "content": [para_json("two")]}
                ]}
            ]
        }));
        let first = extract_text(&doc);
        let second = extract_text(&doc);
        assert_eq!(first, second);
        assert_eq!(first.text, "Bug\none\ntwo");
    }

    fn para_json(text: &str) -> Value {
        json!({"type": "paragraph", "content": [{"type": "text", "text": text}]})
    }

    #[test]
    fn test_inline_nodes_concatenate() {
        let doc = AdfNode::from_value(&json!({
            "type": "doc",
            "content": [{"type": "paragraph", "content": [
                {"type": "text", "text": "Ping "},
                {"type": "mention", "attrs": {"id": "abc", "text": "@sam"}},
                {"type": "text", "text": " about "},
                {"type": "inlineCard", "attrs": {"url": "https://example.com/pr/1"}},
                {"type": "emoji", "attrs": {"shortName": ":tada:"}}
            ]}]
        }));
        assert_eq!(
            extract_text(&doc).text,
            "Ping @sam about https://example.com/pr/1:tada:"
        );
    }

    #[test]
    fn test_hard_break_emits_newline() {
        let doc = AdfNode::from_value(&json!({
            "type": "paragraph",
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "hardBreak"},
                {"type": "text", "text": "line two"}
            ]
        }));
        assert_eq!(extract_text(&doc).text, "line one\nline two");
    }

    #[test]
    fn test_malformed_nodes_contribute_nothing_and_are_counted() {
        let doc = AdfNode::from_value(&json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [
                    {"type": "text"},
                    {"type": "text", "text": "kept"}
                ]},
                "not a node",
                {"content": [{"type": "text", "text": "orphan"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "also kept"}]}
            ]
        }));
        let out = extract_text(&doc);
        assert_eq!(out.text, "kept\nalso kept");
        assert_eq!(out.malformed, 3);
    }

    #[test]
    fn test_code_block_and_rule_are_blocks() {
        let doc = AdfNode::from_value(&json!({
            "type": "doc",
            "content": [
                para_json("Steps:"),
                {"type": "codeBlock", "attrs": {"language": "sh"}, "content": [{"type": "text", "text": "make test"}]},
                {"type": "rule"},
                para_json("End")
            ]
        }));
        assert_eq!(extract_text(&doc).text, "Steps:\nmake test\nEnd");
    }

    #[test]
    fn test_table_rows_each_on_own_line() {
        let cell = |t: &str| json!({"type": "tableCell", "content": [{"type": "text", "text": t}]});
        let doc = AdfNode::from_value(&json!({
            "type": "table",
            "content": [
                {"type": "tableRow", "content": [cell("a"), cell("b")]},
                {"type": "tableRow", "content": [cell("c"), cell("d")]}
            ]
        }));
        assert_eq!(extract_text(&doc).text, "ab\ncd");
    }

    #[test]
    fn test_extract_value_uses_plain_strings_verbatim() {
        let out = extract_value(&json!("Just text\nwith lines\n"));
        assert_eq!(out.text, "Just text\nwith lines\n");
    }

    #[test]
    fn test_non_object_root_is_malformed() {
        let out = extract_value(&json!(42));
        assert_eq!(out.text, "");
        assert_eq!(out.malformed, 1);
    }

    #[test]
    fn test_from_value_keeps_unknown_tag() {
        let node = AdfNode::from_value(&json!({"type": "expand", "content": []}));
        assert_eq!(node.kind, AdfKind::Unknown("expand".into()));
    }
}
