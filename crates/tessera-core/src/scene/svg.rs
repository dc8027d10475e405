//! SVG serialization of a [`Scene`] and parsing of SVG markup strings.

use std::fmt::Write as _;

use serde_json::Value;
use svg::{
    Document, Node,
    node::{Text as SvgText, element::Element, element::tag::Type},
    parser::Event,
};

use super::{MarkupNode, NodeId, Scene, SceneError};

/// Attribute names markup strings use for selectors. The `@` prefix is not
/// a valid XML name start, so it is rewritten before parsing.
const SELECTOR_ATTRIBUTE: &str = "data-tessera-selector";
const GROUP_SELECTOR_ATTRIBUTE: &str = "data-tessera-group-selector";

impl Scene {
    /// Serializes the whole scene as an SVG document.
    pub fn to_document(&self) -> Document {
        let root = self.root();
        let mut document = Document::new();
        if let Some(node) = self.node(root) {
            for (name, value) in &node.attributes {
                document.assign(name.as_str(), value.as_str());
            }
            for child in &node.children {
                if let Some(element) = self.to_element(*child) {
                    document.append(element);
                }
            }
        }
        document
    }

    /// Serializes the whole scene as SVG text.
    pub fn to_svg_string(&self) -> String {
        self.to_document().to_string()
    }

    /// Serializes the subtree rooted at `id`.
    pub fn to_element(&self, id: NodeId) -> Option<Element> {
        let node = self.node(id)?;
        let mut element = Element::new(node.tag.as_str());
        for (name, value) in &node.attributes {
            element.assign(name.as_str(), value.as_str());
        }
        if let Some(text) = &node.text {
            element.append(SvgText::new(text.as_str()));
        }
        for child in &node.children {
            if let Some(child) = self.to_element(*child) {
                element.append(child);
            }
        }
        Some(element)
    }

    /// Short textual outline of a subtree, one node per line. Used in logs
    /// and test failure messages.
    pub fn outline(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_outline(id, 0, &mut out);
        out
    }

    fn write_outline(&self, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        let _ = write!(out, "{:indent$}<{}", "", node.tag, indent = depth * 2);
        for (name, value) in &node.attributes {
            let _ = write!(out, " {name}=\"{value}\"");
        }
        out.push_str(">\n");
        for child in &node.children {
            self.write_outline(*child, depth + 1, out);
        }
    }
}

/// Parses an SVG markup string into markup descriptors.
///
/// `@selector` and `@group-selector` attributes become selectors and
/// `class` becomes the class name. Whitespace-only text is ignored.
pub(super) fn parse_markup(markup: &str) -> Result<Vec<MarkupNode>, SceneError> {
    let source = markup
        .replace("@group-selector=", &format!("{GROUP_SELECTOR_ATTRIBUTE}="))
        .replace("@selector=", &format!("{SELECTOR_ATTRIBUTE}="));
    let parser = svg::read(&source).map_err(|err| SceneError::InvalidMarkup(err.to_string()))?;

    let mut roots: Vec<MarkupNode> = Vec::new();
    let mut stack: Vec<MarkupNode> = Vec::new();
    for event in parser {
        match event {
            Event::Tag(name, kind, attributes) => match kind {
                Type::Start | Type::Empty => {
                    let mut node = MarkupNode::new(name);
                    let mut names: Vec<&String> = attributes.keys().collect();
                    names.sort();
                    for attribute in names {
                        let value = attributes[attribute].to_string();
                        node = match attribute.as_str() {
                            SELECTOR_ATTRIBUTE => node.with_selector(&value),
                            GROUP_SELECTOR_ATTRIBUTE => node.with_group_selector(&value),
                            "class" => node.with_class_name(&value),
                            other => node.with_attribute(other, Value::String(value)),
                        };
                    }
                    if matches!(kind, Type::Start) {
                        stack.push(node);
                    } else {
                        attach(&mut stack, &mut roots, node);
                    }
                }
                Type::End => {
                    let node = stack.pop().ok_or_else(|| {
                        SceneError::InvalidMarkup(format!("unexpected closing tag `{name}`"))
                    })?;
                    if node.tag_name() != name {
                        return Err(SceneError::InvalidMarkup(format!(
                            "closing tag `{name}` does not match `{}`",
                            node.tag_name()
                        )));
                    }
                    attach(&mut stack, &mut roots, node);
                }
            },
            Event::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let Some(current) = stack.pop() else {
                    return Err(SceneError::InvalidMarkup(format!(
                        "text `{trimmed}` outside of an element"
                    )));
                };
                stack.push(current.with_text_content(trimmed));
            }
            Event::Error(err) => return Err(SceneError::InvalidMarkup(err.to_string())),
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        return Err(SceneError::InvalidMarkup(format!(
            "unclosed tag `{}`",
            open.tag_name()
        )));
    }
    Ok(roots)
}

fn attach(stack: &mut [MarkupNode], roots: &mut Vec<MarkupNode>, node: MarkupNode) {
    match stack.last_mut() {
        Some(parent) => parent.push_child(node),
        None => roots.push(node),
    }
}
