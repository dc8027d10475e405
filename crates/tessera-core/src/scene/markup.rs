//! Declarative markup descriptors and their expansion into scene subtrees.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{NodeId, Scene, SceneError};

/// One or several group names attached to a markup node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum GroupSelector {
    One(String),
    Many(Vec<String>),
}

/// A node of a markup descriptor.
///
/// Serialized in the JSON cell format as
/// `{tagName, selector?, groupSelector?, attributes?, className?, textContent?, children?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupNode {
    tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_selector: Option<GroupSelector>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    attributes: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<MarkupNode>,
}

impl MarkupNode {
    pub fn new(tag_name: &str) -> Self {
        Self {
            tag_name: tag_name.to_string(),
            selector: None,
            group_selector: None,
            attributes: IndexMap::new(),
            class_name: None,
            text_content: None,
            children: Vec::new(),
        }
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = Some(selector.to_string());
        self
    }

    pub fn with_group_selector(mut self, group: &str) -> Self {
        self.group_selector = Some(GroupSelector::One(group.to_string()));
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_class_name(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn with_text_content(mut self, text: &str) -> Self {
        self.text_content = Some(text.to_string());
        self
    }

    pub fn with_child(mut self, child: MarkupNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: MarkupNode) {
        self.children.push(child);
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    /// Group names of this node, if any.
    pub fn group_selectors(&self) -> Vec<&str> {
        match &self.group_selector {
            None => Vec::new(),
            Some(GroupSelector::One(name)) => vec![name.as_str()],
            Some(GroupSelector::Many(names)) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.attributes
    }

    pub fn children(&self) -> &[MarkupNode] {
        &self.children
    }

    /// Reads a markup descriptor from a JSON value: either an array of
    /// nodes or an SVG markup string using `@selector` attributes.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidMarkup`] when the value has another shape
    /// or cannot be parsed.
    pub fn from_value(value: &Value) -> Result<Vec<MarkupNode>, SceneError> {
        match value {
            Value::String(markup) => super::svg::parse_markup(markup),
            Value::Array(_) => serde_json::from_value(value.clone())
                .map_err(|err| SceneError::InvalidMarkup(err.to_string())),
            Value::Object(_) => serde_json::from_value::<MarkupNode>(value.clone())
                .map(|node| vec![node])
                .map_err(|err| SceneError::InvalidMarkup(err.to_string())),
            other => Err(SceneError::InvalidMarkup(format!(
                "expected an array or a string, found {other}"
            ))),
        }
    }

    /// Serializes a descriptor list to its JSON form.
    pub fn to_value(nodes: &[MarkupNode]) -> Value {
        serde_json::to_value(nodes).unwrap_or(Value::Array(Vec::new()))
    }
}

/// Converts a JSON attribute value to its SVG string form. `null` removes
/// the attribute and yields `None`.
pub fn value_to_attribute(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() => f.to_string(),
            _ => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}

/// Selector lookup produced by expanding markup.
///
/// A plain selector names exactly one node, a group selector names any
/// number. The two namespaces must not overlap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selectors {
    single: IndexMap<String, NodeId>,
    groups: IndexMap<String, Vec<NodeId>>,
}

impl Selectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single-node selector.
    pub fn insert(&mut self, name: &str, node: NodeId) -> Result<(), SceneError> {
        if self.single.contains_key(name) || self.groups.contains_key(name) {
            return Err(SceneError::DuplicateSelector(name.to_string()));
        }
        self.single.insert(name.to_string(), node);
        Ok(())
    }

    /// Adds a node to a group selector.
    pub fn insert_group(&mut self, name: &str, node: NodeId) -> Result<(), SceneError> {
        if self.single.contains_key(name) {
            return Err(SceneError::DuplicateSelector(name.to_string()));
        }
        self.groups.entry(name.to_string()).or_default().push(node);
        Ok(())
    }

    /// Merges another lookup into this one, rejecting clashing names.
    pub fn extend(&mut self, other: Selectors) -> Result<(), SceneError> {
        for (name, node) in other.single {
            self.insert(&name, node)?;
        }
        for (name, nodes) in other.groups {
            for node in nodes {
                self.insert_group(&name, node)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.single.get(name).copied()
    }

    /// All nodes matched by a name, single or group.
    pub fn find(&self, name: &str) -> Vec<NodeId> {
        if let Some(node) = self.single.get(name) {
            return vec![*node];
        }
        self.groups.get(name).cloned().unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.single.contains_key(name) || self.groups.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.single.keys().chain(self.groups.keys()).map(String::as_str)
    }
}

impl Scene {
    /// Expands markup into new nodes appended to `parent`.
    ///
    /// Selector uniqueness is checked before anything is created, so a
    /// failing descriptor leaves the scene untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::DuplicateSelector`] when a selector repeats
    /// (or is in `reserved`), and [`SceneError::StaleNode`] for a bad parent.
    pub fn build_markup(
        &mut self,
        parent: NodeId,
        nodes: &[MarkupNode],
        reserved: &[&str],
    ) -> Result<Selectors, SceneError> {
        self.get(parent)?;
        let mut check = Selectors::new();
        let placeholder = parent;
        for name in reserved {
            check.insert(name, placeholder)?;
        }
        validate_selectors(nodes, &mut check)?;

        let mut selectors = Selectors::new();
        for node in nodes {
            self.build_node(parent, node, &mut selectors)?;
        }
        Ok(selectors)
    }

    fn build_node(
        &mut self,
        parent: NodeId,
        markup: &MarkupNode,
        selectors: &mut Selectors,
    ) -> Result<NodeId, SceneError> {
        let id = self.create_element(&markup.tag_name);
        for (name, value) in &markup.attributes {
            if let Some(value) = value_to_attribute(value) {
                self.set_attribute(id, name, value)?;
            }
        }
        if let Some(class_name) = &markup.class_name {
            for class in class_name.split_whitespace() {
                self.add_class(id, class)?;
            }
        }
        if let Some(text) = &markup.text_content {
            self.set_text(id, Some(text))?;
        }
        if let Some(selector) = &markup.selector {
            self.set_attribute(id, "data-selector", selector.clone())?;
            selectors.insert(selector, id)?;
        }
        for group in markup.group_selectors() {
            selectors.insert_group(group, id)?;
        }
        self.append_child(parent, id)?;
        for child in &markup.children {
            self.build_node(id, child, selectors)?;
        }
        Ok(id)
    }
}

fn validate_selectors(nodes: &[MarkupNode], check: &mut Selectors) -> Result<(), SceneError> {
    for node in nodes {
        if let Some(selector) = &node.selector {
            // The handle is irrelevant here, only names are checked
            check.insert(selector, NodeId { index: 0, generation: 0 })?;
        }
        for group in node.group_selectors() {
            check.insert_group(group, NodeId { index: 0, generation: 0 })?;
        }
        validate_selectors(&node.children, check)?;
    }
    Ok(())
}
