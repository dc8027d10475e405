//! Graph change events and mutation options.

use serde_json::{Map, Value};

use tessera_core::identifier::Id;

use crate::model::{Cell, CellKind};

/// Options passed along with a mutation and echoed in its events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    silent: bool,
    source: Option<String>,
    flags: Map<String, Value>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that suppress every event of the mutation.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Tags the mutation with its origin, e.g. `"ui"` or `"undo"`.
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_flag(mut self, key: &str, value: Value) -> Self {
        self.flags.insert(key.to_string(), value);
        self
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn flag(&self, key: &str) -> Option<&Value> {
        self.flags.get(key)
    }

    pub fn flags(&self) -> &Map<String, Value> {
        &self.flags
    }
}

/// Handle returned by [`Graph::on`](crate::model::Graph::on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// A notification emitted by the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    Add {
        id: Id,
        kind: CellKind,
        options: Options,
    },
    Remove {
        id: Id,
        kind: CellKind,
        /// The cell as it was right before removal.
        cell: Box<Cell>,
        options: Options,
    },
    Change {
        id: Id,
        kind: CellKind,
        key: String,
        previous: Value,
        current: Value,
        options: Options,
    },
    Reset {
        options: Options,
    },
    BatchStart {
        name: String,
        options: Options,
    },
    BatchStop {
        name: String,
        options: Options,
    },
}

impl GraphEvent {
    /// Event name: `add`, `remove`, `change:<key>`, `reset`, `batch:start`
    /// or `batch:stop`.
    pub fn name(&self) -> String {
        match self {
            Self::Add { .. } => "add".to_string(),
            Self::Remove { .. } => "remove".to_string(),
            Self::Change { key, .. } => format!("change:{key}"),
            Self::Reset { .. } => "reset".to_string(),
            Self::BatchStart { .. } => "batch:start".to_string(),
            Self::BatchStop { .. } => "batch:stop".to_string(),
        }
    }

    /// Name prefixed with the cell kind, e.g. `link:change:source`. Events
    /// without a cell keep their plain name.
    pub fn qualified_name(&self) -> String {
        match self.kind() {
            Some(kind) => format!("{kind}:{}", self.name()),
            None => self.name(),
        }
    }

    pub fn id(&self) -> Option<Id> {
        match self {
            Self::Add { id, .. } | Self::Remove { id, .. } | Self::Change { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<CellKind> {
        match self {
            Self::Add { kind, .. } | Self::Remove { kind, .. } | Self::Change { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }

    pub fn options(&self) -> &Options {
        match self {
            Self::Add { options, .. }
            | Self::Remove { options, .. }
            | Self::Change { options, .. }
            | Self::Reset { options }
            | Self::BatchStart { options, .. }
            | Self::BatchStop { options, .. } => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_names() {
        let change = GraphEvent::Change {
            id: Id::new("l"),
            kind: CellKind::Link,
            key: "source".to_string(),
            previous: json!({}),
            current: json!({ "id": "a" }),
            options: Options::new(),
        };
        assert_eq!(change.name(), "change:source");
        assert_eq!(change.qualified_name(), "link:change:source");

        let batch = GraphEvent::BatchStart {
            name: "add".to_string(),
            options: Options::new(),
        };
        assert_eq!(batch.qualified_name(), "batch:start");
        assert_eq!(batch.id(), None);
    }

    #[test]
    fn test_options_builder() {
        let options = Options::new().with_source("ui").with_flag("undo", json!(true));
        assert_eq!(options.source(), Some("ui"));
        assert_eq!(options.flag("undo"), Some(&json!(true)));
        assert!(Options::silent().is_silent());
    }
}
