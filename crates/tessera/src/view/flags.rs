//! Update flags accumulated by views between flushes.

use std::{fmt, ops};

use crate::model::CellKind;

/// A set of pending view updates.
///
/// Attribute changes map to flags (see [`UpdateFlags::for_attribute`]); a
/// flush performs the least work that covers every accumulated flag.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UpdateFlags(u32);

impl UpdateFlags {
    pub const NONE: Self = Self(0);
    /// Rebuild the subtree from markup.
    pub const RENDER: Self = Self(1 << 0);
    /// Re-apply `attrs` (and for links, re-resolve the geometry).
    pub const UPDATE: Self = Self(1 << 1);
    pub const TRANSLATE: Self = Self(1 << 2);
    pub const RESIZE: Self = Self(1 << 3);
    pub const ROTATE: Self = Self(1 << 4);
    pub const PORTS: Self = Self(1 << 5);
    pub const SOURCE: Self = Self(1 << 6);
    pub const TARGET: Self = Self(1 << 7);
    pub const LABELS: Self = Self(1 << 8);
    pub const TOOLS: Self = Self(1 << 9);
    /// Re-insert the view root at its paint position.
    pub const INSERT: Self = Self(1 << 10);

    const NAMES: [(Self, &'static str); 11] = [
        (Self::RENDER, "RENDER"),
        (Self::UPDATE, "UPDATE"),
        (Self::TRANSLATE, "TRANSLATE"),
        (Self::RESIZE, "RESIZE"),
        (Self::ROTATE, "ROTATE"),
        (Self::PORTS, "PORTS"),
        (Self::SOURCE, "SOURCE"),
        (Self::TARGET, "TARGET"),
        (Self::LABELS, "LABELS"),
        (Self::TOOLS, "TOOLS"),
        (Self::INSERT, "INSERT"),
    ];

    /// Everything a freshly mounted view needs.
    pub fn mount(kind: CellKind) -> Self {
        match kind {
            CellKind::Element => Self::RENDER | Self::INSERT,
            CellKind::Link => Self::RENDER | Self::SOURCE | Self::TARGET | Self::INSERT,
        }
    }

    /// The flags a change of `key` raises on a view of `kind`.
    pub fn for_attribute(kind: CellKind, key: &str) -> Self {
        match (kind, key) {
            (_, "z") => Self::INSERT,
            (_, "markup") => Self::RENDER,
            (CellKind::Element, "attrs") => Self::UPDATE,
            (CellKind::Element, "position") => Self::TRANSLATE,
            (CellKind::Element, "size") => Self::RESIZE,
            (CellKind::Element, "angle") => Self::ROTATE,
            (CellKind::Element, "ports") => Self::PORTS,
            (CellKind::Link, "attrs" | "router" | "connector" | "vertices") => Self::UPDATE,
            (CellKind::Link, "source") => Self::SOURCE | Self::UPDATE,
            (CellKind::Link, "target") => Self::TARGET | Self::UPDATE,
            (CellKind::Link, "labels") => Self::LABELS,
            _ => Self::NONE,
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether any flag of `other` is set.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Flag names, for logs.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl ops::BitOr for UpdateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for UpdateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for UpdateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        f.write_str(&self.names().join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_mapping() {
        assert_eq!(
            UpdateFlags::for_attribute(CellKind::Element, "position"),
            UpdateFlags::TRANSLATE
        );
        assert_eq!(
            UpdateFlags::for_attribute(CellKind::Link, "source"),
            UpdateFlags::SOURCE | UpdateFlags::UPDATE
        );
        assert_eq!(
            UpdateFlags::for_attribute(CellKind::Link, "vertices"),
            UpdateFlags::UPDATE
        );
        assert!(UpdateFlags::for_attribute(CellKind::Element, "custom").is_empty());
        assert_eq!(UpdateFlags::for_attribute(CellKind::Link, "z"), UpdateFlags::INSERT);
    }

    #[test]
    fn test_set_operations() {
        let mut flags = UpdateFlags::TRANSLATE | UpdateFlags::ROTATE;
        assert!(flags.contains(UpdateFlags::ROTATE));
        assert!(flags.intersects(UpdateFlags::ROTATE | UpdateFlags::RENDER));
        flags.remove(UpdateFlags::ROTATE);
        assert_eq!(format!("{flags:?}"), "TRANSLATE");
        assert_eq!(format!("{:?}", UpdateFlags::NONE), "NONE");
    }
}
