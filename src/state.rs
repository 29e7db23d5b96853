use crate::record::Attr;

/// An attribute bound via `with_attrs`, remembered together with the
/// group path that was active at bind time.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundAttr {
    pub groups: Vec<String>,
    pub attr: Attr,
}

/// Immutable snapshot of everything a handler has accumulated through
/// contextual calls.
///
/// Extension never touches `self`; it returns a fresh value, so a handler
/// can be branched from many call sites at once without locking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerState {
    attrs: Vec<BoundAttr>,
    groups: Vec<String>,
}

impl HandlerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound attributes in bind order.
    pub fn attrs(&self) -> &[BoundAttr] {
        &self.attrs
    }

    /// Currently open groups, outermost first.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Return a state with `attrs` appended, each tagged with the current
    /// group path. Keys are not deduplicated here.
    pub fn with_attrs(&self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        let mut bound = self.attrs.clone();
        bound.extend(attrs.into_iter().map(|attr| BoundAttr {
            groups: self.groups.clone(),
            attr,
        }));
        HandlerState {
            attrs: bound,
            groups: self.groups.clone(),
        }
    }

    /// Return a state with `name` pushed onto the group stack. An empty
    /// name opens no group.
    pub fn with_group(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut groups = self.groups.clone();
        if !name.is_empty() {
            groups.push(name);
        }
        HandlerState {
            attrs: self.attrs.clone(),
            groups,
        }
    }
}
