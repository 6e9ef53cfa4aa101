//! Arena-backed XML document tree.
//!
//! Nodes live in a single `Vec` owned by [`Document`] and are addressed by
//! [`NodeId`].  Each slot records its parent index (non-owning) and its
//! ordered children (owning).  Removing a node from its parent destroys the
//! whole subtree and frees its payload; ids are never reused, so a stale id
//! stays recognisably dead instead of aliasing a newer node.

use std::fmt;

// ── Names ─────────────────────────────────────────────────────────────────────

/// A qualified element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Full name as written, e.g. `w:t`.
    pub name: String,
    pub prefix: String,
    pub local: String,
    /// Namespace URI resolved from in-scope `xmlns` declarations (may be empty).
    pub uri: String,
}

impl QName {
    pub fn new(name: &str) -> Self {
        let (prefix, local) = match name.split_once(':') {
            Some((p, l)) => (p.to_owned(), l.to_owned()),
            None => (String::new(), name.to_owned()),
        };
        QName {
            name: name.to_owned(),
            prefix,
            local,
            uri: String::new(),
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

// ── Nodes ─────────────────────────────────────────────────────────────────────

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Text(String),
    Element { tag: QName, attrs: Vec<Attribute> },
}

#[derive(Debug, Clone)]
struct Slot {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Set on nodes kept by a truthy IF; names the conditional.
    if_name: Option<String>,
    live: bool,
}

/// An XML document as a mutable node arena.
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    root: NodeId,
}

impl Document {
    /// Create a document whose root element is `tag`.
    pub fn new(tag: QName, attrs: Vec<Attribute>) -> Self {
        let mut doc = Document {
            slots: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.push(NodeKind::Element { tag, attrs });
        doc
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.slots.push(Slot {
            kind,
            parent: None,
            children: Vec::new(),
            if_name: None,
            live: true,
        });
        NodeId(self.slots.len() - 1)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Create a detached element node.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: QName::new(tag),
            attrs: Vec::new(),
        })
    }

    /// Create a detached element node with attributes.
    pub fn create_element_with(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs = attrs
            .iter()
            .map(|(k, v)| Attribute {
                name: QName::new(k),
                value: (*v).to_owned(),
            })
            .collect();
        self.push(NodeKind::Element {
            tag: QName::new(tag),
            attrs,
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    /// Create a detached node from an existing kind (used by the XML reader).
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        self.push(kind)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.slots[id.0].kind
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.slots.get(id.0).is_some_and(|s| s.live)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.slots[id.0].kind {
            NodeKind::Text(t) => Some(t),
            NodeKind::Element { .. } => None,
        }
    }

    /// Replace the content of a text node.  No-op on elements.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let NodeKind::Text(t) = &mut self.slots[id.0].kind {
            *t = text.into();
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&QName> {
        match &self.slots[id.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.tag(id).map(|t| t.name.as_str())
    }

    /// True when `id` is an element named `name` (full name, e.g. `w:p`).
    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.tag_name(id) == Some(name)
    }

    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        match &self.slots[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs,
            NodeKind::Text(_) => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|a| a.name.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set (or add) an attribute.  No-op on text nodes.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let NodeKind::Element { attrs, .. } = &mut self.slots[id.0].kind {
            let value = value.into();
            match attrs.iter_mut().find(|a| a.name.name == name) {
                Some(a) => a.value = value,
                None => attrs.push(Attribute {
                    name: QName::new(name),
                    value,
                }),
            }
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.slots[id.0].children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    /// First child element named `name`.
    pub fn child_element(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.is_element(c, name))
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn if_name(&self, id: NodeId) -> Option<&str> {
        self.slots[id.0].if_name.as_deref()
    }

    pub fn set_if_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.slots[id.0].if_name = Some(name.into());
    }

    /// Nearest ancestor-or-self carrying a branch marker.
    pub fn branch_of(&self, id: NodeId) -> Option<&str> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if let Some(name) = self.if_name(n) {
                return Some(name);
            }
            cur = self.parent(n);
        }
        None
    }

    // ── Traversal ─────────────────────────────────────────────────────────────

    /// Pre-order list of `id` and all its descendants.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Ancestors of `id`, nearest first (excluding `id`).
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.parent(id);
        while let Some(n) = cur {
            out.push(n);
            cur = self.parent(n);
        }
        out
    }

    /// Nearest ancestor-or-self element named `name`.
    pub fn closest(&self, id: NodeId, name: &str) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if self.is_element(n, name) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// Lowest common ancestor of two attached nodes.
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut chain_a = vec![a];
        chain_a.extend(self.ancestors(a));
        let mut cur = Some(b);
        while let Some(n) = cur {
            if chain_a.contains(&n) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    /// The ancestor-or-self of `node` whose parent is `ancestor`.
    pub fn child_toward(&self, ancestor: NodeId, node: NodeId) -> Option<NodeId> {
        let mut cur = node;
        loop {
            let parent = self.parent(cur)?;
            if parent == ancestor {
                return Some(cur);
            }
            cur = parent;
        }
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    /// Unlink `id` from its parent without destroying it.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.slots[id.0].parent.take() {
            self.slots[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Detach `id` and destroy it together with its subtree.
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
        for n in self.descendants(id) {
            let slot = &mut self.slots[n.0];
            slot.live = false;
            slot.kind = NodeKind::Text(String::new());
            slot.if_name = None;
            slot.parent = None;
            slot.children = Vec::new();
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.slots[child.0].parent = Some(parent);
        self.slots[parent.0].children.push(child);
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.slots[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.slots[child.0].parent = Some(parent);
    }

    /// Insert `new` as the preceding sibling of `reference`.
    pub fn insert_before(&mut self, reference: NodeId, new: NodeId) {
        if let (Some(parent), Some(idx)) = (self.parent(reference), self.index_in_parent(reference)) {
            self.insert_child(parent, idx, new);
        }
    }

    /// Insert `new` as the following sibling of `reference`.
    pub fn insert_after(&mut self, reference: NodeId, new: NodeId) {
        if let (Some(parent), Some(idx)) = (self.parent(reference), self.index_in_parent(reference)) {
            self.insert_child(parent, idx + 1, new);
        }
    }

    /// Replace `old` with `new` nodes (in order) and destroy `old`.
    pub fn replace(&mut self, old: NodeId, new: &[NodeId]) {
        if let (Some(parent), Some(mut idx)) = (self.parent(old), self.index_in_parent(old)) {
            for &n in new {
                self.insert_child(parent, idx, n);
                idx += 1;
            }
        }
        self.remove(old);
    }

    /// Detached copy of `id` without its children (attributes kept).
    pub fn shallow_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.slots[id.0].kind.clone();
        let copy = self.push(kind);
        self.slots[copy.0].if_name = self.slots[id.0].if_name.clone();
        copy
    }

    /// Detached deep copy of the subtree rooted at `id`.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let copy = self.shallow_clone(id);
        let children = self.children(id).to_vec();
        for c in children {
            let cc = self.deep_clone(c);
            self.slots[cc.0].parent = Some(copy);
            self.slots[copy.0].children.push(cc);
        }
        copy
    }

    /// Copy the subtree `id` of another document into this one (detached).
    pub fn import(&mut self, other: &Document, id: NodeId) -> NodeId {
        let copy = self.push(other.kind(id).clone());
        for &c in other.children(id) {
            let cc = self.import(other, c);
            self.slots[cc.0].parent = Some(copy);
            self.slots[copy.0].children.push(cc);
        }
        copy
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// `<w:body><w:p><w:r><w:t>hello</w:t></w:r></w:p></w:body>`
    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new(QName::new("w:body"), Vec::new());
        let p = doc.create_element("w:p");
        let r = doc.create_element("w:r");
        let t = doc.create_element("w:t");
        let txt = doc.create_text("hello");
        doc.append_child(doc.root(), p);
        doc.append_child(p, r);
        doc.append_child(r, t);
        doc.append_child(t, txt);
        (doc, p, r, txt)
    }

    #[test]
    fn qname_split() {
        let q = QName::new("w:t");
        assert_eq!((q.prefix.as_str(), q.local.as_str()), ("w", "t"));
        let q = QName::new("body");
        assert_eq!((q.prefix.as_str(), q.local.as_str()), ("", "body"));
    }

    #[test]
    fn parent_links_follow_moves() {
        let (mut doc, p, r, _) = sample();
        let p2 = doc.create_element("w:p");
        doc.append_child(doc.root(), p2);
        doc.append_child(p2, r);
        assert_eq!(doc.parent(r), Some(p2));
        assert!(doc.children(p).is_empty());
    }

    #[test]
    fn remove_destroys_subtree() {
        let (mut doc, p, r, txt) = sample();
        doc.remove(p);
        assert!(!doc.is_live(p));
        assert!(!doc.is_live(r));
        assert!(!doc.is_live(txt));
        assert!(doc.children(doc.root()).is_empty());
        assert_eq!(doc.tag(p), None);
        assert_eq!(doc.text(txt), Some(""));
    }

    #[test]
    fn deep_clone_is_independent() {
        let (mut doc, p, _, txt) = sample();
        let copy = doc.deep_clone(p);
        assert_eq!(doc.parent(copy), None);
        assert_eq!(doc.text_content(copy), "hello");
        doc.set_text(txt, "changed");
        assert_eq!(doc.text_content(copy), "hello");
    }

    #[test]
    fn insert_before_and_after() {
        let (mut doc, p, _, _) = sample();
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        doc.insert_before(p, a);
        doc.insert_after(p, b);
        assert_eq!(doc.children(doc.root()), &[a, p, b]);
    }

    #[test]
    fn common_ancestor_and_child_toward() {
        let (mut doc, p, r, txt) = sample();
        let r2 = doc.create_element("w:r");
        doc.append_child(p, r2);
        assert_eq!(doc.common_ancestor(txt, r2), Some(p));
        assert_eq!(doc.child_toward(p, txt), Some(r));
        assert_eq!(doc.closest(txt, "w:p"), Some(p));
    }

    #[test]
    fn branch_marker_inherited_by_lookup() {
        let (mut doc, p, _, txt) = sample();
        doc.set_if_name(p, "IF x");
        assert_eq!(doc.branch_of(txt), Some("IF x"));
    }

    #[test]
    fn replace_keeps_position() {
        let (mut doc, p, r, _) = sample();
        let x = doc.create_element("x");
        let y = doc.create_element("y");
        doc.replace(r, &[x, y]);
        assert_eq!(doc.children(p), &[x, y]);
        assert!(!doc.is_live(r));
    }
}
