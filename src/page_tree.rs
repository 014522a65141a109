//! Page tree over the object graph.
//!
//! The tree is made of `/Type /Pages` container nodes and `/Type /Page`
//! leaves. Every node keeps `/Count` equal to the number of leaves below it
//! and every kid's `/Parent` names its actual container. Links are object
//! identities, so the operations here edit `/Kids`, `/Count` and `/Parent`
//! entries and never hold pointers into the graph.
//!
//! Public page indices are 1-based and inclusive, except for
//! [`PageTree::delete_pages_at`], which takes 0-based positions in the
//! root's `/Kids`.

use crate::error::{Error, Result};
use crate::graph::ObjectGraph;
use crate::object::{dict, Dictionary, Object, ObjectRef};
use std::collections::HashSet;

/// US Letter media box used for new pages.
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// A leaf page that has not been added to a document yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    dict: Dictionary,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// Empty page with the default media box.
    pub fn new() -> Self {
        let media_box = DEFAULT_MEDIA_BOX.iter().map(|v| number(*v)).collect();
        Self {
            dict: dict([
                ("Type", Object::name("Page")),
                ("MediaBox", Object::Array(media_box)),
            ]),
        }
    }

    /// Replace the media box.
    pub fn with_media_box(mut self, media_box: [f64; 4]) -> Self {
        let values = media_box.iter().map(|v| number(*v)).collect();
        self.dict.insert("MediaBox".into(), Object::Array(values));
        self
    }

    /// Set an arbitrary page attribute. `Type`, `Parent` and `Kids` are
    /// managed by the tree and ignored here.
    pub fn with_entry(mut self, key: impl Into<String>, value: Object) -> Self {
        let key = key.into();
        if !matches!(key.as_str(), "Type" | "Parent" | "Kids") {
            self.dict.insert(key, value);
        }
        self
    }

    /// Page attributes.
    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }
}

fn number(v: f64) -> Object {
    if v.fract() == 0.0 {
        Object::Integer(v as i64)
    } else {
        Object::Real(v)
    }
}

/// A container node with its own kids, added to a tree as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageTreeNode {
    kids: Vec<PageKid>,
}

impl PageTreeNode {
    /// Empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a kid.
    pub fn with_kid(mut self, kid: impl Into<PageKid>) -> Self {
        self.kids.push(kid.into());
        self
    }

    /// Number of leaves below this node.
    pub fn leaf_count(&self) -> usize {
        self.kids.iter().map(PageKid::leaf_count).sum()
    }
}

/// Anything that can be placed in a `/Kids` array.
#[derive(Debug, Clone, PartialEq)]
pub enum PageKid {
    /// A leaf
    Page(Page),
    /// A container with its subtree
    Node(PageTreeNode),
}

impl PageKid {
    fn leaf_count(&self) -> usize {
        match self {
            PageKid::Page(_) => 1,
            PageKid::Node(node) => node.leaf_count(),
        }
    }
}

impl From<Page> for PageKid {
    fn from(page: Page) -> Self {
        PageKid::Page(page)
    }
}

impl From<PageTreeNode> for PageKid {
    fn from(node: PageTreeNode) -> Self {
        PageKid::Node(node)
    }
}

/// Handle on the page tree rooted at a given node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTree {
    root: ObjectRef,
}

impl PageTree {
    /// Tree rooted at an existing `/Type /Pages` node.
    pub fn new(root: ObjectRef) -> Self {
        Self { root }
    }

    /// Add an empty root node to `graph`.
    pub fn create(graph: &mut ObjectGraph) -> Self {
        let root = graph.add_object(Object::Dictionary(dict([
            ("Type", Object::name("Pages")),
            ("Kids", Object::Array(Vec::new())),
            ("Count", Object::Integer(0)),
        ])));
        Self { root }
    }

    /// Identity of the root node.
    pub fn root(&self) -> ObjectRef {
        self.root
    }

    /// Number of leaf pages, as recorded on the root.
    pub fn count(&self, graph: &ObjectGraph) -> usize {
        leaf_count(graph, self.root)
    }

    /// Leaf at 1-based document position `index`.
    pub fn get(&self, graph: &ObjectGraph, index: usize) -> Result<ObjectRef> {
        let count = self.count(graph);
        if index == 0 || index > count {
            return Err(Error::IndexOutOfRange { index, count });
        }
        self.locate(graph, index).map(|slot| slot.leaf)
    }

    /// All leaves in document order.
    pub fn pages(&self, graph: &ObjectGraph) -> Vec<ObjectRef> {
        self.iter(graph).collect()
    }

    /// Lazy depth-first traversal of the leaves; every call starts afresh.
    pub fn iter<'g>(&self, graph: &'g ObjectGraph) -> PageIter<'g> {
        PageIter {
            graph,
            stack: vec![self.root],
            visited: HashSet::new(),
        }
    }

    /// Append `kid` as the last kid of the root and return its identity.
    pub fn append(&self, graph: &mut ObjectGraph, kid: impl Into<PageKid>) -> Result<ObjectRef> {
        let (reference, leaves) = materialize(graph, kid.into(), self.root);
        kids_mut(graph, self.root)?.push(Object::Reference(reference));
        self.adjust_counts(graph, self.root, leaves as i64)?;
        log::debug!("appended {} ({} leaves)", reference, leaves);
        Ok(reference)
    }

    /// Insert `kid` so that its first leaf ends up at 1-based position
    /// `index`; `count + 1` appends.
    pub fn insert(
        &self,
        graph: &mut ObjectGraph,
        index: usize,
        kid: impl Into<PageKid>,
    ) -> Result<ObjectRef> {
        let count = self.count(graph);
        if index == 0 || index > count + 1 {
            return Err(Error::IndexOutOfRange { index, count });
        }
        if index == count + 1 {
            return self.append(graph, kid);
        }

        let slot = self.locate(graph, index)?;
        let (reference, leaves) = materialize(graph, kid.into(), slot.container);
        kids_mut(graph, slot.container)?.insert(slot.position, Object::Reference(reference));
        self.adjust_counts(graph, slot.container, leaves as i64)?;
        Ok(reference)
    }

    /// Delete the leaf at 1-based position `index`. Containers left empty
    /// are removed as well.
    pub fn delete_page_at(&self, graph: &mut ObjectGraph, index: usize) -> Result<()> {
        let count = self.count(graph);
        if index == 0 || index > count {
            return Err(Error::IndexOutOfRange { index, count });
        }

        let slot = self.locate(graph, index)?;
        kids_mut(graph, slot.container)?.remove(slot.position);
        graph.remove(slot.leaf);
        self.adjust_counts(graph, slot.container, -1)?;
        self.prune(graph, slot.container)
    }

    /// Delete the root kids at the given 0-based positions. A position that
    /// names a container removes its whole subtree, and `/Count` drops by the
    /// number of leaves removed.
    pub fn delete_pages_at(&self, graph: &mut ObjectGraph, positions: &[usize]) -> Result<()> {
        let kids = kid_slots(graph, self.root);
        if let Some(&bad) = positions.iter().find(|p| **p >= kids.len()) {
            return Err(Error::IndexOutOfRange {
                index: bad,
                count: kids.len(),
            });
        }

        let mut ordered = positions.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut removed_leaves = 0usize;
        for &position in ordered.iter().rev() {
            let (slot, kid) = kids[position];
            removed_leaves += leaf_count(graph, kid);
            remove_subtree(graph, kid);
            kids_mut(graph, self.root)?.remove(slot);
        }

        self.adjust_counts(graph, self.root, -(removed_leaves as i64))?;
        log::debug!("deleted {} root kids, {} leaves", ordered.len(), removed_leaves);
        Ok(())
    }

    /// Find the container and position of the leaf at 1-based `index`.
    fn locate(&self, graph: &ObjectGraph, index: usize) -> Result<Slot> {
        let mut remaining = index - 1;
        let mut node = self.root;
        let mut visited = HashSet::new();

        'descend: loop {
            if !visited.insert(node) {
                return Err(Error::CircularReference(node));
            }
            for (position, kid) in kid_slots(graph, node) {
                let leaves = leaf_count(graph, kid);
                if remaining < leaves {
                    if is_leaf(graph, kid) {
                        return Ok(Slot {
                            container: node,
                            position,
                            leaf: kid,
                        });
                    }
                    node = kid;
                    continue 'descend;
                }
                remaining -= leaves;
            }
            // /Count promised more leaves than the kids hold
            return Err(Error::IndexOutOfRange {
                index,
                count: self.count(graph),
            });
        }
    }

    /// Add `delta` to `/Count` of `node` and every ancestor up to the root.
    fn adjust_counts(&self, graph: &mut ObjectGraph, node: ObjectRef, delta: i64) -> Result<()> {
        let mut current = Some(node);
        let mut visited = HashSet::new();

        while let Some(reference) = current {
            if !visited.insert(reference) {
                return Err(Error::CircularReference(reference));
            }
            let count = graph.resolve_ref(reference).get("Count");
            let count = count.map(|c| graph.resolve(c).cast_or_default::<i64>()).unwrap_or(0);
            let node_dict = node_dict_mut(graph, reference)?;
            node_dict.insert("Count".into(), Object::Integer((count + delta).max(0)));

            current = if reference == self.root {
                None
            } else {
                node_dict.get("Parent").and_then(Object::as_reference)
            };
        }
        Ok(())
    }

    /// Remove empty non-root containers, walking upwards from `node`.
    fn prune(&self, graph: &mut ObjectGraph, node: ObjectRef) -> Result<()> {
        let mut current = node;
        while current != self.root && kid_refs(graph, current).is_empty() {
            let Some(parent) = graph.resolve_ref(current).get("Parent").and_then(Object::as_reference)
            else {
                break;
            };
            kids_mut(graph, parent)?.retain(|kid| kid.as_reference() != Some(current));
            graph.remove(current);
            log::debug!("removed empty page tree node {}", current);
            current = parent;
        }
        Ok(())
    }
}

struct Slot {
    container: ObjectRef,
    position: usize,
    leaf: ObjectRef,
}

/// Lazy document-order traversal of the leaves.
///
/// Nodes reached twice (a cycle or a shared subtree) are skipped and
/// recorded as diagnostics on the graph.
pub struct PageIter<'g> {
    graph: &'g ObjectGraph,
    stack: Vec<ObjectRef>,
    visited: HashSet<ObjectRef>,
}

impl Iterator for PageIter<'_> {
    type Item = ObjectRef;

    fn next(&mut self) -> Option<ObjectRef> {
        while let Some(node) = self.stack.pop() {
            if !self.visited.insert(node) {
                self.graph
                    .record(format!("page tree node {} reached twice, skipped", node));
                continue;
            }
            if is_leaf(self.graph, node) {
                return Some(node);
            }
            self.stack.extend(kid_refs(self.graph, node).into_iter().rev());
        }
        None
    }
}

fn is_leaf(graph: &ObjectGraph, node: ObjectRef) -> bool {
    if !graph.contains(node) {
        return false;
    }
    let value = graph.resolve_ref(node);
    match value.get("Type").and_then(Object::as_name) {
        Some("Page") => true,
        Some("Pages") => false,
        _ => value.get("Kids").is_none(),
    }
}

fn leaf_count(graph: &ObjectGraph, node: ObjectRef) -> usize {
    if is_leaf(graph, node) {
        return 1;
    }
    graph
        .resolve_ref(node)
        .get("Count")
        .map(|c| graph.resolve(c).cast_or_default::<i64>().max(0) as usize)
        .unwrap_or(0)
}

fn kid_refs(graph: &ObjectGraph, node: ObjectRef) -> Vec<ObjectRef> {
    kid_slots(graph, node).into_iter().map(|(_, kid)| kid).collect()
}

/// Kids of `node` that name an existing object, with their index in `/Kids`.
fn kid_slots(graph: &ObjectGraph, node: ObjectRef) -> Vec<(usize, ObjectRef)> {
    let value = graph.resolve_ref(node);
    let Some(kids) = value.get("Kids") else {
        return Vec::new();
    };
    let Some(kids) = graph.resolve(kids).as_array() else {
        return Vec::new();
    };
    kids.iter()
        .enumerate()
        .filter_map(|(slot, kid)| {
            let kid = kid.as_reference()?;
            if graph.contains(kid) {
                Some((slot, kid))
            } else {
                graph.record(format!("page tree node {} has missing kid {}, skipped", node, kid));
                None
            }
        })
        .collect()
}

fn node_dict_mut(graph: &mut ObjectGraph, node: ObjectRef) -> Result<&mut Dictionary> {
    let value = graph
        .get_mut(node)
        .ok_or(Error::ObjectNotFound(node.id, node.gen))?;
    let found = value.type_name();
    value.as_dict_mut().ok_or(Error::TypeMismatch {
        expected: "Dictionary",
        found,
    })
}

fn kids_mut(graph: &mut ObjectGraph, node: ObjectRef) -> Result<&mut Vec<Object>> {
    let node_dict = node_dict_mut(graph, node)?;
    let kids = node_dict
        .entry("Kids".to_string())
        .or_insert_with(|| Object::Array(Vec::new()));
    if kids.as_array().is_none() {
        *kids = Object::Array(Vec::new());
    }
    kids.as_array_mut().ok_or(Error::TypeMismatch {
        expected: "Array",
        found: "Null",
    })
}

/// Add `kid` and its subtree to the graph under `parent`.
fn materialize(graph: &mut ObjectGraph, kid: PageKid, parent: ObjectRef) -> (ObjectRef, usize) {
    match kid {
        PageKid::Page(page) => {
            let mut page_dict = page.dict;
            page_dict.insert("Parent".into(), Object::Reference(parent));
            (graph.add_object(Object::Dictionary(page_dict)), 1)
        },
        PageKid::Node(node) => {
            let reference = graph.add_object(Object::Null);
            let mut kids = Vec::with_capacity(node.kids.len());
            let mut leaves = 0;
            for child in node.kids {
                let (child_ref, child_leaves) = materialize(graph, child, reference);
                kids.push(Object::Reference(child_ref));
                leaves += child_leaves;
            }
            graph.insert(
                reference,
                Object::Dictionary(dict([
                    ("Type", Object::name("Pages")),
                    ("Parent", Object::Reference(parent)),
                    ("Kids", Object::Array(kids)),
                    ("Count", Object::Integer(leaves as i64)),
                ])),
            );
            (reference, leaves)
        },
    }
}

fn remove_subtree(graph: &mut ObjectGraph, node: ObjectRef) {
    let mut stack = vec![node];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        stack.extend(kid_refs(graph, current));
        graph.remove(current);
    }
}
