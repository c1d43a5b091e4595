//! Hierarchical expansion tree.
//!
//! An [`ExpansionTree`] owns one [`ProjectionModel`] per expanded node and
//! presents the whole hierarchy as a single flattened [`RowSequence`]: each
//! row is followed by the header rows and children of its node, if that node
//! is expanded.
//!
//! Nodes live in a `slotmap` arena and refer to each other by [`NodeId`].
//! Child nodes are created collapsed when their parent expands; expanding one
//! asks the expander for its child collection and the classifier for the
//! child level's columns, sort, filter and header count.
//!
//! The tree never mutates itself from a notification. Projections report
//! changes into a shared queue; [`ExpansionTree::refresh`] (the host tick)
//! applies pending projection refreshes and reconciles the queued nodes. The
//! flattened sequence always reflects the projections directly, so it is
//! never stale between ticks.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use horizon_grid_core::logging::{targets, PerfSpan};
use horizon_grid_core::Signal;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use slotmap::{new_key_type, SlotMap};

use super::collection::RowCollection;
use super::column::ColumnSchema;
use super::filter::Filter;
use super::projection::ProjectionModel;
use super::row::{same_row, RowKey, RowObject};
use super::sequence::{locate, RowRef, RowSequence, DEFAULT_SEARCH_WINDOW};
use super::sort::SortOrder;
use crate::error::{GridError, Result};

new_key_type! {
    /// Identifies a node of an [`ExpansionTree`].
    pub struct NodeId;
}

/// Identifies the header rows of one expansion.
///
/// The id is generated when a node expands and kept while it stays expanded,
/// across reconciliation, so a renderer can reuse its header visuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeaderId(u64);

impl HeaderId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Expansion state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    #[default]
    Collapsed,
    Expanding,
    Expanded,
    Collapsing,
}

/// Column and projection settings for one level of the hierarchy.
pub struct LevelSpec<R: ?Sized> {
    pub schema: Arc<ColumnSchema<R>>,
    pub sort: SortOrder,
    pub filter: Filter,
    /// Header pseudo-rows shown before the level's rows.
    pub header_rows: usize,
}

impl<R: ?Sized> LevelSpec<R> {
    pub fn new(schema: Arc<ColumnSchema<R>>) -> Self {
        Self {
            schema,
            sort: SortOrder::none(),
            filter: Filter::none(),
            header_rows: 0,
        }
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_header_rows(mut self, header_rows: usize) -> Self {
        self.header_rows = header_rows;
        self
    }
}

impl<R: ?Sized> Clone for LevelSpec<R> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            sort: self.sort.clone(),
            filter: self.filter.clone(),
            header_rows: self.header_rows,
        }
    }
}

/// Resolves a row's child collection. Must be side-effect free.
pub type Expander<R> = Arc<dyn Fn(&R) -> Option<Arc<RowCollection<R>>> + Send + Sync>;

/// Describes the child level of a row.
pub type NodeClassifier<R> = Arc<dyn Fn(&R) -> LevelSpec<R> + Send + Sync>;

/// Signals emitted by an [`ExpansionTree`].
#[derive(Default)]
pub struct TreeSignals {
    /// Emitted after a node expanded.
    pub expanded: Signal<NodeId>,
    /// Emitted for every node that leaves the expanded state, descendants
    /// before ancestors.
    pub collapsed: Signal<NodeId>,
}

struct ExpansionNode<R: RowObject + ?Sized> {
    /// `None` only for the root.
    row: Option<Arc<R>>,
    parent: Option<NodeId>,
    depth: usize,
    state: NodeState,
    can_expand: bool,
    projection: Option<ProjectionModel<R>>,
    /// Distinct child nodes in projection order.
    children: Vec<NodeId>,
    lookup: HashMap<RowKey, NodeId>,
    header_rows: usize,
    header_id: Option<HeaderId>,
}

impl<R: RowObject + ?Sized> ExpansionNode<R> {
    fn collapsed(row: Arc<R>, parent: NodeId, depth: usize) -> Self {
        Self {
            row: Some(row),
            parent: Some(parent),
            depth,
            state: NodeState::Collapsed,
            can_expand: true,
            projection: None,
            children: Vec::new(),
            lookup: HashMap::new(),
            header_rows: 0,
            header_id: None,
        }
    }
}

/// A lazily expanded tree of projections, flattened into one row sequence.
pub struct ExpansionTree<R: RowObject + ?Sized> {
    nodes: SlotMap<NodeId, ExpansionNode<R>>,
    root: NodeId,
    expander: Expander<R>,
    classifier: NodeClassifier<R>,
    stale: Arc<Mutex<Vec<NodeId>>>,
    dirty: Arc<AtomicBool>,
    flattened: RwLock<Vec<RowRef<R>>>,
    search_window: usize,
    signals: TreeSignals,
}

impl<R: RowObject + ?Sized> ExpansionTree<R> {
    /// Creates a tree over `source`, with the root level described by `level`.
    pub fn new<E, C>(
        source: Arc<RowCollection<R>>,
        level: LevelSpec<R>,
        expander: E,
        classifier: C,
    ) -> Result<Self>
    where
        E: Fn(&R) -> Option<Arc<RowCollection<R>>> + Send + Sync + 'static,
        C: Fn(&R) -> LevelSpec<R> + Send + Sync + 'static,
    {
        let projection = ProjectionModel::builder(source, level.schema)
            .sort(level.sort)
            .filter(level.filter)
            .build()?;

        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(ExpansionNode {
            row: None,
            parent: None,
            depth: 0,
            state: NodeState::Expanded,
            can_expand: true,
            projection: None,
            children: Vec::new(),
            lookup: HashMap::new(),
            header_rows: 0,
            header_id: None,
        });

        let mut tree = Self {
            nodes,
            root,
            expander: Arc::new(expander),
            classifier: Arc::new(classifier),
            stale: Arc::new(Mutex::new(Vec::new())),
            dirty: Arc::new(AtomicBool::new(true)),
            flattened: RwLock::new(Vec::new()),
            search_window: DEFAULT_SEARCH_WINDOW,
            signals: TreeSignals::default(),
        };
        tree.attach(root, projection);
        tree.sync_children(root);
        Ok(tree)
    }

    /// Sets how many rows around a hint are checked before a full scan.
    pub fn with_search_window(mut self, search_window: usize) -> Self {
        self.search_window = search_window;
        self
    }

    pub fn signals(&self) -> &TreeSignals {
        &self.signals
    }

    /// The root node. It has no row and is always expanded.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The projection of the top-level rows.
    pub fn root_projection(&self) -> Option<&ProjectionModel<R>> {
        self.projection(self.root)
    }

    // -------------------------------------------------------------------------
    // Node queries
    // -------------------------------------------------------------------------

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        self.nodes.get(id).map(|node| node.state)
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.state(id) == Some(NodeState::Expanded)
    }

    /// Whether the node may have children. Optimistically `true` until an
    /// expansion finds none.
    pub fn can_expand(&self, id: NodeId) -> Option<bool> {
        self.nodes.get(id).map(|node| node.can_expand)
    }

    pub fn row(&self, id: NodeId) -> Option<Arc<R>> {
        self.nodes.get(id).and_then(|node| node.row.clone())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(id).map(|node| node.depth)
    }

    /// Child nodes in projection order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// The nested projection of an expanded node.
    pub fn projection(&self, id: NodeId) -> Option<&ProjectionModel<R>> {
        self.nodes.get(id).and_then(|node| node.projection.as_ref())
    }

    /// Header pseudo-rows shown before an expanded node's children.
    pub fn header_rows(&self, id: NodeId) -> Option<(HeaderId, usize)> {
        let node = self.nodes.get(id)?;
        node.header_id.map(|header| (header, node.header_rows))
    }

    /// Finds the node of the first flattened occurrence of `row`.
    pub fn node_for_row(&self, row: &Arc<R>) -> Option<NodeId> {
        self.rows().iter().find_map(|entry| match entry {
            RowRef::Data {
                row: candidate,
                node,
                ..
            } if same_row(candidate, row) => *node,
            _ => None,
        })
    }

    /// The column schema of the level a flattened data row belongs to.
    pub fn schema_of(&self, entry: &RowRef<R>) -> Option<Arc<ColumnSchema<R>>> {
        let parent = self.parent(entry.node()?)?;
        self.projection(parent).map(|projection| projection.schema().clone())
    }

    // -------------------------------------------------------------------------
    // Expansion
    // -------------------------------------------------------------------------

    /// Expands a collapsed node.
    ///
    /// Returns `false` if the expander found no children; the node then stays
    /// collapsed and is marked as not expandable.
    pub fn expand(&mut self, id: NodeId) -> Result<bool> {
        let node = self.nodes.get_mut(id).ok_or(GridError::UnknownNode)?;
        if node.state != NodeState::Collapsed {
            return Err(GridError::InvalidTransition {
                action: "expand",
                state: node.state,
            });
        }
        let Some(row) = node.row.clone() else {
            return Err(GridError::UnknownNode);
        };
        node.state = NodeState::Expanding;

        let children = (self.expander)(&row).filter(|children| !children.is_empty());
        let Some(children) = children else {
            let node = &mut self.nodes[id];
            node.state = NodeState::Collapsed;
            node.can_expand = false;
            tracing::debug!(target: targets::TREE, ?id, "node has no children");
            return Ok(false);
        };

        let level = (self.classifier)(&row);
        let built = ProjectionModel::builder(children, level.schema)
            .sort(level.sort)
            .filter(level.filter)
            .build();
        let projection = match built {
            Ok(projection) => projection,
            Err(err) => {
                self.nodes[id].state = NodeState::Collapsed;
                return Err(err);
            }
        };

        {
            let node = &mut self.nodes[id];
            node.can_expand = true;
            node.header_rows = level.header_rows;
            node.header_id = (level.header_rows > 0).then(HeaderId::next);
            node.state = NodeState::Expanded;
        }
        self.attach(id, projection);
        self.sync_children(id);
        self.invalidate();

        tracing::debug!(
            target: targets::TREE,
            ?id,
            children = self.children(id).len(),
            "node expanded"
        );
        self.signals.expanded.emit(id);
        Ok(true)
    }

    /// Collapses an expanded node, tearing down its subtree first.
    pub fn collapse(&mut self, id: NodeId) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or(GridError::UnknownNode)?;
        if node.state != NodeState::Expanded || id == self.root {
            return Err(GridError::InvalidTransition {
                action: "collapse",
                state: node.state,
            });
        }
        node.state = NodeState::Collapsing;
        let children = std::mem::take(&mut node.children);
        node.lookup.clear();

        for child in children {
            self.destroy(child);
        }

        {
            let node = &mut self.nodes[id];
            node.projection = None;
            node.header_id = None;
            node.header_rows = 0;
            node.state = NodeState::Collapsed;
        }
        self.invalidate();

        tracing::debug!(target: targets::TREE, ?id, "node collapsed");
        self.signals.collapsed.emit(id);
        Ok(())
    }

    /// Expands a collapsed node or collapses an expanded one.
    ///
    /// Returns whether the node is expanded afterwards.
    pub fn toggle(&mut self, id: NodeId) -> Result<bool> {
        match self.state(id) {
            Some(NodeState::Expanded) => self.collapse(id).map(|()| false),
            Some(_) => self.expand(id),
            None => Err(GridError::UnknownNode),
        }
    }

    pub fn expand_row(&mut self, row: &Arc<R>) -> Result<bool> {
        let id = self.node_for_row(row).ok_or(GridError::UnknownNode)?;
        self.expand(id)
    }

    pub fn collapse_row(&mut self, row: &Arc<R>) -> Result<()> {
        let id = self.node_for_row(row).ok_or(GridError::UnknownNode)?;
        self.collapse(id)
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Applies pending projection refreshes, then reconciles every node whose
    /// projection changed.
    ///
    /// All projections are refreshed even if one fails; the first failure is
    /// returned.
    pub fn refresh(&mut self) -> Result<()> {
        let mut first_error = None;
        for id in self.expanded_preorder() {
            if let Some(projection) = self.projection(id)
                && let Err(err) = projection.apply_pending()
            {
                first_error.get_or_insert(err);
            }
        }

        loop {
            let mut stale = std::mem::take(&mut *self.stale.lock());
            if stale.is_empty() {
                break;
            }
            stale.sort_unstable();
            stale.dedup();
            for id in stale {
                if self.nodes.contains_key(id) {
                    self.sync_children(id);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Applies the node's pending projection refresh, then reconciles its
    /// children with the result.
    ///
    /// The children are reconciled even if the refresh fails; the failure is
    /// returned afterwards.
    pub fn refresh_children(&mut self, id: NodeId) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(GridError::UnknownNode);
        }
        let refreshed = match self.projection(id) {
            Some(projection) => projection.apply_pending().map(drop),
            None => Ok(()),
        };
        self.sync_children(id);
        refreshed
    }

    fn attach(&mut self, id: NodeId, projection: ProjectionModel<R>) {
        let stale = self.stale.clone();
        let dirty = self.dirty.clone();
        projection.signals().changed.connect(move |_| {
            stale.lock().push(id);
            dirty.store(true, Ordering::Release);
        });
        self.nodes[id].projection = Some(projection);
    }

    /// Matches child nodes to the projection's rows by reference: matched
    /// nodes keep their state, unmatched nodes are destroyed and new rows get
    /// collapsed nodes.
    fn sync_children(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let Some(rows) = node.projection.as_ref().map(ProjectionModel::items) else {
            return;
        };
        let depth = if id == self.root { 0 } else { node.depth + 1 };
        let mut previous = std::mem::take(&mut node.lookup);

        let mut children = Vec::with_capacity(rows.len());
        let mut lookup = HashMap::with_capacity(rows.len());
        let mut created = 0usize;
        for row in rows {
            let key = RowKey::of(&row);
            if lookup.contains_key(&key) {
                continue;
            }
            let child = match previous.remove(&key) {
                Some(child) => child,
                None => {
                    created += 1;
                    self.nodes.insert(ExpansionNode::collapsed(row, id, depth))
                }
            };
            lookup.insert(key, child);
            children.push(child);
        }

        let removed = previous.len();
        for orphan in previous.into_values() {
            self.destroy(orphan);
        }

        let node = &mut self.nodes[id];
        node.children = children;
        node.lookup = lookup;
        self.invalidate();

        tracing::trace!(target: targets::TREE, ?id, created, removed, "children reconciled");
    }

    /// Removes a node and its subtree, descendants first.
    fn destroy(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            self.destroy(child);
        }
        if let Some(node) = self.nodes.remove(id)
            && node.state == NodeState::Expanded
        {
            self.signals.collapsed.emit(id);
        }
    }

    fn expanded_preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if node.projection.is_some() {
                order.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    // -------------------------------------------------------------------------
    // Flattening
    // -------------------------------------------------------------------------

    fn invalidate(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// The flattened rows, rebuilt first if anything changed.
    ///
    /// Drop the guard before mutating the tree or its collections: the next
    /// call rebuilds under a write lock and blocks while a guard is alive.
    pub fn rows(&self) -> RwLockReadGuard<'_, Vec<RowRef<R>>> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            let _perf = PerfSpan::new("tree.flatten");
            let mut rows = Vec::new();
            self.flatten_into(self.root, 0, &mut rows);
            tracing::trace!(target: targets::TREE, rows = rows.len(), "tree flattened");
            *self.flattened.write() = rows;
        }
        self.flattened.read()
    }

    fn flatten_into(&self, id: NodeId, depth: usize, out: &mut Vec<RowRef<R>>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let Some(projection) = node.projection.as_ref() else {
            return;
        };
        for row in projection.items() {
            let child = node.lookup.get(&RowKey::of(&row)).copied();
            out.push(RowRef::Data {
                row,
                depth,
                node: child,
            });

            let Some((child_id, child)) =
                child.and_then(|child_id| Some((child_id, self.nodes.get(child_id)?)))
            else {
                continue;
            };
            if child.state != NodeState::Expanded {
                continue;
            }
            if let Some(header) = child.header_id {
                out.extend((0..child.header_rows).map(|ordinal| RowRef::Header {
                    id: header,
                    ordinal,
                    depth: depth + 1,
                }));
            }
            self.flatten_into(child_id, depth + 1, out);
        }
    }
}

impl<R: RowObject + ?Sized> RowSequence<R> for ExpansionTree<R> {
    fn row_count(&self) -> usize {
        self.rows().len()
    }

    fn row_at(&self, index: usize) -> Option<RowRef<R>> {
        self.rows().get(index).cloned()
    }

    fn search_window(&self) -> usize {
        self.search_window
    }

    fn index_of(&self, target: &RowRef<R>, hint: Option<usize>) -> Option<usize> {
        let rows = self.rows();
        locate(rows.len(), hint, self.search_window, |index| {
            rows[index].is_same(target)
        })
    }
}

impl<R: RowObject + ?Sized> fmt::Debug for ExpansionTree<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpansionTree")
            .field("nodes", &self.nodes.len())
            .field("dirty", &self.dirty.load(Ordering::Acquire))
            .finish()
    }
}
