use super::ResourceTypeId;
use fnv::FnvHashMap;

struct TypeNode {
    ty: ResourceTypeId,
    children: Vec<usize>,
}

/// Tree of registered resource types, built lazily. Newly registered types sit in a wait
/// queue until the first hierarchy query, which splices them under their parent chain.
/// Insertion is idempotent; resolving the queue twice changes nothing.
pub(super) struct TypeGraph {
    nodes: Vec<TypeNode>,
    node_of_type: FnvHashMap<ResourceTypeId, usize>,
    insert_wait_queue: Vec<ResourceTypeId>,
}

impl TypeGraph {
    pub fn new(root: ResourceTypeId) -> Self {
        let mut node_of_type = FnvHashMap::default();
        node_of_type.insert(root, 0);
        TypeGraph {
            nodes: vec![TypeNode {
                ty: root,
                children: Vec::new(),
            }],
            node_of_type,
            insert_wait_queue: Vec::new(),
        }
    }

    /// Insert happens only when querying for some resource
    pub fn lazy_insert(
        &mut self,
        ty: ResourceTypeId,
    ) {
        self.insert_wait_queue.push(ty);
    }

    /// Drain the wait queue into the tree. `parents` is indexed by type id.
    pub fn resolve(
        &mut self,
        parents: &[Option<ResourceTypeId>],
    ) {
        if self.insert_wait_queue.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut self.insert_wait_queue);
        for ty in pending {
            self.ensure_node(ty, parents);
        }
    }

    fn ensure_node(
        &mut self,
        ty: ResourceTypeId,
        parents: &[Option<ResourceTypeId>],
    ) -> usize {
        if let Some(&node) = self.node_of_type.get(&ty) {
            return node;
        }

        // The parent chain is finite and acyclic because a type can only be registered
        // with an already-registered parent
        let parent_ty = parents[ty.index()].expect("only the root type may have no parent");
        let parent_node = self.ensure_node(parent_ty, parents);

        let node = self.nodes.len();
        self.nodes.push(TypeNode {
            ty,
            children: Vec::new(),
        });
        self.nodes[parent_node].children.push(node);
        self.node_of_type.insert(ty, node);
        node
    }

    /// Collect the descendants of `ty`, optionally transitively, optionally only leaf
    /// types. A type that was never registered yields an empty result.
    pub fn find_descendants(
        &self,
        ty: ResourceTypeId,
        recursive: bool,
        leaves_only: bool,
    ) -> Vec<ResourceTypeId> {
        let mut out = Vec::new();
        if let Some(&node) = self.node_of_type.get(&ty) {
            self.collect_children(node, recursive, leaves_only, &mut out);
        }
        out
    }

    /// A type with no registered subtypes is a leaf. Unknown types count as leaves.
    pub fn is_leaf(
        &self,
        ty: ResourceTypeId,
    ) -> bool {
        self.node_of_type
            .get(&ty)
            .map_or(true, |&node| self.nodes[node].children.is_empty())
    }

    pub fn is_known(
        &self,
        ty: ResourceTypeId,
    ) -> bool {
        self.node_of_type.contains_key(&ty)
    }

    fn collect_children(
        &self,
        node: usize,
        recursive: bool,
        leaves_only: bool,
        out: &mut Vec<ResourceTypeId>,
    ) {
        for &child in &self.nodes[node].children {
            if !leaves_only || self.nodes[child].children.is_empty() {
                out.push(self.nodes[child].ty);
            }
            if recursive {
                self.collect_children(child, recursive, leaves_only, out);
            }
        }
    }
}
