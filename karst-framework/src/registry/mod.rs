//! Runtime registry of GPU resource types and their live instances.
//!
//! Every concrete resource class gets one [`ResourceTypeDescriptor`], created through
//! [`ResourceTypeRegistry::register_type`] during a defined startup phase; the registry is
//! an explicit object threaded through to its consumers, never a global. The descriptor
//! table plus the lazily-built type graph answer "give me every live resource that is an
//! instance of type T or any subtype" without any host-language RTTI.
//!
//! Live-instance lists are non-owning: the registry stores weak references in a
//! generational slab, keyed by pointer identity so that re-registering after a resource
//! reinit does not duplicate the entry.

mod type_graph;

use fnv::FnvHashMap;
use karst_base::slab::{GenSlab, GenSlabKey};
use std::sync::{Arc, Mutex, Weak};
use type_graph::TypeGraph;

/// Identifies a concrete resource type registered with a [`ResourceTypeRegistry`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResourceTypeId(u32);

impl ResourceTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Destroys a resource of the descriptor's type once the final strong reference is handed
/// over. Held in the descriptor table so destruction dispatches through the registry
/// rather than through the object itself.
pub type DeleteFn = fn(Arc<dyn RenderResource>);

/// Default [`DeleteFn`]: run the release hook, then drop the final strong reference.
pub fn default_delete(resource: Arc<dyn RenderResource>) {
    resource.release();
}

/// Implemented by anything whose lifetime is observed by the type registry.
pub trait RenderResource: Send + Sync {
    fn resource_type(&self) -> ResourceTypeId;

    fn resource_name(&self) -> String {
        String::new()
    }

    /// GPU-side teardown hook. Called before the final strong reference is dropped.
    fn release(&self) {}
}

/// One per concrete resource type. The default instance doubles as an always-valid
/// placeholder for consumers that need *some* instance of the type before any real one
/// exists.
pub struct ResourceTypeDescriptor {
    name: &'static str,
    parent: Option<ResourceTypeId>,
    default_instance: Option<Arc<dyn RenderResource>>,
    delete_fn: DeleteFn,
}

impl ResourceTypeDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<ResourceTypeId> {
        self.parent
    }

    pub fn default_instance(&self) -> Option<&Arc<dyn RenderResource>> {
        self.default_instance.as_ref()
    }

    pub fn delete_fn(&self) -> DeleteFn {
        self.delete_fn
    }
}

struct LiveEntry {
    resource: Weak<dyn RenderResource>,
}

/// Per-type live-instance list: a generational slab of weak references plus an identity
/// map for O(1), idempotent unregistration.
#[derive(Default)]
struct TypeLiveList {
    slots: GenSlab<LiveEntry>,
    key_by_identity: FnvHashMap<usize, GenSlabKey<LiveEntry>>,
}

struct RegistryInner {
    descriptors: Vec<ResourceTypeDescriptor>,
    live: Vec<TypeLiveList>,
    graph: TypeGraph,
}

impl RegistryInner {
    fn parents(&self) -> Vec<Option<ResourceTypeId>> {
        self.descriptors.iter().map(|d| d.parent).collect()
    }

    fn resolve_graph(&mut self) {
        let parents = self.parents();
        self.graph.resolve(&parents);
    }

    fn live_instances_of_exact(
        &mut self,
        ty: ResourceTypeId,
        out: &mut Vec<Arc<dyn RenderResource>>,
    ) {
        let list = &mut self.live[ty.index()];
        let mut dead = Vec::new();
        for (&identity, &key) in &list.key_by_identity {
            match list.slots.get(key).and_then(|entry| entry.resource.upgrade()) {
                Some(resource) => out.push(resource),
                None => dead.push((identity, key)),
            }
        }

        // Entries whose resource went away without unregistering are purged as we notice
        // them
        for (identity, key) in dead {
            list.key_by_identity.remove(&identity);
            list.slots.free(key);
        }
    }
}

/// The process-wide (but explicitly constructed) registry of resource types.
pub struct ResourceTypeRegistry {
    inner: Mutex<RegistryInner>,
    root: ResourceTypeId,
}

fn identity_of(resource: &dyn RenderResource) -> usize {
    resource as *const dyn RenderResource as *const () as usize
}

impl ResourceTypeRegistry {
    /// Creates the registry with the single root type every other type descends from.
    pub fn new() -> Self {
        let root = ResourceTypeId(0);
        let descriptors = vec![ResourceTypeDescriptor {
            name: "render_resource",
            parent: None,
            default_instance: None,
            delete_fn: default_delete,
        }];

        ResourceTypeRegistry {
            inner: Mutex::new(RegistryInner {
                descriptors,
                live: vec![TypeLiveList::default()],
                graph: TypeGraph::new(root),
            }),
            root,
        }
    }

    pub fn root_type(&self) -> ResourceTypeId {
        self.root
    }

    /// Registers a concrete type under an already-registered parent and returns its id.
    /// The new type is only spliced into the type graph on the next hierarchy query.
    pub fn register_type(
        &self,
        name: &'static str,
        parent: ResourceTypeId,
    ) -> ResourceTypeId {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            parent.index() < inner.descriptors.len(),
            "parent type must be registered first"
        );

        let ty = ResourceTypeId(inner.descriptors.len() as u32);
        inner.descriptors.push(ResourceTypeDescriptor {
            name,
            parent: Some(parent),
            default_instance: None,
            delete_fn: default_delete,
        });
        inner.live.push(TypeLiveList::default());
        inner.graph.lazy_insert(ty);
        log::trace!("registered resource type {} ({:?})", name, ty);
        ty
    }

    /// Attaches the canonical default instance for a type. Expected to be called once,
    /// right after the type is registered.
    pub fn set_type_default_instance(
        &self,
        ty: ResourceTypeId,
        instance: Arc<dyn RenderResource>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let descriptor = &mut inner.descriptors[ty.index()];
        debug_assert!(descriptor.default_instance.is_none());
        descriptor.default_instance = Some(instance);
    }

    pub fn set_type_delete_fn(
        &self,
        ty: ResourceTypeId,
        delete_fn: DeleteFn,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.descriptors[ty.index()].delete_fn = delete_fn;
    }

    pub fn type_name(
        &self,
        ty: ResourceTypeId,
    ) -> &'static str {
        self.inner.lock().unwrap().descriptors[ty.index()].name
    }

    pub fn parent_of(
        &self,
        ty: ResourceTypeId,
    ) -> Option<ResourceTypeId> {
        self.inner.lock().unwrap().descriptors[ty.index()].parent
    }

    pub fn delete_fn_of(
        &self,
        ty: ResourceTypeId,
    ) -> DeleteFn {
        self.inner.lock().unwrap().descriptors[ty.index()].delete_fn
    }

    pub fn default_instance_of(
        &self,
        ty: ResourceTypeId,
    ) -> Option<Arc<dyn RenderResource>> {
        self.inner.lock().unwrap().descriptors[ty.index()]
            .default_instance
            .clone()
    }

    /// True when `ty` is `ancestor` or transitively descends from it.
    pub fn is_child_of(
        &self,
        ty: ResourceTypeId,
        ancestor: ResourceTypeId,
    ) -> bool {
        let inner = self.inner.lock().unwrap();
        let mut current = Some(ty);
        while let Some(ty) = current {
            if ty == ancestor {
                return true;
            }
            current = inner.descriptors[ty.index()].parent;
        }
        false
    }

    /// Adds `resource` to its type's live list. Idempotent: an already-registered
    /// resource (say, re-registering after a reinit) is unregistered first, so no
    /// duplicate entry can exist.
    pub fn register_resource(
        &self,
        resource: Arc<dyn RenderResource>,
    ) {
        let ty = resource.resource_type();
        let identity = identity_of(&*resource);

        let mut inner = self.inner.lock().unwrap();
        debug_assert!(ty.index() < inner.live.len());
        let list = &mut inner.live[ty.index()];
        if let Some(key) = list.key_by_identity.remove(&identity) {
            list.slots.free(key);
        }

        let key = list.slots.allocate(LiveEntry {
            resource: Arc::downgrade(&resource),
        });
        list.key_by_identity.insert(identity, key);
    }

    /// Removes `resource` from its type's live list. Unregistering a resource that was
    /// never registered is a no-op.
    pub fn unregister_resource(
        &self,
        resource: &dyn RenderResource,
    ) {
        let ty = resource.resource_type();
        let identity = identity_of(resource);

        let mut inner = self.inner.lock().unwrap();
        let list = &mut inner.live[ty.index()];
        if let Some(key) = list.key_by_identity.remove(&identity) {
            list.slots.free(key);
        }
    }

    /// Returns the types descending from `ty` (excluding `ty` itself). The first query
    /// after new registrations pays the lazy graph-resolution cost.
    pub fn find_descendants(
        &self,
        ty: ResourceTypeId,
        recursive: bool,
        leaves_only: bool,
    ) -> Vec<ResourceTypeId> {
        let mut inner = self.inner.lock().unwrap();
        inner.resolve_graph();
        inner.graph.find_descendants(ty, recursive, leaves_only)
    }

    /// Every live instance of `ty` or (per the flags) its subtypes, each exactly once.
    /// Querying a type with no live instances returns an empty vec, not an error.
    pub fn all_live_instances_of(
        &self,
        ty: ResourceTypeId,
        recursive: bool,
        leaves_only: bool,
    ) -> Vec<Arc<dyn RenderResource>> {
        let mut inner = self.inner.lock().unwrap();
        inner.resolve_graph();
        if !inner.graph.is_known(ty) {
            return Vec::new();
        }

        let mut types = inner.graph.find_descendants(ty, recursive, leaves_only);
        if !leaves_only || inner.graph.is_leaf(ty) {
            types.insert(0, ty);
        }

        let mut out = Vec::new();
        for ty in types {
            inner.live_instances_of_exact(ty, &mut out);
        }
        out
    }

    /// The default instances of every type descending from `ty`.
    pub fn child_default_resources(
        &self,
        ty: ResourceTypeId,
        recursive: bool,
        leaves_only: bool,
    ) -> Vec<Arc<dyn RenderResource>> {
        let mut inner = self.inner.lock().unwrap();
        inner.resolve_graph();
        inner
            .graph
            .find_descendants(ty, recursive, leaves_only)
            .into_iter()
            .filter_map(|ty| inner.descriptors[ty.index()].default_instance.clone())
            .collect()
    }

    /// Count of live instances registered under exactly `ty`.
    pub fn live_count_of_exact(
        &self,
        ty: ResourceTypeId,
    ) -> usize {
        self.inner.lock().unwrap().live[ty.index()].slots.count()
    }
}

impl Default for ResourceTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestResource;

    fn names(
        registry: &ResourceTypeRegistry,
        types: &[ResourceTypeId],
    ) -> Vec<&'static str> {
        types.iter().map(|&t| registry.type_name(t)).collect()
    }

    #[test]
    fn test_find_descendants() {
        let registry = ResourceTypeRegistry::new();
        let type_a = registry.register_type("a", registry.root_type());
        let type_b = registry.register_type("b", type_a);
        let type_c = registry.register_type("c", type_b);
        let type_d = registry.register_type("d", type_a);

        assert_eq!(
            names(&registry, &registry.find_descendants(type_a, true, false)),
            vec!["b", "c", "d"]
        );
        assert_eq!(
            names(&registry, &registry.find_descendants(type_a, false, false)),
            vec!["b", "d"]
        );
        // c and d are the leaves under a
        assert_eq!(
            names(&registry, &registry.find_descendants(type_a, true, true)),
            vec!["c", "d"]
        );
        assert!(registry.find_descendants(type_c, true, false).is_empty());
        assert!(registry.is_child_of(type_c, type_a));
        assert!(!registry.is_child_of(type_d, type_b));
        assert_eq!(registry.parent_of(type_b), Some(type_a));
    }

    #[test]
    fn test_lazy_resolution_is_incremental() {
        let registry = ResourceTypeRegistry::new();
        let type_a = registry.register_type("a", registry.root_type());

        // First query drains the pending queue
        assert!(registry.find_descendants(type_a, true, false).is_empty());

        // Types registered after a query show up on the next one
        let type_b = registry.register_type("b", type_a);
        assert_eq!(
            registry.find_descendants(type_a, true, false),
            vec![type_b]
        );
    }

    #[test]
    fn test_live_instances_include_subtypes() {
        let registry = ResourceTypeRegistry::new();
        let type_a = registry.register_type("a", registry.root_type());
        let type_b = registry.register_type("b", type_a);

        let a_instances = [TestResource::new(type_a), TestResource::new(type_a)];
        let b_instances = [TestResource::new(type_b), TestResource::new(type_b)];
        for resource in a_instances.iter().chain(&b_instances) {
            registry.register_resource(resource.clone());
        }

        let all = registry.all_live_instances_of(type_a, true, false);
        assert_eq!(all.len(), 4);

        // Each instance appears exactly once
        let mut identities: Vec<usize> = all
            .iter()
            .map(|r| Arc::as_ptr(r) as *const () as usize)
            .collect();
        identities.sort_unstable();
        identities.dedup();
        assert_eq!(identities.len(), 4);

        assert_eq!(registry.all_live_instances_of(type_b, true, false).len(), 2);
    }

    #[test]
    fn test_register_resource_is_idempotent() {
        let registry = ResourceTypeRegistry::new();
        let type_a = registry.register_type("a", registry.root_type());

        let resource = TestResource::new(type_a);
        registry.register_resource(resource.clone());
        registry.register_resource(resource.clone());

        assert_eq!(registry.live_count_of_exact(type_a), 1);
        assert_eq!(registry.all_live_instances_of(type_a, false, false).len(), 1);

        registry.unregister_resource(&*resource);
        assert_eq!(registry.live_count_of_exact(type_a), 0);

        // Unregistering again is a no-op
        registry.unregister_resource(&*resource);
    }

    #[test]
    fn test_dead_instances_are_skipped() {
        let registry = ResourceTypeRegistry::new();
        let type_a = registry.register_type("a", registry.root_type());

        let resource = TestResource::new(type_a);
        registry.register_resource(resource.clone());
        drop(resource);

        assert!(registry.all_live_instances_of(type_a, false, false).is_empty());
    }

    #[test]
    fn test_child_default_resources() {
        let registry = ResourceTypeRegistry::new();
        let type_a = registry.register_type("a", registry.root_type());
        let type_b = registry.register_type("b", type_a);

        let default_b = TestResource::new(type_b);
        registry.set_type_default_instance(type_b, default_b.clone());

        let defaults = registry.child_default_resources(type_a, true, false);
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].resource_type(), type_b);
    }
}
