//! Reference-count-aware, strategy-driven delayed destruction of GPU objects.
//!
//! A GPU object must not be destroyed while the GPU may still be reading it, so the last
//! owner hands it here instead of dropping it. Entries land in a write-side list guarded
//! by a lock; the render thread's [`DeferredDeleter::update`] scans the read-side list
//! without taking that lock and the two sides swap under the lock afterwards, so a push
//! from another thread never blocks on a long scan and never tears it.

use crate::registry::{RenderResource, ResourceTypeId, ResourceTypeRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// When a deferred resource is actually destroyed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeferredDeleteStrategy {
    /// No deferral, destroy during the `defer_delete` call itself
    Immediate,
    /// Destroy after this many calls to `update` (one per frame)
    FrameCount { defer_frames: u32 },
    /// Destroy after this many swapchain cycles
    SwapchainCount { defer_count: u32 },
    /// Destroy once this much wall-clock time has passed since the enqueue
    TimePeriod { duration: Duration },
}

/// What gets destroyed: a registered resource, or a bare closure for objects that live
/// outside the type registry.
pub enum DeferredResource {
    Resource(Arc<dyn RenderResource>),
    Deleter(Box<dyn FnOnce() + Send>),
}

pub struct DeferringData {
    pub resource: DeferredResource,
    pub strategy: DeferredDeleteStrategy,
}

struct PendingDelete {
    data: DeferringData,
    elapsed: u32,
    queued_at: Instant,
}

pub struct DeferredDeleter {
    registry: Arc<ResourceTypeRegistry>,

    /// Types (with their subtypes) whose `Arc` strong count is meaningful as a GPU-object
    /// ownership count. Anything else handed in is destroyed immediately with an alert.
    ref_counted_roots: Vec<ResourceTypeId>,

    /// Set once at shutdown; from then on every `defer_delete` destroys synchronously
    clearing: AtomicBool,

    /// Write side of the double buffer. The lock covers only the check-and-push and the
    /// buffer swap, never the scan.
    write_queue: Mutex<Vec<PendingDelete>>,

    /// Read side, only ever touched by the render thread
    read_queue: Vec<PendingDelete>,
}

impl DeferredDeleter {
    pub fn new(
        registry: Arc<ResourceTypeRegistry>,
        ref_counted_roots: Vec<ResourceTypeId>,
    ) -> Self {
        DeferredDeleter {
            registry,
            ref_counted_roots,
            clearing: AtomicBool::new(false),
            write_queue: Mutex::new(Vec::new()),
            read_queue: Vec::new(),
        }
    }

    fn delete_resource(
        registry: &ResourceTypeRegistry,
        resource: DeferredResource,
    ) {
        match resource {
            DeferredResource::Resource(resource) => {
                let delete_fn = registry.delete_fn_of(resource.resource_type());
                (delete_fn)(resource);
            }
            DeferredResource::Deleter(deleter) => (deleter)(),
        }
    }

    /// Number of entries waiting in either buffer.
    pub fn pending_count(&self) -> usize {
        self.read_queue.len() + self.write_queue.lock().unwrap().len()
    }

    /// Queue `deferring_info` for delayed destruction. Safe to call from any thread.
    /// During shutdown, or for the `Immediate` strategy, destruction happens right here.
    pub fn defer_delete(
        &self,
        deferring_info: DeferringData,
    ) {
        if self.clearing.load(Ordering::Acquire)
            || deferring_info.strategy == DeferredDeleteStrategy::Immediate
        {
            Self::delete_resource(&self.registry, deferring_info.resource);
            return;
        }

        let mut write_queue = self.write_queue.lock().unwrap();
        write_queue.push(PendingDelete {
            data: deferring_info,
            elapsed: 0,
            queued_at: Instant::now(),
        });
    }

    /// The live external reference count of `resource`, or None when its type is not one
    /// of the ref-countable kinds. Our own strong handle is excluded from the count.
    fn live_references(
        &self,
        resource: &Arc<dyn RenderResource>,
    ) -> Option<u32> {
        let ty = resource.resource_type();
        let supported = self
            .ref_counted_roots
            .iter()
            .any(|&root| self.registry.is_child_of(ty, root));
        supported.then(|| (Arc::strong_count(resource) - 1) as u32)
    }

    /// Render-thread tick. Scans the read-side list, destroys what is due, then swaps the
    /// buffers so entries pushed meanwhile get picked up next tick.
    #[profiling::function]
    pub fn update(&mut self) {
        let mut survivors = Vec::new();
        for mut entry in std::mem::take(&mut self.read_queue) {
            let mut unsupported = false;
            let mut reacquired = false;
            if let DeferredResource::Resource(resource) = &entry.data.resource {
                match self.live_references(resource) {
                    None => {
                        log::error!(
                            "Unsupported type {} for deferred deletion resource {}",
                            self.registry.type_name(resource.resource_type()),
                            resource.resource_name()
                        );
                        unsupported = true;
                    }
                    // Somewhere a reference was acquired again, so the entry leaves the
                    // list without destroying anything
                    Some(references) if references > 0 => reacquired = true,
                    Some(_) => {}
                }
            }
            if unsupported {
                Self::delete_resource(&self.registry, entry.data.resource);
                continue;
            }
            if reacquired {
                continue;
            }

            match entry.data.strategy {
                DeferredDeleteStrategy::FrameCount {
                    defer_frames: duration,
                }
                | DeferredDeleteStrategy::SwapchainCount {
                    defer_count: duration,
                } => {
                    if entry.elapsed == duration {
                        Self::delete_resource(&self.registry, entry.data.resource);
                    } else {
                        entry.elapsed += 1;
                        survivors.push(entry);
                    }
                }
                DeferredDeleteStrategy::TimePeriod { duration } => {
                    if entry.queued_at.elapsed() > duration {
                        Self::delete_resource(&self.registry, entry.data.resource);
                    } else {
                        survivors.push(entry);
                    }
                }
                DeferredDeleteStrategy::Immediate => {
                    Self::delete_resource(&self.registry, entry.data.resource);
                }
            }
        }

        // Swap read/write sides. The lock is held only for the exchange, not for the scan
        // above, so concurrent defer_delete calls land in the other buffer.
        {
            let mut write_queue = self.write_queue.lock().unwrap();
            std::mem::swap(&mut *write_queue, &mut self.read_queue);
        }
        self.read_queue.append(&mut survivors);
    }

    /// Unconditionally destroys everything in both buffers. Used once at shutdown so no
    /// GPU object outlives device destruction; any `defer_delete` arriving afterwards
    /// destroys synchronously.
    pub fn clear(&mut self) {
        self.clearing.store(true, Ordering::Release);

        // Any thread mid-push finishes before we drain. update() cannot be running, it is
        // called from the same thread as clear().
        drop(self.write_queue.lock().unwrap());

        for entry in self
            .write_queue
            .lock()
            .unwrap()
            .drain(..)
            .chain(self.read_queue.drain(..))
        {
            Self::delete_resource(&self.registry, entry.data.resource);
        }
    }
}

impl Drop for DeferredDeleter {
    fn drop(&mut self) {
        self.clear();
    }
}
