use super::Generation;
use super::GenerationIndex;
use super::SlabIndexT;
use std::marker::PhantomData;

/// A key to use with a `GenSlab`. Internally, it holds an element index and a generation
/// index.
#[derive(Eq)]
pub struct GenSlabKey<T> {
    /// Raw index to location within the slab
    index: SlabIndexT,

    /// Generation index of this element
    generation_index: GenerationIndex,

    phantom_data: PhantomData<T>,
}

impl<T> GenSlabKey<T> {
    fn new(
        index: SlabIndexT,
        generation_index: GenerationIndex,
    ) -> GenSlabKey<T> {
        GenSlabKey::<T> {
            index,
            generation_index,
            phantom_data: PhantomData,
        }
    }

    pub fn index(&self) -> SlabIndexT {
        self.index
    }
}

impl<T> Clone for GenSlabKey<T> {
    fn clone(&self) -> Self {
        GenSlabKey {
            index: self.index,
            generation_index: self.generation_index,
            phantom_data: PhantomData,
        }
    }
}

impl<T> Copy for GenSlabKey<T> {}

impl<T> PartialEq for GenSlabKey<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.index == other.index && self.generation_index == other.generation_index
    }
}

impl<T> std::hash::Hash for GenSlabKey<T> {
    fn hash<H: std::hash::Hasher>(
        &self,
        state: &mut H,
    ) {
        self.index.hash(state);
        self.generation_index.hash(state);
    }
}

impl<T> std::fmt::Debug for GenSlabKey<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        write!(
            f,
            "Index: {} Generation: {:?}",
            self.index, self.generation_index
        )
    }
}

/// A slab where each slot is a T with a generation.
///
/// A typical use-case is a pool of elements where allocation/deallocation is explicitly
/// controlled, but other code holds indexes into the pool. The generation prevents a slot
/// from being accessed through a stale key after it has been recycled.
pub struct GenSlab<T> {
    /// List of actual Ts
    storage: Vec<Generation<T>>,

    /// List of unused slot indexes
    free_list: Vec<SlabIndexT>,
}

impl<T> GenSlab<T> {
    /// Create an empty GenSlab
    pub fn new() -> Self {
        GenSlab::with_capacity(32)
    }

    /// Create an empty but presized GenSlab
    pub fn with_capacity(capacity: SlabIndexT) -> Self {
        let mut storage = Vec::with_capacity(capacity as usize);
        let mut free_list = Vec::with_capacity(capacity as usize);

        // reverse count so index 0 is at the top of the free list
        for index in (0..capacity).rev() {
            storage.push(Generation::<T>::new());
            free_list.push(index);
        }

        GenSlab { storage, free_list }
    }

    /// Insert a T into the slab. A generation-aware key is returned.
    ///
    /// Allocation can cause vectors to be resized. Use `with_capacity` to avoid this.
    pub fn allocate(
        &mut self,
        value: T,
    ) -> GenSlabKey<T> {
        if let Some(index) = self.free_list.pop() {
            let generation_index = self.storage[index as usize].allocate(value);
            GenSlabKey::new(index, generation_index)
        } else {
            let index = self.storage.len() as SlabIndexT;
            let mut generation = Generation::new();
            let generation_index = generation.allocate(value);
            self.storage.push(generation);
            GenSlabKey::new(index, generation_index)
        }
    }

    /// Remove the T from the slab. Fatal if the key is stale.
    pub fn free(
        &mut self,
        slab_key: GenSlabKey<T>,
    ) -> T {
        let value = self.storage[slab_key.index as usize].free(slab_key.generation_index);
        self.free_list.push(slab_key.index);
        value
    }

    /// Returns true if the key still refers to a live element
    pub fn exists(
        &self,
        slab_key: GenSlabKey<T>,
    ) -> bool {
        self.storage[slab_key.index as usize].exists(slab_key.generation_index)
    }

    /// Try to get the given element; a stale key returns None
    pub fn get(
        &self,
        slab_key: GenSlabKey<T>,
    ) -> Option<&T> {
        self.storage[slab_key.index as usize].get(slab_key.generation_index)
    }

    /// Try to get the given element; a stale key returns None
    pub fn get_mut(
        &mut self,
        slab_key: GenSlabKey<T>,
    ) -> Option<&mut T> {
        self.storage[slab_key.index as usize].get_mut(slab_key.generation_index)
    }

    /// Iterate all live values
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.storage
            .iter()
            .filter_map(|generation| generation.get_unchecked())
    }

    /// Return count of allocated Ts
    pub fn count(&self) -> usize {
        self.storage.len() - self.free_list.len()
    }
}

impl<T> Default for GenSlab<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_get_free() {
        let mut slab = GenSlab::<u32>::new();
        let key = slab.allocate(7);
        assert_eq!(*slab.get(key).unwrap(), 7);
        assert_eq!(slab.count(), 1);

        assert_eq!(slab.free(key), 7);
        assert_eq!(slab.count(), 0);
        assert!(slab.get(key).is_none());
    }

    #[test]
    fn test_stale_key_detected() {
        let mut slab = GenSlab::<u32>::new();
        let key_a = slab.allocate(1);
        slab.free(key_a);

        // The slot is recycled but the old key must not see the new value
        let key_b = slab.allocate(2);
        assert_eq!(key_a.index(), key_b.index());
        assert!(slab.get(key_a).is_none());
        assert_eq!(*slab.get(key_b).unwrap(), 2);
    }

    #[test]
    fn test_iter_live_only() {
        let mut slab = GenSlab::<u32>::new();
        let _key_a = slab.allocate(1);
        let key_b = slab.allocate(2);
        let _key_c = slab.allocate(3);
        slab.free(key_b);

        let mut values: Vec<u32> = slab.iter().copied().collect();
        values.sort_unstable();
        assert_eq!(values, vec![1, 3]);
    }
}
