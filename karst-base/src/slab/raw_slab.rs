use super::SlabIndexT;
use std::marker::PhantomData;

/// A key to a value in a `RawSlab`
pub struct RawSlabKey<T: Sized> {
    /// Raw location within the slab
    index: SlabIndexT,

    phantom_data: PhantomData<T>,
}

impl<T: Sized> RawSlabKey<T> {
    fn new(index: SlabIndexT) -> Self {
        RawSlabKey {
            index,
            phantom_data: PhantomData,
        }
    }

    pub fn index(&self) -> SlabIndexT {
        self.index
    }
}

impl<T: Sized> Clone for RawSlabKey<T> {
    fn clone(&self) -> RawSlabKey<T> {
        RawSlabKey {
            index: self.index,
            phantom_data: Default::default(),
        }
    }
}

impl<T: Sized> Copy for RawSlabKey<T> {}

/// A very simple, minimalist slab structure. Keys returned by `allocate` are plain
/// indexes, so a key held past the `free` of its slot will alias whatever gets stored
/// there next. Use `GenSlab` when stale keys need to be detected.
pub struct RawSlab<T> {
    /// List of Ts, will be tightly packed
    storage: Vec<Option<T>>,

    /// List of unused indexes within the storage
    free_list: Vec<SlabIndexT>,
}

impl<T> RawSlab<T> {
    /// Create an empty RawSlab
    pub fn new() -> Self {
        Self::with_capacity(32)
    }

    /// Create an empty but presized RawSlab
    pub fn with_capacity(capacity: SlabIndexT) -> Self {
        let mut storage = Vec::with_capacity(capacity as usize);
        let mut free_list = Vec::with_capacity(capacity as usize);

        // reverse count so index 0 is at the top of the free list
        for index in (0..capacity).rev() {
            storage.push(None);
            free_list.push(index);
        }

        RawSlab { storage, free_list }
    }

    /// Allocate a slot within the slab, reusing a free slot if one exists.
    pub fn allocate(
        &mut self,
        value: T,
    ) -> RawSlabKey<T> {
        if let Some(index) = self.free_list.pop() {
            assert!(self.storage[index as usize].is_none());
            self.storage[index as usize] = Some(value);
            RawSlabKey::new(index)
        } else {
            let index = self.storage.len() as SlabIndexT;
            self.storage.push(Some(value));
            RawSlabKey::new(index)
        }
    }

    /// Free an element in the slab. It is fatal to free an element that doesn't exist.
    pub fn free(
        &mut self,
        slab_key: RawSlabKey<T>,
    ) {
        assert!(
            self.storage[slab_key.index as usize].is_some(),
            "tried to free a none value"
        );
        self.storage[slab_key.index as usize] = None;
        self.free_list.push(slab_key.index);
    }

    /// Check if an element exists
    pub fn exists(
        &self,
        slab_key: RawSlabKey<T>,
    ) -> bool {
        self.storage[slab_key.index as usize].is_some()
    }

    /// Try to get the given element
    pub fn get(
        &self,
        slab_key: RawSlabKey<T>,
    ) -> Option<&T> {
        self.storage[slab_key.index as usize].as_ref()
    }

    /// Try to get the given element
    pub fn get_mut(
        &mut self,
        slab_key: RawSlabKey<T>,
    ) -> Option<&mut T> {
        self.storage[slab_key.index as usize].as_mut()
    }

    /// Iterate all values
    pub fn iter(&self) -> impl Iterator<Item = (RawSlabKey<T>, &T)> {
        self.storage
            .iter()
            .enumerate()
            .filter_map(|(index, value)| {
                value
                    .as_ref()
                    .map(|value| (RawSlabKey::new(index as SlabIndexT), value))
            })
    }

    /// Iterate all values
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RawSlabKey<T>, &mut T)> {
        self.storage
            .iter_mut()
            .enumerate()
            .filter_map(|(index, value)| {
                value
                    .as_mut()
                    .map(|value| (RawSlabKey::new(index as SlabIndexT), value))
            })
    }

    /// Return count of allocated Ts
    pub fn count(&self) -> usize {
        self.storage.len() - self.free_list.len()
    }
}

impl<T> Default for RawSlab<T> {
    fn default() -> Self {
        Self::new()
    }
}
