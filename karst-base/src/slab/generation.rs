use super::GenerationCounterT;

/// Represents a particular instance of a Generation. If a slot is set, cleared, then set
/// again, the second instance gets a different generation index than the first.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct GenerationIndex(pub(super) GenerationCounterT);

/// Wraps a T, requiring a generation index to access it. Used for pools of Ts where other
/// code holds indexes into the pool and stale indexes must be detected.
///
/// This data structure is assert/panic-happy because mistakes in using it can imply subtle
/// bugs in downstream code.
pub struct Generation<T> {
    /// A counter that increments when free() is called
    generation_index: GenerationIndex,

    /// Underlying T
    value: Option<T>,
}

impl<T> Default for Generation<T> {
    fn default() -> Self {
        Generation {
            generation_index: GenerationIndex(0),
            value: None,
        }
    }
}

impl<T> Generation<T> {
    /// Create a cleared Generation<T>
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns true if the element is not None, and matches the given generation
    pub fn exists(
        &self,
        generation: GenerationIndex,
    ) -> bool {
        self.value.is_some() && self.generation_index == generation
    }

    /// Get the value, but only if the given generation index isn't stale
    pub fn get(
        &self,
        generation: GenerationIndex,
    ) -> Option<&T> {
        let value = self.value.as_ref()?;
        if self.generation_index == generation {
            Some(value)
        } else {
            None
        }
    }

    /// Get the value, but only if the given generation index isn't stale
    pub fn get_mut(
        &mut self,
        generation: GenerationIndex,
    ) -> Option<&mut T> {
        let value = self.value.as_mut()?;
        if self.generation_index == generation {
            Some(value)
        } else {
            None
        }
    }

    /// Set the value. Fatal if a value already exists; free must be called between
    /// allocates, partly to detect errors in usage and partly because free increments the
    /// generation counter.
    pub fn allocate(
        &mut self,
        value: T,
    ) -> GenerationIndex {
        assert!(
            self.value.is_none(),
            "Can only allocate a generation if it's not already allocated"
        );
        self.value = Some(value);
        self.generation_index
    }

    /// Clear the value. Fatal if the generation index is stale.
    pub fn free(
        &mut self,
        generation_index: GenerationIndex,
    ) -> T {
        assert!(
            self.value.is_some(),
            "Can only free a generation if it's not already freed"
        );
        assert!(
            self.generation_index == generation_index,
            "Can not free a generation with incorrect generation_index"
        );
        let value = self.value.take().unwrap();
        self.generation_index.0 += 1;
        value
    }

    /// Returns true if no value exists
    pub fn is_none(&self) -> bool {
        self.value.is_none()
    }

    /// Get a ref to the inner value, but without checking the generation
    pub fn get_unchecked(&self) -> Option<&T> {
        self.value.as_ref()
    }
}
