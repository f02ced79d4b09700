use derivative::Derivative;
use std::marker::PhantomData;

/// Stable handle into a [`SlotMap`](crate::SlotMap).
///
/// A slot stays valid until the element it refers to is removed. Reusing the same index after a
/// removal bumps the generation, so stale slots are rejected instead of aliasing new data.
#[derive(Derivative)]
#[derivative(
    Debug(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Hash(bound = "")
)]
pub struct Slot<T> {
    id: usize,
    generation: usize,
    #[derivative(Debug = "ignore", PartialEq = "ignore", Hash = "ignore")]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> Slot<T> {
    pub fn new(id: usize, generation: usize) -> Self {
        Self {
            id,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn generation(&self) -> usize {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_equality_ignores_type_marker() {
        let a: Slot<u32> = Slot::new(3, 1);
        let b: Slot<u32> = Slot::new(3, 1);
        let c: Slot<u32> = Slot::new(3, 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_slot_is_copy() {
        let a: Slot<String> = Slot::new(0, 0);
        let b = a;
        assert_eq!(a.id(), b.id());
        assert_eq!(a.generation(), b.generation());
    }
}
