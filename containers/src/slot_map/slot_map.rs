use crate::error::ContainerErrors;
use crate::slot::Slot;

/// Proxy entry pointing at a position in the dense data array
#[derive(Debug, Clone, PartialEq, Eq)]
struct Proxy {
    index: usize,
    generation: usize,
}

/// Dense slot map.
///
/// Elements are kept packed in insertion order (until a removal swaps the last element into the
/// gap), and slots go through an indirection table so they survive those swaps.
#[derive(Debug, PartialEq, Eq)]
pub struct SlotMap<T> {
    // (element, proxy index that points at it)
    pub(crate) data: Vec<(T, usize)>,
    proxies: Vec<Proxy>,
    free_list: Vec<usize>,
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self {
            data: Default::default(),
            proxies: Default::default(),
            free_list: Default::default(),
        }
    }
}

impl<T> SlotMap<T> {
    pub fn insert(&mut self, element: T) -> Slot<T> {
        let data_index = self.data.len();
        let proxy_index = match self.free_list.pop() {
            Some(index) => {
                self.proxies[index].index = data_index;
                index
            }
            None => {
                self.proxies.push(Proxy {
                    index: data_index,
                    generation: 0,
                });
                self.proxies.len() - 1
            }
        };
        self.data.push((element, proxy_index));
        Slot::new(proxy_index, self.proxies[proxy_index].generation)
    }

    fn resolve(&self, slot: &Slot<T>) -> Result<usize, ContainerErrors> {
        let proxy = self
            .proxies
            .get(slot.id())
            .ok_or(ContainerErrors::NonexistentSlot)?;
        if proxy.generation != slot.generation() {
            return Err(ContainerErrors::GenerationMismatch);
        }
        Ok(proxy.index)
    }

    pub fn remove(&mut self, slot: Slot<T>) -> Result<T, ContainerErrors> {
        let data_index = self.resolve(&slot)?;
        self.proxies[slot.id()].generation += 1;
        self.free_list.push(slot.id());

        let (element, _) = self.data.swap_remove(data_index);
        // the previous last element now lives at data_index
        if let Some((_, moved_proxy)) = self.data.get(data_index) {
            self.proxies[*moved_proxy].index = data_index;
        }
        Ok(element)
    }

    pub fn get(&self, slot: Slot<T>) -> Option<&T> {
        self.resolve(&slot)
            .ok()
            .and_then(|index| self.data.get(index))
            .map(|(element, _)| element)
    }

    pub fn get_mut(&mut self, slot: Slot<T>) -> Option<&mut T> {
        self.resolve(&slot)
            .ok()
            .and_then(|index| self.data.get_mut(index))
            .map(|(element, _)| element)
    }

    /// Same as [`Self::get`], but reports why the slot could not be resolved
    pub fn try_get(&self, slot: Slot<T>) -> Result<&T, ContainerErrors> {
        let index = self.resolve(&slot)?;
        self.data
            .get(index)
            .map(|(element, _)| element)
            .ok_or(ContainerErrors::NonexistentSlot)
    }

    pub fn contains(&self, slot: Slot<T>) -> bool {
        self.resolve(&slot).is_ok()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot<T>, &T)> {
        self.data.iter().map(|(element, proxy)| {
            (
                Slot::new(*proxy, self.proxies[*proxy].generation),
                element,
            )
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.data.iter_mut().map(|(element, _)| element)
    }

    /// Removes every element, invalidating all outstanding slots
    pub fn drain(&mut self) -> Vec<T> {
        let drained: Vec<(T, usize)> = self.data.drain(..).collect();
        drained
            .into_iter()
            .map(|(element, proxy)| {
                self.proxies[proxy].generation += 1;
                self.free_list.push(proxy);
                element
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut slot_map = SlotMap::default();
        let slot = slot_map.insert(42);
        assert_eq!(slot_map.get(slot), Some(&42));
        assert_eq!(slot_map.len(), 1);
    }

    #[test]
    fn test_insert_multiple_and_get() {
        let mut slot_map = SlotMap::default();
        let slot1 = slot_map.insert(42);
        let slot2 = slot_map.insert(43);
        let slot3 = slot_map.insert(44);

        assert_eq!(slot_map.get(slot1), Some(&42));
        assert_eq!(slot_map.get(slot2), Some(&43));
        assert_eq!(slot_map.get(slot3), Some(&44));
    }

    #[test]
    fn test_remove() {
        let mut slot_map = SlotMap::default();
        let slot = slot_map.insert(42);
        assert_eq!(slot_map.remove(slot).unwrap(), 42);
        assert_eq!(slot_map.get(slot), None);
        assert!(slot_map.is_empty());
    }

    #[test]
    fn test_remove_keeps_swapped_element_reachable() {
        let mut slot_map = SlotMap::default();
        let first = slot_map.insert("a");
        let second = slot_map.insert("b");
        let third = slot_map.insert("c");
        slot_map.remove(first).unwrap();
        // "c" was swapped into the hole left by "a"
        assert_eq!(slot_map.get(third), Some(&"c"));
        assert_eq!(slot_map.get(second), Some(&"b"));
        assert_eq!(slot_map.len(), 2);
    }

    #[test]
    fn test_remove_and_insert_reuses_id() {
        let mut slot_map = SlotMap::default();
        let slot1 = slot_map.insert(42);
        let slot2 = slot_map.insert(43);
        slot_map.remove(slot1).unwrap();
        let slot3 = slot_map.insert(44);

        assert_eq!(slot3.id(), slot1.id());
        assert_eq!(slot3.generation(), slot1.generation() + 1);
        assert_eq!(slot_map.get(slot2), Some(&43));
        assert_eq!(slot_map.get(slot3), Some(&44));
        assert_eq!(slot_map.get(slot1), None);
    }

    #[test]
    fn test_generation_mismatch() {
        let mut slot_map = SlotMap::default();
        let slot = slot_map.insert(42);
        slot_map.remove(slot).unwrap();
        assert_eq!(slot_map.get(slot), None);
        match slot_map.remove(slot) {
            Err(ContainerErrors::GenerationMismatch) => {}
            _ => panic!("Expected GenerationMismatch error"),
        }
    }

    #[test]
    fn test_nonexistent_slot() {
        let mut slot_map: SlotMap<i32> = SlotMap::default();
        match slot_map.remove(Slot::new(999, 0)) {
            Err(ContainerErrors::NonexistentSlot) => {}
            _ => panic!("Expected NonexistentSlot error"),
        }
        match slot_map.try_get(Slot::new(0, 0)) {
            Err(ContainerErrors::NonexistentSlot) => {}
            _ => panic!("Expected NonexistentSlot error"),
        }
    }

    #[test]
    fn test_get_mut() {
        let mut slot_map = SlotMap::default();
        let slot = slot_map.insert(42);
        if let Some(value) = slot_map.get_mut(slot) {
            *value = 100;
        }
        assert_eq!(slot_map.get(slot), Some(&100));
    }

    #[test]
    fn test_iter_yields_live_slots() {
        let mut slot_map = SlotMap::default();
        let a = slot_map.insert(1);
        let b = slot_map.insert(2);
        let c = slot_map.insert(3);
        slot_map.remove(b).unwrap();

        let collected: Vec<_> = slot_map.iter().map(|(slot, value)| (slot, *value)).collect();
        assert_eq!(collected, vec![(a, 1), (c, 3)]);
    }

    #[test]
    fn test_iter_mut() {
        let mut slot_map = SlotMap::default();
        slot_map.insert(1);
        slot_map.insert(2);
        slot_map.insert(3);

        for value in slot_map.iter_mut() {
            *value *= 2;
        }

        let collected: Vec<_> = slot_map.iter().map(|(_, value)| *value).collect();
        assert_eq!(collected, vec![2, 4, 6]);
    }

    #[test]
    fn test_drain_invalidates_slots() {
        let mut slot_map = SlotMap::default();
        let a = slot_map.insert(String::from("a"));
        let b = slot_map.insert(String::from("b"));
        let drained = slot_map.drain();
        assert_eq!(drained, vec![String::from("a"), String::from("b")]);
        assert!(slot_map.is_empty());
        assert!(!slot_map.contains(a));
        assert!(!slot_map.contains(b));

        let c = slot_map.insert(String::from("c"));
        assert_eq!(slot_map.get(c), Some(&String::from("c")));
        assert_eq!(slot_map.get(a), None);
    }

    #[test]
    fn test_large_number_of_elements() {
        let mut slot_map = SlotMap::default();
        let num_elements = 1000;
        let slots: Vec<_> = (0..num_elements).map(|i| slot_map.insert(i)).collect();

        for i in (0..num_elements).step_by(2) {
            slot_map.remove(slots[i]).unwrap();
        }
        for i in (0..num_elements).step_by(2) {
            assert_eq!(slot_map.get(slots[i]), None);
        }
        for i in (1..num_elements).step_by(2) {
            assert_eq!(slot_map.get(slots[i]), Some(&i));
        }
        assert_eq!(slot_map.len(), num_elements / 2);
    }

    #[test]
    fn test_double_remove() {
        let mut slot_map = SlotMap::default();
        let slot = slot_map.insert(42);
        slot_map.remove(slot).unwrap();
        match slot_map.remove(slot) {
            Err(ContainerErrors::GenerationMismatch) => {}
            _ => panic!("Expected GenerationMismatch error"),
        }
    }

    #[test]
    fn test_empty_slot_map() {
        let slot_map: SlotMap<i32> = SlotMap::default();
        assert_eq!(slot_map.len(), 0);
        assert!(slot_map.is_empty());
        assert_eq!(slot_map.data.len(), 0);
    }
}
