use std::collections::BTreeMap;

use log::warn;

use crate::object::{Dictionary, Name, Object, Reference, Value};

/// Sole owner of a document's indirect objects.
///
/// Lookup is by `(number, generation)`; iteration is in ascending object
/// number order, which is also the writer's emission order. Freed slots form
/// a free list; reusing a slot bumps its generation.
#[derive(Debug, Default)]
pub struct ObjectCollection {
    objects: BTreeMap<u32, Object>,
    /// Free slots: object number to the generation a reuse would get.
    free: BTreeMap<u32, u16>,
    /// Allocation counter: lowest never-assigned object number.
    next_number: u32,
}

impl ObjectCollection {
    pub fn new() -> Self {
        ObjectCollection {
            objects: BTreeMap::new(),
            free: BTreeMap::new(),
            next_number: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Highest object number in use, or 0.
    pub fn max_number(&self) -> u32 {
        let in_use = self.objects.keys().next_back().copied().unwrap_or(0);
        let free = self.free.keys().next_back().copied().unwrap_or(0);
        in_use.max(free)
    }

    pub fn get(&self, id: Reference) -> Option<&Object> {
        self.objects
            .get(&id.number)
            .filter(|obj| obj.reference().generation == id.generation)
    }

    /// Mutable lookup; marks the object dirty, which is what queues it for
    /// the next incremental save.
    pub fn get_mut(&mut self, id: Reference) -> Option<&mut Object> {
        self.objects
            .get_mut(&id.number)
            .filter(|obj| obj.reference().generation == id.generation)
            .map(|obj| {
                obj.mark_dirty();
                obj
            })
    }

    /// Follow a reference one level. Dangling references resolve to Null
    /// with a logged warning, matching the load-time tolerance contract.
    pub fn resolve<'a>(&'a self, value: &'a Value) -> &'a Value {
        match value {
            Value::Reference(id) => match self.get(*id) {
                Some(obj) => obj.value(),
                None => {
                    warn!("ObjectNotFound: reference {id} does not resolve");
                    const NULL: Value = Value::Null;
                    &NULL
                }
            },
            other => other,
        }
    }

    /// Take ownership of an externally built object. An existing object
    /// under the same number is replaced.
    pub fn insert(&mut self, object: Object) {
        let number = object.reference().number;
        self.free.remove(&number);
        if number >= self.next_number {
            self.next_number = number + 1;
        }
        self.objects.insert(number, object);
    }

    /// Allocate the smallest available slot and register a fresh object.
    /// The payload is an empty dictionary, with `/Type` prefilled when
    /// given.
    pub fn create(&mut self, type_name: Option<&str>) -> Reference {
        let id = match self.free.pop_first() {
            Some((number, generation)) => Reference::new(number, generation),
            None => {
                let number = self.next_number;
                self.next_number += 1;
                Reference::new(number, 0)
            }
        };
        let mut dict = Dictionary::new();
        if let Some(type_name) = type_name {
            dict.set("Type", Name::from(type_name));
        }
        self.objects.insert(id.number, Object::new(id, Value::Dictionary(dict)));
        id
    }

    /// Release an object. Its slot joins the free list with an incremented
    /// generation; the object is returned to the caller.
    pub fn remove(&mut self, id: Reference) -> Option<Object> {
        if self.get(id).is_none() {
            return None;
        }
        let object = self.objects.remove(&id.number)?;
        let next_gen = id.generation.saturating_add(1);
        if next_gen < u16::MAX {
            self.free.insert(id.number, next_gen);
        }
        Some(object)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.objects.values_mut()
    }

    /// Free slots in ascending object number order.
    pub fn free_slots(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        self.free.iter().map(|(&n, &g)| (n, g))
    }

    pub(crate) fn register_free(&mut self, number: u32, generation: u16) {
        // Object number 0 is the permanent head of the free list and never
        // allocatable.
        if number != 0 && !self.objects.contains_key(&number) {
            if number >= self.next_number {
                self.next_number = number + 1;
            }
            self.free.insert(number, generation);
        }
    }

    pub fn mark_all_clean(&mut self) {
        for obj in self.objects.values_mut() {
            obj.clear_dirty();
        }
    }

    pub fn dirty_objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values().filter(|o| o.is_dirty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_allocates_sequentially() {
        let mut col = ObjectCollection::new();
        assert_eq!(col.create(None), Reference::new(1, 0));
        assert_eq!(col.create(Some("Catalog")), Reference::new(2, 0));
        let obj = col.get(Reference::new(2, 0)).unwrap();
        assert_eq!(
            obj.dict().unwrap().get_name(b"Type").unwrap().as_bytes(),
            b"Catalog"
        );
    }

    #[test]
    fn freed_slot_is_reused_with_bumped_generation() {
        let mut col = ObjectCollection::new();
        let a = col.create(None);
        let _b = col.create(None);
        col.remove(a).unwrap();
        assert_eq!(col.free_slots().collect::<Vec<_>>(), vec![(1, 1)]);
        let reused = col.create(None);
        assert_eq!(reused, Reference::new(1, 1));
        assert!(col.free_slots().next().is_none());
    }

    #[test]
    fn generation_mismatch_fails_lookup() {
        let mut col = ObjectCollection::new();
        let id = col.create(None);
        assert!(col.get(id).is_some());
        assert!(col.get(Reference::new(id.number, 3)).is_none());
    }

    #[test]
    fn resolve_dangling_yields_null() {
        let col = ObjectCollection::new();
        let value = Value::Reference(Reference::new(99, 0));
        assert!(col.resolve(&value).is_null());
    }

    #[test]
    fn get_mut_marks_dirty() {
        let mut col = ObjectCollection::new();
        let id = col.create(None);
        col.mark_all_clean();
        assert_eq!(col.dirty_objects().count(), 0);
        col.get_mut(id).unwrap();
        assert_eq!(col.dirty_objects().count(), 1);
    }

    #[test]
    fn insert_tracks_allocation_counter() {
        let mut col = ObjectCollection::new();
        col.insert(Object::new(Reference::new(7, 0), Value::Null));
        assert_eq!(col.create(None), Reference::new(8, 0));
    }
}
