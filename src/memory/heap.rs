//! Heap implementation for the interpreter
//!
//! This module owns every heap object (vectors, maps, closures, channels):
//! - Allocation with a stable [`HeapHandle`] and a relocatable backing address
//! - Capacity doubling on append/insert at capacity (`0 → 1`)
//! - Tombstone tracking for freed blocks
//! - Use-after-free and double-free detection
//!
//! # Error Handling
//!
//! Methods return [`HeapError`], which the interpreter converts into
//! `RuntimeError` at its boundary.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::channel::Channel;
use super::scope::ScopeId;
use super::value::{Address, HeapHandle, MapKey, Value};
use crate::ast::FunctionDef;
use crate::interpreter::constants::{DEFAULT_MAX_HEAP_SLOTS, HEAP_ADDRESS_START, HEAP_SLOT_SIZE};

/// Failures reported by heap operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HeapError {
    #[error("use-after-free: heap object {handle} at 0x{address:x} has been freed")]
    UseAfterFree { handle: HeapHandle, address: Address },

    #[error("double free of heap object {handle} at 0x{address:x}")]
    DoubleFree { handle: HeapHandle, address: Address },

    #[error("heap object {handle} was never allocated")]
    InvalidHandle { handle: HeapHandle },

    #[error("heap object {handle} is a {found}, expected a {expected}")]
    KindMismatch {
        handle: HeapHandle,
        expected: &'static str,
        found: &'static str,
    },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    /// Buffer larger than one object may hold, or past the end of the address space
    #[error("cannot allocate {requested} slot(s), limit is {limit}")]
    AllocationLimit { requested: usize, limit: usize },
}

/// State of a heap block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Allocated,
    Tombstone, // Freed; kept so later accesses are detected
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorData {
    pub items: Vec<Value>,
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapData {
    pub entries: FxHashMap<MapKey, Value>,
    pub capacity: usize,
}

/// A closure and the persistent scope holding its captured environment
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureData {
    pub function: Rc<FunctionDef>,
    pub outer: ScopeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    Vector(VectorData),
    Map(MapData),
    Closure(ClosureData),
    Channel(Channel),
}

impl HeapObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapObject::Vector(_) => "vector",
            HeapObject::Map(_) => "map",
            HeapObject::Closure(_) => "closure",
            HeapObject::Channel(_) => "channel",
        }
    }

    /// Number of slots the backing buffer occupies
    fn slots(&self) -> usize {
        match self {
            HeapObject::Vector(v) => v.capacity,
            HeapObject::Map(m) => m.capacity,
            HeapObject::Closure(_) | HeapObject::Channel(_) => 1,
        }
        .max(1)
    }

    /// The language value referring to this object
    pub fn to_value(&self, handle: HeapHandle) -> Value {
        match self {
            HeapObject::Vector(_) => Value::Vector(handle),
            HeapObject::Map(_) => Value::Map(handle),
            HeapObject::Closure(_) => Value::Closure(handle),
            HeapObject::Channel(_) => Value::Channel(handle),
        }
    }
}

/// A block of heap memory
#[derive(Debug, Clone, PartialEq)]
pub struct HeapBlock {
    pub address: Address,
    pub state: BlockState,
    pub object: HeapObject,
}

/// Reallocation performed by an append or insert at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Growth {
    pub handle: HeapHandle,
    pub old_address: Address,
    pub new_address: Address,
    pub new_capacity: usize,
}

/// The heap
#[derive(Debug, Clone)]
pub struct Heap {
    blocks: FxHashMap<HeapHandle, HeapBlock>,
    next_handle: u32,
    next_address: Address,
    /// Largest buffer a single object may occupy
    max_slots: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::with_slot_limit(DEFAULT_MAX_HEAP_SLOTS)
    }

    pub fn with_slot_limit(max_slots: usize) -> Self {
        Heap {
            blocks: FxHashMap::default(),
            next_handle: 0,
            next_address: HEAP_ADDRESS_START, // Start heap at high address
            max_slots,
        }
    }

    pub fn slot_limit(&self) -> usize {
        self.max_slots
    }

    fn over_limit(&self, requested: usize) -> HeapError {
        HeapError::AllocationLimit {
            requested,
            limit: self.max_slots,
        }
    }

    /// Capacity after one doubling (`0 → 1`)
    fn grown_capacity(&self, capacity: usize) -> Result<usize, HeapError> {
        if capacity == 0 {
            return Ok(1);
        }
        capacity
            .checked_mul(2)
            .ok_or_else(|| self.over_limit(usize::MAX))
    }

    /// Carve out a fresh buffer of `slots` slots
    fn reserve(&mut self, slots: usize) -> Result<Address, HeapError> {
        if slots > self.max_slots {
            return Err(self.over_limit(slots));
        }
        let address = self.next_address;
        self.next_address = u64::try_from(slots)
            .ok()
            .and_then(|n| n.checked_mul(HEAP_SLOT_SIZE))
            .and_then(|bytes| address.checked_add(bytes))
            .ok_or_else(|| self.over_limit(slots))?;
        Ok(address)
    }

    /// Allocate a heap object
    pub fn allocate(&mut self, object: HeapObject) -> Result<HeapHandle, HeapError> {
        let address = self.reserve(object.slots())?;
        let handle = HeapHandle(self.next_handle);
        self.next_handle += 1;
        self.blocks.insert(
            handle,
            HeapBlock {
                address,
                state: BlockState::Allocated,
                object,
            },
        );
        Ok(handle)
    }

    pub fn allocate_vector(&mut self, items: Vec<Value>, capacity: usize) -> Result<HeapHandle, HeapError> {
        let capacity = capacity.max(items.len());
        self.allocate(HeapObject::Vector(VectorData { items, capacity }))
    }

    pub fn allocate_map(&mut self, capacity: usize) -> Result<HeapHandle, HeapError> {
        self.allocate(HeapObject::Map(MapData {
            entries: FxHashMap::default(),
            capacity,
        }))
    }

    /// Free a heap object (mark as tombstone)
    pub fn free(&mut self, handle: HeapHandle) -> Result<(), HeapError> {
        match self.blocks.get_mut(&handle) {
            Some(block) if block.state == BlockState::Allocated => {
                block.state = BlockState::Tombstone;
                Ok(())
            }
            Some(block) => Err(HeapError::DoubleFree {
                handle,
                address: block.address,
            }),
            None => Err(HeapError::InvalidHandle { handle }),
        }
    }

    /// Get a live heap block
    pub fn block(&self, handle: HeapHandle) -> Result<&HeapBlock, HeapError> {
        match self.blocks.get(&handle) {
            Some(block) if block.state == BlockState::Allocated => Ok(block),
            Some(block) => Err(HeapError::UseAfterFree {
                handle,
                address: block.address,
            }),
            None => Err(HeapError::InvalidHandle { handle }),
        }
    }

    fn block_mut(&mut self, handle: HeapHandle) -> Result<&mut HeapBlock, HeapError> {
        match self.blocks.get_mut(&handle) {
            Some(block) if block.state == BlockState::Allocated => Ok(block),
            Some(block) => Err(HeapError::UseAfterFree {
                handle,
                address: block.address,
            }),
            None => Err(HeapError::InvalidHandle { handle }),
        }
    }

    pub fn get(&self, handle: HeapHandle) -> Result<&HeapObject, HeapError> {
        self.block(handle).map(|b| &b.object)
    }

    pub fn is_live(&self, handle: HeapHandle) -> bool {
        self.block(handle).is_ok()
    }

    /// Current backing address of a live object
    pub fn address_of(&self, handle: HeapHandle) -> Result<Address, HeapError> {
        self.block(handle).map(|b| b.address)
    }

    /// Find the object whose current backing buffer starts at `address`.
    ///
    /// Tombstones are included so that a dangling address reports use-after-free.
    pub fn handle_at(&self, address: Address) -> Option<HeapHandle> {
        self.blocks
            .iter()
            .find(|(_, block)| block.address == address)
            .map(|(handle, _)| *handle)
    }

    /// Number of live objects
    pub fn live_count(&self) -> usize {
        self.blocks
            .values()
            .filter(|b| b.state == BlockState::Allocated)
            .count()
    }

    /// Move a full buffer to a fresh one of twice the capacity.
    /// Nothing changes when the new buffer cannot be reserved.
    fn grow(&mut self, handle: HeapHandle, capacity: usize) -> Result<Growth, HeapError> {
        let new_capacity = self.grown_capacity(capacity)?;
        let new_address = self.reserve(new_capacity)?;
        let block = self.block_mut(handle)?;
        let old_address = block.address;
        block.address = new_address;
        match &mut block.object {
            HeapObject::Vector(v) => v.capacity = new_capacity,
            HeapObject::Map(m) => m.capacity = new_capacity,
            HeapObject::Closure(_) | HeapObject::Channel(_) => {}
        }
        Ok(Growth {
            handle,
            old_address,
            new_address,
            new_capacity,
        })
    }

    // ---- vectors ----

    pub fn vector(&self, handle: HeapHandle) -> Result<&VectorData, HeapError> {
        match self.get(handle)? {
            HeapObject::Vector(v) => Ok(v),
            other => Err(HeapError::KindMismatch {
                handle,
                expected: "vector",
                found: other.kind_name(),
            }),
        }
    }

    fn vector_mut(&mut self, handle: HeapHandle) -> Result<&mut VectorData, HeapError> {
        match &mut self.block_mut(handle)?.object {
            HeapObject::Vector(v) => Ok(v),
            other => Err(HeapError::KindMismatch {
                handle,
                expected: "vector",
                found: other.kind_name(),
            }),
        }
    }

    /// Append an item, doubling the capacity when the buffer is full
    pub fn vec_push(&mut self, handle: HeapHandle, value: Value) -> Result<Option<Growth>, HeapError> {
        let (len, capacity) = {
            let vector = self.vector(handle)?;
            (vector.items.len(), vector.capacity)
        };
        let growth = if len >= capacity {
            Some(self.grow(handle, capacity)?)
        } else {
            None
        };
        self.vector_mut(handle)?.items.push(value);
        Ok(growth)
    }

    /// Append every item in order; one growth per doubling
    pub fn vec_extend(&mut self, handle: HeapHandle, items: Vec<Value>) -> Result<Vec<Growth>, HeapError> {
        let mut growths = Vec::new();
        for item in items {
            growths.extend(self.vec_push(handle, item)?);
        }
        Ok(growths)
    }

    /// Drop every item; the buffer keeps its capacity and address
    pub fn vec_clear(&mut self, handle: HeapHandle) -> Result<(), HeapError> {
        self.vector_mut(handle)?.items.clear();
        Ok(())
    }

    pub fn vec_pop(&mut self, handle: HeapHandle) -> Result<Option<Value>, HeapError> {
        Ok(self.vector_mut(handle)?.items.pop())
    }

    fn checked_index(index: i64, len: usize) -> Result<usize, HeapError> {
        if index < 0 || index as usize >= len {
            return Err(HeapError::IndexOutOfBounds { index, len });
        }
        Ok(index as usize)
    }

    pub fn vec_remove(&mut self, handle: HeapHandle, index: i64) -> Result<Value, HeapError> {
        let vector = self.vector_mut(handle)?;
        let index = Self::checked_index(index, vector.items.len())?;
        Ok(vector.items.remove(index))
    }

    pub fn vec_contains(&self, handle: HeapHandle, value: &Value) -> Result<bool, HeapError> {
        Ok(self.vector(handle)?.items.iter().any(|item| item == value))
    }

    pub fn vec_get(&self, handle: HeapHandle, index: i64) -> Result<Value, HeapError> {
        let vector = self.vector(handle)?;
        let index = Self::checked_index(index, vector.items.len())?;
        Ok(vector.items[index].clone())
    }

    pub fn vec_set(&mut self, handle: HeapHandle, index: i64, value: Value) -> Result<(), HeapError> {
        let vector = self.vector_mut(handle)?;
        let index = Self::checked_index(index, vector.items.len())?;
        vector.items[index] = value;
        Ok(())
    }

    // ---- maps ----

    pub fn map(&self, handle: HeapHandle) -> Result<&MapData, HeapError> {
        match self.get(handle)? {
            HeapObject::Map(m) => Ok(m),
            other => Err(HeapError::KindMismatch {
                handle,
                expected: "map",
                found: other.kind_name(),
            }),
        }
    }

    fn map_mut(&mut self, handle: HeapHandle) -> Result<&mut MapData, HeapError> {
        match &mut self.block_mut(handle)?.object {
            HeapObject::Map(m) => Ok(m),
            other => Err(HeapError::KindMismatch {
                handle,
                expected: "map",
                found: other.kind_name(),
            }),
        }
    }

    /// Insert or overwrite an entry. Only a new key can trigger growth.
    pub fn map_insert(
        &mut self,
        handle: HeapHandle,
        key: MapKey,
        value: Value,
    ) -> Result<Option<Growth>, HeapError> {
        let (full, capacity) = {
            let map = self.map(handle)?;
            (
                !map.entries.contains_key(&key) && map.entries.len() >= map.capacity,
                map.capacity,
            )
        };
        let growth = if full {
            Some(self.grow(handle, capacity)?)
        } else {
            None
        };
        self.map_mut(handle)?.entries.insert(key, value);
        Ok(growth)
    }

    pub fn map_get(&self, handle: HeapHandle, key: &MapKey) -> Result<Option<Value>, HeapError> {
        Ok(self.map(handle)?.entries.get(key).cloned())
    }

    pub fn map_contains(&self, handle: HeapHandle, key: &MapKey) -> Result<bool, HeapError> {
        Ok(self.map(handle)?.entries.contains_key(key))
    }

    pub fn map_delete(&mut self, handle: HeapHandle, key: &MapKey) -> Result<Option<Value>, HeapError> {
        Ok(self.map_mut(handle)?.entries.remove(key))
    }

    pub fn map_clear(&mut self, handle: HeapHandle) -> Result<(), HeapError> {
        self.map_mut(handle)?.entries.clear();
        Ok(())
    }

    pub fn map_len(&self, handle: HeapHandle) -> Result<usize, HeapError> {
        Ok(self.map(handle)?.entries.len())
    }

    pub fn map_capacity(&self, handle: HeapHandle) -> Result<usize, HeapError> {
        Ok(self.map(handle)?.capacity)
    }

    /// Keys in ascending order
    pub fn map_keys(&self, handle: HeapHandle) -> Result<Vec<MapKey>, HeapError> {
        let mut keys: Vec<MapKey> = self.map(handle)?.entries.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    // ---- closures and channels ----

    pub fn closure(&self, handle: HeapHandle) -> Result<&ClosureData, HeapError> {
        match self.get(handle)? {
            HeapObject::Closure(c) => Ok(c),
            other => Err(HeapError::KindMismatch {
                handle,
                expected: "closure",
                found: other.kind_name(),
            }),
        }
    }

    pub fn channel(&self, handle: HeapHandle) -> Result<&Channel, HeapError> {
        match self.get(handle)? {
            HeapObject::Channel(c) => Ok(c),
            other => Err(HeapError::KindMismatch {
                handle,
                expected: "channel",
                found: other.kind_name(),
            }),
        }
    }

    pub fn channel_mut(&mut self, handle: HeapHandle) -> Result<&mut Channel, HeapError> {
        match &mut self.block_mut(handle)?.object {
            HeapObject::Channel(c) => Ok(c),
            other => Err(HeapError::KindMismatch {
                handle,
                expected: "channel",
                found: other.kind_name(),
            }),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_at_capacity_doubles_and_relocates() {
        let mut heap = Heap::new();
        let v = heap.allocate_vector(vec![Value::Number(1), Value::Number(2)], 2).unwrap();
        let before = heap.address_of(v).unwrap();

        let growth = heap.vec_push(v, Value::Number(3)).unwrap().unwrap();
        assert_eq!(growth.old_address, before);
        assert_ne!(growth.new_address, before);
        assert_eq!(growth.new_capacity, 4);
        assert_eq!(heap.vector(v).unwrap().capacity, 4);
        assert_eq!(heap.address_of(v).unwrap(), growth.new_address);
    }

    #[test]
    fn test_push_below_capacity_keeps_address() {
        let mut heap = Heap::new();
        let v = heap.allocate_vector(vec![], 4).unwrap();
        let before = heap.address_of(v).unwrap();

        assert_eq!(heap.vec_push(v, Value::Number(1)).unwrap(), None);
        assert_eq!(heap.address_of(v).unwrap(), before);
        assert_eq!(heap.vector(v).unwrap().capacity, 4);
    }

    #[test]
    fn test_growth_from_zero_capacity() {
        let mut heap = Heap::new();
        let v = heap.allocate_vector(vec![], 0).unwrap();
        let growth = heap.vec_push(v, Value::Bool(true)).unwrap().unwrap();
        assert_eq!(growth.new_capacity, 1);
    }

    #[test]
    fn test_remove_never_reallocates() {
        let mut heap = Heap::new();
        let v = heap.allocate_vector(vec![Value::Number(7), Value::Number(8)], 2).unwrap();
        let before = heap.address_of(v).unwrap();
        assert_eq!(heap.vec_remove(v, 0).unwrap(), Value::Number(7));
        assert_eq!(heap.address_of(v).unwrap(), before);
        assert_eq!(heap.vector(v).unwrap().capacity, 2);
        assert!(matches!(
            heap.vec_remove(v, 5),
            Err(HeapError::IndexOutOfBounds { index: 5, len: 1 })
        ));
    }

    #[test]
    fn test_map_overwrite_does_not_grow() {
        let mut heap = Heap::new();
        let m = heap.allocate_map(1).unwrap();
        assert_eq!(heap.map_insert(m, MapKey::Number(1), Value::Number(10)).unwrap(), None);
        assert_eq!(heap.map_insert(m, MapKey::Number(1), Value::Number(11)).unwrap(), None);
        assert!(heap.map_insert(m, MapKey::Char('k'), Value::Unit).unwrap().is_some());
        assert_eq!(heap.map_capacity(m).unwrap(), 2);
        assert_eq!(heap.map_len(m).unwrap(), 2);
        assert_eq!(heap.map_get(m, &MapKey::Number(1)).unwrap(), Some(Value::Number(11)));
    }

    #[test]
    fn test_map_keys_sorted() {
        let mut heap = Heap::new();
        let m = heap.allocate_map(0).unwrap();
        for n in [5, -2, 9] {
            heap.map_insert(m, MapKey::Number(n), Value::Unit).unwrap();
        }
        assert_eq!(
            heap.map_keys(m).unwrap(),
            vec![MapKey::Number(-2), MapKey::Number(5), MapKey::Number(9)]
        );
        assert_eq!(heap.map_delete(m, &MapKey::Number(5)).unwrap(), Some(Value::Unit));
        assert!(!heap.map_contains(m, &MapKey::Number(5)).unwrap());
    }

    #[test]
    fn test_free_tombstone_detection() {
        let mut heap = Heap::new();
        let v = heap.allocate_vector(vec![], 0).unwrap();
        heap.free(v).unwrap();
        assert!(matches!(heap.vec_len_for_test(v), Err(HeapError::UseAfterFree { .. })));
        assert!(matches!(heap.free(v), Err(HeapError::DoubleFree { .. })));
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn test_kind_mismatch() {
        let mut heap = Heap::new();
        let m = heap.allocate_map(0).unwrap();
        assert!(matches!(
            heap.vec_push(m, Value::Unit),
            Err(HeapError::KindMismatch { expected: "vector", found: "map", .. })
        ));
    }

    #[test]
    fn test_oversized_allocation_rejected() {
        let mut heap = Heap::with_slot_limit(8);
        assert_eq!(
            heap.allocate_vector(vec![], usize::MAX),
            Err(HeapError::AllocationLimit {
                requested: usize::MAX,
                limit: 8,
            })
        );
        assert_eq!(heap.live_count(), 0);
        assert!(heap.allocate_vector(vec![], 8).is_ok());
    }

    #[test]
    fn test_growth_past_limit_leaves_object_unchanged() {
        let mut heap = Heap::with_slot_limit(2);
        let v = heap.allocate_vector(vec![Value::Number(1), Value::Number(2)], 2).unwrap();
        let before = heap.address_of(v).unwrap();

        assert_eq!(
            heap.vec_push(v, Value::Number(3)),
            Err(HeapError::AllocationLimit { requested: 4, limit: 2 })
        );
        assert_eq!(heap.vector(v).unwrap().items.len(), 2);
        assert_eq!(heap.vector(v).unwrap().capacity, 2);
        assert_eq!(heap.address_of(v).unwrap(), before);
    }

    #[test]
    fn test_extend_grows_per_doubling() {
        let mut heap = Heap::new();
        let v = heap.allocate_vector(vec![Value::Number(0)], 1).unwrap();
        let growths = heap
            .vec_extend(v, (1..=4).map(Value::Number).collect())
            .unwrap();
        let capacities: Vec<usize> = growths.iter().map(|g| g.new_capacity).collect();
        assert_eq!(capacities, vec![2, 4, 8]);
        assert_eq!(heap.vec_len_for_test(v).unwrap(), 5);
        assert_eq!(heap.vec_get(v, 4).unwrap(), Value::Number(4));
    }

    #[test]
    fn test_clear_keeps_capacity_and_address() {
        let mut heap = Heap::new();
        let v = heap.allocate_vector(vec![Value::Number(1), Value::Number(2)], 3).unwrap();
        let m = heap.allocate_map(2).unwrap();
        heap.map_insert(m, MapKey::Bool(true), Value::Unit).unwrap();
        let before = (heap.address_of(v).unwrap(), heap.address_of(m).unwrap());

        heap.vec_clear(v).unwrap();
        heap.map_clear(m).unwrap();

        assert_eq!(heap.vec_len_for_test(v).unwrap(), 0);
        assert_eq!(heap.vector(v).unwrap().capacity, 3);
        assert_eq!(heap.map_len(m).unwrap(), 0);
        assert_eq!(heap.map_capacity(m).unwrap(), 2);
        assert_eq!((heap.address_of(v).unwrap(), heap.address_of(m).unwrap()), before);
    }

    impl Heap {
        fn vec_len_for_test(&self, handle: HeapHandle) -> Result<usize, HeapError> {
            self.vector(handle).map(|v| v.items.len())
        }
    }
}
