//! Item index: mem address to record location
//!
//! Records refer to each other by mem address. The index is rebuilt from the
//! decoded records whenever the set of records may have changed, and is the
//! only way pointers are resolved.

use crate::core::error::{DbpfError, Result};
use crate::core::pointer::{Pointer, PointerSlot};
use crate::core::subfile;
use ahash::AHashMap;
use std::collections::BTreeSet;
use tracing::debug;

/// Location of an addressed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRef {
    pub type_id: u32,
    /// Position of the owning entry in directory order
    pub entry: usize,
    /// Position inside an entity list, `None` for whole-entry records
    pub item: Option<usize>,
}

/// A mem field handed to [`ItemIndex::rebuild`]
#[derive(Debug)]
pub struct AddressSlot<'a> {
    pub type_id: u32,
    pub entry: usize,
    pub item: Option<usize>,
    pub mem: &'a mut u32,
}

#[derive(Debug, Clone, Default)]
pub struct ItemIndex {
    items: AHashMap<u32, ItemRef>,
    assigned: Vec<u32>,
    touched: BTreeSet<usize>,
}

impl ItemIndex {
    /// Index every slot, assigning fresh addresses to the zero ones
    ///
    /// Existing addresses are collected first so that a fresh address never
    /// collides with one that appears later in the walk. New addresses
    /// continue from the largest existing one, in walk order.
    pub fn rebuild<'a, I>(slots: I) -> Result<Self>
    where
        I: IntoIterator<Item = AddressSlot<'a>>,
    {
        let mut index = ItemIndex::default();
        let mut fresh = Vec::new();
        let mut max = 0u32;

        for slot in slots {
            let item = ItemRef {
                type_id: slot.type_id,
                entry: slot.entry,
                item: slot.item,
            };
            if *slot.mem == 0 {
                fresh.push((item, slot.mem));
                continue;
            }
            if index.items.insert(*slot.mem, item).is_some() {
                return Err(DbpfError::DuplicateAddress(*slot.mem));
            }
            max = max.max(*slot.mem);
        }

        let mut next = max;
        for (item, mem) in fresh {
            next = index.next_free(next)?;
            *mem = next;
            index.items.insert(next, item);
            index.assigned.push(next);
            index.touched.insert(item.entry);
        }

        debug!(
            "Item index rebuilt: {} records, {} new addresses",
            index.items.len(),
            index.assigned.len()
        );
        Ok(index)
    }

    fn next_free(&self, after: u32) -> Result<u32> {
        if let Some(next) = after.checked_add(1) {
            if !self.items.contains_key(&next) {
                return Ok(next);
            }
        }
        // Wrapped past u32::MAX: fall back to the lowest unused address
        (1..=u32::MAX)
            .find(|a| !self.items.contains_key(a))
            .ok_or_else(|| DbpfError::malformed("mem address space exhausted"))
    }

    /// Resolve a pointer; `None` when the address is unknown or of another type
    pub fn resolve(&self, pointer: &Pointer) -> Option<ItemRef> {
        if pointer.is_null() {
            return None;
        }
        self.items
            .get(&pointer.address)
            .filter(|item| item.type_id == pointer.type_id)
            .copied()
    }

    pub fn get(&self, address: u32) -> Option<ItemRef> {
        self.items.get(&address).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Addresses handed out by the last rebuild, in assignment order
    pub fn assigned(&self) -> &[u32] {
        &self.assigned
    }

    /// Entries that received new addresses
    pub fn touched(&self) -> impl Iterator<Item = usize> + '_ {
        self.touched.iter().copied()
    }

    /// Check that every pointer slot is total
    pub fn validate(&self, slots: &[PointerSlot]) -> Result<()> {
        for slot in slots {
            let pointer = match slot.pointer {
                Some(pointer) => pointer,
                None if slot.nullable => continue,
                None => return Err(DbpfError::NullPointer { owner: slot.owner }),
            };
            if !subfile::is_addressable(pointer.type_id) {
                debug!("Skipping pointer {} to unregistered type", pointer);
                continue;
            }
            if self.resolve(&pointer).is_none() {
                return Err(DbpfError::DanglingPointer { pointer });
            }
        }
        Ok(())
    }
}
