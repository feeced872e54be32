use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed weak reference to an addressed record
///
/// A pointer never owns its target. It names the target's type id and mem
/// address and is resolved through the [`ItemIndex`](crate::core::index::ItemIndex).
/// Address 0 is the null pointer and is never a valid target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    pub type_id: u32,
    pub address: u32,
}

impl Pointer {
    /// Placeholder held by a non-nullable slot that was stored as null
    pub const NULL: Pointer = Pointer {
        type_id: 0,
        address: 0,
    };

    pub fn new(type_id: u32, address: u32) -> Self {
        Pointer { type_id, address }
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}@{:#010x}", self.type_id, self.address)
    }
}

/// One pointer slot found while walking a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSlot {
    /// Type id of the record holding the slot
    pub owner: u32,
    pub pointer: Option<Pointer>,
    /// Whether the schema allows the slot to be null
    pub nullable: bool,
}

impl PointerSlot {
    pub fn nullable(owner: u32, pointer: Option<Pointer>) -> Self {
        PointerSlot {
            owner,
            pointer,
            nullable: true,
        }
    }

    pub fn required(owner: u32, pointer: Pointer) -> Self {
        PointerSlot {
            owner,
            pointer: Some(pointer).filter(|p| !p.is_null()),
            nullable: false,
        }
    }
}
