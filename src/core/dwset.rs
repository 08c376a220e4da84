//! Membership set of 32-bit items.
//!
//! The set is a table of fixed-width slots, each holding up to
//! [`SLOT_SIZE`] items packed from the front and padded with [`EMPTY`].
//! A 32-bit key selects the slot (`key & mask`); the item is what gets
//! stored and compared. When a slot overflows the table grows four-fold
//! and every item is rehashed. A failed growth leaves the previous table
//! untouched.
//!
//! Two key modes exist:
//!
//! - **Integer**: key is the low half of [`ihash64`] of the raw bits,
//!   item is the low 32 bits.
//! - **Vertex**: key is the vertex arena index, item is `index >> 12`, so the
//!   slot position supplies the low index bits on rehash.

use super::item::ihash64;

/// Items per slot.
pub const SLOT_SIZE: usize = 16;

/// Unused entry.
pub const EMPTY: u32 = u32::MAX;

const MIN_MASK_BITS: u32 = 12;
const MIN_MASK: u32 = (1 << MIN_MASK_BITS) - 1;
const EXPAND_SHIFT: u32 = 2;
const EXPAND_MASK: u32 = (1 << EXPAND_SHIFT) - 1;
const MAX_MASK: u32 = (1 << 24) - 1;

type Slot = [u32; SLOT_SIZE];

/// How keys are recomputed from stored items when the table grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMode {
    Integer,
    Vertex,
}

/// Key and item for an integer-mode member.
#[inline]
pub fn integer_key(bits: u64) -> (u32, u32) {
    (ihash64(bits) as u32, bits as u32)
}

/// Key and item for a vertex-mode member.
#[inline]
pub fn vertex_key(index: u64) -> (u32, u32) {
    (index as u32, (index >> MIN_MASK_BITS) as u32)
}

/// Outcome of a slot insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotAdd {
    Added,
    Present,
    Full,
}

/// Open-addressed set of 32-bit items.
#[derive(Clone, Default)]
pub struct DwSet {
    slots: Vec<Slot>,
    mask: u32,
    len: usize,
}

impl DwSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Number of slots in the current table.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot_add(&mut self, key: u32, item: u32) -> SlotAdd {
        let slot = &mut self.slots[(key & self.mask) as usize];
        for entry in slot.iter_mut() {
            if *entry == EMPTY {
                *entry = item;
                return SlotAdd::Added;
            }
            if *entry == item {
                return SlotAdd::Present;
            }
        }
        SlotAdd::Full
    }

    /// Grow (or create) the table and rehash existing items.
    ///
    /// On failure the previous table and mask are restored.
    fn expand(&mut self, mode: KeyMode) -> bool {
        let old_mask = self.mask;
        let new_mask = if self.slots.is_empty() && old_mask == 0 {
            MIN_MASK
        } else {
            (old_mask << EXPAND_SHIFT) | EXPAND_MASK
        };
        if new_mask > MAX_MASK || new_mask < old_mask {
            tracing::warn!(mask = old_mask, "membership set cannot grow further");
            return false;
        }
        let nslots = new_mask as usize + 1;
        let mut fresh: Vec<Slot> = Vec::new();
        if fresh.try_reserve_exact(nslots).is_err() {
            tracing::warn!(slots = nslots, "membership set allocation failed");
            return false;
        }
        fresh.resize(nslots, [EMPTY; SLOT_SIZE]);

        let old_slots = std::mem::replace(&mut self.slots, fresh);
        self.mask = new_mask;
        for (i, slot) in old_slots.iter().enumerate() {
            for &item in slot.iter().take_while(|&&e| e != EMPTY) {
                let key = match mode {
                    KeyMode::Integer => ihash64(item as u64) as u32,
                    KeyMode::Vertex => (item << MIN_MASK_BITS) | i as u32,
                };
                if self.slot_add(key, item) != SlotAdd::Added {
                    tracing::warn!(mask = new_mask, "membership set rehash overflow");
                    self.slots = old_slots;
                    self.mask = old_mask;
                    return false;
                }
            }
        }
        true
    }

    /// Insert an item. Returns 1 if added, 0 if already present, -1 on failure.
    pub fn insert(&mut self, key: u32, item: u32, mode: KeyMode) -> i64 {
        if item == EMPTY {
            return -1;
        }
        if self.is_allocated() {
            match self.slot_add(key, item) {
                SlotAdd::Added => {
                    self.len += 1;
                    return 1;
                }
                SlotAdd::Present => return 0,
                SlotAdd::Full => {}
            }
        }
        if !self.expand(mode) {
            return -1;
        }
        match self.slot_add(key, item) {
            SlotAdd::Added => {
                self.len += 1;
                1
            }
            SlotAdd::Present => 0,
            SlotAdd::Full => -1,
        }
    }

    /// Remove an item, compacting the remainder of its slot.
    pub fn remove(&mut self, key: u32, item: u32) -> bool {
        if !self.is_allocated() {
            return false;
        }
        let slot = &mut self.slots[(key & self.mask) as usize];
        let Some(pos) = slot.iter().take_while(|&&e| e != EMPTY).position(|&e| e == item) else {
            return false;
        };
        slot.copy_within(pos + 1.., pos);
        slot[SLOT_SIZE - 1] = EMPTY;
        self.len -= 1;
        true
    }

    pub fn contains(&self, key: u32, item: u32) -> bool {
        if !self.is_allocated() {
            return false;
        }
        self.slots[(key & self.mask) as usize]
            .iter()
            .take_while(|&&e| e != EMPTY)
            .any(|&e| e == item)
    }

    /// Drop the table. Returns the number of items that were in the set.
    pub fn clear(&mut self) -> usize {
        let n = self.len;
        self.slots = Vec::new();
        self.mask = 0;
        self.len = 0;
        n
    }

    /// Clear and pre-size the table for roughly `size` integer items.
    pub fn initialize(&mut self, size: i64) -> bool {
        self.clear();
        let wanted = (2 * size.max(0) / SLOT_SIZE as i64) as u64;
        let mag = if wanted <= 1 { 0 } else { 64 - (wanted - 1).leading_zeros() };
        self.mask = if mag == 0 { 0 } else { ((1u64 << mag.min(22)) - 1) as u32 };
        self.expand(KeyMode::Integer)
    }
}

impl std::fmt::Debug for DwSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DwSet{{len: {}, slots: {}}}", self.len, self.slots.len())
    }
}
