//! Scratch memory bank.
//!
//! A power-of-two array of [`StackItem`] cells addressed through a mask.
//! There is no range check anywhere: every address is reduced with
//! `addr & mask`, so `load(i)` and `load(i + k * size)` always reach the
//! same cell.
//!
//! The top four cells double as registers R1..R4, and a secondary stack
//! grows downward from just below them. The bank also owns the
//! membership set used by the `*set*` operations.
//!
//! Cells start out as `INTEGER 0`.

use std::fmt;
use std::ops::Range;

use super::dwset::DwSet;
use super::error::{EvalError, EvalResult};
use super::item::StackItem;
use super::object::ObjectTable;

/// Smallest supported bank order.
pub const MIN_ORDER: u32 = 2;
/// Largest supported bank order.
pub const MAX_ORDER: u32 = 24;

/// Initial bank stack pointer: the first push lands just below R4.
const SP_TOP: i64 = -5;

/// Register aliases for the top cells of the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
}

impl Register {
    /// Address of the register cell.
    #[inline]
    pub const fn address(self) -> i64 {
        -(self as i64)
    }
}

/// Two equal-length cell ranges for element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contiguous {
    /// Negative length or a range running past the end of the bank.
    Invalid,
    Empty,
    Ranges { a: usize, b: usize, n: usize },
}

/// Addressable scratch memory for one evaluator.
#[derive(Clone)]
pub struct MemoryBank {
    data: Vec<StackItem>,
    order: u32,
    mask: u64,
    sp: i64,
    dwset: DwSet,
}

impl MemoryBank {
    /// Create a bank of `2^order` cells.
    pub fn new(order: u32) -> EvalResult<Self> {
        if !(MIN_ORDER..=MAX_ORDER).contains(&order) {
            return Err(EvalError::InvalidMemoryOrder { order, min: MIN_ORDER, max: MAX_ORDER });
        }
        let size = 1usize << order;
        Ok(Self {
            data: vec![StackItem::ZERO; size],
            order,
            mask: (size - 1) as u64,
            sp: SP_TOP,
            dwset: DwSet::new(),
        })
    }

    #[inline]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Number of cells, `2^order`.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Wrap an address into the bank.
    #[inline]
    pub fn addr(&self, index: i64) -> usize {
        (index as u64 & self.mask) as usize
    }

    #[inline]
    pub fn get(&self, index: i64) -> StackItem {
        self.data[self.addr(index)]
    }

    #[inline]
    pub fn get_mut(&mut self, index: i64) -> &mut StackItem {
        let a = self.addr(index);
        &mut self.data[a]
    }

    #[inline]
    pub fn set(&mut self, index: i64, item: StackItem) {
        let a = self.addr(index);
        self.data[a] = item;
    }

    /// Address stored in cell `index`, used by the indirect (`r*`) operations.
    #[inline]
    pub fn deref(&self, index: i64) -> i64 {
        self.get(index).raw_integer()
    }

    #[inline]
    pub fn register(&self, r: Register) -> StackItem {
        self.get(r.address())
    }

    #[inline]
    pub fn cells(&self) -> &[StackItem] {
        &self.data
    }

    #[inline]
    pub fn cells_mut(&mut self) -> &mut [StackItem] {
        &mut self.data
    }

    // ═══════════════════════════════════════════════════════════════════
    // Bank Stack
    // ═══════════════════════════════════════════════════════════════════

    #[inline]
    pub fn sp(&self) -> i64 {
        self.sp
    }

    /// Push onto the bank stack. Returns the cell address written.
    #[inline]
    pub fn push(&mut self, item: StackItem) -> usize {
        let a = self.addr(self.sp);
        self.sp -= 1;
        self.data[a] = item;
        a
    }

    #[inline]
    pub fn pop(&mut self) -> StackItem {
        self.sp += 1;
        self.get(self.sp)
    }

    /// Top of the bank stack without popping.
    #[inline]
    pub fn peek(&self) -> StackItem {
        self.get(self.sp + 1)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Slices
    // ═══════════════════════════════════════════════════════════════════

    /// Cell range for the inclusive address pair `a1..=an`.
    ///
    /// Both ends are wrapped; an end before the start gives an empty range.
    #[inline]
    pub fn slice(&self, a1: i64, an: i64) -> Range<usize> {
        let start = self.addr(a1);
        let end = self.addr(an) + 1;
        if end > start {
            start..end
        } else {
            start..start
        }
    }

    /// Validate two `n`-cell ranges starting at `a` and `b`.
    pub fn contiguous(&self, a: i64, b: i64, n: i64) -> Contiguous {
        let size = self.data.len() as i64;
        let a = self.addr(a) as i64;
        let b = self.addr(b) as i64;
        let fits = |start: i64| start.checked_add(n).is_some_and(|end| end <= size);
        if n < 0 || !fits(a) || !fits(b) {
            Contiguous::Invalid
        } else if n == 0 {
            Contiguous::Empty
        } else {
            Contiguous::Ranges { a: a as usize, b: b as usize, n: n as usize }
        }
    }

    /// Start offset and length `k` of an unwrapped run, if it fits the bank.
    ///
    /// Unlike every other address path, `x` is not masked: heap and sort
    /// runs must lie wholly inside the bank as given, and anything else
    /// (a negative start, or an end past the last cell) is no run at all.
    pub fn run(&self, x: i64, k: i64) -> Option<Range<usize>> {
        let size = self.data.len() as i64;
        if k < 1 || x < 0 {
            return None;
        }
        let end = x.checked_add(k).filter(|&end| end <= size)?;
        Some(x as usize..end as usize)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Membership Set
    // ═══════════════════════════════════════════════════════════════════

    #[inline]
    pub fn dwset(&self) -> &DwSet {
        &self.dwset
    }

    #[inline]
    pub fn dwset_mut(&mut self) -> &mut DwSet {
        &mut self.dwset
    }

    // ═══════════════════════════════════════════════════════════════════
    // Index Bitmap
    // ═══════════════════════════════════════════════════════════════════

    /// Cell address and bit for a vertex index in the bitmap view of the bank.
    #[inline]
    fn bitmap_position(&self, index: u64) -> (usize, u64) {
        (((index >> 6) & self.mask) as usize, 1u64 << (index & 63))
    }

    /// Set the bit for `index`. Returns true if it was previously clear.
    pub fn bitmap_set(&mut self, index: u64) -> bool {
        let (a, bit) = self.bitmap_position(index);
        let cell = self.data[a];
        if cell.bits() & bit != 0 {
            return false;
        }
        self.data[a] = cell.with_bits(cell.bits() | bit);
        true
    }

    pub fn bitmap_test(&self, index: u64) -> bool {
        let (a, bit) = self.bitmap_position(index);
        self.data[a].bits() & bit != 0
    }

    pub fn bitmap_clear(&mut self, index: u64) {
        let (a, bit) = self.bitmap_position(index);
        let cell = self.data[a];
        self.data[a] = cell.with_bits(cell.bits() & !bit);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reset
    // ═══════════════════════════════════════════════════════════════════

    /// Zero every cell, reset the bank stack and drop the membership set.
    ///
    /// Objects retained on behalf of the bank are released through `objects`.
    /// Returns the number of cells cleared.
    pub fn reset(&mut self, objects: &mut ObjectTable) -> usize {
        self.data.fill(StackItem::ZERO);
        self.sp = SP_TOP;
        self.dwset.clear();
        objects.release_retained();
        self.data.len()
    }
}

/// Admit an item for storage in the bank.
///
/// Scoped objects are retained so their handles outlive the evaluation.
/// Returns `false` for items that may not be stored (markers, vertex
/// identifiers and stale object handles).
pub fn admit(item: &StackItem, objects: &mut ObjectTable) -> bool {
    match item {
        StackItem::CString(r) | StackItem::Vector(r) => objects.retain(*r),
        other => other.is_storable(),
    }
}

impl fmt::Debug for MemoryBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nonzero: Vec<_> = self
            .data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != StackItem::ZERO)
            .collect();
        if nonzero.is_empty() {
            return write!(f, "MemoryBank{{order: {}, all zero}}", self.order);
        }
        write!(f, "MemoryBank{{order: {}, ", self.order)?;
        for (i, (addr, item)) in nonzero.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}]={}", addr, item)?;
        }
        write!(f, "}}")
    }
}
