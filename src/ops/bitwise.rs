//! Shifts and bit masks.
//!
//! Masks apply only to integer-compatible pairs; anything else leaves the
//! left operand unchanged. Shifts take an `INTEGER` count and saturate to
//! zero past the word width.

use super::cast;
use crate::core::{PairType, StackItem};

/// Bitwise complement. Bitvectors stay bitvectors; everything else is
/// cast to an integer first.
pub fn bnot(x: StackItem) -> StackItem {
    match x {
        StackItem::Bitvector(b) => StackItem::Bitvector(!b),
        other => StackItem::Integer(!cast::int(other).raw_integer()),
    }
}

fn shift_count(y: &StackItem) -> Option<u32> {
    match *y {
        StackItem::Integer(n) if n >= 0 => Some(n.min(64) as u32),
        StackItem::Integer(_) => Some(64),
        _ => None,
    }
}

pub fn shl(x: StackItem, y: StackItem) -> StackItem {
    let Some(n) = shift_count(&y) else {
        return x;
    };
    match x {
        StackItem::Bitvector(b) => StackItem::Bitvector(b.checked_shl(n).unwrap_or(0)),
        other => StackItem::Integer(cast::int(other).raw_integer().checked_shl(n).unwrap_or(0)),
    }
}

/// Logical for bitvectors, arithmetic for integers.
pub fn shr(x: StackItem, y: StackItem) -> StackItem {
    let Some(n) = shift_count(&y) else {
        return x;
    };
    match x {
        StackItem::Bitvector(b) => StackItem::Bitvector(b.checked_shr(n).unwrap_or(0)),
        other => StackItem::Integer(cast::int(other).raw_integer().checked_shr(n).unwrap_or(0)),
    }
}

fn mask(x: StackItem, y: StackItem, f: impl Fn(u64, u64) -> u64) -> StackItem {
    if PairType::of(x.item_type(), y.item_type()).is_integer_compatible() {
        x.with_bits(f(x.bits(), y.bits()))
    } else {
        x
    }
}

pub fn band(x: StackItem, y: StackItem) -> StackItem {
    mask(x, y, |a, b| a & b)
}

pub fn bor(x: StackItem, y: StackItem) -> StackItem {
    mask(x, y, |a, b| a | b)
}

pub fn bxor(x: StackItem, y: StackItem) -> StackItem {
    mask(x, y, |a, b| a ^ b)
}
