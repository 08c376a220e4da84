//! Token-array probe matching.
//!
//! An array is a sequence of 64-bit token ids. A probe is a sequence of
//! items that are either token ids (`INTEGER`) or position masks
//! (`BITVECTOR`, bit *i* asserting "array position *i* matches").
//!
//! Matching is two-phase. The *prefix* phase walks probe and array in
//! lockstep; if every probe item matches the array position under it the
//! result carries the prefix boost. On the first mismatch the *set* phase
//! takes over from that point: each remaining probe item claims the first
//! unclaimed array position it matches, scanning from where the prefix
//! phase stopped. A claimed position can never satisfy a second probe
//! item.
//!
//! # Alt arrays
//!
//! Alt array entries pack a primary token in the high 32 bits and a
//! secondary token in the low 32 bits. Primary matches score fully;
//! any secondary match multiplies the result by the alt deboost. Masks
//! carry primary positions in bits 16..31 and secondary positions in
//! bits 0..15, so at most 16 positions are addressable.
//!
//! # Super arrays
//!
//! A zero segment marks a continuation of the token before it. Claiming
//! a primary position also consumes the whole secondary *supertoken*
//! covering that position, and vice versa, so a multi-token span cannot
//! be counted twice through its two segments.

use crate::core::StackItem;

const PRIMARY: u64 = 0xFFFF_FFFF_0000_0000;
const SECONDARY: u64 = 0x0000_0000_FFFF_FFFF;

/// Numeric value of a boost operand.
#[inline]
fn factor(x: &StackItem) -> f64 {
    match *x {
        StackItem::Real(r) => r,
        other => other.raw_integer() as f64,
    }
}

#[inline]
fn lowest_bit_u64(x: u64) -> u64 {
    x & x.wrapping_neg()
}

#[inline]
fn lowest_bit_u16(x: u16) -> u16 {
    x & x.wrapping_neg()
}

#[inline]
fn pos16(i: usize) -> u16 {
    u32::try_from(i).ok().and_then(|i| 1u16.checked_shl(i)).unwrap_or(0)
}

/// Which segment of an alt entry a probe token matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Primary,
    Secondary,
}

#[inline]
fn alt_match(probe: u64, entry: u64) -> Option<Segment> {
    let diff = probe ^ entry;
    if diff & PRIMARY == 0 {
        Some(Segment::Primary)
    } else if diff & SECONDARY == 0 {
        Some(Segment::Secondary)
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Plain Arrays
// ═══════════════════════════════════════════════════════════════════════════

/// Probe a plain token array. Returns the prefix boost (truncated to an
/// integer) for an in-order prefix match, 1 for an unordered match and 0
/// for a miss.
pub fn probe_array(probe: &[StackItem], array: &[i64], prefix_boost: &StackItem) -> i64 {
    if probe.is_empty() || probe.len() > array.len() {
        return 0;
    }
    let mut posvec: u64 = 1;
    let mut unmatched: u64 = !0;
    let mut p = 0;

    while p < probe.len() {
        let item = &probe[p];
        let hit = match item {
            StackItem::Bitvector(bits) => posvec & bits != 0,
            other => other.bits() == array[p] as u64,
        };
        if !hit {
            break;
        }
        unmatched ^= posvec;
        posvec <<= 1;
        p += 1;
    }
    if p == probe.len() {
        return match *prefix_boost {
            StackItem::Real(r) => r as i64,
            other => other.raw_integer(),
        };
    }

    let start = p;
    let posvec_reset = posvec;
    for item in &probe[p..] {
        match *item {
            StackItem::Bitvector(bits) => {
                let m = bits & unmatched;
                if m == 0 {
                    return 0;
                }
                unmatched ^= lowest_bit_u64(m);
            }
            StackItem::Integer(token) => {
                let mut pos = posvec_reset;
                let mut claimed = false;
                for &entry in &array[start..] {
                    if entry == token && pos & unmatched != 0 {
                        unmatched ^= pos;
                        claimed = true;
                        break;
                    }
                    pos <<= 1;
                }
                if !claimed {
                    return 0;
                }
            }
            _ => return 0,
        }
    }
    1
}

// ═══════════════════════════════════════════════════════════════════════════
// Alt Arrays
// ═══════════════════════════════════════════════════════════════════════════

fn alt_score(prefix: bool, n_secondary: usize, prefix_boost: &StackItem, alt_deboost: &StackItem) -> f64 {
    let base = if prefix { factor(prefix_boost) } else { 1.0 };
    if n_secondary == 0 {
        base
    } else {
        base * factor(alt_deboost)
    }
}

/// Probe an alt array of primary/secondary token pairs.
pub fn probe_alt_array(probe: &[StackItem], array: &[i64], prefix_boost: &StackItem, alt_deboost: &StackItem) -> f64 {
    if probe.is_empty() || probe.len() > array.len() {
        return 0.0;
    }
    let mut n_secondary = 0;
    let mut posvec: u16 = 1;
    let mut unmatched: u16 = 0xFFFF;
    let mut p = 0;

    while p < probe.len() {
        let seg = match probe[p] {
            StackItem::Bitvector(bits) => {
                if posvec as u64 & (bits >> 16) != 0 {
                    Some(Segment::Primary)
                } else if posvec as u64 & bits != 0 {
                    Some(Segment::Secondary)
                } else {
                    None
                }
            }
            other => alt_match(other.bits(), array[p] as u64),
        };
        match seg {
            Some(Segment::Secondary) => n_secondary += 1,
            Some(Segment::Primary) => {}
            None => break,
        }
        unmatched ^= posvec;
        posvec <<= 1;
        p += 1;
    }
    if p == probe.len() {
        return alt_score(true, n_secondary, prefix_boost, alt_deboost);
    }

    let start = p;
    let posvec_reset = posvec;
    for item in &probe[p..] {
        match *item {
            StackItem::Bitvector(bits) => {
                let primary = (bits >> 16) as u16 & unmatched;
                let m = if primary != 0 {
                    primary
                } else {
                    n_secondary += 1;
                    bits as u16 & unmatched
                };
                if m == 0 {
                    return 0.0;
                }
                unmatched ^= lowest_bit_u16(m);
            }
            StackItem::Integer(token) => {
                let mut pos = posvec_reset;
                let mut secondary_pos = 0u16;
                let mut claimed = false;
                for &entry in &array[start..] {
                    if pos & unmatched != 0 {
                        match alt_match(token as u64, entry as u64) {
                            Some(Segment::Primary) => {
                                unmatched ^= pos;
                                claimed = true;
                                break;
                            }
                            Some(Segment::Secondary) if secondary_pos == 0 => secondary_pos = pos,
                            _ => {}
                        }
                    }
                    pos <<= 1;
                }
                if !claimed {
                    if secondary_pos == 0 {
                        return 0.0;
                    }
                    n_secondary += 1;
                    unmatched ^= secondary_pos;
                }
            }
            _ => return 0.0,
        }
    }
    alt_score(false, n_secondary, prefix_boost, alt_deboost)
}

// ═══════════════════════════════════════════════════════════════════════════
// Super Arrays
// ═══════════════════════════════════════════════════════════════════════════

/// Positions of the supertoken covering `x` within the given segment: back
/// to the nearest entry with a non-zero segment, then forward through the
/// zero-segment continuations after it.
fn supertoken_mask(array: &[i64], x: usize, segment: u64) -> u16 {
    let mut i = x;
    while i > 0 && array[i] as u64 & segment == 0 {
        i -= 1;
    }
    let mut mask = 0u16;
    loop {
        mask |= pos16(i);
        i += 1;
        if i >= array.len() || array[i] as u64 & segment != 0 {
            return mask;
        }
    }
}

struct Consumption {
    primary: u16,
    secondary: u16,
}

impl Consumption {
    fn claim(&mut self, array: &[i64], x: usize, seg: Segment) {
        match seg {
            Segment::Primary => {
                self.primary &= !pos16(x);
                self.secondary &= !supertoken_mask(array, x, SECONDARY);
            }
            Segment::Secondary => {
                self.secondary &= !pos16(x);
                self.primary &= !supertoken_mask(array, x, PRIMARY);
            }
        }
    }

    fn matches(&self, token: u64, entry: u64, x: usize) -> Option<Segment> {
        let pos = pos16(x);
        match alt_match(token, entry) {
            Some(Segment::Primary) if self.primary & pos != 0 => Some(Segment::Primary),
            Some(_) if self.secondary & pos != 0 && (token ^ entry) & SECONDARY == 0 => Some(Segment::Secondary),
            _ => None,
        }
    }
}

/// Probe an alt array with supertoken consumption.
pub fn probe_super_array(probe: &[StackItem], array: &[i64], prefix_boost: &StackItem, alt_deboost: &StackItem) -> f64 {
    if probe.is_empty() || probe.len() > array.len() {
        return 0.0;
    }
    let mut n_secondary = 0;
    let mut c = Consumption { primary: 0xFFFF, secondary: 0xFFFF };
    let mut p = 0;

    while p < probe.len() {
        let pos = pos16(p);
        match probe[p] {
            StackItem::Bitvector(bits) => {
                if c.primary & pos & (bits >> 16) as u16 != 0 {
                } else if c.secondary & pos & bits as u16 != 0 {
                    n_secondary += 1;
                } else {
                    break;
                }
                c.primary &= !pos;
                c.secondary &= !pos;
            }
            other => match c.matches(other.bits(), array[p] as u64, p) {
                Some(seg) => {
                    if seg == Segment::Secondary {
                        n_secondary += 1;
                    }
                    c.claim(array, p, seg);
                }
                None => break,
            },
        }
        p += 1;
    }
    if p == probe.len() {
        return alt_score(true, n_secondary, prefix_boost, alt_deboost);
    }

    let start = p;
    for item in &probe[p..] {
        match *item {
            StackItem::Bitvector(bits) => {
                let primary = (bits >> 16) as u16 & c.primary;
                let m = if primary != 0 {
                    primary
                } else {
                    n_secondary += 1;
                    bits as u16 & c.secondary
                };
                if m == 0 {
                    return 0.0;
                }
                let keep = !lowest_bit_u16(m);
                c.primary &= keep;
                c.secondary &= keep;
            }
            StackItem::Integer(token) => {
                let mut secondary_at = None;
                let mut claimed = false;
                for (x, &entry) in array.iter().enumerate().skip(start) {
                    match c.matches(token as u64, entry as u64, x) {
                        Some(Segment::Primary) => {
                            c.claim(array, x, Segment::Primary);
                            claimed = true;
                            break;
                        }
                        Some(Segment::Secondary) if secondary_at.is_none() => secondary_at = Some(x),
                        _ => {}
                    }
                }
                if !claimed {
                    let Some(x) = secondary_at else {
                        return 0.0;
                    };
                    n_secondary += 1;
                    c.claim(array, x, Segment::Secondary);
                }
            }
            _ => return 0.0,
        }
    }
    alt_score(false, n_secondary, prefix_boost, alt_deboost)
}
