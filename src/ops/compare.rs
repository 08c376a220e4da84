//! Equality, ordering and membership between stack items.
//!
//! Equality is deliberately loose: bit-comparable types compare raw bits,
//! reals compare within `FLT_EPSILON`, vectors compare through the
//! similarity engine, `WILD` equals everything and strings honour the
//! wildcard form they were written in. Ordering is defined only for
//! numeric, keyval, string and vector pairs; any other pair is neither
//! greater nor less.

use std::cmp::Ordering;

use super::Env;
use crate::core::object::contains;
use crate::core::{are_bit_comparable, hash_bytes, EvalObject, ItemType, PairType, StackItem};

/// Single-precision epsilon used as the tolerance for real equality.
pub const FLT_EPSILON: f64 = f32::EPSILON as f64;

/// Truthiness of a condition item.
#[inline]
pub fn condition(x: &StackItem) -> bool {
    x.condition()
}

// ═══════════════════════════════════════════════════════════════════════════
// Equality
// ═══════════════════════════════════════════════════════════════════════════

pub fn equ(x: &StackItem, y: &StackItem, env: &Env<'_>) -> bool {
    let (tx, ty) = (x.item_type(), y.item_type());
    if are_bit_comparable(tx, ty) && x.bits() == y.bits() {
        return true;
    }
    if tx == ItemType::None && ty == ItemType::None {
        return true;
    }
    match (*x, *y) {
        (StackItem::Real(a), StackItem::Real(b)) => return (a - b).abs() < FLT_EPSILON,
        (StackItem::Real(a), _) => {
            return if ty.is_bit_comparable() {
                (a - y.raw_integer() as f64).abs() < FLT_EPSILON
            } else {
                ty == ItemType::Wild
            };
        }
        (_, StackItem::Real(b)) => {
            return if tx.is_bit_comparable() {
                (x.raw_integer() as f64 - b).abs() < FLT_EPSILON
            } else {
                tx == ItemType::Wild
            };
        }
        (StackItem::Vector(_), StackItem::Vector(_)) => {
            return match (env.vector(x), env.vector(y)) {
                (Some(a), Some(b)) => env.similarity.matches(a, b),
                _ => false,
            };
        }
        _ => {}
    }
    if PairType::of(tx, ty).is_wild() {
        return true;
    }
    string_match(x, y, env)
}

#[inline]
pub fn neq(x: &StackItem, y: &StackItem, env: &Env<'_>) -> bool {
    !equ(x, y, env)
}

/// String equality between strings and vertex identifiers.
///
/// A string written with wildcards matches as a pattern; when both sides
/// are patterns the right-hand one is the probe.
pub fn string_match(x: &StackItem, y: &StackItem, env: &Env<'_>) -> bool {
    match (*x, *y) {
        (StackItem::VertexId(a), StackItem::VertexId(b)) => a == b,
        (StackItem::CString(_), StackItem::CString(_)) => {
            let (Some((xb, xp)), Some((yb, yp))) = (env.text(x), env.text(y)) else {
                return false;
            };
            if yp.is_wildcard() {
                yp.matches(yb, xb)
            } else if xp.is_wildcard() {
                xp.matches(xb, yb)
            } else {
                xb == yb
            }
        }
        (StackItem::VertexId(_), StackItem::CString(_)) => identifier_match(x, y, env),
        (StackItem::CString(_), StackItem::VertexId(_)) => identifier_match(y, x, env),
        _ => false,
    }
}

fn identifier_match(id: &StackItem, probe: &StackItem, env: &Env<'_>) -> bool {
    match (env.text(id), env.text(probe)) {
        (Some((target, _)), Some((bytes, pattern))) => pattern.matches(bytes, target),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Ordering
// ═══════════════════════════════════════════════════════════════════════════

/// Ordering of `x` relative to `y`, `None` when the pair has no order.
pub fn order(x: &StackItem, y: &StackItem, env: &Env<'_>) -> Option<Ordering> {
    match (*x, *y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => Some(a.cmp(&b)),
        (StackItem::Keyval(a), StackItem::Keyval(b)) => a.value().partial_cmp(&b.value()),
        (StackItem::Real(a), StackItem::Real(b)) => a.partial_cmp(&b),
        (StackItem::Integer(a), StackItem::Real(b)) => (a as f64).partial_cmp(&b),
        (StackItem::Real(a), StackItem::Integer(b)) => a.partial_cmp(&(b as f64)),
        (StackItem::CString(_), StackItem::CString(_)) => {
            let (a, _) = env.text(x)?;
            let (b, _) = env.text(y)?;
            Some(a.cmp(b))
        }
        (StackItem::Vector(_), StackItem::Vector(_)) => {
            let a = env.vector(x)?;
            let b = env.vector(y)?;
            Some(env.similarity.compare(a, b))
        }
        _ if PairType::of(x.item_type(), y.item_type()).is_numeric() => Some(x.bits().cmp(&y.bits())),
        _ => None,
    }
}

#[inline]
pub fn gt(x: &StackItem, y: &StackItem, env: &Env<'_>) -> bool {
    order(x, y, env) == Some(Ordering::Greater)
}

#[inline]
pub fn gte(x: &StackItem, y: &StackItem, env: &Env<'_>) -> bool {
    matches!(order(x, y, env), Some(Ordering::Greater | Ordering::Equal))
}

#[inline]
pub fn lt(x: &StackItem, y: &StackItem, env: &Env<'_>) -> bool {
    order(x, y, env) == Some(Ordering::Less)
}

#[inline]
pub fn lte(x: &StackItem, y: &StackItem, env: &Env<'_>) -> bool {
    matches!(order(x, y, env), Some(Ordering::Less | Ordering::Equal))
}

// ═══════════════════════════════════════════════════════════════════════════
// Membership
// ═══════════════════════════════════════════════════════════════════════════

/// `lower <= probe < upper`.
pub fn in_range(probe: &StackItem, lower: &StackItem, upper: &StackItem, env: &Env<'_>) -> bool {
    gte(probe, lower, env) && lt(probe, upper, env)
}

/// `probe` equals any of `members`.
pub fn in_set(probe: &StackItem, members: &[StackItem], env: &Env<'_>) -> bool {
    members.iter().rev().any(|m| equ(m, probe, env))
}

/// Membership of `probe` in a single container item.
///
/// | container | test |
/// |-----------|------|
/// | vertex | has the property keyed by an integer or a string's hash |
/// | int array | contains an integer, integral real or keyval key |
/// | float array | contains a numeric value within `FLT_EPSILON` |
/// | map | has the integer or keyval key |
/// | string | contains the probe string as a substring |
/// | bitvector | every probe bit is set |
/// | vertex id | identifier contains the probe string |
pub fn element_of(probe: &StackItem, container: &StackItem, env: &Env<'_>) -> bool {
    match *container {
        StackItem::Vertex(v) => {
            let key = match *probe {
                StackItem::Integer(k) => k,
                StackItem::CString(_) => match env.text(probe) {
                    Some((bytes, _)) => hash_bytes(bytes) as i64,
                    None => return false,
                },
                _ => return false,
            };
            env.graph.is_some_and(|g| g.property(v, key).is_some())
        }
        StackItem::CString(_) => match env.object(container) {
            Some(EvalObject::IntArray(values)) => {
                let wanted = match *probe {
                    StackItem::Integer(i) => i,
                    StackItem::Real(r) if r.fract() == 0.0 => r as i64,
                    StackItem::Keyval(kv) => kv.key() as i64,
                    _ => return false,
                };
                values.contains(&wanted)
            }
            Some(EvalObject::FloatArray(values)) => {
                let wanted = match *probe {
                    StackItem::Integer(i) => i as f64,
                    StackItem::Real(r) => r,
                    StackItem::Keyval(kv) => kv.value() as f64,
                    _ => return false,
                };
                values.iter().any(|v| (v - wanted).abs() < FLT_EPSILON)
            }
            Some(map @ EvalObject::Map(_)) => match *probe {
                StackItem::Integer(i) => map.map_get(i as i32).is_some(),
                StackItem::Keyval(kv) => map.map_get(kv.key()).is_some(),
                _ => false,
            },
            Some(EvalObject::Str { bytes, .. }) => match env.text(probe) {
                Some((needle, _)) if matches!(probe, StackItem::CString(_)) => contains(bytes, needle),
                _ => false,
            },
            _ => false,
        },
        StackItem::Bitvector(bits) => probe.bits() & bits == probe.bits(),
        StackItem::VertexId(_) => match (env.text(container), probe) {
            (Some((id, _)), StackItem::CString(_)) => env.text(probe).is_some_and(|(p, _)| contains(id, p)),
            _ => false,
        },
        _ => false,
    }
}
