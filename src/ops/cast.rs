//! Type conversions.
//!
//! `int`/`real` convert values; `asint`/`asreal` reinterpret payload bits
//! (and parse strings). Reference types cast to their handle bits.
//! Stringification allocates an ephemeral string and degrades to `NONE`
//! when the item has no text form or the object budget is exhausted.

use super::Env;
use crate::core::item::saturating_trunc;
use crate::core::{hash_bytes, ihash64, EvalObject, KeyVal, StackItem};

// ═══════════════════════════════════════════════════════════════════════════
// Numeric Casts
// ═══════════════════════════════════════════════════════════════════════════

/// Truncating integer conversion. Infinities saturate, `NAN`/`NONE` give 0.
pub fn int(x: StackItem) -> StackItem {
    match x {
        StackItem::Real(r) => StackItem::Integer(saturating_trunc(r)),
        StackItem::Nan | StackItem::None => StackItem::ZERO,
        StackItem::Keyval(kv) => StackItem::Integer(kv.key() as i64),
        other => StackItem::Integer(other.bits() as i64),
    }
}

/// Integer conversion rounding reals to nearest.
pub fn intr(x: StackItem) -> StackItem {
    match x {
        StackItem::Real(r) => int(StackItem::Real(r.round())),
        other => int(other),
    }
}

/// Integer view of the payload: a real's bit pattern, a string's parsed
/// value, a vector's length.
pub fn asint(x: StackItem, env: &Env<'_>) -> StackItem {
    match x {
        StackItem::Real(r) => StackItem::Integer(r.to_bits() as i64),
        StackItem::Nan | StackItem::None => StackItem::ZERO,
        StackItem::CString(_) => StackItem::Integer(env.text(&x).map_or(0, |(b, _)| parse_integer(b))),
        StackItem::Vector(_) => StackItem::Integer(env.vector(&x).map_or(0, |v| v.len() as i64)),
        other => StackItem::Integer(other.bits() as i64),
    }
}

/// Raw payload as an integer.
#[inline]
pub fn asbits(x: StackItem) -> StackItem {
    StackItem::Integer(x.bits() as i64)
}

/// Real conversion. Bit-level types without a numeric meaning are
/// reinterpreted.
pub fn real(x: StackItem) -> StackItem {
    match x {
        StackItem::Real(_) => x,
        StackItem::Integer(i) => StackItem::Real(i as f64),
        StackItem::Nan => StackItem::Real(f64::NAN),
        StackItem::None => StackItem::Real(0.0),
        StackItem::Keyval(kv) => StackItem::Real(kv.value() as f64),
        StackItem::Vertex(_) | StackItem::CString(_) | StackItem::Vector(_) | StackItem::VertexId(_) => {
            StackItem::Real(x.bits() as f64)
        }
        other => StackItem::Real(other.raw_real()),
    }
}

/// Real view of the payload: an integer's bit pattern, a string's parsed
/// value, a vector's magnitude. Infinite reals clamp to the finite range.
pub fn asreal(x: StackItem, env: &Env<'_>) -> StackItem {
    match x {
        StackItem::Integer(i) => StackItem::Real(f64::from_bits(i as u64)),
        StackItem::Real(r) if r.is_infinite() => StackItem::Real(if r > 0.0 { f64::MAX } else { -f64::MAX }),
        StackItem::Real(_) => x,
        StackItem::Nan => StackItem::Real(f64::NAN),
        StackItem::None => StackItem::Real(0.0),
        StackItem::Vertex(v) | StackItem::VertexId(v) => StackItem::Real(v.index() as f64),
        StackItem::CString(_) => StackItem::Real(env.text(&x).map_or(0.0, |(b, _)| parse_real(b))),
        StackItem::Vector(_) => StackItem::Real(env.vector(&x).map_or(0.0, |v| env.similarity.magnitude(v))),
        other => StackItem::Real(other.raw_real()),
    }
}

#[inline]
pub fn bitvector(x: StackItem) -> StackItem {
    StackItem::Bitvector(x.bits())
}

/// Pack `key` (integer cast) and `value` (real cast) into a keyval.
pub fn keyval(key: StackItem, value: StackItem) -> StackItem {
    let v = real(value).raw_real() as f32;
    let k = int(key).raw_integer() as i32;
    StackItem::Keyval(KeyVal::new(k, v))
}

fn parse_integer(bytes: &[u8]) -> i64 {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(saturating_trunc))
        .unwrap_or(0)
}

fn parse_real(bytes: &[u8]) -> f64 {
    String::from_utf8_lossy(bytes).trim().parse::<f64>().unwrap_or(0.0)
}

// ═══════════════════════════════════════════════════════════════════════════
// Text
// ═══════════════════════════════════════════════════════════════════════════

/// C `%#g`: six significant digits, trailing zeros kept.
pub fn format_real(r: f64) -> String {
    if r.is_nan() {
        return "nan".to_string();
    }
    if r.is_infinite() {
        return if r > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let sci = format!("{:.5e}", r);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp == 5 {
        format!("{:.0}.", r)
    } else if (-4..5).contains(&exp) {
        format!("{:.*}", (5 - exp) as usize, r)
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    }
}

/// Text form of an item, `None` for items that have none.
pub fn text_of(x: &StackItem, env: &Env<'_>) -> Option<Vec<u8>> {
    let text = match *x {
        StackItem::CString(_) | StackItem::VertexId(_) => return env.text(x).map(|(b, _)| b.to_vec()),
        StackItem::Integer(i) => i.to_string(),
        StackItem::Real(r) => format_real(r),
        StackItem::Nan => "nan".to_string(),
        StackItem::None => "null".to_string(),
        StackItem::Keyval(kv) => format!("{{{}:{}}}", kv.key(), format_real(kv.value() as f64)),
        StackItem::Vertex(v) => format!("{:032x}", env.graph?.internal_id(v)),
        StackItem::Vector(r) => format!("<vector @ {}>", r.index()),
        _ => return None,
    };
    Some(text.into_bytes())
}

/// `str(x)`: strings pass through, everything else is stringified into
/// an ephemeral string.
pub fn str(x: StackItem, env: &mut Env<'_>) -> StackItem {
    if let StackItem::CString(_) = x {
        return x;
    }
    match text_of(&x, env) {
        Some(bytes) => env.scope_str(EvalObject::bytes(bytes)),
        None => StackItem::None,
    }
}

/// `bytes(x1..xn)`: a byte string from the low byte of each argument.
pub fn bytes(args: &[StackItem], env: &mut Env<'_>) -> StackItem {
    let data = args.iter().map(|a| a.raw_integer() as u8).collect();
    env.scope_str(EvalObject::bytes(data))
}

/// Element count of objects, identifier length of vertices, 1 for scalars
/// and 0 for `NONE`.
pub fn len(x: StackItem, env: &Env<'_>) -> StackItem {
    let n = match x {
        StackItem::None => 0,
        StackItem::CString(_) | StackItem::Vector(_) => env.object(&x).map_or(0, |o| o.len() as i64),
        StackItem::VertexId(_) | StackItem::Vertex(_) => env.text(&x).map_or(0, |(b, _)| b.len() as i64),
        _ => 1,
    };
    StackItem::Integer(n)
}

/// 64-bit hash of an item, shared by `hash(x)` and `mhash`.
///
/// Numbers hash their payload bits, strings their bytes, vectors give
/// their fingerprint and vertex identifiers the low half of the internal
/// id. Items with nothing to hash give 0.
pub fn hash(x: &StackItem, env: &Env<'_>) -> StackItem {
    match *x {
        StackItem::Integer(i) => StackItem::Integer(ihash64(i as u64) as i64),
        StackItem::Real(_) | StackItem::Bitvector(_) => StackItem::Integer(ihash64(x.bits()) as i64),
        StackItem::Keyval(kv) => StackItem::Integer(kv.hashkey() as i64),
        StackItem::Vertex(v) => StackItem::Integer(ihash64(v.index()) as i64),
        StackItem::CString(_) => env.text(x).map_or(StackItem::ZERO, |(b, _)| StackItem::Integer(hash_bytes(b) as i64)),
        StackItem::Vector(_) => env.vector(x).map_or(StackItem::ZERO, |v| StackItem::Integer(v.fingerprint() as i64)),
        StackItem::VertexId(v) => env.graph.map_or(StackItem::ZERO, |g| StackItem::Integer(g.internal_id(v) as u64 as i64)),
        _ => StackItem::ZERO,
    }
}
