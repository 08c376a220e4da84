//! String and array element operators.
//!
//! Operands that are not strings degrade to `NONE` (predicates) or pass
//! through unchanged (transforms). New strings are ephemeral.

use super::cast::text_of;
use super::Env;
use crate::core::{EvalObject, StackItem};

fn text_pair(x: &StackItem, y: &StackItem, env: &Env<'_>) -> Option<(Vec<u8>, Vec<u8>)> {
    match (x, y) {
        (StackItem::CString(_) | StackItem::VertexId(_), StackItem::CString(_) | StackItem::VertexId(_)) => {
            let (a, _) = env.text(x)?;
            let (b, _) = env.text(y)?;
            Some((a.to_vec(), b.to_vec()))
        }
        _ => None,
    }
}

fn sign(o: std::cmp::Ordering) -> StackItem {
    StackItem::Integer(o as i64)
}

pub fn strcmp(x: StackItem, y: StackItem, env: &Env<'_>) -> StackItem {
    text_pair(&x, &y, env).map_or(StackItem::None, |(a, b)| sign(a.cmp(&b)))
}

pub fn strcasecmp(x: StackItem, y: StackItem, env: &Env<'_>) -> StackItem {
    text_pair(&x, &y, env).map_or(StackItem::None, |(a, b)| {
        sign(a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
    })
}

pub fn startswith(x: StackItem, y: StackItem, env: &Env<'_>) -> StackItem {
    text_pair(&x, &y, env).map_or(StackItem::None, |(a, b)| StackItem::boolean(a.starts_with(&b)))
}

pub fn endswith(x: StackItem, y: StackItem, env: &Env<'_>) -> StackItem {
    text_pair(&x, &y, env).map_or(StackItem::None, |(a, b)| StackItem::boolean(a.ends_with(&b)))
}

pub fn contains(x: StackItem, y: StackItem, env: &Env<'_>) -> StackItem {
    text_pair(&x, &y, env).map_or(StackItem::None, |(a, b)| {
        StackItem::boolean(crate::core::object::contains(&a, &b))
    })
}

/// `join(sep, x1..xn)`: the separator is the first argument. Items
/// without a text form are skipped.
pub fn join(args: &[StackItem], env: &mut Env<'_>) -> StackItem {
    let Some((sep, items)) = args.split_first() else {
        return StackItem::None;
    };
    let sep = text_of(sep, env).unwrap_or_default();
    let mut out = Vec::new();
    for (i, text) in items.iter().filter_map(|item| text_of(item, env)).enumerate() {
        if i > 0 {
            out.extend_from_slice(&sep);
        }
        out.extend_from_slice(&text);
    }
    env.scope_str(EvalObject::bytes(out))
}

/// Replace every occurrence of `probe` in `x` with `subst`.
pub fn replace(x: StackItem, probe: StackItem, subst: StackItem, env: &mut Env<'_>) -> StackItem {
    let (Some((hay, _)), Some((needle, _))) = (env.text(&x), env.text(&probe)) else {
        return x;
    };
    if needle.is_empty() {
        return x;
    }
    let (hay, needle) = (hay.to_vec(), needle.to_vec());
    let subst = text_of(&subst, env).unwrap_or_default();
    let mut out = Vec::with_capacity(hay.len());
    let mut rest = hay.as_slice();
    while let Some(pos) = rest.windows(needle.len()).position(|w| w == needle.as_slice()) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(&subst);
        rest = &rest[pos + needle.len()..];
    }
    out.extend_from_slice(rest);
    env.scope_str(EvalObject::bytes(out))
}

/// Python-style slice bound; `NONE` means open.
fn bound(b: &StackItem, len: i64, default: i64) -> Option<i64> {
    match *b {
        StackItem::None => Some(default),
        StackItem::Integer(i) if i < 0 => Some((len + i).max(0)),
        StackItem::Integer(i) => Some(i.min(len)),
        _ => None,
    }
}

/// `slice(x, a, b)` with negative indices counting from the end.
pub fn slice(x: StackItem, a: StackItem, b: StackItem, env: &mut Env<'_>) -> StackItem {
    let Some((bytes, _)) = env.text(&x) else {
        return x;
    };
    let len = bytes.len() as i64;
    let (Some(start), Some(end)) = (bound(&a, len, 0), bound(&b, len, len)) else {
        return x;
    };
    let part = if start < end { bytes[start as usize..end as usize].to_vec() } else { Vec::new() };
    env.scope_str(EvalObject::bytes(part))
}

/// First `n` bytes of `x`.
pub fn prefix(x: StackItem, n: StackItem, env: &mut Env<'_>) -> StackItem {
    slice(x, StackItem::ZERO, n, env)
}

/// Element `i` (modulo the length) of a string, int array or float array.
pub fn idx(x: StackItem, i: StackItem, env: &Env<'_>) -> StackItem {
    let StackItem::Integer(i) = i else {
        return StackItem::None;
    };
    let at = |len: usize| i.rem_euclid(len as i64) as usize;
    match env.object(&x) {
        Some(EvalObject::IntArray(values)) if !values.is_empty() => StackItem::Integer(values[at(values.len())]),
        Some(EvalObject::FloatArray(values)) if !values.is_empty() => StackItem::Real(values[at(values.len())]),
        Some(EvalObject::Str { bytes, .. }) if !bytes.is_empty() => {
            StackItem::Integer(bytes[at(bytes.len())] as i8 as i64)
        }
        _ => StackItem::None,
    }
}

/// `mapget(map, key)`: the keyval stored under an integer key, `NONE` if absent.
pub fn mapget(map: StackItem, key: StackItem, env: &Env<'_>) -> StackItem {
    let k = match key {
        StackItem::Integer(i) => i as i32,
        StackItem::Keyval(kv) => kv.key(),
        _ => return StackItem::None,
    };
    match env.object(&map).and_then(|o| o.map_get(k)) {
        Some(kv) => StackItem::Keyval(kv),
        None => StackItem::None,
    }
}
