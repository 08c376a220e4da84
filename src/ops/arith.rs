//! Arithmetic with the promotion ladder.
//!
//! `int ⊕ int → int`, `int ⊕ real → real`, `real ⊕ real → real`. Pairs
//! outside the ladder degrade per operator: `add` concatenates strings
//! and falls back to raw-bit `BITVECTOR` sums, `mul` yields `NAN`, `div`
//! and `mod` leave the left operand unchanged. Zero divisors never trap.

use super::cast::text_of;
use super::Env;
use crate::core::item::saturating_trunc;
use crate::core::{are_bit_comparable, EvalObject, ItemType, StackItem};

/// Smallest positive normal single-precision value, substituted for zero divisors.
pub const FLT_MIN: f64 = f32::MIN_POSITIVE as f64;
/// Largest single-precision value, the result of `inv(0)`.
pub const FLT_MAX: f64 = f32::MAX as f64;

// ═══════════════════════════════════════════════════════════════════════════
// Binary
// ═══════════════════════════════════════════════════════════════════════════

pub fn add(x: StackItem, y: StackItem, env: &mut Env<'_>) -> StackItem {
    match (x, y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => StackItem::Integer(a.wrapping_add(b)),
        (StackItem::Integer(a), StackItem::Real(b)) => StackItem::Real(a as f64 + b),
        (StackItem::Real(a), StackItem::Integer(b)) => StackItem::Real(a + b as f64),
        (StackItem::Real(a), StackItem::Real(b)) => StackItem::Real(a + b),
        (StackItem::CString(_), StackItem::CString(_)) => concat(x, y, env),
        (StackItem::Vector(_), StackItem::Vector(_)) => vector_arithmetic(x, y, false, env),
        (StackItem::None, _) => y,
        (StackItem::CString(_), _) if text_of(&y, env).is_some() => concat(x, y, env),
        (_, StackItem::None) => x,
        _ => StackItem::Bitvector(x.bits().wrapping_add(y.bits())),
    }
}

pub fn sub(x: StackItem, y: StackItem, env: &mut Env<'_>) -> StackItem {
    match (x, y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => StackItem::Integer(a.wrapping_sub(b)),
        (StackItem::Integer(a), StackItem::Real(b)) => StackItem::Real(a as f64 - b),
        (StackItem::Real(a), StackItem::Integer(b)) => StackItem::Real(a - b as f64),
        (StackItem::Real(a), StackItem::Real(b)) => StackItem::Real(a - b),
        (StackItem::Vector(_), StackItem::Vector(_)) => vector_arithmetic(x, y, true, env),
        (StackItem::None, _) => unary(MathFn::Neg, y, env),
        (_, StackItem::None) => x,
        _ => StackItem::Bitvector(x.bits().wrapping_sub(y.bits())),
    }
}

pub fn mul(x: StackItem, y: StackItem, env: &mut Env<'_>) -> StackItem {
    match (x, y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => return StackItem::Integer(a.wrapping_mul(b)),
        (StackItem::Real(a), StackItem::Real(b)) => return StackItem::Real(a * b),
        (StackItem::Real(a), StackItem::Integer(b)) => return StackItem::Real(a * b as f64),
        (StackItem::Integer(a), StackItem::Real(b)) => return StackItem::Real(a as f64 * b),
        (StackItem::Vector(_), StackItem::Vector(_)) => {
            return match (env.vector(&x), env.vector(&y)) {
                (Some(a), Some(b)) => StackItem::Real(env.similarity.dot(a, b)),
                _ => x,
            };
        }
        (StackItem::Real(f), StackItem::Vector(_)) | (StackItem::Vector(_), StackItem::Real(f)) => {
            return scalar_multiply(x, y, f, env);
        }
        (StackItem::Integer(i), StackItem::Vector(_)) | (StackItem::Vector(_), StackItem::Integer(i)) => {
            return scalar_multiply(x, y, i as f64, env);
        }
        _ => {}
    }
    let (tx, ty) = (x.item_type(), y.item_type());
    if are_bit_comparable(tx, ty) {
        return StackItem::Bitvector(x.bits().wrapping_mul(y.bits()));
    }
    if ty == ItemType::None {
        return if tx.is_integer_compatible() || tx == ItemType::Real { x.with_bits(0) } else { StackItem::None };
    }
    if tx == ItemType::None {
        return if ty.is_integer_compatible() || ty == ItemType::Real { y.with_bits(0) } else { x };
    }
    StackItem::Nan
}

/// Real division; a zero divisor is replaced by `FLT_MIN`.
pub fn div(x: StackItem, y: StackItem) -> StackItem {
    let divisor = |v: f64| if y.bits() == 0 { FLT_MIN } else { v };
    match (x, y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => StackItem::Real(a as f64 / divisor(b as f64)),
        (StackItem::Integer(a), StackItem::Real(b)) => StackItem::Real(a as f64 / divisor(b)),
        (StackItem::Real(a), StackItem::Integer(b)) => StackItem::Real(a / divisor(b as f64)),
        (StackItem::Real(a), StackItem::Real(b)) => StackItem::Real(a / divisor(b)),
        _ => x,
    }
}

/// Remainder. Integer modulo zero is 0; real modulo zero is `FLT_MIN`.
pub fn modulo(x: StackItem, y: StackItem) -> StackItem {
    let zero = y.bits() == 0;
    match (x, y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => StackItem::Integer(if zero { 0 } else { a.wrapping_rem(b) }),
        (StackItem::Integer(a), StackItem::Real(b)) => StackItem::Real(if zero { FLT_MIN } else { a as f64 % b }),
        (StackItem::Real(a), StackItem::Integer(b)) => StackItem::Real(if zero { FLT_MIN } else { a % b as f64 }),
        (StackItem::Real(a), StackItem::Real(b)) => StackItem::Real(if zero { FLT_MIN } else { a % b }),
        _ => x,
    }
}

/// `x ** y`. Any base to a zero power is 1; negative bases are clamped to
/// 0 for real exponents; overflow clamps to `f64::MAX`.
pub fn pow(x: StackItem, y: StackItem) -> StackItem {
    if y.bits() == 0 {
        return match x {
            StackItem::Real(_) => StackItem::Real(1.0),
            _ => StackItem::ONE,
        };
    }
    let r = match (x, y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => {
            return StackItem::Integer(saturating_trunc((a as f64).powf(b as f64)));
        }
        (StackItem::Integer(a), StackItem::Real(b)) => (if a > 0 { a as f64 } else { 0.0 }).powf(b),
        (StackItem::Real(a), StackItem::Integer(b)) => a.powf(b as f64),
        (StackItem::Real(a), StackItem::Real(b)) => (if a > 0.0 { a } else { 0.0 }).powf(b),
        _ => return x,
    };
    StackItem::Real(if r.is_infinite() { f64::MAX } else { r })
}

pub fn atan2(x: StackItem, y: StackItem) -> StackItem {
    match (x, y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => StackItem::Real((a as f64).atan2(b as f64)),
        (StackItem::Integer(a), StackItem::Real(b)) => StackItem::Real((a as f64).atan2(b)),
        (StackItem::Real(a), StackItem::Integer(b)) => StackItem::Real(a.atan2(b as f64)),
        (StackItem::Real(a), StackItem::Real(b)) => StackItem::Real(a.atan2(b)),
        _ => x,
    }
}

/// `log_b(x)` for positive `x` and a positive base other than 1, else 0.
pub fn log_base(b: StackItem, x: StackItem) -> StackItem {
    let (base, v) = (numeric(&b), numeric(&x));
    match (base, v) {
        (Some(base), Some(v)) if base > 0.0 && base != 1.0 && v > 0.0 => StackItem::Real(v.ln() / base.ln()),
        _ => StackItem::Real(0.0),
    }
}

fn extreme(x: StackItem, y: StackItem, env: &Env<'_>, want_greater: bool) -> StackItem {
    let better = |o: std::cmp::Ordering| (o == std::cmp::Ordering::Greater) == want_greater && o.is_ne();
    match (x, y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => {
            if better(b.cmp(&a)) {
                y
            } else {
                x
            }
        }
        (StackItem::Integer(a), StackItem::Real(b)) => pick(b.partial_cmp(&(a as f64)), x, y, &better),
        (StackItem::Real(a), StackItem::Integer(b)) => pick((b as f64).partial_cmp(&a), x, y, &better),
        (StackItem::Real(a), StackItem::Real(b)) => pick(b.partial_cmp(&a), x, y, &better),
        (StackItem::CString(_), StackItem::CString(_)) => match (env.text(&x), env.text(&y)) {
            (Some((a, _)), Some((b, _))) => pick(Some(b.cmp(a)), x, y, &better),
            _ => x,
        },
        (StackItem::None, _) => y,
        _ => pick(Some(y.bits().cmp(&x.bits())), x, y, &better),
    }
}

fn pick(
    o: Option<std::cmp::Ordering>,
    x: StackItem,
    y: StackItem,
    better: &dyn Fn(std::cmp::Ordering) -> bool,
) -> StackItem {
    match o {
        Some(o) if better(o) => y,
        _ => x,
    }
}

/// Larger of the two; unordered pairs compare raw bits and `NONE` always loses.
pub fn max(x: StackItem, y: StackItem, env: &Env<'_>) -> StackItem {
    extreme(x, y, env, true)
}

/// Smaller of the two; unordered pairs compare raw bits and `NONE` always loses.
pub fn min(x: StackItem, y: StackItem, env: &Env<'_>) -> StackItem {
    extreme(x, y, env, false)
}

/// `(actual, target)` as doubles; unordered pairs use their raw bits.
fn two_doubles(x: &StackItem, y: &StackItem) -> (f64, f64) {
    match (*x, *y) {
        (StackItem::Integer(a), StackItem::Integer(b)) => (a as f64, b as f64),
        (StackItem::Integer(a), StackItem::Real(b)) => (a as f64, b),
        (StackItem::Real(a), StackItem::Integer(b)) => (a, b as f64),
        (StackItem::Real(a), StackItem::Real(b)) => (a, b),
        _ => (x.bits() as f64, y.bits() as f64),
    }
}

/// Proximity score `256 / (256 + |x - y|)`.
pub fn prox(x: StackItem, y: StackItem) -> StackItem {
    let (actual, target) = two_doubles(&x, &y);
    StackItem::Real(256.0 / (256.0 + (target - actual).abs()))
}

/// 1 when `x` is within relative error `err` of `y` (absolute when `y` is 0).
pub fn approx(x: StackItem, y: StackItem, err: StackItem) -> StackItem {
    let maxerr = match err {
        StackItem::Real(r) => r,
        other => other.raw_integer() as f64,
    };
    let (actual, target) = two_doubles(&x, &y);
    let e = if target == 0.0 { actual.abs() } else { ((actual - target) / target).abs() };
    StackItem::boolean(e < maxerr.abs())
}

/// `comb(n, k)` as a real; non-numeric pairs give 1.
pub fn comb(n: StackItem, k: StackItem) -> StackItem {
    match (numeric(&n), numeric(&k)) {
        (Some(n), Some(k)) => StackItem::Real(combinations(n as i32, k as i32)),
        _ => StackItem::ONE,
    }
}

fn combinations(n: i32, k: i32) -> f64 {
    if k < 0 || n < 0 || k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn factorial(n: i32) -> f64 {
    if n < 0 {
        return 0.0;
    }
    (2..=n.min(171)).fold(1.0, |acc, i| acc * i as f64)
}

fn concat(x: StackItem, y: StackItem, env: &mut Env<'_>) -> StackItem {
    let (Some(mut a), Some(b)) = (text_of(&x, env), text_of(&y, env)) else {
        return x;
    };
    a.extend_from_slice(&b);
    match env.scope_str(EvalObject::bytes(a)) {
        StackItem::None => x,
        joined => joined,
    }
}

fn vector_arithmetic(x: StackItem, y: StackItem, subtract: bool, env: &mut Env<'_>) -> StackItem {
    let result = match (env.vector(&x), env.vector(&y)) {
        (Some(a), Some(b)) => env.similarity.vector_arithmetic(a, b, subtract),
        _ => None,
    };
    match result.map(|v| env.scope_vector(v)) {
        Some(StackItem::None) | None => x,
        Some(v) => v,
    }
}

fn scalar_multiply(x: StackItem, y: StackItem, factor: f64, env: &mut Env<'_>) -> StackItem {
    let v = if let StackItem::Vector(_) = x { x } else { y };
    let Some(product) = env.vector(&v).map(|a| env.similarity.scalar_multiply(a, factor)) else {
        return x;
    };
    match env.scope_vector(product) {
        StackItem::None => x,
        scoped => scoped,
    }
}

/// Mean earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_001.0;
/// Half the earth's circumference, the distance reported for unusable input.
pub const MAX_DISTANCE: f64 = EARTH_RADIUS * std::f64::consts::PI;

fn geodistance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (lat1.to_radians(), lon1.to_radians(), lat2.to_radians(), lon2.to_radians());
    let sdlat = ((lat2 - lat1) / 2.0).sin();
    let sdlon = ((lon2 - lon1) / 2.0).sin();
    let a = sdlat * sdlat + lat1.cos() * lat2.cos() * sdlon * sdlon;
    let distance = EARTH_RADIUS * 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    if distance.is_nan() {
        MAX_DISTANCE
    } else {
        distance
    }
}

/// Haversine distance in meters between two `(lat, lon)` points in degrees.
/// Any non-numeric coordinate gives [`MAX_DISTANCE`].
pub fn havdist(lat1: StackItem, lon1: StackItem, lat2: StackItem, lon2: StackItem) -> StackItem {
    let d = match (numeric(&lat1), numeric(&lon1), numeric(&lat2), numeric(&lon2)) {
        (Some(a), Some(b), Some(c), Some(d)) => geodistance(a, b, c, d),
        _ => MAX_DISTANCE,
    };
    StackItem::Real(d)
}

/// `(MAX_DISTANCE - havdist) / MAX_DISTANCE`: 1 for the same point, 0 for antipodes.
pub fn geoprox(lat1: StackItem, lon1: StackItem, lat2: StackItem, lon2: StackItem) -> StackItem {
    let d = havdist(lat1, lon1, lat2, lon2).raw_real();
    StackItem::Real((MAX_DISTANCE - d) / MAX_DISTANCE)
}

/// Numeric value of an `INTEGER` or `REAL`.
#[inline]
pub fn numeric(x: &StackItem) -> Option<f64> {
    match *x {
        StackItem::Integer(i) => Some(i as f64),
        StackItem::Real(r) => Some(r),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unary
// ═══════════════════════════════════════════════════════════════════════════

/// Unary math functions, shared by the stack operator and the `m*`
/// slice operator of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFn {
    Neg,
    Inv,
    Log2,
    Log,
    Log10,
    Rad,
    Deg,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Sinc,
    Exp,
    Abs,
    Sqrt,
    Ceil,
    Floor,
    Round,
    Sign,
    Fac,
    Popcnt,
}

impl MathFn {
    pub fn name(self) -> &'static str {
        match self {
            MathFn::Neg => "neg",
            MathFn::Inv => "inv",
            MathFn::Log2 => "log2",
            MathFn::Log => "log",
            MathFn::Log10 => "log10",
            MathFn::Rad => "rad",
            MathFn::Deg => "deg",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Asin => "asin",
            MathFn::Acos => "acos",
            MathFn::Atan => "atan",
            MathFn::Sinh => "sinh",
            MathFn::Cosh => "cosh",
            MathFn::Tanh => "tanh",
            MathFn::Asinh => "asinh",
            MathFn::Acosh => "acosh",
            MathFn::Atanh => "atanh",
            MathFn::Sinc => "sinc",
            MathFn::Exp => "exp",
            MathFn::Abs => "abs",
            MathFn::Sqrt => "sqrt",
            MathFn::Ceil => "ceil",
            MathFn::Floor => "floor",
            MathFn::Round => "round",
            MathFn::Sign => "sign",
            MathFn::Fac => "fac",
            MathFn::Popcnt => "popcnt",
        }
    }

    /// The function applied to a bare double, used where cells are
    /// treated as raw reals regardless of their tag.
    pub fn apply_real(self, r: f64) -> f64 {
        if let Some(func) = self.transcendental() {
            return func(r);
        }
        match self {
            MathFn::Neg => -r,
            MathFn::Inv => {
                if r != 0.0 {
                    1.0 / r
                } else {
                    FLT_MAX
                }
            }
            MathFn::Log2 => if r > 0.0 { r.log2() } else { -1074.0 },
            MathFn::Log => if r > 0.0 { r.ln() } else { -745.0 },
            MathFn::Log10 => if r > 0.0 { r.log10() } else { -324.0 },
            MathFn::Rad => r.to_radians(),
            MathFn::Deg => r.to_degrees(),
            MathFn::Sinc => {
                let v = r * std::f64::consts::PI;
                if v != 0.0 {
                    v.sin() / v
                } else {
                    1.0
                }
            }
            MathFn::Abs => r.abs(),
            MathFn::Sqrt => if r > 0.0 { r.sqrt() } else { 0.0 },
            MathFn::Ceil => r.ceil(),
            MathFn::Floor => r.floor(),
            MathFn::Round => r.round(),
            MathFn::Sign => ((r > 0.0) as i32 - (r < 0.0) as i32) as f64,
            MathFn::Fac => factorial(r as i32),
            MathFn::Popcnt => r.to_bits().count_ones() as f64,
            _ => r,
        }
    }

    fn transcendental(self) -> Option<fn(f64) -> f64> {
        Some(match self {
            MathFn::Sin => f64::sin,
            MathFn::Cos => f64::cos,
            MathFn::Tan => f64::tan,
            MathFn::Asin => f64::asin,
            MathFn::Acos => f64::acos,
            MathFn::Atan => f64::atan,
            MathFn::Sinh => f64::sinh,
            MathFn::Cosh => f64::cosh,
            MathFn::Tanh => f64::tanh,
            MathFn::Asinh => f64::asinh,
            MathFn::Acosh => f64::acosh,
            MathFn::Atanh => f64::atanh,
            MathFn::Exp => f64::exp,
            _ => return None,
        })
    }
}

/// Logarithm with the floor value returned for non-positive input.
fn log_with_floor(x: StackItem, f: fn(f64) -> f64, floor: f64) -> StackItem {
    match x {
        StackItem::Integer(_) | StackItem::Vertex(_) => {
            let i = x.raw_integer();
            StackItem::Real(if i > 0 { f(i as f64) } else { floor })
        }
        StackItem::Real(r) => StackItem::Real(if r > 0.0 { f(r) } else { floor }),
        StackItem::Nan => x,
        _ => StackItem::Real(0.0),
    }
}

pub fn unary(f: MathFn, x: StackItem, env: &mut Env<'_>) -> StackItem {
    if let Some(func) = f.transcendental() {
        return match x {
            StackItem::Integer(i) => StackItem::Real(func(i as f64)),
            StackItem::Real(r) => StackItem::Real(func(r)),
            _ => x,
        };
    }
    match f {
        MathFn::Neg => match x {
            StackItem::Integer(i) => StackItem::Integer(i.wrapping_neg()),
            StackItem::Bitvector(b) => StackItem::Bitvector((b as i64).wrapping_neg() as u64),
            StackItem::Real(r) => StackItem::Real(-r),
            StackItem::Vertex(v) => StackItem::Integer((v.index() as i64).wrapping_neg()),
            StackItem::Vector(_) => match scalar_multiply(x, x, -1.0, env) {
                same if same == x => StackItem::Nan,
                negated => negated,
            },
            _ => x,
        },
        MathFn::Inv => match x {
            StackItem::Integer(i) => StackItem::Real(if i != 0 { 1.0 / i as f64 } else { FLT_MAX }),
            StackItem::Real(r) => StackItem::Real(if r.to_bits() != 0 { 1.0 / r } else { FLT_MAX }),
            _ => x,
        },
        MathFn::Log2 => log_with_floor(x, f64::log2, -1074.0),
        MathFn::Log => log_with_floor(x, f64::ln, -745.0),
        MathFn::Log10 => log_with_floor(x, f64::log10, -324.0),
        MathFn::Rad => StackItem::Real(numeric(&x).map_or(0.0, f64::to_radians)),
        MathFn::Deg => StackItem::Real(numeric(&x).map_or(0.0, f64::to_degrees)),
        MathFn::Sinc => {
            let v = match x {
                StackItem::Real(r) => r,
                other => other.raw_integer() as f64,
            } * std::f64::consts::PI;
            StackItem::Real(if v != 0.0 { v.sin() / v } else { 1.0 })
        }
        MathFn::Abs => match x {
            StackItem::Integer(i) => StackItem::Integer(i.wrapping_abs()),
            StackItem::Real(r) => StackItem::Real(r.abs()),
            StackItem::Vector(_) => match env.vector(&x) {
                Some(v) => StackItem::Real(env.similarity.magnitude(v)),
                None => x,
            },
            _ => x,
        },
        MathFn::Sqrt => match x {
            StackItem::Integer(i) => StackItem::Real(if i > 0 { (i as f64).sqrt() } else { 0.0 }),
            StackItem::Real(r) => StackItem::Real(if r > 0.0 { r.sqrt() } else { 0.0 }),
            _ => x,
        },
        MathFn::Ceil => real_only(x, f64::ceil),
        MathFn::Floor => real_only(x, f64::floor),
        MathFn::Round => real_only(x, f64::round),
        MathFn::Sign => match x {
            StackItem::Integer(i) => StackItem::Integer(i.signum()),
            StackItem::Real(r) => StackItem::Real(((r > 0.0) as i32 - (r < 0.0) as i32) as f64),
            StackItem::Nan => x,
            _ => StackItem::ONE,
        },
        MathFn::Fac => match x {
            StackItem::Integer(i) => StackItem::Real(factorial(i.clamp(i32::MIN as i64, i32::MAX as i64) as i32)),
            StackItem::Real(r) => StackItem::Real(factorial(r as i32)),
            _ => x,
        },
        MathFn::Popcnt => StackItem::Integer(x.bits().count_ones() as i64),
        _ => x,
    }
}

#[inline]
fn real_only(x: StackItem, f: fn(f64) -> f64) -> StackItem {
    match x {
        StackItem::Real(r) => StackItem::Real(f(r)),
        _ => x,
    }
}
