//! Tagged stack values for the evaluator.
//!
//! Every value flowing through the machine is a [`StackItem`]. The variant
//! selects how the 64-bit payload is interpreted; the numeric type codes
//! are kept because binary operators dispatch on the *pair type*
//! `(x << 8) | y` and several predicates are defined on code bit patterns.
//!
//! Reference variants ([`VertexRef`], [`ObjectRef`]) are plain handles.
//! They carry no destructor and the evaluator never frees what they point at.

use std::fmt;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// Type Codes
// ═══════════════════════════════════════════════════════════════════════════

/// Item type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ItemType {
    None = 0x00,
    Integer = 0x01,
    Real = 0x02,
    Nan = 0x03,
    Vertex = 0x04,
    Range = 0x08,
    CString = 0x10,
    Vector = 0x20,
    Bitvector = 0x21,
    Keyval = 0x22,
    VertexId = 0x40,
    Wild = 0x77,
    Set = 0x80,
}

impl ItemType {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// INTEGER and BITVECTOR.
    #[inline]
    pub const fn is_integer_compatible(self) -> bool {
        self.code() & 0x07 == 0x01
    }

    /// Types whose raw bits are meaningful for equality: INTEGER, BITVECTOR, VERTEX.
    #[inline]
    pub const fn is_bit_comparable(self) -> bool {
        self.is_integer_compatible() || matches!(self, ItemType::Vertex)
    }

    #[inline]
    pub const fn is_object(self) -> bool {
        self.code() & 0xF8 != 0
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemType::None => "null",
            ItemType::Integer => "int",
            ItemType::Real => "flt",
            ItemType::Nan => "nan",
            ItemType::Vertex => "oid",
            ItemType::Range => "range",
            ItemType::CString => "str",
            ItemType::Vector => "vec",
            ItemType::Bitvector => "btv",
            ItemType::Keyval => "keyval",
            ItemType::VertexId => "vtx",
            ItemType::Wild => "wild",
            ItemType::Set => "set",
        }
    }
}

/// True when both types are bit comparable and either identical or both
/// individually bit comparable.
#[inline]
pub const fn are_bit_comparable(a: ItemType, b: ItemType) -> bool {
    a.is_bit_comparable() && (a.code() == b.code() || b.is_bit_comparable())
}

/// Combined `(x << 8) | y` type code of an operand pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairType(pub u16);

impl PairType {
    #[inline]
    pub const fn of(x: ItemType, y: ItemType) -> Self {
        PairType(((x.code() as u16) << 8) | y.code() as u16)
    }

    /// Both sides have a non-zero scalar nibble (INTEGER, REAL, NAN,
    /// VERTEX, BITVECTOR, KEYVAL, WILD).
    #[inline]
    pub const fn is_numeric(self) -> bool {
        self.0 & 0x0F00 != 0 && self.0 & 0x000F != 0
    }

    #[inline]
    pub const fn is_integer_compatible(self) -> bool {
        self.0 & 0x0707 == 0x0101
    }

    #[inline]
    pub const fn is_wild(self) -> bool {
        (self.0 >> 8) as u8 == ItemType::Wild.code() || (self.0 & 0xFF) as u8 == ItemType::Wild.code()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Handles
// ═══════════════════════════════════════════════════════════════════════════

/// Weak reference into the caller's vertex arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VertexRef(pub u64);

impl VertexRef {
    #[inline]
    pub const fn index(self) -> u64 {
        self.0
    }
}

/// Generation-checked handle into an evaluator's object table.
///
/// A handle whose generation no longer matches its slot is stale and
/// resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { index: bits as u32, generation: (bits >> 32) as u32 }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Packed Values
// ═══════════════════════════════════════════════════════════════════════════

/// Sparse-set element: `i32` key in the low half, `f32` value in the high half.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeyVal(u64);

impl KeyVal {
    #[inline]
    pub fn new(key: i32, value: f32) -> Self {
        KeyVal(((value.to_bits() as u64) << 32) | (key as u32) as u64)
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        KeyVal(bits)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn key(self) -> i32 {
        self.0 as u32 as i32
    }

    #[inline]
    pub fn value(self) -> f32 {
        f32::from_bits((self.0 >> 32) as u32)
    }

    /// 32-bit hash of the key, used when keyvals are fingerprinted.
    #[inline]
    pub fn hashkey(self) -> u64 {
        ihash64(self.key() as i64 as u64) & 0xFFFF_FFFF
    }
}

/// Arc direction field of a predicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArcDir {
    Any = 0,
    In = 1,
    Out = 2,
    Both = 3,
}

/// Packed arc attribute.
///
/// ```text
/// 63      55     47             33 31                              0
/// [  EPH  ][ MOD ][     REL     ]DD[             VAL              ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Predicator(pub u64);

impl Predicator {
    pub const NONE: Predicator = Predicator(0);

    /// Modifier type nibble values.
    pub const MOD_NONE: u8 = 0x00;
    pub const MOD_STATIC: u8 = 0x01;
    pub const MOD_SIMILARITY: u8 = 0x12;
    pub const MOD_DISTANCE: u8 = 0x13;
    pub const MOD_LSH: u8 = 0x04;
    pub const MOD_INTEGER: u8 = 0x05;
    pub const MOD_UNSIGNED: u8 = 0x06;
    pub const MOD_FLOAT: u8 = 0x17;
    pub const MOD_COUNTER: u8 = 0x08;
    pub const MOD_ACCUMULATOR: u8 = 0x19;
    pub const MOD_INT_AGGREGATOR: u8 = 0x0A;
    pub const MOD_FLT_AGGREGATOR: u8 = 0x1B;
    pub const MOD_TIME_CREATED: u8 = 0x0C;
    pub const MOD_TIME_MODIFIED: u8 = 0x0D;
    pub const MOD_TIME_EXPIRES: u8 = 0x0E;

    const MOD_TYPE_MASK: u8 = 0x0F;
    const MOD_FLOAT_MASK: u8 = 0x10;
    const MOD_STORED_MASK: u8 = 0x1F;
    const MOD_FWD: u8 = 0x20;
    const MOD_CLASS_MASK: u8 = 0x0C;
    const MOD_CLASS_TIME: u8 = 0x0C;

    const EPH_DISTANCE: u8 = 4;

    pub const REL_NONE: u16 = 0x0000;
    pub const REL_SYNTHETIC: u16 = 0x0105;

    pub fn new(rel: u16, dir: ArcDir, modifier: u8, value: u32) -> Self {
        let rel = (rel as u64 & 0x3FFF) << 34;
        let dir = (dir as u64) << 32;
        let m = (modifier as u64) << 48;
        Predicator(m | rel | dir | value as u64)
    }

    pub fn with_float(rel: u16, dir: ArcDir, modifier: u8, value: f32) -> Self {
        Self::new(rel, dir, modifier, value.to_bits())
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn value_bits(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn rel(self) -> u16 {
        ((self.0 >> 34) & 0x3FFF) as u16
    }

    #[inline]
    pub fn dir(self) -> ArcDir {
        match (self.0 >> 32) & 0x3 {
            1 => ArcDir::In,
            2 => ArcDir::Out,
            3 => ArcDir::Both,
            _ => ArcDir::Any,
        }
    }

    #[inline]
    pub const fn modifier(self) -> u8 {
        (self.0 >> 48) as u8
    }

    /// Modifier without the forward-only flag and probe bits.
    #[inline]
    pub const fn stored_modifier(self) -> u8 {
        self.modifier() & Self::MOD_STORED_MASK
    }

    #[inline]
    pub const fn mod_type(self) -> u8 {
        self.modifier() & Self::MOD_TYPE_MASK
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        self.modifier() & Self::MOD_FLOAT_MASK != 0
    }

    #[inline]
    pub const fn is_forward_only(self) -> bool {
        self.modifier() & Self::MOD_FWD != 0
    }

    #[inline]
    pub const fn is_time(self) -> bool {
        self.modifier() & Self::MOD_CLASS_MASK == Self::MOD_CLASS_TIME
    }

    #[inline]
    pub const fn is_synthetic(self) -> bool {
        self.rel() == Self::REL_SYNTHETIC
    }

    /// Relationship code and stored modifier, the identity of an arc kind.
    #[inline]
    pub const fn key(self) -> u32 {
        ((self.rel() as u32) << 5) | self.stored_modifier() as u32
    }

    /// Predicator value decoded according to the modifier type: float
    /// modifiers give REAL, the signed integer modifier a sign-extended
    /// INTEGER, everything else the unsigned payload.
    pub fn value(self) -> StackItem {
        if self.is_float() {
            StackItem::Real(f32::from_bits(self.value_bits()) as f64)
        } else if self.stored_modifier() == Self::MOD_INTEGER {
            StackItem::Integer(self.value_bits() as i32 as i64)
        } else {
            StackItem::Integer(self.value_bits() as i64)
        }
    }

    /// Predicator value as a double.
    pub fn value_real(self) -> f64 {
        match self.value() {
            StackItem::Real(r) => r,
            other => other.raw_integer() as f64,
        }
    }

    /// Traversal distance carried in the ephemeral byte, 0 when absent.
    #[inline]
    pub const fn distance(self) -> i64 {
        let eph = (self.0 >> 56) as u8;
        if (eph >> 4) & 0x7 == Self::EPH_DISTANCE {
            (eph & 0x0F) as i64
        } else {
            0
        }
    }

    /// Same predicator tagged with a traversal distance (0..=15).
    pub fn with_distance(self, distance: u8) -> Self {
        let eph = (Self::EPH_DISTANCE << 4) | (distance.min(15));
        Predicator((self.0 & 0x00FF_FFFF_FFFF_FFFF) | ((eph as u64) << 56))
    }

    /// Same predicator with the value payload replaced.
    pub fn with_value_bits(self, value: u32) -> Self {
        Predicator((self.0 & !0xFFFF_FFFF) | value as u64)
    }

    /// Same predicator with the relationship code replaced.
    pub fn with_rel(self, rel: u16) -> Self {
        Predicator((self.0 & !(0x3FFF << 34)) | ((rel as u64 & 0x3FFF) << 34))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Hashing
// ═══════════════════════════════════════════════════════════════════════════

/// 64-bit integer mixer shared by set keys, array hashing and keyval hash keys.
#[inline]
pub const fn ihash64(n: u64) -> u64 {
    const M1: u64 = 0x9e37_79b9_7f4a_7c15;
    const M2: u64 = 0xc6a4_a793_5bd1_e995;
    const M3: u64 = 0x94d0_49bb_1331_11eb;
    const M4: u64 = 0x2545_f491_4f6c_dd1d;
    let mut h = n ^ M1;
    let mut b = (n & 0x1FFFF).wrapping_mul(M2);
    b ^= b >> 47;
    h ^= b;
    h = h.wrapping_mul(M3);
    h ^= h.rotate_right(23);
    h = h.rotate_right(11);
    h = h.wrapping_mul(M4);
    h ^= h.rotate_right(33);
    h
}

/// Hash of a byte string, folded through [`ihash64`] eight bytes at a time.
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut h = ihash64(data.len() as u64);
    for chunk in data.chunks(8) {
        let mut word = [0u8; 8];
        word[..chunk.len()].copy_from_slice(chunk);
        h = ihash64(h ^ u64::from_le_bytes(word));
    }
    h
}

// ═══════════════════════════════════════════════════════════════════════════
// Stack Item
// ═══════════════════════════════════════════════════════════════════════════

/// A tagged evaluator value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StackItem {
    /// Absent value; extremal sentinel for sorting and heaps.
    #[default]
    None,
    Integer(i64),
    Real(f64),
    Nan,
    Vertex(VertexRef),
    /// Marker pushed by `range`, carries its operand count.
    Range(i64),
    CString(ObjectRef),
    Vector(ObjectRef),
    Bitvector(u64),
    Keyval(KeyVal),
    VertexId(VertexRef),
    /// Marker pushed by `set(n)`, carries the member count.
    Set(i64),
    /// Matches everything.
    Wild,
}

impl StackItem {
    pub const ZERO: StackItem = StackItem::Integer(0);
    pub const ONE: StackItem = StackItem::Integer(1);

    #[inline]
    pub fn item_type(&self) -> ItemType {
        match self {
            StackItem::None => ItemType::None,
            StackItem::Integer(_) => ItemType::Integer,
            StackItem::Real(_) => ItemType::Real,
            StackItem::Nan => ItemType::Nan,
            StackItem::Vertex(_) => ItemType::Vertex,
            StackItem::Range(_) => ItemType::Range,
            StackItem::CString(_) => ItemType::CString,
            StackItem::Vector(_) => ItemType::Vector,
            StackItem::Bitvector(_) => ItemType::Bitvector,
            StackItem::Keyval(_) => ItemType::Keyval,
            StackItem::VertexId(_) => ItemType::VertexId,
            StackItem::Set(_) => ItemType::Set,
            StackItem::Wild => ItemType::Wild,
        }
    }

    /// Raw 64-bit payload.
    #[inline]
    pub fn bits(&self) -> u64 {
        match *self {
            StackItem::None | StackItem::Wild => 0,
            StackItem::Integer(i) | StackItem::Range(i) | StackItem::Set(i) => i as u64,
            StackItem::Real(r) => r.to_bits(),
            StackItem::Nan => f64::NAN.to_bits(),
            StackItem::Vertex(v) | StackItem::VertexId(v) => v.0,
            StackItem::CString(o) | StackItem::Vector(o) => o.to_bits(),
            StackItem::Bitvector(b) => b,
            StackItem::Keyval(kv) => kv.bits(),
        }
    }

    /// Rebuild an item from a type code and raw payload.
    ///
    /// This is the single place where bits are reinterpreted under a new tag.
    /// Reference handles rebuilt from arbitrary bits are safe: lookups
    /// through them fail instead of aliasing foreign memory.
    #[inline]
    pub fn from_raw(t: ItemType, bits: u64) -> StackItem {
        match t {
            ItemType::None => StackItem::None,
            ItemType::Integer => StackItem::Integer(bits as i64),
            ItemType::Real => StackItem::Real(f64::from_bits(bits)),
            ItemType::Nan => StackItem::Nan,
            ItemType::Vertex => StackItem::Vertex(VertexRef(bits)),
            ItemType::Range => StackItem::Range(bits as i64),
            ItemType::CString => StackItem::CString(ObjectRef::from_bits(bits)),
            ItemType::Vector => StackItem::Vector(ObjectRef::from_bits(bits)),
            ItemType::Bitvector => StackItem::Bitvector(bits),
            ItemType::Keyval => StackItem::Keyval(KeyVal::from_bits(bits)),
            ItemType::VertexId => StackItem::VertexId(VertexRef(bits)),
            ItemType::Set => StackItem::Set(bits as i64),
            ItemType::Wild => StackItem::Wild,
        }
    }

    /// Same type, new payload.
    #[inline]
    pub fn with_bits(&self, bits: u64) -> StackItem {
        StackItem::from_raw(self.item_type(), bits)
    }

    /// Payload read as a signed integer regardless of tag.
    #[inline]
    pub fn raw_integer(&self) -> i64 {
        self.bits() as i64
    }

    /// Payload read as a double regardless of tag.
    #[inline]
    pub fn raw_real(&self) -> f64 {
        f64::from_bits(self.bits())
    }

    #[inline]
    pub fn real(v: f64) -> StackItem {
        StackItem::Real(v)
    }

    #[inline]
    pub fn boolean(b: bool) -> StackItem {
        StackItem::Integer(b as i64)
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, StackItem::None)
    }

    #[inline]
    pub fn is_nan(&self) -> bool {
        matches!(self, StackItem::Nan)
    }

    /// Neither NONE nor NAN.
    #[inline]
    pub fn has_value(&self) -> bool {
        !matches!(self, StackItem::None | StackItem::Nan)
    }

    /// Truthiness used by every conditional operator.
    #[inline]
    pub fn condition(&self) -> bool {
        self.bits() != 0 && !self.is_nan()
    }

    /// Strictly positive numeric content.
    pub fn is_positive(&self) -> bool {
        match *self {
            StackItem::Integer(i) => i > 0,
            StackItem::Real(r) => r > 0.0,
            StackItem::Vertex(_)
            | StackItem::CString(_)
            | StackItem::Vector(_)
            | StackItem::Bitvector(_)
            | StackItem::VertexId(_) => self.bits() != 0,
            StackItem::Keyval(kv) => kv.value() > 0.0,
            _ => false,
        }
    }

    /// Integer view with saturating conversion of reals.
    pub fn get_integer(&self) -> i64 {
        match *self {
            StackItem::Integer(i) => i,
            StackItem::Real(r) => saturating_trunc(r),
            StackItem::Keyval(kv) => kv.key() as i64,
            StackItem::None | StackItem::Nan | StackItem::Wild => 0,
            _ => self.bits() as i64,
        }
    }

    /// Real view; infinities clamp to the finite double range.
    pub fn get_real(&self) -> f64 {
        match *self {
            StackItem::Integer(i) => i as f64,
            StackItem::Real(r) if r.is_infinite() => {
                if r > 0.0 {
                    f64::MAX
                } else {
                    -f64::MAX
                }
            }
            StackItem::Real(r) => r,
            StackItem::Keyval(kv) => kv.value() as f64,
            StackItem::Nan => f64::NAN,
            StackItem::None | StackItem::Wild => 0.0,
            _ => self.bits() as f64,
        }
    }

    /// Values that may live in the memory bank across operations.
    ///
    /// Markers and vertex identifiers are transient; object handles are
    /// storable but must also be retained by the object table.
    pub fn is_storable(&self) -> bool {
        !matches!(self, StackItem::Range(_) | StackItem::Set(_) | StackItem::VertexId(_))
    }
}

/// Truncating double to integer conversion that saturates at the int64 range.
#[inline]
pub fn saturating_trunc(r: f64) -> i64 {
    if r >= i64::MAX as f64 {
        i64::MAX
    } else if r <= i64::MIN as f64 {
        i64::MIN
    } else if r.is_nan() {
        0
    } else {
        r as i64
    }
}

impl fmt::Display for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StackItem::None => write!(f, "(null)"),
            StackItem::Integer(i) => write!(f, "(int) {}", i),
            StackItem::Real(r) => write!(f, "(flt) {}", r),
            StackItem::Nan => write!(f, "(nan)"),
            StackItem::Vertex(v) => write!(f, "(oid) {}", v.0),
            StackItem::Range(n) => write!(f, "(range) {}", n),
            StackItem::CString(o) => write!(f, "(str) @{}", o.index()),
            StackItem::Vector(o) => write!(f, "(vec) @{}", o.index()),
            StackItem::Bitvector(b) => write!(f, "(btv) 0x{:016x}", b),
            StackItem::Keyval(kv) => write!(f, "(keyval) ({},{})", kv.key(), kv.value()),
            StackItem::VertexId(v) => write!(f, "(vtx) {}", v.0),
            StackItem::Set(n) => write!(f, "(set) {}", n),
            StackItem::Wild => write!(f, "(wild)"),
        }
    }
}
