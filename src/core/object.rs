//! Object table: strings, arrays, maps and vectors referenced by stack items.
//!
//! The table holds two kinds of objects:
//!
//! - **Pinned** objects are program constants, registered when a program is
//!   bound and kept for the evaluator's lifetime.
//! - **Scoped** objects are created during an evaluation (concatenation,
//!   `bytes()`, vector arithmetic, ...) and released when it returns.
//!
//! - **Retained** objects were scoped but got stored into the memory bank;
//!   they live until the bank is reset.
//!
//! Releasing a slot bumps its generation, so any [`ObjectRef`] that escaped
//! its scope is stale afterwards.

use super::item::{KeyVal, ObjectRef};

/// Wildcard form of a string used as a match probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringPattern {
    #[default]
    Exact,
    /// `abc*`
    Prefix,
    /// `*abc`
    Suffix,
    /// `*abc*`
    Infix,
    /// `ab*cd`, text is stored without the star; `split` is the prefix length.
    Internal { split: usize },
}

impl StringPattern {
    /// Parse a probe string, stripping the wildcard markers.
    pub fn parse(text: &str) -> (String, StringPattern) {
        let lead = text.starts_with('*');
        let trail = text.len() > 1 && text.ends_with('*');
        match (lead, trail) {
            (true, true) => (text[1..text.len() - 1].to_string(), StringPattern::Infix),
            (true, false) => (text[1..].to_string(), StringPattern::Suffix),
            (false, true) => (text[..text.len() - 1].to_string(), StringPattern::Prefix),
            (false, false) => match text.find('*') {
                Some(split) => {
                    let mut s = String::with_capacity(text.len() - 1);
                    s.push_str(&text[..split]);
                    s.push_str(&text[split + 1..]);
                    (s, StringPattern::Internal { split })
                }
                None => (text.to_string(), StringPattern::Exact),
            },
        }
    }

    #[inline]
    pub fn is_wildcard(self) -> bool {
        self != StringPattern::Exact
    }

    /// Match `target` against a probe with this pattern.
    pub fn matches(self, probe: &[u8], target: &[u8]) -> bool {
        match self {
            StringPattern::Exact => probe == target,
            StringPattern::Prefix => target.starts_with(probe),
            StringPattern::Suffix => target.ends_with(probe),
            StringPattern::Infix => contains(target, probe),
            StringPattern::Internal { split } => {
                let (head, tail) = probe.split_at(split.min(probe.len()));
                target.len() >= probe.len() && target.starts_with(head) && target.ends_with(tail)
            }
        }
    }
}

/// Byte substring search.
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// Quantized similarity vector: signed 8-bit elements and a scale factor.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorObject {
    elements: Vec<i8>,
    scale: f32,
}

impl VectorObject {
    pub fn new(elements: Vec<i8>, scale: f32) -> Self {
        Self { elements, scale }
    }

    /// Quantize a float vector so its largest magnitude maps to 127.
    pub fn from_f32(values: &[f32]) -> Self {
        let max = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        if max == 0.0 {
            return Self::new(vec![0; values.len()], 1.0);
        }
        let scale = max / 127.0;
        let elements = values.iter().map(|v| (v / scale).round().clamp(-127.0, 127.0) as i8).collect();
        Self::new(elements, scale)
    }

    #[inline]
    pub fn elements(&self) -> &[i8] {
        &self.elements
    }

    /// Elements viewed as packed bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: i8 and u8 have identical size and alignment.
        unsafe { std::slice::from_raw_parts(self.elements.as_ptr() as *const u8, self.elements.len()) }
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.elements.iter().map(|&e| e as f32 * self.scale).collect()
    }

    /// 64-bit sign fingerprint: bit `i` is set when the elements folded
    /// into bucket `i` sum positive.
    pub fn fingerprint(&self) -> u64 {
        let mut buckets = [0i32; 64];
        for (i, &e) in self.elements.iter().enumerate() {
            buckets[i & 63] += e as i32;
        }
        buckets.iter().enumerate().fold(0u64, |fp, (i, &b)| if b > 0 { fp | (1 << i) } else { fp })
    }
}

/// Objects referenced from `CSTRING` and `VECTOR` items.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalObject {
    /// Text or raw bytes, with the wildcard form it was written in.
    Str { bytes: Vec<u8>, pattern: StringPattern },
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    /// Keyval entries sorted by key.
    Map(Vec<KeyVal>),
    Vector(VectorObject),
}

impl EvalObject {
    pub fn string(text: &str) -> Self {
        EvalObject::Str { bytes: text.as_bytes().to_vec(), pattern: StringPattern::Exact }
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        EvalObject::Str { bytes, pattern: StringPattern::Exact }
    }

    /// String written with `*` wildcards.
    pub fn pattern(text: &str) -> Self {
        let (s, pattern) = StringPattern::parse(text);
        EvalObject::Str { bytes: s.into_bytes(), pattern }
    }

    pub fn map(mut entries: Vec<KeyVal>) -> Self {
        entries.sort_by_key(|kv| kv.key());
        entries.dedup_by_key(|kv| kv.key());
        EvalObject::Map(entries)
    }

    /// Element count for arrays and maps, byte length for strings.
    pub fn len(&self) -> usize {
        match self {
            EvalObject::Str { bytes, .. } => bytes.len(),
            EvalObject::IntArray(v) => v.len(),
            EvalObject::FloatArray(v) => v.len(),
            EvalObject::Map(v) => v.len(),
            EvalObject::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn map_get(&self, key: i32) -> Option<KeyVal> {
        match self {
            EvalObject::Map(entries) => entries
                .binary_search_by_key(&key, |kv| kv.key())
                .ok()
                .map(|i| entries[i]),
            _ => None,
        }
    }
}

/// How long an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Program constant.
    Pinned,
    /// Referenced from the memory bank; survives evaluations until the bank is reset.
    Retained,
    /// Released when the current evaluation returns.
    Scoped,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    lifetime: Lifetime,
    object: Option<EvalObject>,
}

/// Arena of objects owned by one evaluator.
#[derive(Debug, Clone)]
pub struct ObjectTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    scoped: Vec<u32>,
    retained: usize,
    budget: usize,
}

impl ObjectTable {
    /// Create a table allowing at most `budget` scoped objects per evaluation.
    pub fn new(budget: usize) -> Self {
        Self { slots: Vec::new(), free: Vec::new(), scoped: Vec::new(), retained: 0, budget }
    }

    /// Change the per-evaluation scope budget.
    pub fn set_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    fn insert(&mut self, object: EvalObject, lifetime: Lifetime) -> ObjectRef {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.lifetime = lifetime;
                slot.object = Some(object);
                ObjectRef::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, lifetime, object: Some(object) });
                ObjectRef::new(index, 0)
            }
        }
    }

    fn free_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.object = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
    }

    /// Register a program constant.
    pub fn pin(&mut self, object: EvalObject) -> ObjectRef {
        self.insert(object, Lifetime::Pinned)
    }

    /// Register an object for the current evaluation.
    ///
    /// Returns `None` when the scope budget is exhausted.
    pub fn scoped(&mut self, object: EvalObject) -> Option<ObjectRef> {
        if self.scoped.len() >= self.budget {
            tracing::warn!(budget = self.budget, "ephemeral object budget exhausted");
            return None;
        }
        let r = self.insert(object, Lifetime::Scoped);
        self.scoped.push(r.index());
        Some(r)
    }

    /// Promote a scoped object so it outlives the evaluation. The handle stays valid.
    ///
    /// Returns false for stale handles.
    pub fn retain(&mut self, r: ObjectRef) -> bool {
        if self.get(r).is_none() {
            return false;
        }
        let slot = &mut self.slots[r.index() as usize];
        if slot.lifetime == Lifetime::Scoped {
            slot.lifetime = Lifetime::Retained;
            self.retained += 1;
        }
        true
    }

    /// Drop every scoped object and invalidate its handles.
    pub fn release_scope(&mut self) {
        let scoped = std::mem::take(&mut self.scoped);
        for &index in &scoped {
            if self.slots[index as usize].lifetime == Lifetime::Scoped {
                self.free_slot(index);
            }
        }
        self.scoped = scoped;
        self.scoped.clear();
    }

    /// Drop every retained object.
    pub fn release_retained(&mut self) {
        if self.retained == 0 {
            return;
        }
        for index in 0..self.slots.len() as u32 {
            let slot = &self.slots[index as usize];
            if slot.lifetime == Lifetime::Retained && slot.object.is_some() {
                self.free_slot(index);
            }
        }
        self.retained = 0;
    }

    /// Drop everything, pinned objects included.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() as u32 {
            if self.slots[index as usize].object.is_some() {
                self.free_slot(index);
            }
        }
        self.scoped.clear();
        self.retained = 0;
    }

    pub fn scoped_count(&self) -> usize {
        self.scoped.len()
    }

    pub fn retained_count(&self) -> usize {
        self.retained
    }

    pub fn lifetime(&self, r: ObjectRef) -> Option<Lifetime> {
        self.get(r)?;
        Some(self.slots[r.index() as usize].lifetime)
    }

    #[inline]
    pub fn get(&self, r: ObjectRef) -> Option<&EvalObject> {
        let slot = self.slots.get(r.index() as usize)?;
        if slot.generation != r.generation() {
            return None;
        }
        slot.object.as_ref()
    }

    /// Bytes and pattern of a string object.
    #[inline]
    pub fn str(&self, r: ObjectRef) -> Option<(&[u8], StringPattern)> {
        match self.get(r)? {
            EvalObject::Str { bytes, pattern } => Some((bytes.as_slice(), *pattern)),
            _ => None,
        }
    }

    /// Raw bytes of a string object or a vector's elements, with the scale factor.
    pub fn byte_view(&self, r: ObjectRef) -> Option<(&[u8], f32)> {
        match self.get(r)? {
            EvalObject::Str { bytes, .. } => Some((bytes.as_slice(), 1.0)),
            EvalObject::Vector(v) => Some((v.bytes(), v.scale())),
            _ => None,
        }
    }

    #[inline]
    pub fn vector(&self, r: ObjectRef) -> Option<&VectorObject> {
        match self.get(r)? {
            EvalObject::Vector(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn int_array(&self, r: ObjectRef) -> Option<&[i64]> {
        match self.get(r)? {
            EvalObject::IntArray(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new(65536)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_release_invalidates_handles() {
        let mut table = ObjectTable::new(8);
        let constant = table.pin(EvalObject::string("const"));
        let eph = table.scoped(EvalObject::string("tmp")).unwrap();
        assert!(table.get(eph).is_some());
        table.release_scope();
        assert!(table.get(eph).is_none());
        assert!(table.get(constant).is_some());
        let again = table.scoped(EvalObject::string("tmp2")).unwrap();
        assert_eq!(again.index(), eph.index());
        assert_ne!(again.generation(), eph.generation());
    }

    #[test]
    fn test_retained_objects_survive_scope() {
        let mut table = ObjectTable::new(8);
        let kept = table.scoped(EvalObject::string("kept")).unwrap();
        let dropped = table.scoped(EvalObject::string("dropped")).unwrap();
        assert!(table.retain(kept));
        table.release_scope();
        assert_eq!(table.lifetime(kept), Some(Lifetime::Retained));
        assert!(table.get(dropped).is_none());
        table.release_retained();
        assert!(table.get(kept).is_none());
        assert!(!table.retain(kept));
    }

    #[test]
    fn test_scope_budget() {
        let mut table = ObjectTable::new(2);
        assert!(table.scoped(EvalObject::string("a")).is_some());
        assert!(table.scoped(EvalObject::string("b")).is_some());
        assert!(table.scoped(EvalObject::string("c")).is_none());
        table.release_scope();
        assert_eq!(table.scoped_count(), 0);
        assert!(table.scoped(EvalObject::string("d")).is_some());
    }

    #[test]
    fn test_pattern_parse_and_match() {
        let (s, p) = StringPattern::parse("abc*");
        assert_eq!((s.as_str(), p), ("abc", StringPattern::Prefix));
        assert!(p.matches(b"abc", b"abcdef"));
        let (s, p) = StringPattern::parse("*def");
        assert!(p.matches(s.as_bytes(), b"abcdef"));
        let (s, p) = StringPattern::parse("*cd*");
        assert!(p.matches(s.as_bytes(), b"abcdef"));
        let (s, p) = StringPattern::parse("ab*ef");
        assert_eq!(p, StringPattern::Internal { split: 2 });
        assert!(p.matches(s.as_bytes(), b"abcdef"));
        assert!(!p.matches(s.as_bytes(), b"abef0"));
        assert!(!p.matches(s.as_bytes(), b"abf"));
    }

    #[test]
    fn test_map_lookup() {
        let map = EvalObject::map(vec![KeyVal::new(5, 0.5), KeyVal::new(1, 1.5), KeyVal::new(3, 2.0)]);
        assert_eq!(map.map_get(3).map(|kv| kv.value()), Some(2.0));
        assert!(map.map_get(4).is_none());
    }

    #[test]
    fn test_vector_quantize_and_fingerprint() {
        let v = VectorObject::from_f32(&[1.0, -0.5, 0.25]);
        assert_eq!(v.elements()[0], 127);
        assert!((v.to_f32()[1] + 0.5).abs() < 0.01);
        assert_eq!(v.fingerprint() & 0b111, 0b101);
    }
}
