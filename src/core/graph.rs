//! Read-only view of the graph the evaluator scores against.
//!
//! The evaluator never owns vertices. It receives [`VertexRef`] handles in
//! its context and resolves them through a [`GraphView`] supplied by the
//! caller. Every method except [`GraphView::identifier`] has a neutral
//! default, so a storage engine only implements what it actually tracks.
//!
//! [`StaticGraph`] is a small in-memory implementation used by tests and
//! by callers that score detached records.

use super::item::{hash_bytes, ihash64, VertexRef};
use super::object::VectorObject;

/// Expiration timestamp meaning "never expires".
pub const TIME_NEVER: i64 = 0xFFFF_FFFE;

/// Value of a vertex property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Linear rank coefficients attached to a vertex, `y = c1 * x + c0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rank {
    pub c1: f32,
    pub c0: f32,
}

impl Default for Rank {
    fn default() -> Self {
        Rank { c1: 1.0, c0: 0.0 }
    }
}

/// Creation, modification and expiration times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub created: i64,
    pub modified: i64,
    pub expires: i64,
}

impl Default for Timestamps {
    fn default() -> Self {
        Timestamps { created: 0, modified: 0, expires: TIME_NEVER }
    }
}

/// Hash key under which a named property is looked up.
#[inline]
pub fn property_key(name: &str) -> i64 {
    hash_bytes(name.as_bytes()) as i64
}

/// Read access to vertex state during one traversal callback.
///
/// Implementations are queried while the caller holds whatever locks the
/// storage engine needs; the evaluator only reads.
pub trait GraphView: Send + Sync {
    /// External identifier of a vertex.
    fn identifier(&self, v: VertexRef) -> Option<&str>;

    /// 128-bit internal id. Defaults to a hash of the identifier.
    fn internal_id(&self, v: VertexRef) -> u128 {
        let hi = self.identifier(v).map(|id| hash_bytes(id.as_bytes())).unwrap_or(0);
        ((hi as u128) << 64) | ihash64(hi) as u128
    }

    fn vertex_type(&self, _v: VertexRef) -> u8 {
        0
    }

    fn indegree(&self, _v: VertexRef) -> i64 {
        0
    }

    fn outdegree(&self, _v: VertexRef) -> i64 {
        0
    }

    fn degree(&self, v: VertexRef) -> i64 {
        self.indegree(v) + self.outdegree(v)
    }

    /// Property stored under `key` (see [`property_key`]).
    fn property(&self, _v: VertexRef, _key: i64) -> Option<PropertyValue> {
        None
    }

    fn property_count(&self, _v: VertexRef) -> i64 {
        0
    }

    fn rank(&self, _v: VertexRef) -> Rank {
        Rank::default()
    }

    fn timestamps(&self, _v: VertexRef) -> Timestamps {
        Timestamps::default()
    }

    fn vector(&self, _v: VertexRef) -> Option<&VectorObject> {
        None
    }

    fn is_virtual(&self, _v: VertexRef) -> bool {
        false
    }

    fn encode_relationship(&self, _name: &str) -> Option<u16> {
        None
    }

    fn decode_relationship(&self, _code: u16) -> Option<&str> {
        None
    }

    fn encode_vertex_type(&self, _name: &str) -> Option<u8> {
        None
    }

    fn decode_vertex_type(&self, _code: u8) -> Option<&str> {
        None
    }

    /// Number of vertices.
    fn order(&self) -> i64 {
        0
    }

    /// Number of arcs.
    fn size(&self) -> i64 {
        0
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Static Graph
// ═══════════════════════════════════════════════════════════════════════════

/// One vertex of a [`StaticGraph`].
#[derive(Debug, Clone, Default)]
pub struct VertexRecord {
    pub identifier: String,
    pub vertex_type: u8,
    pub indegree: i64,
    pub outdegree: i64,
    pub properties: Vec<(i64, PropertyValue)>,
    pub rank: Rank,
    pub timestamps: Timestamps,
    pub vector: Option<VectorObject>,
    pub is_virtual: bool,
}

impl VertexRecord {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), ..Default::default() }
    }

    pub fn with_degree(mut self, indegree: i64, outdegree: i64) -> Self {
        self.indegree = indegree;
        self.outdegree = outdegree;
        self
    }

    pub fn with_property(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.push((property_key(name), value));
        self
    }

    pub fn with_rank(mut self, c1: f32, c0: f32) -> Self {
        self.rank = Rank { c1, c0 };
        self
    }

    pub fn with_timestamps(mut self, created: i64, modified: i64, expires: i64) -> Self {
        self.timestamps = Timestamps { created, modified, expires };
        self
    }

    pub fn with_vector(mut self, vector: VectorObject) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_type(mut self, vertex_type: u8) -> Self {
        self.vertex_type = vertex_type;
        self
    }
}

/// Vector-backed graph; `VertexRef(i)` is the `i`-th added vertex.
#[derive(Debug, Clone, Default)]
pub struct StaticGraph {
    vertices: Vec<VertexRecord>,
    relationships: Vec<String>,
    vertex_types: Vec<String>,
    arcs: i64,
}

impl StaticGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, record: VertexRecord) -> VertexRef {
        self.arcs += record.outdegree;
        self.vertices.push(record);
        VertexRef(self.vertices.len() as u64 - 1)
    }

    /// Register a relationship name. Codes start at 1.
    pub fn add_relationship(&mut self, name: &str) -> u16 {
        if let Some(code) = self.encode_relationship(name) {
            return code;
        }
        self.relationships.push(name.to_string());
        self.relationships.len() as u16
    }

    /// Register a vertex type name. Codes start at 1.
    pub fn add_vertex_type(&mut self, name: &str) -> u8 {
        if let Some(code) = self.encode_vertex_type(name) {
            return code;
        }
        self.vertex_types.push(name.to_string());
        self.vertex_types.len() as u8
    }

    fn record(&self, v: VertexRef) -> Option<&VertexRecord> {
        self.vertices.get(v.index() as usize)
    }
}

impl GraphView for StaticGraph {
    fn identifier(&self, v: VertexRef) -> Option<&str> {
        self.record(v).map(|r| r.identifier.as_str())
    }

    fn vertex_type(&self, v: VertexRef) -> u8 {
        self.record(v).map_or(0, |r| r.vertex_type)
    }

    fn indegree(&self, v: VertexRef) -> i64 {
        self.record(v).map_or(0, |r| r.indegree)
    }

    fn outdegree(&self, v: VertexRef) -> i64 {
        self.record(v).map_or(0, |r| r.outdegree)
    }

    fn property(&self, v: VertexRef, key: i64) -> Option<PropertyValue> {
        let record = self.record(v)?;
        record.properties.iter().find(|(k, _)| *k == key).map(|(_, value)| value.clone())
    }

    fn property_count(&self, v: VertexRef) -> i64 {
        self.record(v).map_or(0, |r| r.properties.len() as i64)
    }

    fn rank(&self, v: VertexRef) -> Rank {
        self.record(v).map(|r| r.rank).unwrap_or_default()
    }

    fn timestamps(&self, v: VertexRef) -> Timestamps {
        self.record(v).map(|r| r.timestamps).unwrap_or_default()
    }

    fn vector(&self, v: VertexRef) -> Option<&VectorObject> {
        self.record(v)?.vector.as_ref()
    }

    fn is_virtual(&self, v: VertexRef) -> bool {
        self.record(v).is_some_and(|r| r.is_virtual)
    }

    fn encode_relationship(&self, name: &str) -> Option<u16> {
        self.relationships.iter().position(|r| r == name).map(|i| i as u16 + 1)
    }

    fn decode_relationship(&self, code: u16) -> Option<&str> {
        let i = (code as usize).checked_sub(1)?;
        self.relationships.get(i).map(String::as_str)
    }

    fn encode_vertex_type(&self, name: &str) -> Option<u8> {
        self.vertex_types.iter().position(|t| t == name).map(|i| i as u8 + 1)
    }

    fn decode_vertex_type(&self, code: u8) -> Option<&str> {
        let i = (code as usize).checked_sub(1)?;
        self.vertex_types.get(i).map(String::as_str)
    }

    fn order(&self) -> i64 {
        self.vertices.len() as i64
    }

    fn size(&self) -> i64 {
        self.arcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_graph_lookup() {
        let mut g = StaticGraph::new();
        let a = g.add_vertex(
            VertexRecord::new("alice")
                .with_degree(2, 3)
                .with_property("age", PropertyValue::Integer(31)),
        );
        assert_eq!(g.identifier(a), Some("alice"));
        assert_eq!(g.degree(a), 5);
        assert_eq!(g.property(a, property_key("age")), Some(PropertyValue::Integer(31)));
        assert_eq!(g.property(a, property_key("name")), None);
        assert_eq!(g.property_count(a), 1);
        assert_eq!(g.order(), 1);
        assert_eq!(g.size(), 3);
    }

    #[test]
    fn test_codes_start_at_one() {
        let mut g = StaticGraph::new();
        assert_eq!(g.add_relationship("knows"), 1);
        assert_eq!(g.add_relationship("likes"), 2);
        assert_eq!(g.add_relationship("knows"), 1);
        assert_eq!(g.decode_relationship(2), Some("likes"));
        assert_eq!(g.decode_relationship(0), None);
        assert_eq!(g.add_vertex_type("person"), 1);
        assert_eq!(g.encode_vertex_type("person"), Some(1));
    }

    #[test]
    fn test_defaults_for_missing_vertex() {
        let g = StaticGraph::new();
        let missing = VertexRef(42);
        assert_eq!(g.identifier(missing), None);
        assert_eq!(g.rank(missing), Rank::default());
        assert_eq!(g.timestamps(missing).expires, TIME_NEVER);
        assert_eq!(g.internal_id(missing), g.internal_id(VertexRef(43)));
    }
}
