//! Temporal decay and synthetic-arc group accumulators.
//!
//! # Accumulate / finalize
//!
//! A multi-arc between two vertices is traversed as a run of raw arcs
//! followed by one synthetic arc marking the end of the group. Group
//! operators keep their state in a per-call-site work register: each raw
//! arc folds into it, and the synthetic arc reads it out.
//!
//! For decay, a raw arc with the target relationship contributes its
//! creation time (a modification time overrides), its expiration time, or
//! its value (non-time values are summed). At the synthetic arc the
//! gathered `N0`, `t0`, `tx` feed the decay formula.

use crate::core::{Predicator, StackItem};

/// `ln(1e4)`: exponential decay reaches 0.01% of `N0` at this exponent.
pub const EXP_CUTOFF: f64 = 9.210_340_371_976_184;

/// `N0 * exp(-lambda * t)`, exactly 0 once the exponent passes the cutoff.
#[inline]
pub fn exp_decay(n0: f64, t: f64, lambda: f64) -> f64 {
    let x = lambda * t;
    if x < EXP_CUTOFF {
        n0 * (-(x as f32)).exp() as f64
    } else {
        0.0
    }
}

/// Exponential decay reaching the cutoff at expiration time `tx`.
#[inline]
pub fn exp_expiring(n0: f64, t1: f64, t0: i64, tx: i64) -> f64 {
    let lambda = EXP_CUTOFF / (tx - t0) as f64;
    exp_decay(n0, t1 - t0 as f64, lambda)
}

/// `N0 - rate * t`.
#[inline]
pub fn lin_decay(n0: f64, t: f64, rate: f64) -> f64 {
    n0 - rate * t
}

/// Linear decay crossing zero at expiration time `tx`.
#[inline]
pub fn lin_expiring(n0: f64, t1: f64, t0: i64, tx: i64) -> f64 {
    let rate = n0 / (tx - t0) as f64;
    lin_decay(n0, t1 - t0 as f64, rate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecayKind {
    Exponential,
    Linear,
}

// ═══════════════════════════════════════════════════════════════════════════
// Arc Group Aggregate
// ═══════════════════════════════════════════════════════════════════════════

/// Decay inputs gathered over one arc group.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArcAggregate {
    rel: Option<u16>,
    t0: u32,
    tx: u32,
    n0: Option<f32>,
}

/// A finalized group ready for the decay formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decayable {
    pub rel: u16,
    pub n0: f64,
    pub t0: i64,
    pub tx: i64,
    pub rate: f64,
}

impl ArcAggregate {
    /// Fold one raw arc into the aggregate if its relationship matches.
    pub fn fold(&mut self, pred: Predicator, relenc: i64) {
        if pred.rel() as i64 != relenc {
            return;
        }
        let m = pred.stored_modifier();
        if (m == Predicator::MOD_TIME_CREATED && self.t0 == 0) || m == Predicator::MOD_TIME_MODIFIED {
            self.t0 = pred.value_bits();
        } else if m == Predicator::MOD_TIME_EXPIRES {
            self.tx = pred.value_bits();
        } else if pred.is_float() {
            let v = f32::from_bits(pred.value_bits());
            self.n0 = Some(self.n0.map_or(v, |n| n + v));
        }
        self.rel = Some(pred.rel());
    }

    /// Read out the aggregate at the end of a group. `None` when no arc of
    /// the relationship was seen. A group with timestamps but no value
    /// decays from 1.
    pub fn finish(&self, rate: f64) -> Option<Decayable> {
        let rel = self.rel?;
        let (t0, tx) = (self.t0 as i64, self.tx as i64);
        let n0 = match self.n0 {
            Some(n) => n as f64,
            None if t0 > 0 || tx > 0 => 1.0,
            None => 0.0,
        };
        Some(Decayable { rel, n0, t0, tx, rate })
    }
}

impl Decayable {
    /// Decayed value at `tnow`. `inception` stands in for `t0` when the
    /// group carries no timestamps.
    ///
    /// With an explicit rate, exponential decay reaches the cutoff after
    /// `1/rate` seconds and linear decay reaches zero after `1/rate`
    /// seconds. Without one, the group's own `(t0, tx)` span sets the
    /// lifetime; with neither there is no decay.
    pub fn value(&self, kind: DecayKind, tnow: f64, inception: f64) -> f64 {
        let Decayable { n0, t0, tx, rate, .. } = *self;
        if rate != 0.0 {
            match kind {
                DecayKind::Exponential => {
                    if t0 != 0 {
                        exp_decay(n0, tnow - t0 as f64, rate * EXP_CUTOFF)
                    } else if tx != 0 {
                        exp_decay(n0, rate * (tnow - tx as f64) + 1.0, EXP_CUTOFF)
                    } else {
                        exp_decay(n0, tnow - inception, rate * EXP_CUTOFF)
                    }
                }
                DecayKind::Linear => {
                    if t0 != 0 {
                        lin_decay(n0, tnow - t0 as f64, n0 * rate)
                    } else if tx != 0 {
                        lin_decay(0.0, tnow - tx as f64, n0 * rate)
                    } else {
                        lin_decay(n0, tnow - inception, n0 * rate)
                    }
                }
            }
        } else if tx > t0 {
            match kind {
                DecayKind::Exponential => exp_expiring(n0, tnow, t0, tx),
                DecayKind::Linear => lin_expiring(n0, tnow, t0, tx),
            }
        } else {
            n0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Group Filters
// ═══════════════════════════════════════════════════════════════════════════

/// Bit `n` is set when the `n`-th argument from the right equals the
/// arc's relationship code.
pub fn hasrel_bits(pred: Predicator, relencs: &[StackItem]) -> u64 {
    relencs
        .iter()
        .rev()
        .take(64)
        .enumerate()
        .filter(|(_, r)| r.raw_integer() == pred.rel() as i64)
        .fold(0, |bits, (n, _)| bits | (1 << n))
}

/// As [`hasrel_bits`] for modifiers.
pub fn hasmod_bits(pred: Predicator, modifiers: &[StackItem]) -> u64 {
    modifiers
        .iter()
        .rev()
        .take(64)
        .enumerate()
        .filter(|(_, m)| m.raw_integer() == pred.stored_modifier() as i64)
        .fold(0, |bits, (n, _)| bits | (1 << n))
}

/// `rel`/`mod` pair filter where 0 is a wildcard on either side.
#[inline]
pub fn relmod_match(pred: Predicator, rel: &StackItem, modifier: &StackItem) -> bool {
    let (r, m) = (rel.raw_integer(), modifier.raw_integer());
    (r == 0 || r == pred.rel() as i64) && (m == 0 || m == pred.stored_modifier() as i64)
}

/// Bit `n` is set when the `n`-th `(rel, mod)` pair from the right
/// matches. A dangling trailing argument is ignored.
pub fn hasrelmod_bits(pred: Predicator, pairs: &[StackItem]) -> u64 {
    let even = &pairs[..pairs.len() & !1];
    even.chunks_exact(2)
        .rev()
        .take(64)
        .enumerate()
        .filter(|(_, p)| relmod_match(pred, &p[0], &p[1]))
        .fold(0, |bits, (n, _)| bits | (1 << n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArcDir;

    const REL: u16 = 0x0201;

    fn arc(modifier: u8, value: u32) -> Predicator {
        Predicator::new(REL, ArcDir::Out, modifier, value)
    }

    #[test]
    fn test_decay_boundaries() {
        assert_eq!(exp_decay(5.0, 0.0, 0.3), 5.0);
        assert_eq!(exp_decay(5.0, 1e9, 0.3), 0.0);
        assert!(exp_decay(5.0, 1.0, 0.3) < 5.0);
        assert!(lin_decay(10.0, 4.0, 2.5).abs() < 1e-12);
        assert!((exp_expiring(1.0, 99.0, 0, 100) - 1e-4).abs() < 2e-5);
        assert_eq!(exp_expiring(1.0, 100.0, 0, 100), 0.0);
        assert!(lin_expiring(8.0, 50.0, 10, 50).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_folds_matching_arcs() {
        let mut agg = ArcAggregate::default();
        agg.fold(arc(Predicator::MOD_TIME_CREATED, 100), REL as i64);
        agg.fold(arc(Predicator::MOD_TIME_MODIFIED, 150), REL as i64);
        agg.fold(arc(Predicator::MOD_TIME_CREATED, 120), REL as i64);
        agg.fold(arc(Predicator::MOD_TIME_EXPIRES, 250), REL as i64);
        agg.fold(Predicator::with_float(REL, ArcDir::Out, Predicator::MOD_FLOAT, 2.0), REL as i64);
        agg.fold(Predicator::with_float(REL, ArcDir::Out, Predicator::MOD_FLOAT, 0.5), REL as i64);
        agg.fold(Predicator::with_float(0x0300, ArcDir::Out, Predicator::MOD_FLOAT, 9.0), REL as i64);
        let d = agg.finish(0.0).unwrap();
        assert_eq!((d.rel, d.t0, d.tx), (REL, 150, 250));
        assert_eq!(d.n0, 2.5);
        // Halfway through the linear lifetime.
        assert!((d.value(DecayKind::Linear, 200.0, 0.0) - 1.25).abs() < 1e-9);
        assert_eq!(d.value(DecayKind::Linear, 150.0, 0.0), 2.5);
    }

    #[test]
    fn test_empty_group_and_defaults() {
        assert!(ArcAggregate::default().finish(0.0).is_none());
        let mut agg = ArcAggregate::default();
        agg.fold(arc(Predicator::MOD_TIME_EXPIRES, 500), REL as i64);
        let d = agg.finish(0.0).unwrap();
        assert_eq!(d.n0, 1.0);
        let mut plain = ArcAggregate::default();
        plain.fold(arc(Predicator::MOD_STATIC, 0), REL as i64);
        let d = plain.finish(0.0).unwrap();
        assert_eq!(d.value(DecayKind::Exponential, 1e6, 0.0), 0.0);
    }

    #[test]
    fn test_explicit_rate_uses_inception() {
        let mut agg = ArcAggregate::default();
        agg.fold(Predicator::with_float(REL, ArcDir::Out, Predicator::MOD_FLOAT, 4.0), REL as i64);
        let d = agg.finish(0.1).unwrap();
        assert!((d.value(DecayKind::Linear, 1005.0, 1000.0) - 2.0).abs() < 1e-9);
        assert!(d.value(DecayKind::Exponential, 1010.0, 1000.0) < 4.0 * 2e-4);
    }

    #[test]
    fn test_group_filters() {
        let p = arc(Predicator::MOD_INTEGER, 3);
        let args = [StackItem::Integer(REL as i64), StackItem::Integer(7), StackItem::Integer(REL as i64)];
        assert_eq!(hasrel_bits(p, &args), 0b101);
        let mods = [StackItem::Integer(Predicator::MOD_INTEGER as i64), StackItem::Integer(1)];
        assert_eq!(hasmod_bits(p, &mods), 0b10);
        let pairs = [
            StackItem::Integer(REL as i64),
            StackItem::Integer(0),
            StackItem::Integer(9),
            StackItem::Integer(0),
            StackItem::Integer(0),
        ];
        assert_eq!(hasrelmod_bits(p, &pairs), 0b10);
    }
}
