//! Instruction set of the evaluator.
//!
//! Every operation is an [`OpCode`] paired with an immediate [`OpArg`].
//! Families that differ only by a small parameter (the comparison in a
//! memory compare, the math function in a slice transform, the vertex role
//! of a context load) are a single variant carrying a parameter enum, so
//! the executors dispatch once per family.
//!
//! # Variadic Operations
//!
//! Operations marked *variadic* take their argument count from the
//! immediate (`OpArg::Int`). The compiler that produced the program
//! guarantees the count matches what it pushed.

use crate::context::Role;
use crate::core::{KeyMode, ObjectRef, Register, StackItem, VertexRef};
use crate::decay::DecayKind;
use crate::heap::Polarity;
use crate::ops::MathFn;

// ═══════════════════════════════════════════════════════════════════════════
// Immediate Arguments
// ═══════════════════════════════════════════════════════════════════════════

/// Immediate operand attached to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OpArg {
    #[default]
    None,
    Int(i64),
    Real(f64),
    Bits(u64),
    /// String or array constant in the evaluator's object table.
    Object(ObjectRef),
    Vector(ObjectRef),
    Vertex(VertexRef),
    Nan,
    Wild,
}

impl OpArg {
    /// The stack item `push` places for this immediate.
    pub fn item(self) -> StackItem {
        match self {
            OpArg::None => StackItem::None,
            OpArg::Int(i) => StackItem::Integer(i),
            OpArg::Real(r) => StackItem::Real(r),
            OpArg::Bits(b) => StackItem::Bitvector(b),
            OpArg::Object(r) => StackItem::CString(r),
            OpArg::Vector(r) => StackItem::Vector(r),
            OpArg::Vertex(v) => StackItem::Vertex(v),
            OpArg::Nan => StackItem::Nan,
            OpArg::Wild => StackItem::Wild,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Parameters
// ═══════════════════════════════════════════════════════════════════════════

/// Direct addressing uses the operand as the cell address; indirect
/// addressing reads the address from that cell first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Addr {
    Direct,
    Indirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "equ",
            CmpOp::Neq => "neq",
            CmpOp::Gt => "gt",
            CmpOp::Gte => "gte",
            CmpOp::Lt => "lt",
            CmpOp::Lte => "lte",
        }
    }
}

/// In-place arithmetic and bit operations on memory cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shr,
    Shl,
    And,
    Or,
    Xor,
}

impl MemOp {
    pub fn name(self) -> &'static str {
        match self {
            MemOp::Add => "add",
            MemOp::Sub => "sub",
            MemOp::Mul => "mul",
            MemOp::Div => "div",
            MemOp::Mod => "mod",
            MemOp::Shr => "shr",
            MemOp::Shl => "shl",
            MemOp::And => "and",
            MemOp::Or => "or",
            MemOp::Xor => "xor",
        }
    }
}

/// Raw-payload arithmetic of the `mi*` and `mr*` slice families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawOp {
    Inc,
    Dec,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl RawOp {
    pub fn name(self) -> &'static str {
        match self {
            RawOp::Inc => "inc",
            RawOp::Dec => "dec",
            RawOp::Add => "add",
            RawOp::Sub => "sub",
            RawOp::Mul => "mul",
            RawOp::Div => "div",
            RawOp::Mod => "mod",
        }
    }

    /// Whether the operation takes a value operand after the slice.
    pub fn has_operand(self) -> bool {
        !matches!(self, RawOp::Inc | RawOp::Dec)
    }
}

/// Slice reductions written to a destination cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduce {
    Sum,
    SumSqr,
    Stdev,
    InvSum,
    Prod,
    Mean,
    HarmMean,
    GeoMean,
    GeoStdev,
}

impl Reduce {
    pub fn name(self) -> &'static str {
        match self {
            Reduce::Sum => "sum",
            Reduce::SumSqr => "sumsqr",
            Reduce::Stdev => "stdev",
            Reduce::InvSum => "invsum",
            Reduce::Prod => "prod",
            Reduce::Mean => "mean",
            Reduce::HarmMean => "harmmean",
            Reduce::GeoMean => "geomean",
            Reduce::GeoStdev => "geostdev",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extreme {
    Min,
    Max,
}

/// pi8 similarity kernels over byte arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Ecld,
    Ssq,
    RsqrtSsq,
    Dp,
    Cos,
}

impl Kernel {
    pub fn is_unary(self) -> bool {
        matches!(self, Kernel::Ssq | Kernel::RsqrtSsq)
    }
}

/// Attributes readable from a vertex in the traversal triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexField {
    Ref,
    Id,
    InternalId,
    Type,
    Degree,
    InDegree,
    OutDegree,
    Created,
    Modified,
    Expires,
    C1,
    C0,
    Virtual,
    Vector,
    PropertyCount,
}

impl VertexField {
    pub fn name(self) -> &'static str {
        match self {
            VertexField::Ref => "ref",
            VertexField::Id => "id",
            VertexField::InternalId => "internalid",
            VertexField::Type => "type",
            VertexField::Degree => "deg",
            VertexField::InDegree => "ideg",
            VertexField::OutDegree => "odeg",
            VertexField::Created => "tmc",
            VertexField::Modified => "tmm",
            VertexField::Expires => "tmx",
            VertexField::C1 => "c1",
            VertexField::C0 => "c0",
            VertexField::Virtual => "virtual",
            VertexField::Vector => "vector",
            VertexField::PropertyCount => "propcount",
        }
    }
}

/// Which context arc an arc load reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArcSide {
    Arrive,
    Exit,
}

/// Attributes readable from an arc predicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArcField {
    Value,
    Distance,
    RelCode,
    Direction,
    Modifier,
    IsFwdOnly,
    IsSyn,
    Raw,
}

impl ArcField {
    pub fn name(self) -> &'static str {
        match self {
            ArcField::Value => "value",
            ArcField::Distance => "dist",
            ArcField::RelCode => "type",
            ArcField::Direction => "dir",
            ArcField::Modifier => "mod",
            ArcField::IsFwdOnly => "isfwdonly",
            ArcField::IsSyn => "issyn",
            ArcField::Raw => "raw",
        }
    }
}

/// Values pushed from the evaluation context or graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constant {
    T0,
    TNow,
    /// Seconds since traversal inception.
    Age,
    /// Vertex count of the graph.
    Order,
    /// Arc count of the graph.
    Size,
    /// Operations executed so far in this evaluation.
    OpCount,
    RankScore,
}

impl Constant {
    pub fn name(self) -> &'static str {
        match self {
            Constant::T0 => "t0",
            Constant::TNow => "tnow",
            Constant::Age => "age",
            Constant::Order => "order",
            Constant::Size => "size",
            Constant::OpCount => "opcnt",
            Constant::RankScore => "rankscore",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Operation Codes
// ═══════════════════════════════════════════════════════════════════════════

/// One evaluator instruction.
///
/// Stack comments read `( before -- after )` with the top on the right.
/// Memory operands `idx`, `a1`, `an` are bank addresses and are always
/// wrapped into the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ═══════════════════════════════════════════════════════════════════
    // Stack and Control
    // ═══════════════════════════════════════════════════════════════════

    /// Push the immediate.
    /// Stack: ( -- imm )
    Push,

    /// Stack: ( a -- )
    Pop,

    /// Stack: ( a -- a a )
    Dup,

    /// Stack: ( a b -- b a )
    Swap,

    /// No operation.
    Noop,

    /// Log the top of stack.
    /// Stack: ( a -- a )
    Debug,

    /// End the program, skipping the passthru trailer.
    /// Stack: ( -- )
    Return,

    /// Return `v` if `c` holds, otherwise continue with `c`.
    /// Stack: ( c v -- c|v )
    ReturnIf,

    /// Return 0 unless `c` holds.
    /// Stack: ( c -- c|0 )
    Require,

    /// Mark the timing budget halted. Pushes 1 when a budget is attached.
    /// Stack: ( -- 1|0 )
    Halt,

    /// Stack: ( c -- c )
    HaltIf,

    /// Stack: ( -- 1|0 )
    Halted,

    /// Clear the halt flag. Pushes 1 when a budget is attached.
    /// Stack: ( -- 1|0 )
    Continue,

    /// Stack: ( c -- c )
    ContinueIf,

    /// Variadic. Keep the first argument.
    /// Stack: ( a1 .. an -- a1 )
    First,

    /// Variadic. First argument that is neither NONE nor NAN.
    /// Stack: ( a1 .. an -- ak )
    FirstVal,

    /// Variadic. Last argument that is neither NONE nor NAN.
    /// Stack: ( a1 .. an -- ak )
    LastVal,

    /// Variadic. Mark the `n` items below as a set for `in`.
    /// Stack: ( m1 .. mn -- m1 .. mn SET )
    Set,

    /// Mark the two items below as a range for `in`.
    /// Stack: ( lo hi -- lo hi RANGE )
    Range,

    /// Variadic. Evaluate for side effects.
    /// Stack: ( a1 .. an -- 1 )
    Do,

    /// Variadic. Stack: ( a1 .. an -- NONE )
    Void,

    /// Jump to the immediate target if `c` is false, keeping `c`; otherwise pop it.
    /// Stack: ( c -- ) or ( c -- c )
    Jz,

    /// Jump to the immediate target if `c` is true, keeping `c`; otherwise pop it.
    /// Stack: ( c -- ) or ( c -- c )
    Jnz,

    /// Unconditional jump.
    /// Stack: ( -- )
    Jump,

    /// Select `a` when `c` holds, else `b`.
    /// Stack: ( c a b -- a|b )
    If,

    /// Membership in a range, set, string or object.
    /// Stack: ( x container -- 1|0 )
    In,

    /// Stack: ( x container -- 1|0 )
    NotIn,

    // ═══════════════════════════════════════════════════════════════════
    // Comparison and Logic
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( a b -- 1|0 )
    Compare(CmpOp),

    /// Stack: ( a -- 1|0 )
    Not,

    /// Stack: ( a b -- 1|0 )
    And,

    /// Stack: ( a b -- 1|0 )
    Or,

    /// Stack: ( a b -- 1|0 )
    Xor,

    // ═══════════════════════════════════════════════════════════════════
    // Arithmetic
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( a b -- a+b )
    Add,
    /// Stack: ( a b -- a-b )
    Sub,
    /// Stack: ( a b -- a*b )
    Mul,
    /// Stack: ( a b -- a/b )
    Div,
    /// Stack: ( a b -- a%b )
    Mod,
    /// Stack: ( a b -- a^b )
    Pow,
    Max,
    Min,
    Atan2,
    /// Logarithm of `x` in base `b`.
    /// Stack: ( b x -- log_b(x) )
    LogB,
    /// Proximity score in `[0, 1]`.
    Prox,
    /// Stack: ( a b err -- 1|0 )
    Approx,
    /// Binomial coefficient.
    /// Stack: ( n k -- C(n,k) )
    Comb,
    /// Great-circle distance in meters between two points in degrees.
    /// Stack: ( lat1 lon1 lat2 lon2 -- d )
    HavDist,
    /// Great-circle proximity in `[0, 1]`, 1 for the same point.
    /// Stack: ( lat1 lon1 lat2 lon2 -- p )
    GeoProx,
    /// Stack: ( a -- f(a) )
    Math(MathFn),
    /// `idx % mod + offset` when `mod` is positive.
    /// Stack: ( idx mod offset -- i )
    ModIndex,

    // ═══════════════════════════════════════════════════════════════════
    // Casts
    // ═══════════════════════════════════════════════════════════════════

    Int,
    Intr,
    AsInt,
    AsBits,
    Real,
    AsReal,
    Bitvector,
    /// Stack: ( key value -- keyval )
    Keyval,
    /// Variadic. Byte string from integer arguments.
    /// Stack: ( b1 .. bn -- str )
    Bytes,
    Str,
    Len,
    Hash,

    // ═══════════════════════════════════════════════════════════════════
    // Bitwise
    // ═══════════════════════════════════════════════════════════════════

    BNot,
    Shl,
    Shr,
    BAnd,
    BOr,
    BXor,

    // ═══════════════════════════════════════════════════════════════════
    // Strings
    // ═══════════════════════════════════════════════════════════════════

    StrCmp,
    StrCaseCmp,
    StartsWith,
    EndsWith,
    Contains,
    /// Variadic. Stack: ( sep s1 .. sn -- str )
    Join,
    /// Stack: ( s probe subst -- str )
    Replace,
    /// Stack: ( s a b -- str )
    Slice,
    /// Stack: ( s n -- str )
    Prefix,
    /// Element `i` of a string, array or map.
    /// Stack: ( s i -- x )
    Idx,
    /// Stack: ( map key -- value )
    MapGet,

    // ═══════════════════════════════════════════════════════════════════
    // Vectors and Probes
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( v1 v2 -- real )
    Dot,
    /// Stack: ( v -- real )
    Magnitude,
    /// Hamming distance of fingerprints or bit patterns.
    /// Stack: ( a b -- int )
    HamDist,
    /// Similarity score of two vectors.
    /// Stack: ( v1 v2 -- real )
    Sim,
    /// pi8 kernel over string or vector bytes.
    /// Stack: ( a [b] -- real )
    Kernel(Kernel),
    /// Stack: ( p1 pn array boost -- 1|0|boost )
    ProbeArray,
    /// Stack: ( p1 pn altarray boost deboost -- real )
    ProbeAltArray,
    /// Stack: ( p1 pn superarray boost deboost -- real )
    ProbeSuperArray,

    // ═══════════════════════════════════════════════════════════════════
    // Memory Bank: Scalar
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( idx -- [idx] )
    Load(Addr),
    /// Stack: ( idx v -- v )
    Store(Addr),
    /// Stack: ( c idx v -- c )
    StoreIf(Addr),
    /// Variadic. Sequential store from `idx`; indirect form advances the cursor cell.
    /// Stack: ( idx v1 .. vn -- n )
    Write(Addr),
    /// Variadic. Stack: ( c idx v1 .. vn -- c )
    WriteIf(Addr),
    /// Stack: ( dest src -- [dest] )
    Mov(Addr),
    /// Stack: ( c dest src -- c )
    MovIf(Addr),
    /// Stack: ( a b -- old[b] )
    Xchg(Addr),
    /// Stack: ( c a b -- c )
    XchgIf(Addr),
    /// Stack: ( idx -- [idx] )
    Inc(Addr),
    /// Stack: ( c idx -- c )
    IncIf(Addr),
    /// Stack: ( idx -- [idx] )
    Dec(Addr),
    /// Stack: ( c idx -- c )
    DecIf(Addr),
    /// Raw integer increment, tag kept.
    /// Stack: ( idx -- [idx] )
    IInc,
    /// Stack: ( idx -- [idx] )
    IDec,
    /// Raw integer division by fixed-point reciprocal.
    /// Stack: ( idx x -- [idx] )
    IDiv,
    /// Compare two cells.
    /// Stack: ( a b -- 1|0 )
    MemCmp(Addr, CmpOp),
    /// Stack: ( idx y -- [idx] )
    MemArith(MemOp),
    /// Stack: ( c idx y -- c )
    MemArithIf(MemOp),
    /// Push onto the bank stack.
    /// Stack: ( v -- v )
    MPush,
    /// Stack: ( c v -- c )
    MPushIf,
    /// Stack: ( -- v )
    MPop,
    /// Stack: ( c -- v|NONE )
    MPopIf,
    /// Top of the bank stack.
    /// Stack: ( -- v )
    MGet,
    /// Stack: ( -- [R] )
    Reg(Register),
    /// Variadic. Count into a cell.
    /// Stack: ( idx .. -- [idx] )
    Count,
    /// Variadic. Stack: ( c idx .. -- c )
    CountIf,
    /// Exponential smoothing into a cell.
    /// Stack: ( idx v alpha -- [idx] )
    Smooth,
    /// Mark a vertex in the bank's index bitmap.
    /// Stack: ( vertex -- 1|0 )
    Index,
    /// Stack: ( vertex -- 1|0 )
    Indexed,
    /// Stack: ( vertex -- 0 )
    Unindex,

    // ═══════════════════════════════════════════════════════════════════
    // Memory Bank: Slices
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( a1 an v -- n )
    MSet,
    /// Reset the whole bank.
    /// Stack: ( -- size )
    MReset,
    /// Stack: ( a1 an -- n )
    MRandomize,
    /// Stack: ( a1 an -- n )
    MRandBits,
    /// Stack: ( dest src n -- n )
    MCopy,
    /// Copy to the address held in `r` and advance it.
    /// Stack: ( r src n -- n )
    MPWrite,
    /// Unpack an array or map object.
    /// Stack: ( dest obj -- n )
    MCopyObj,
    /// Stack: ( a1 an -- n )
    MHash,
    /// Stack: ( idx -- idx )
    MTerm,
    /// Stack: ( idx -- n )
    MLen,
    /// Stack: ( dest a1 an -- result )
    MReduce { kind: Reduce, raw: bool },
    /// Stack: ( dest a1 an -- index )
    MExtreme(Extreme),
    /// Stack: ( a1 an v -- 1|0 )
    MContains,
    /// Stack: ( a1 an v -- count )
    MCount,
    /// Stack: ( a1 an v -- index|-1 )
    MIndex,
    /// Stack: ( A B n -- -1|0|1 )
    MCmp,
    /// Stack: ( A B n -- -1|0|1 )
    MCmpa,
    /// Stack: ( a1 an b1 bm -- 1|0 )
    MSubset,
    /// Stack: ( a1 an obj -- 1|0 )
    MSubsetObj,
    /// Stack: ( a1 an obj -- real )
    MSumProdObj,
    /// Stack: ( a1 an x -- n )
    MScalar(MemOp),
    /// Stack: ( a1 an [x] -- n )
    MInt(RawOp),
    /// Stack: ( a1 an [x] -- n )
    MRaw(RawOp),
    /// Stack: ( a1 an -- n )
    MUnary(MathFn),
    /// Stack: ( a1 an -- n )
    MRUnary(MathFn),
    MSq,
    MRSq,
    /// Stack: ( a1 an y -- n )
    MPow,
    MRPow,
    MInc,
    MDec,
    MToInt,
    MToIntr,
    MToReal,
    MToBits,
    /// Element-wise `A op= B`.
    /// Stack: ( A B n -- n )
    MVector(MemOp),
    /// Stack: ( A B n -- n )
    MVExtreme(Extreme),
    /// Stack: ( x k -- count )
    MSort { raw: bool, reverse: bool },
    /// Stack: ( x k -- k )
    MReverse,

    // ═══════════════════════════════════════════════════════════════════
    // Heaps
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( h1 k -- k )
    MHeapInit,
    /// Stack: ( h1 k -- k )
    MHeapify(Polarity),
    /// Stack: ( h1 k v -- 1|0 )
    MHeapPush(Polarity),
    /// Variadic. Stack: ( h1 k v1 .. vn -- count )
    MHeapWrite(Polarity),
    /// Stack: ( h1 k a1 an -- n )
    MHeapSift(Polarity),
    /// Offer the current vertex to the cull heap.
    /// Stack: ( score k -- 1|0|-1 )
    MCull,
    /// Stack: ( c score k -- c )
    MCullIf,

    // ═══════════════════════════════════════════════════════════════════
    // Membership Set
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( x -- 1|0|-1 )
    SetAdd(KeyMode),
    /// Stack: ( x -- 1|0 )
    SetDel(KeyMode),
    /// Stack: ( x -- 1|0 )
    SetHas(KeyMode),
    /// Stack: ( -- n )
    XSetClr,
    /// Stack: ( -- n )
    XSetLen,
    /// Stack: ( size -- 1|0 )
    XSetIni,

    // ═══════════════════════════════════════════════════════════════════
    // Context
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( -- x )
    Vertex(Role, VertexField),
    /// Stack: ( -- x )
    Arc(ArcSide, ArcField),
    /// Variadic. Property lookup with optional default and condition.
    /// Stack: ( key [dflt [cond]] -- value )
    Property(Role),
    /// Variadic. `c1 * sum(args) + c0`.
    /// Stack: ( a1 .. an -- real )
    Rank,
    /// Stack: ( -- x )
    Const(Constant),
    /// Stack: ( name -- code )
    RelEnc,
    /// Stack: ( code -- name )
    RelDec,
    /// Stack: ( name -- code )
    TypeEnc,
    /// Stack: ( code -- name )
    TypeDec,
    /// Stack: ( -- real )
    Random,
    /// Stack: ( -- bits )
    RandomBits,
    /// Stack: ( lo hi -- int )
    RandInt,

    // ═══════════════════════════════════════════════════════════════════
    // Decay and Arc Groups
    // ═══════════════════════════════════════════════════════════════════

    /// Stack: ( n0 t lambda -- real )
    ExpDecay,
    /// Stack: ( n0 t rate -- real )
    LinDecay,
    /// Variadic. Accumulate over an arc group, decay at its end.
    /// Stack: ( relenc [rate] -- real|NONE )
    ArcDecay(DecayKind),
    /// Variadic. Stack: ( r1 .. rn -- bits|NONE )
    HasRel,
    /// Variadic. Stack: ( m1 .. mn -- bits|NONE )
    HasMod,
    /// Variadic. Stack: ( r1 m1 .. rn mn -- bits|NONE )
    HasRelMod,
    /// Stack: ( rel mod -- value|NONE )
    ArcValue,

    // ═══════════════════════════════════════════════════════════════════
    // Collector
    // ═══════════════════════════════════════════════════════════════════

    /// Variadic. Stack: ( [arcvalue [cx]] -- 1|0|-1 )
    Stage,
    /// Variadic. Stack: ( c [arcvalue [cx]] -- c )
    StageIf,
    /// Variadic. Stack: ( [cx] -- 1|0|-1 )
    Unstage,
    /// Variadic. Stack: ( c [cx] -- c )
    UnstageIf,
    /// Variadic. Stack: ( [cx] -- 1|0|-1 )
    Commit,
    /// Variadic. Stack: ( c [cx] -- c )
    CommitIf,
    /// Variadic. Stack: ( [arcvalue] -- 1|0|-1 )
    Collect,
    /// Variadic. Stack: ( c [arcvalue] -- c )
    CollectIf,
    /// Sort floor of the collector as a real.
    /// Stack: ( -- real )
    CollectableReal,
    /// Stack: ( -- int )
    CollectableInt,
}

impl OpCode {
    /// Name of the operation as it appears in expressions.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Push => "push",
            OpCode::Pop => "pop",
            OpCode::Dup => "dup",
            OpCode::Swap => "swap",
            OpCode::Noop => "noop",
            OpCode::Debug => "debug",
            OpCode::Return => "return",
            OpCode::ReturnIf => "returnif",
            OpCode::Require => "require",
            OpCode::Halt => "halt",
            OpCode::HaltIf => "haltif",
            OpCode::Halted => "halted",
            OpCode::Continue => "continue",
            OpCode::ContinueIf => "continueif",
            OpCode::First => "first",
            OpCode::FirstVal => "firstval",
            OpCode::LastVal => "lastval",
            OpCode::Set => "set",
            OpCode::Range => "range",
            OpCode::Do => "do",
            OpCode::Void => "void",
            OpCode::Jz => "jz",
            OpCode::Jnz => "jnz",
            OpCode::Jump => "jump",
            OpCode::If => "if",
            OpCode::In => "in",
            OpCode::NotIn => "notin",
            OpCode::Compare(c) => c.name(),
            OpCode::Not => "not",
            OpCode::And => "and",
            OpCode::Or => "or",
            OpCode::Xor => "xor",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Mod => "mod",
            OpCode::Pow => "pow",
            OpCode::Max => "max",
            OpCode::Min => "min",
            OpCode::Atan2 => "atan2",
            OpCode::LogB => "logb",
            OpCode::Prox => "prox",
            OpCode::Approx => "approx",
            OpCode::Comb => "comb",
            OpCode::HavDist => "havdist",
            OpCode::GeoProx => "geoprox",
            OpCode::Math(f) => f.name(),
            OpCode::ModIndex => "modindex",
            OpCode::Int => "int",
            OpCode::Intr => "intr",
            OpCode::AsInt => "asint",
            OpCode::AsBits => "asbits",
            OpCode::Real => "real",
            OpCode::AsReal => "asreal",
            OpCode::Bitvector => "bitvector",
            OpCode::Keyval => "keyval",
            OpCode::Bytes => "bytes",
            OpCode::Str => "str",
            OpCode::Len => "len",
            OpCode::Hash => "hash",
            OpCode::BNot => "bnot",
            OpCode::Shl => "shl",
            OpCode::Shr => "shr",
            OpCode::BAnd => "band",
            OpCode::BOr => "bor",
            OpCode::BXor => "bxor",
            OpCode::StrCmp => "strcmp",
            OpCode::StrCaseCmp => "strcasecmp",
            OpCode::StartsWith => "startswith",
            OpCode::EndsWith => "endswith",
            OpCode::Contains => "contains",
            OpCode::Join => "join",
            OpCode::Replace => "replace",
            OpCode::Slice => "slice",
            OpCode::Prefix => "prefix",
            OpCode::Idx => "idx",
            OpCode::MapGet => "mapget",
            OpCode::Dot => "dot",
            OpCode::Magnitude => "magnitude",
            OpCode::HamDist => "hamdist",
            OpCode::Sim => "sim",
            OpCode::Kernel(k) => match k {
                Kernel::Ecld => "ecld",
                Kernel::Ssq => "ssq",
                Kernel::RsqrtSsq => "rsqrtssq",
                Kernel::Dp => "dp",
                Kernel::Cos => "cos_pi8",
            },
            OpCode::ProbeArray => "probearray",
            OpCode::ProbeAltArray => "probealtarray",
            OpCode::ProbeSuperArray => "probesuperarray",
            OpCode::Load(Addr::Direct) => "load",
            OpCode::Load(Addr::Indirect) => "rload",
            OpCode::Store(Addr::Direct) => "store",
            OpCode::Store(Addr::Indirect) => "rstore",
            OpCode::StoreIf(Addr::Direct) => "storeif",
            OpCode::StoreIf(Addr::Indirect) => "rstoreif",
            OpCode::Write(Addr::Direct) => "write",
            OpCode::Write(Addr::Indirect) => "rwrite",
            OpCode::WriteIf(Addr::Direct) => "writeif",
            OpCode::WriteIf(Addr::Indirect) => "rwriteif",
            OpCode::Mov(Addr::Direct) => "mov",
            OpCode::Mov(Addr::Indirect) => "rmov",
            OpCode::MovIf(Addr::Direct) => "movif",
            OpCode::MovIf(Addr::Indirect) => "rmovif",
            OpCode::Xchg(Addr::Direct) => "xchg",
            OpCode::Xchg(Addr::Indirect) => "rxchg",
            OpCode::XchgIf(Addr::Direct) => "xchgif",
            OpCode::XchgIf(Addr::Indirect) => "rxchgif",
            OpCode::Inc(Addr::Direct) => "inc",
            OpCode::Inc(Addr::Indirect) => "rinc",
            OpCode::IncIf(Addr::Direct) => "incif",
            OpCode::IncIf(Addr::Indirect) => "rincif",
            OpCode::Dec(Addr::Direct) => "dec",
            OpCode::Dec(Addr::Indirect) => "rdec",
            OpCode::DecIf(Addr::Direct) => "decif",
            OpCode::DecIf(Addr::Indirect) => "rdecif",
            OpCode::IInc => "iinc",
            OpCode::IDec => "idec",
            OpCode::IDiv => "idiv",
            OpCode::MemCmp(Addr::Direct, c) => c.name(),
            OpCode::MemCmp(Addr::Indirect, c) => match c {
                CmpOp::Eq => "requ",
                CmpOp::Neq => "rneq",
                CmpOp::Gt => "rgt",
                CmpOp::Gte => "rgte",
                CmpOp::Lt => "rlt",
                CmpOp::Lte => "rlte",
            },
            OpCode::MemArith(m) => m.name(),
            OpCode::MemArithIf(m) => match m {
                MemOp::Add => "addif",
                MemOp::Sub => "subif",
                MemOp::Mul => "mulif",
                MemOp::Div => "divif",
                MemOp::Mod => "modif",
                MemOp::Shr => "shrif",
                MemOp::Shl => "shlif",
                MemOp::And => "andif",
                MemOp::Or => "orif",
                MemOp::Xor => "xorif",
            },
            OpCode::MPush => "push",
            OpCode::MPushIf => "pushif",
            OpCode::MPop => "pop",
            OpCode::MPopIf => "popif",
            OpCode::MGet => "get",
            OpCode::Reg(r) => match r {
                Register::R1 => "r1",
                Register::R2 => "r2",
                Register::R3 => "r3",
                Register::R4 => "r4",
            },
            OpCode::Count => "count",
            OpCode::CountIf => "countif",
            OpCode::Smooth => "smooth",
            OpCode::Index => "index",
            OpCode::Indexed => "indexed",
            OpCode::Unindex => "unindex",
            OpCode::MSet => "mset",
            OpCode::MReset => "mreset",
            OpCode::MRandomize => "mrandomize",
            OpCode::MRandBits => "mrandbits",
            OpCode::MCopy => "mcopy",
            OpCode::MPWrite => "mpwrite",
            OpCode::MCopyObj => "mcopyobj",
            OpCode::MHash => "mhash",
            OpCode::MTerm => "mterm",
            OpCode::MLen => "mlen",
            OpCode::MReduce { kind, raw: false } => match kind {
                Reduce::Sum => "msum",
                Reduce::SumSqr => "msumsqr",
                Reduce::Stdev => "mstdev",
                Reduce::InvSum => "minvsum",
                Reduce::Prod => "mprod",
                Reduce::Mean => "mmean",
                Reduce::HarmMean => "mharmmean",
                Reduce::GeoMean => "mgeomean",
                Reduce::GeoStdev => "mgeostdev",
            },
            OpCode::MReduce { kind, raw: true } => match kind {
                Reduce::Sum => "mrsum",
                Reduce::SumSqr => "mrsumsqr",
                Reduce::Stdev => "mrstdev",
                Reduce::InvSum => "mrinvsum",
                Reduce::Prod => "mrprod",
                Reduce::Mean => "mrmean",
                Reduce::HarmMean => "mrharmmean",
                Reduce::GeoMean => "mrgeomean",
                Reduce::GeoStdev => "mrgeostdev",
            },
            OpCode::MExtreme(Extreme::Min) => "mmin",
            OpCode::MExtreme(Extreme::Max) => "mmax",
            OpCode::MContains => "mcontains",
            OpCode::MCount => "mcount",
            OpCode::MIndex => "mindex",
            OpCode::MCmp => "mcmp",
            OpCode::MCmpa => "mcmpa",
            OpCode::MSubset => "msubset",
            OpCode::MSubsetObj => "msubsetobj",
            OpCode::MSumProdObj => "msumprodobj",
            OpCode::MScalar(m) => match m {
                MemOp::Add => "madd",
                MemOp::Sub => "msub",
                MemOp::Mul => "mmul",
                MemOp::Div => "mdiv",
                MemOp::Mod => "mmod",
                MemOp::Shr => "mshr",
                MemOp::Shl => "mshl",
                MemOp::And => "mand",
                MemOp::Or => "mor",
                MemOp::Xor => "mxor",
            },
            OpCode::MInt(r) => match r {
                RawOp::Inc => "miinc",
                RawOp::Dec => "midec",
                RawOp::Add => "miadd",
                RawOp::Sub => "misub",
                RawOp::Mul => "mimul",
                RawOp::Div => "midiv",
                RawOp::Mod => "mimod",
            },
            OpCode::MRaw(r) => match r {
                RawOp::Inc => "mrinc",
                RawOp::Dec => "mrdec",
                RawOp::Add => "mradd",
                RawOp::Sub => "mrsub",
                RawOp::Mul => "mrmul",
                RawOp::Div => "mrdiv",
                RawOp::Mod => "mrmod",
            },
            OpCode::MUnary(_) => "m<fn>",
            OpCode::MRUnary(_) => "mr<fn>",
            OpCode::MSq => "msq",
            OpCode::MRSq => "mrsq",
            OpCode::MPow => "mpow",
            OpCode::MRPow => "mrpow",
            OpCode::MInc => "minc",
            OpCode::MDec => "mdec",
            OpCode::MToInt => "mint",
            OpCode::MToIntr => "mintr",
            OpCode::MToReal => "mreal",
            OpCode::MToBits => "mbits",
            OpCode::MVector(m) => match m {
                MemOp::Add => "mvadd",
                MemOp::Sub => "mvsub",
                MemOp::Mul => "mvmul",
                MemOp::Div => "mvdiv",
                MemOp::Mod => "mvmod",
                MemOp::Shr => "mvshr",
                MemOp::Shl => "mvshl",
                MemOp::And => "mvand",
                MemOp::Or => "mvor",
                MemOp::Xor => "mvxor",
            },
            OpCode::MVExtreme(Extreme::Min) => "mvmin",
            OpCode::MVExtreme(Extreme::Max) => "mvmax",
            OpCode::MSort { raw: false, reverse: false } => "msort",
            OpCode::MSort { raw: false, reverse: true } => "msortrev",
            OpCode::MSort { raw: true, reverse: false } => "mrsort",
            OpCode::MSort { raw: true, reverse: true } => "mrsortrev",
            OpCode::MReverse => "mreverse",
            OpCode::MHeapInit => "mheapinit",
            OpCode::MHeapify(Polarity::Min) => "mheapifymin",
            OpCode::MHeapify(Polarity::Max) => "mheapifymax",
            OpCode::MHeapPush(Polarity::Min) => "mheappushmin",
            OpCode::MHeapPush(Polarity::Max) => "mheappushmax",
            OpCode::MHeapWrite(Polarity::Min) => "mheapwritemin",
            OpCode::MHeapWrite(Polarity::Max) => "mheapwritemax",
            OpCode::MHeapSift(Polarity::Min) => "mheapsiftmin",
            OpCode::MHeapSift(Polarity::Max) => "mheapsiftmax",
            OpCode::MCull => "mcull",
            OpCode::MCullIf => "mcullif",
            OpCode::SetAdd(KeyMode::Integer) => "isetadd",
            OpCode::SetAdd(KeyMode::Vertex) => "vsetadd",
            OpCode::SetDel(KeyMode::Integer) => "isetdel",
            OpCode::SetDel(KeyMode::Vertex) => "vsetdel",
            OpCode::SetHas(KeyMode::Integer) => "isethas",
            OpCode::SetHas(KeyMode::Vertex) => "vsethas",
            OpCode::XSetClr => "xsetclr",
            OpCode::XSetLen => "xsetlen",
            OpCode::XSetIni => "xsetini",
            OpCode::Vertex(_, f) => f.name(),
            OpCode::Arc(_, f) => f.name(),
            OpCode::Property(_) => "property",
            OpCode::Rank => "rank",
            OpCode::Const(c) => c.name(),
            OpCode::RelEnc => "relenc",
            OpCode::RelDec => "reldec",
            OpCode::TypeEnc => "typeenc",
            OpCode::TypeDec => "typedec",
            OpCode::Random => "random",
            OpCode::RandomBits => "randbits",
            OpCode::RandInt => "randint",
            OpCode::ExpDecay => "expdecay",
            OpCode::LinDecay => "lindecay",
            OpCode::ArcDecay(DecayKind::Exponential) => "synarc.xdecay",
            OpCode::ArcDecay(DecayKind::Linear) => "synarc.decay",
            OpCode::HasRel => "synarc.hasrel",
            OpCode::HasMod => "synarc.hasmod",
            OpCode::HasRelMod => "synarc.hasrelmod",
            OpCode::ArcValue => "synarc.value",
            OpCode::Stage => "stage",
            OpCode::StageIf => "stageif",
            OpCode::Unstage => "unstage",
            OpCode::UnstageIf => "unstageif",
            OpCode::Commit => "commit",
            OpCode::CommitIf => "commitif",
            OpCode::Collect => "collect",
            OpCode::CollectIf => "collectif",
            OpCode::CollectableReal => "collectable.real",
            OpCode::CollectableInt => "collectable.int",
        }
    }

    /// Whether the immediate carries an argument count.
    pub fn is_variadic(&self) -> bool {
        matches!(
            self,
            OpCode::First
                | OpCode::FirstVal
                | OpCode::LastVal
                | OpCode::Set
                | OpCode::Do
                | OpCode::Void
                | OpCode::Bytes
                | OpCode::Join
                | OpCode::Write(_)
                | OpCode::WriteIf(_)
                | OpCode::Count
                | OpCode::CountIf
                | OpCode::MHeapWrite(_)
                | OpCode::Property(_)
                | OpCode::Rank
                | OpCode::ArcDecay(_)
                | OpCode::HasRel
                | OpCode::HasMod
                | OpCode::HasRelMod
                | OpCode::Stage
                | OpCode::StageIf
                | OpCode::Unstage
                | OpCode::UnstageIf
                | OpCode::Commit
                | OpCode::CommitIf
                | OpCode::Collect
                | OpCode::CollectIf
        )
    }

    /// Whether the immediate is a jump target.
    pub fn is_jump(&self) -> bool {
        matches!(self, OpCode::Jz | OpCode::Jnz | OpCode::Jump)
    }

    /// Items consumed and produced, for static depth checks.
    ///
    /// `nargs` is the argument count of variadic operations. Operations
    /// whose consumption depends on runtime markers (`in` over a set)
    /// report their minimum, and conditional jumps report the fall-through
    /// path.
    pub fn stack_effect(&self, nargs: usize) -> (usize, usize) {
        match self {
            OpCode::Noop | OpCode::Debug | OpCode::Return | OpCode::Jump => (0, 0),
            OpCode::Pop | OpCode::Jz | OpCode::Jnz => (1, 0),
            OpCode::Dup => (1, 2),
            OpCode::Swap => (2, 2),

            OpCode::Push
            | OpCode::Halt
            | OpCode::Halted
            | OpCode::Continue
            | OpCode::Set
            | OpCode::Range
            | OpCode::MPop
            | OpCode::MGet
            | OpCode::Reg(_)
            | OpCode::MReset
            | OpCode::XSetClr
            | OpCode::XSetLen
            | OpCode::Vertex(..)
            | OpCode::Arc(..)
            | OpCode::Const(_)
            | OpCode::Random
            | OpCode::RandomBits
            | OpCode::CollectableReal
            | OpCode::CollectableInt => (0, 1),

            OpCode::Require
            | OpCode::HaltIf
            | OpCode::ContinueIf
            | OpCode::Not
            | OpCode::Math(_)
            | OpCode::Int
            | OpCode::Intr
            | OpCode::AsInt
            | OpCode::AsBits
            | OpCode::Real
            | OpCode::AsReal
            | OpCode::Bitvector
            | OpCode::Str
            | OpCode::Len
            | OpCode::Hash
            | OpCode::BNot
            | OpCode::Magnitude
            | OpCode::Load(_)
            | OpCode::Inc(_)
            | OpCode::Dec(_)
            | OpCode::IInc
            | OpCode::IDec
            | OpCode::MPush
            | OpCode::MPopIf
            | OpCode::Index
            | OpCode::Indexed
            | OpCode::Unindex
            | OpCode::MTerm
            | OpCode::MLen
            | OpCode::SetAdd(_)
            | OpCode::SetDel(_)
            | OpCode::SetHas(_)
            | OpCode::XSetIni
            | OpCode::RelEnc
            | OpCode::RelDec
            | OpCode::TypeEnc
            | OpCode::TypeDec => (1, 1),

            OpCode::Kernel(k) if k.is_unary() => (1, 1),

            OpCode::ReturnIf
            | OpCode::In
            | OpCode::NotIn
            | OpCode::Compare(_)
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::Max
            | OpCode::Min
            | OpCode::Atan2
            | OpCode::LogB
            | OpCode::Prox
            | OpCode::Comb
            | OpCode::Keyval
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::BAnd
            | OpCode::BOr
            | OpCode::BXor
            | OpCode::StrCmp
            | OpCode::StrCaseCmp
            | OpCode::StartsWith
            | OpCode::EndsWith
            | OpCode::Contains
            | OpCode::Prefix
            | OpCode::Idx
            | OpCode::MapGet
            | OpCode::Dot
            | OpCode::HamDist
            | OpCode::Sim
            | OpCode::Kernel(_)
            | OpCode::Store(_)
            | OpCode::Mov(_)
            | OpCode::Xchg(_)
            | OpCode::IncIf(_)
            | OpCode::DecIf(_)
            | OpCode::IDiv
            | OpCode::MemCmp(..)
            | OpCode::MemArith(_)
            | OpCode::MPushIf
            | OpCode::MRandomize
            | OpCode::MRandBits
            | OpCode::MCopyObj
            | OpCode::MHash
            | OpCode::MUnary(_)
            | OpCode::MRUnary(_)
            | OpCode::MSq
            | OpCode::MRSq
            | OpCode::MInc
            | OpCode::MDec
            | OpCode::MToInt
            | OpCode::MToIntr
            | OpCode::MToReal
            | OpCode::MToBits
            | OpCode::MSort { .. }
            | OpCode::MReverse
            | OpCode::MHeapInit
            | OpCode::MHeapify(_)
            | OpCode::MCull
            | OpCode::RandInt
            | OpCode::ArcValue => (2, 1),

            OpCode::MInt(r) | OpCode::MRaw(r) => {
                if r.has_operand() {
                    (3, 1)
                } else {
                    (2, 1)
                }
            }

            OpCode::If
            | OpCode::Approx
            | OpCode::ModIndex
            | OpCode::Replace
            | OpCode::Slice
            | OpCode::StoreIf(_)
            | OpCode::MovIf(_)
            | OpCode::XchgIf(_)
            | OpCode::MemArithIf(_)
            | OpCode::Smooth
            | OpCode::MSet
            | OpCode::MCopy
            | OpCode::MPWrite
            | OpCode::MReduce { .. }
            | OpCode::MExtreme(_)
            | OpCode::MContains
            | OpCode::MCount
            | OpCode::MIndex
            | OpCode::MCmp
            | OpCode::MCmpa
            | OpCode::MSubsetObj
            | OpCode::MSumProdObj
            | OpCode::MScalar(_)
            | OpCode::MPow
            | OpCode::MRPow
            | OpCode::MVector(_)
            | OpCode::MVExtreme(_)
            | OpCode::MHeapPush(_)
            | OpCode::MCullIf
            | OpCode::ExpDecay
            | OpCode::LinDecay => (3, 1),

            OpCode::ProbeArray
            | OpCode::MSubset
            | OpCode::MHeapSift(_)
            | OpCode::HavDist
            | OpCode::GeoProx => (4, 1),
            OpCode::ProbeAltArray | OpCode::ProbeSuperArray => (5, 1),

            OpCode::First
            | OpCode::FirstVal
            | OpCode::LastVal
            | OpCode::Do
            | OpCode::Void
            | OpCode::Bytes
            | OpCode::Join
            | OpCode::Write(_)
            | OpCode::WriteIf(_)
            | OpCode::Count
            | OpCode::CountIf
            | OpCode::MHeapWrite(_)
            | OpCode::Property(_)
            | OpCode::Rank
            | OpCode::ArcDecay(_)
            | OpCode::HasRel
            | OpCode::HasMod
            | OpCode::HasRelMod
            | OpCode::Stage
            | OpCode::StageIf
            | OpCode::Unstage
            | OpCode::UnstageIf
            | OpCode::Commit
            | OpCode::CommitIf
            | OpCode::Collect
            | OpCode::CollectIf => (nargs, 1),
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpCode::MUnary(m) => write!(f, "m{}", m.name()),
            OpCode::MRUnary(m) => write!(f, "mr{}", m.name()),
            OpCode::Vertex(role, field) => write!(f, "{}.{}", role.name(), field.name()),
            OpCode::Arc(ArcSide::Arrive, field) => write!(f, "arrive.{}", field.name()),
            OpCode::Arc(ArcSide::Exit, field) => write!(f, "exit.{}", field.name()),
            other => f.write_str(other.name()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Operation
// ═══════════════════════════════════════════════════════════════════════════

/// An instruction with its immediate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Op {
    pub code: OpCode,
    pub arg: OpArg,
}

impl Op {
    pub const fn new(code: OpCode, arg: OpArg) -> Self {
        Self { code, arg }
    }

    /// Operation without an immediate.
    pub const fn bare(code: OpCode) -> Self {
        Self { code, arg: OpArg::None }
    }

    /// Variadic operation with `n` arguments.
    pub const fn variadic(code: OpCode, n: i64) -> Self {
        Self { code, arg: OpArg::Int(n) }
    }

    pub const fn push(arg: OpArg) -> Self {
        Self { code: OpCode::Push, arg }
    }

    /// Argument count from the immediate, negative counts read as zero.
    #[inline]
    pub fn nargs(&self) -> usize {
        match self.arg {
            OpArg::Int(n) if n > 0 => n as usize,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.arg {
            OpArg::None => write!(f, "{}", self.code),
            OpArg::Int(i) => write!(f, "{} {}", self.code, i),
            OpArg::Real(r) => write!(f, "{} {}", self.code, r),
            OpArg::Bits(b) => write!(f, "{} 0x{:016x}", self.code, b),
            OpArg::Object(r) | OpArg::Vector(r) => write!(f, "{} @{}", self.code, r.index()),
            OpArg::Vertex(v) => write!(f, "{} v{}", self.code, v.index()),
            OpArg::Nan => write!(f, "{} nan", self.code),
            OpArg::Wild => write!(f, "{} *", self.code),
        }
    }
}
