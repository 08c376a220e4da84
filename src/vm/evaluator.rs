//! The evaluator control loop.
//!
//! An [`Evaluator`] owns everything one worker needs to run a program:
//! the operand stack, the memory bank, the object table, the cull heap and
//! the work registers of the arc-group operators. It is bound to one
//! program at a time and evaluated once per visited arc or vertex.
//!
//! # Execution Model
//!
//! Operations run in order from the first. Jumps only go forward, so every
//! evaluation terminates after at most `len` steps. The loop stops when it
//! falls off the end of the program, on `return`, when the timing budget is
//! halted, or when the program's operation limit is reached. The result is
//! the top of the stack.
//!
//! # Performance Characteristics
//!
//! - **No per-op checks**: stack depth is validated once at bind time
//! - **No allocation**: the stack, bank, cull heap and registers are reused
//!   across evaluations; only string and vector results allocate
//! - **Single dispatch**: one `match` per operation, families carry their
//!   parameter in the variant
//!
//! # State Across Evaluations
//!
//! The memory bank, the cull heap and the work registers persist between
//! evaluations so a traversal can accumulate into them. Scoped objects are
//! released after every evaluation; objects stored in the bank are retained
//! until the bank is reset.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EvalConfig;
use crate::context::EvalContext;
use crate::core::{EvalError, EvalResult, EvalStack, MemoryBank, ObjectTable, StackItem};
use crate::decay::ArcAggregate;
use crate::heap::{ArcHeadHeapItem, CullHeap};
use crate::similarity::{CosineSimilarity, Similarity, DEFAULT_THRESHOLD};
use crate::simd::Kernels;

use super::opcode::{Addr, ArcSide, Op, OpCode};
use super::program::Program;

// ═══════════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════════

/// How an evaluation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Ran off the end of the program, trailer included.
    Completed,
    /// Left through `return`, `returnif` or `require`.
    Returned,
    /// The timing budget was halted.
    Halted,
    /// The program's operation limit was reached.
    Limited,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Top of the stack when the program ended.
    pub value: StackItem,
    pub status: ExitStatus,
    /// Operations executed.
    pub ops: u64,
    /// Text of a string result, copied before scoped objects are released.
    pub text: Option<String>,
}

impl Evaluation {
    /// Score view of the result.
    pub fn real(&self) -> f64 {
        self.value.get_real()
    }

    pub fn integer(&self) -> i64 {
        self.value.get_integer()
    }

    /// Truthiness of the result, the verdict of a filter program.
    pub fn passed(&self) -> bool {
        self.value.condition()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════════

/// Per-operation state kept between evaluations by the arc-group operators.
#[derive(Debug, Clone, Copy, Default)]
pub(super) enum WorkRegister {
    #[default]
    Empty,
    Aggregate(ArcAggregate),
    Bits(u64),
    Item(StackItem),
}

/// Where the control loop goes after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Flow {
    Next,
    Jump(usize),
    Return,
}

/// A program bound to private execution state.
///
/// Clones share the program and similarity engine and copy everything else.
#[derive(Clone)]
pub struct Evaluator {
    pub(super) program: Arc<Program>,
    pub(super) config: EvalConfig,
    pub(super) stack: EvalStack,
    pub(super) memory: MemoryBank,
    pub(super) objects: ObjectTable,
    pub(super) similarity: Arc<dyn Similarity>,
    pub(super) cull: CullHeap,
    pub(super) registers: Vec<WorkRegister>,
    pub(super) rng: u64,
    pub(super) op_count: u64,
}

impl Evaluator {
    /// Bind `program` to a new evaluator using cosine similarity and the
    /// kernels selected by `config.simd`.
    pub fn new(program: impl Into<Arc<Program>>, config: EvalConfig) -> EvalResult<Self> {
        config.validate()?;
        let similarity = Arc::new(CosineSimilarity::new(DEFAULT_THRESHOLD, Kernels::from_mode(config.simd)));
        Self::with_similarity(program, config, similarity)
    }

    /// Bind `program` with a caller-supplied similarity engine.
    pub fn with_similarity(
        program: impl Into<Arc<Program>>,
        config: EvalConfig,
        similarity: Arc<dyn Similarity>,
    ) -> EvalResult<Self> {
        config.validate()?;
        let program = program.into();
        let (memory, objects, cull) = Self::bind(&program, &config)?;
        let rng = if config.random_seed == 0 { 0x9e37_79b9_7f4a_7c15 } else { config.random_seed };
        Ok(Self {
            stack: EvalStack::with_capacity(config.stack_capacity),
            registers: vec![WorkRegister::Empty; program.len()],
            program,
            config,
            memory,
            objects,
            similarity,
            cull,
            rng,
            op_count: 0,
        })
    }

    /// Validate `program` against `config` and build the state it asks for.
    fn bind(program: &Program, config: &EvalConfig) -> EvalResult<(MemoryBank, ObjectTable, CullHeap)> {
        let depth = program.validate()?;
        if depth > config.stack_capacity {
            return Err(EvalError::StackOverflow { depth, capacity: config.stack_capacity });
        }
        if program.cull() > config.max_cull {
            return Err(EvalError::InvalidCullCapacity { requested: program.cull(), max: config.max_cull });
        }
        let order = program.memory_order().unwrap_or(config.memory_order);
        let memory = MemoryBank::new(order)?;
        let mut objects = program.constants().clone();
        objects.set_budget(config.object_budget);
        debug!(
            ops = program.len(),
            passthru = program.passthru(),
            order,
            cull = program.cull(),
            depth,
            "program bound"
        );
        Ok((memory, objects, CullHeap::new(program.cull())))
    }

    /// Replace the bound program. Bank, cull heap and registers start fresh.
    pub fn rebind(&mut self, program: impl Into<Arc<Program>>) -> EvalResult<()> {
        let program = program.into();
        let (memory, objects, cull) = Self::bind(&program, &self.config)?;
        self.memory = memory;
        self.objects = objects;
        self.cull = cull;
        self.registers = vec![WorkRegister::Empty; program.len()];
        self.program = program;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn stack(&self) -> &EvalStack {
        &self.stack
    }

    pub fn memory(&self) -> &MemoryBank {
        &self.memory
    }

    /// Mutable bank access for callers that seed or harvest cells.
    pub fn memory_mut(&mut self) -> &mut MemoryBank {
        &mut self.memory
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    /// Cull heap entries, best score first.
    pub fn culled(&self) -> Vec<ArcHeadHeapItem> {
        self.cull.ranked()
    }

    pub fn reset_cull(&mut self) {
        self.cull.reset();
    }

    /// Clear the bank and release the objects it retained. Returns the cell count.
    pub fn reset_memory(&mut self) -> usize {
        self.memory.reset(&mut self.objects)
    }

    /// Forget partially accumulated arc groups.
    pub fn reset_registers(&mut self) {
        self.registers.fill(WorkRegister::Empty);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Control Loop
    // ═══════════════════════════════════════════════════════════════════

    /// Run the bound program once against `ctx`.
    pub fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Evaluation {
        let program = Arc::clone(&self.program);
        let ops = program.ops();
        let limit = program.limit();
        self.stack.reset();
        self.op_count = 0;

        let mut status = ExitStatus::Completed;
        let mut pc = 0;
        while pc < ops.len() {
            let op = ops[pc];
            self.op_count += 1;
            match self.dispatch(op, pc, ctx) {
                Flow::Next => pc += 1,
                Flow::Jump(target) => pc = target,
                Flow::Return => {
                    status = ExitStatus::Returned;
                    break;
                }
            }
            if self.config.check_halt && ctx.is_halted() {
                status = ExitStatus::Halted;
                break;
            }
            if limit != 0 && self.op_count >= limit && pc < ops.len() {
                status = ExitStatus::Limited;
                break;
            }
        }

        let value = self.stack.top();
        let text = match value {
            StackItem::CString(r) => self
                .objects
                .str(r)
                .map(|(bytes, _)| String::from_utf8_lossy(bytes).into_owned()),
            StackItem::VertexId(v) => ctx.graph.and_then(|g| g.identifier(v)).map(str::to_owned),
            _ => None,
        };
        self.objects.release_scope();
        Evaluation { value, status, ops: self.op_count, text }
    }

    /// Execute one operation.
    fn dispatch(&mut self, op: Op, pc: usize, ctx: &mut EvalContext<'_>) -> Flow {
        match op.code {
            // ═══════════════════════════════════════════════════════════
            // Stack and Control
            // ═══════════════════════════════════════════════════════════
            OpCode::Push => self.stack.push(op.arg.item()),
            OpCode::Pop => {
                self.stack.pop();
            }
            OpCode::Dup => self.stack.push(self.stack.top()),
            OpCode::Swap => {
                let b = self.stack.pop();
                let a = self.stack.top();
                self.set_top(b);
                self.stack.push(a);
            }
            OpCode::Noop => {}
            OpCode::Debug => {
                info!(target: "vxeval::debug", "STACK[{}]: {}", self.stack.depth(), self.stack.top());
            }
            OpCode::Return => return Flow::Return,
            OpCode::ReturnIf => return self.return_if(),
            OpCode::Require => return self.require(),
            OpCode::Halt => self.halt(ctx),
            OpCode::HaltIf => self.halt_if(ctx),
            OpCode::Halted => self.stack.push(StackItem::boolean(ctx.is_halted())),
            OpCode::Continue => self.resume(ctx),
            OpCode::ContinueIf => self.resume_if(ctx),
            OpCode::First => self.first(op.nargs()),
            OpCode::FirstVal => self.first_value(op.nargs(), false),
            OpCode::LastVal => self.first_value(op.nargs(), true),
            OpCode::Set => self.stack.push(StackItem::Set(op.nargs() as i64)),
            OpCode::Range => self.stack.push(StackItem::Range(2)),
            OpCode::Do => {
                self.stack.discard(op.nargs());
                self.stack.push(StackItem::ONE);
            }
            OpCode::Void => {
                self.stack.discard(op.nargs());
                self.stack.push(StackItem::None);
            }
            OpCode::Jz => return self.branch(op, false),
            OpCode::Jnz => return self.branch(op, true),
            OpCode::Jump => return Flow::Jump(Self::target(op)),
            OpCode::If => self.select(),
            OpCode::In => self.membership(ctx, false),
            OpCode::NotIn => self.membership(ctx, true),

            // ═══════════════════════════════════════════════════════════
            // Comparison and Logic
            // ═══════════════════════════════════════════════════════════
            OpCode::Compare(cmp) => self.compare(cmp, ctx),
            OpCode::Not => {
                let x = self.stack.top();
                self.set_top(StackItem::boolean(!x.condition()));
            }
            OpCode::And => self.logic(|a, b| a && b),
            OpCode::Or => self.logic(|a, b| a || b),
            OpCode::Xor => self.logic(|a, b| a != b),

            // ═══════════════════════════════════════════════════════════
            // Arithmetic, Casts, Bitwise, Strings
            // ═══════════════════════════════════════════════════════════
            OpCode::Add
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
            | OpCode::MapGet => self.binary(op.code, ctx),
            OpCode::Math(_)
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
            | OpCode::BNot => self.unary(op.code, ctx),
            OpCode::Approx => self.approx(),
            OpCode::HavDist | OpCode::GeoProx => self.geo(op.code),
            OpCode::ModIndex => self.modindex(),
            OpCode::Bytes | OpCode::Join => self.gather(op.code, op.nargs(), ctx),
            OpCode::Replace | OpCode::Slice => self.ternary_text(op.code, ctx),

            // ═══════════════════════════════════════════════════════════
            // Vectors and Probes
            // ═══════════════════════════════════════════════════════════
            OpCode::Dot => self.vector_pair(|s, a, b| s.dot(a, b)),
            OpCode::Sim => self.vector_pair(|s, a, b| s.similarity(a, b)),
            OpCode::Magnitude => self.magnitude(),
            OpCode::HamDist => self.hamdist(),
            OpCode::Kernel(k) => self.kernel(k),
            OpCode::ProbeArray => self.probe(false, false),
            OpCode::ProbeAltArray => self.probe(true, false),
            OpCode::ProbeSuperArray => self.probe(true, true),

            // ═══════════════════════════════════════════════════════════
            // Memory Bank: Scalar
            // ═══════════════════════════════════════════════════════════
            OpCode::Load(addr) => self.load(addr),
            OpCode::Store(addr) => self.store(addr),
            OpCode::StoreIf(addr) => self.store_if(addr),
            OpCode::Write(addr) => self.write(addr, op.nargs(), false),
            OpCode::WriteIf(addr) => self.write(addr, op.nargs(), true),
            OpCode::Mov(addr) => self.mov(addr, false),
            OpCode::MovIf(addr) => self.mov(addr, true),
            OpCode::Xchg(addr) => self.xchg(addr, false),
            OpCode::XchgIf(addr) => self.xchg(addr, true),
            OpCode::Inc(addr) => self.step(addr, 1, false),
            OpCode::IncIf(addr) => self.step(addr, 1, true),
            OpCode::Dec(addr) => self.step(addr, -1, false),
            OpCode::DecIf(addr) => self.step(addr, -1, true),
            OpCode::IInc => self.raw_step(1),
            OpCode::IDec => self.raw_step(-1),
            OpCode::IDiv => self.raw_divide(),
            OpCode::MemCmp(addr, cmp) => self.memory_compare(addr, cmp, ctx),
            OpCode::MemArith(m) => self.memory_arith(m, false),
            OpCode::MemArithIf(m) => self.memory_arith(m, true),
            OpCode::MPush => self.bank_push(false),
            OpCode::MPushIf => self.bank_push(true),
            OpCode::MPop => {
                let v = self.memory.pop();
                self.stack.push(v);
            }
            OpCode::MPopIf => self.bank_pop_if(),
            OpCode::MGet => self.stack.push(self.memory.peek()),
            OpCode::Reg(r) => self.stack.push(self.memory.register(r)),
            OpCode::Count => self.count(op.nargs(), false),
            OpCode::CountIf => self.count(op.nargs(), true),
            OpCode::Smooth => self.smooth(),
            OpCode::Index => self.index(),
            OpCode::Indexed => self.indexed(),
            OpCode::Unindex => self.unindex(),
            OpCode::SetAdd(mode) => self.set_add(mode),
            OpCode::SetDel(mode) => self.set_del(mode),
            OpCode::SetHas(mode) => self.set_has(mode),
            OpCode::XSetClr => {
                let n = self.memory.dwset_mut().clear();
                self.stack.push(StackItem::Integer(n as i64));
            }
            OpCode::XSetLen => self.stack.push(StackItem::Integer(self.memory.dwset().len() as i64)),
            OpCode::XSetIni => self.set_initialize(),

            // ═══════════════════════════════════════════════════════════
            // Memory Bank: Slices
            // ═══════════════════════════════════════════════════════════
            OpCode::MSet => self.mset(),
            OpCode::MReset => {
                let n = self.memory.reset(&mut self.objects);
                self.stack.push(StackItem::Integer(n as i64));
            }
            OpCode::MRandomize => self.mrandomize(false),
            OpCode::MRandBits => self.mrandomize(true),
            OpCode::MCopy => self.mcopy(),
            OpCode::MPWrite => self.mpwrite(),
            OpCode::MCopyObj => self.mcopyobj(),
            OpCode::MHash => self.mhash(ctx),
            OpCode::MTerm => self.mterm(),
            OpCode::MLen => self.mlen(),
            OpCode::MReduce { kind, raw } => self.mreduce(kind, raw),
            OpCode::MExtreme(e) => self.mextreme(e),
            OpCode::MContains => self.msearch(ctx, Search::Contains),
            OpCode::MCount => self.msearch(ctx, Search::Count),
            OpCode::MIndex => self.msearch(ctx, Search::Index),
            OpCode::MCmp => self.mcmp(false),
            OpCode::MCmpa => self.mcmp(true),
            OpCode::MSubset => self.msubset(),
            OpCode::MSubsetObj => self.msubsetobj(),
            OpCode::MSumProdObj => self.msumprodobj(),
            OpCode::MScalar(m) => self.mscalar(m),
            OpCode::MInt(r) => self.mint_raw(r),
            OpCode::MRaw(r) => self.mreal_raw(r),
            OpCode::MUnary(f) => self.munary(f, false),
            OpCode::MRUnary(f) => self.munary(f, true),
            OpCode::MSq => self.msq(false),
            OpCode::MRSq => self.msq(true),
            OpCode::MPow => self.mpow(false),
            OpCode::MRPow => self.mpow(true),
            OpCode::MInc => self.mstep(1),
            OpCode::MDec => self.mstep(-1),
            OpCode::MToInt => self.mcast(Cast::Trunc),
            OpCode::MToIntr => self.mcast(Cast::Round),
            OpCode::MToReal => self.mcast(Cast::Real),
            OpCode::MToBits => self.mcast(Cast::Bits),
            OpCode::MVector(m) => self.mvector(m),
            OpCode::MVExtreme(e) => self.mvextreme(e),
            OpCode::MSort { raw, reverse } => self.msort(raw, reverse, ctx),
            OpCode::MReverse => self.mreverse(),

            // ═══════════════════════════════════════════════════════════
            // Heaps
            // ═══════════════════════════════════════════════════════════
            OpCode::MHeapInit => self.mheapinit(),
            OpCode::MHeapify(p) => self.mheapify(p, ctx),
            OpCode::MHeapPush(p) => self.mheappush(p, ctx),
            OpCode::MHeapWrite(p) => self.mheapwrite(p, op.nargs(), ctx),
            OpCode::MHeapSift(p) => self.mheapsift(p, ctx),
            OpCode::MCull => self.mcull(ctx, false),
            OpCode::MCullIf => self.mcull(ctx, true),

            // ═══════════════════════════════════════════════════════════
            // Context
            // ═══════════════════════════════════════════════════════════
            OpCode::Vertex(role, field) => self.vertex_field(role, field, ctx),
            OpCode::Arc(side, field) => {
                let pred = match side {
                    ArcSide::Arrive => ctx.arrive,
                    ArcSide::Exit => ctx.exit,
                };
                self.stack.push(Self::arc_field(pred, field));
            }
            OpCode::Property(role) => self.property(role, op.nargs(), ctx),
            OpCode::Rank => self.rank(op.nargs(), ctx),
            OpCode::Const(c) => self.constant(c, ctx),
            OpCode::RelEnc => self.relenc(ctx),
            OpCode::RelDec => self.reldec(ctx),
            OpCode::TypeEnc => self.typeenc(ctx),
            OpCode::TypeDec => self.typedec(ctx),
            OpCode::Random => {
                let r = self.rand63() as f64 / i64::MAX as f64;
                self.stack.push(StackItem::Real(r));
            }
            OpCode::RandomBits => {
                let r = self.rand64();
                self.stack.push(StackItem::Bitvector(r));
            }
            OpCode::RandInt => self.randint(),

            // ═══════════════════════════════════════════════════════════
            // Decay and Arc Groups
            // ═══════════════════════════════════════════════════════════
            OpCode::ExpDecay => self.decay_formula(true),
            OpCode::LinDecay => self.decay_formula(false),
            OpCode::ArcDecay(kind) => self.arc_decay(kind, pc, op.nargs(), ctx),
            OpCode::HasRel => self.group_bits(pc, op.nargs(), ctx, GroupFilter::Rel),
            OpCode::HasMod => self.group_bits(pc, op.nargs(), ctx, GroupFilter::Mod),
            OpCode::HasRelMod => self.group_bits(pc, op.nargs(), ctx, GroupFilter::RelMod),
            OpCode::ArcValue => self.group_value(pc, ctx),

            // ═══════════════════════════════════════════════════════════
            // Collector
            // ═══════════════════════════════════════════════════════════
            OpCode::Stage => self.stage(op.nargs(), ctx, false),
            OpCode::StageIf => self.stage(op.nargs(), ctx, true),
            OpCode::Unstage => self.slot_verb(op.nargs(), ctx, SlotVerb::Unstage, false),
            OpCode::UnstageIf => self.slot_verb(op.nargs(), ctx, SlotVerb::Unstage, true),
            OpCode::Commit => self.slot_verb(op.nargs(), ctx, SlotVerb::Commit, false),
            OpCode::CommitIf => self.slot_verb(op.nargs(), ctx, SlotVerb::Commit, true),
            OpCode::Collect => self.collect(op.nargs(), ctx, false),
            OpCode::CollectIf => self.collect(op.nargs(), ctx, true),
            OpCode::CollectableReal => {
                let floor = Self::sort_floor(ctx);
                self.stack.push(StackItem::Real(f64::from_bits(floor)));
            }
            OpCode::CollectableInt => {
                let floor = Self::sort_floor(ctx);
                self.stack.push(StackItem::Integer(floor as i64));
            }
        }
        Flow::Next
    }

    // ═══════════════════════════════════════════════════════════════════
    // Shared Helpers
    // ═══════════════════════════════════════════════════════════════════

    #[inline]
    pub(super) fn set_top(&mut self, item: StackItem) {
        *self.stack.top_mut() = item;
    }

    /// Pop an address operand, dereferencing it once for indirect addressing.
    #[inline]
    pub(super) fn pop_address(&mut self, addr: Addr) -> i64 {
        let idx = self.stack.pop().raw_integer();
        self.resolve(idx, addr)
    }

    #[inline]
    pub(super) fn resolve(&self, idx: i64, addr: Addr) -> i64 {
        match addr {
            Addr::Direct => idx,
            Addr::Indirect => self.memory.deref(idx),
        }
    }

    #[inline]
    fn target(op: Op) -> usize {
        op.nargs()
    }

    /// xorshift64*
    #[inline]
    pub(super) fn rand64(&mut self) -> u64 {
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    #[inline]
    pub(super) fn rand63(&mut self) -> i64 {
        (self.rand64() >> 1) as i64
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("ops", &self.program.len())
            .field("stack", &self.stack)
            .field("memory", &self.memory)
            .field("cull", &self.cull.capacity())
            .finish()
    }
}

/// Lookup flavour of `mcontains`, `mcount` and `mindex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Search {
    Contains,
    Count,
    Index,
}

/// Conversion applied by `mint`, `mintr`, `mreal` and `mbits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Cast {
    Trunc,
    Round,
    Real,
    Bits,
}

/// Which predicator attributes an arc-group bit filter tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum GroupFilter {
    Rel,
    Mod,
    RelMod,
}

/// Collector verbs addressed by staging slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SlotVerb {
    Unstage,
    Commit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TimingBudget;
    use crate::vm::opcode::OpArg;

    fn run(program: Program) -> Evaluation {
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        vm.evaluate(&mut EvalContext::detached())
    }

    fn int(i: i64) -> Op {
        Op::push(OpArg::Int(i))
    }

    #[test]
    fn test_arithmetic_program() {
        let program = Program::builder()
            .op(int(3))
            .op(int(4))
            .op(Op::bare(OpCode::Add))
            .op(int(2))
            .op(Op::bare(OpCode::Mul));
        let result = run(program);
        assert_eq!(result.value, StackItem::Integer(14));
        assert_eq!(result.status, ExitStatus::Completed);
        assert_eq!(result.ops, 5);
    }

    #[test]
    fn test_bind_rejects_deep_program() {
        let config = EvalConfig { stack_capacity: 3, ..EvalConfig::default() };
        let program = Program::new(vec![int(1); 4]);
        let err = Evaluator::new(program, config).unwrap_err();
        assert!(matches!(err, EvalError::StackOverflow { depth: 4, capacity: 3 }));
    }

    #[test]
    fn test_bind_rejects_large_cull() {
        let config = EvalConfig { max_cull: 8, ..EvalConfig::default() };
        let err = Evaluator::new(Program::new(vec![int(1)]).with_cull(9), config).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_return_skips_passthru() {
        let program = Program::builder()
            .op(int(1))
            .op(Op::bare(OpCode::Return))
            .op(int(99))
            .with_passthru(1);
        let result = run(program);
        assert_eq!(result.value, StackItem::Integer(1));
        assert_eq!(result.status, ExitStatus::Returned);

        let program = Program::builder().op(int(1)).op(int(99)).with_passthru(1);
        assert_eq!(run(program).value, StackItem::Integer(99));
    }

    #[test]
    fn test_halt_stops_loop() {
        let budget = TimingBudget::new();
        let program = Program::builder().op(Op::bare(OpCode::Halt)).op(int(7));
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        let mut ctx = EvalContext::detached().with_budget(&budget);
        let result = vm.evaluate(&mut ctx);
        assert_eq!(result.status, ExitStatus::Halted);
        assert_eq!(result.value, StackItem::ONE);
        assert!(budget.is_halted());

        let result = vm.evaluate(&mut EvalContext::detached());
        assert_eq!(result.value, StackItem::Integer(7));
    }

    #[test]
    fn test_op_limit() {
        let program = Program::new(vec![int(1), int(2), int(3)]).with_limit(2);
        let result = run(program);
        assert_eq!(result.status, ExitStatus::Limited);
        assert_eq!(result.value, StackItem::Integer(2));
    }

    #[test]
    fn test_string_result_survives_scope_release() {
        let mut program = Program::builder();
        let a = program.string("ab");
        let b = program.string("cd");
        let program = program.op(Op::push(a)).op(Op::push(b)).op(Op::bare(OpCode::Add));
        let mut vm = Evaluator::new(program, EvalConfig::default()).unwrap();
        let result = vm.evaluate(&mut EvalContext::detached());
        assert_eq!(result.text.as_deref(), Some("abcd"));
        assert_eq!(vm.objects().scoped_count(), 0);
    }

    #[test]
    fn test_random_is_seeded() {
        let program = Program::new(vec![Op::bare(OpCode::RandomBits)]);
        let mut a = Evaluator::new(program.clone(), EvalConfig::default()).unwrap();
        let mut b = Evaluator::new(program, EvalConfig::default()).unwrap();
        let ra = a.evaluate(&mut EvalContext::detached()).value;
        assert_eq!(ra, b.evaluate(&mut EvalContext::detached()).value);
        assert_ne!(ra, a.evaluate(&mut EvalContext::detached()).value);
    }
}
