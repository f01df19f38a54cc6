use miette::Result;

use crate::error;
use crate::symbol::{Label, SymbolTable};
use crate::vm::{HALT, MEMORY_SIZE};

/// Initial stack pointer: the topmost 16-bit cell. The stack grows downward
/// by one cell per push.
const STACK_TOP: u16 = 0xFFFE;

/// An instruction operand: either a literal address or a symbolic one
/// resolved at finalization.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Addr(u16),
    Label(Label),
}

impl From<u16> for Operand {
    fn from(value: u16) -> Self {
        Operand::Addr(value)
    }
}

impl From<Label> for Operand {
    fn from(value: Label) -> Self {
        Operand::Label(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Label(Label::new(value))
    }
}

/// Addresses of the reserved cells and shared subroutine bodies emitted by
/// the preamble. Established once per assembler instance.
#[derive(Default)]
struct SupportBlock {
    /// Cell permanently holding 0; subtracting it copies a value.
    zero: u16,
    /// Cell permanently holding 1; `1 - 0` drives unconditional jumps.
    one: u16,
    /// Scratch cell for results nothing reads back.
    junk: u16,
    /// Stack pointer cell.
    sp: u16,
    /// One-slot staging cell passing values in and out of the stack bodies.
    staging: u16,
    /// Entry of the shared push subroutine body.
    push_entry: u16,
    /// D field of the push body's return jump, patched by each call site.
    push_ret: u16,
    /// Entry of the shared pop subroutine body.
    pop_entry: u16,
    /// D field of the pop body's return jump, patched by each call site.
    pop_ret: u16,
}

/// In-memory assembler for the SBNZ machine.
///
/// Client code emits macros and data directives in program order, then calls
/// [`assemble`](Assembler::assemble) to patch forward references and obtain
/// the flat image. Construction emits a fixed preamble: an entry jump over
/// the reserved cells and the shared push/pop subroutine bodies.
pub struct Assembler {
    /// Emission buffer; the cursor is its length.
    image: Vec<u8>,
    symbols: SymbolTable,
    support: SupportBlock,
}

impl Assembler {
    pub fn new() -> Self {
        let mut asm = Assembler {
            image: Vec::new(),
            symbols: SymbolTable::new(),
            support: SupportBlock::default(),
        };
        asm.emit_preamble();
        asm
    }

    fn cursor(&self) -> u16 {
        self.image.len() as u16
    }

    /// Bind `label` to the current emission cursor.
    ///
    /// Redefining a label or using a `__`-prefixed name is an error; both
    /// would silently corrupt branch targets otherwise.
    pub fn define_label(&mut self, label: impl Into<Label>) -> Result<()> {
        let label = label.into();
        if label.is_reserved() {
            return Err(error::reserved_label(&label));
        }
        if let Some(previous) = self.symbols.lookup(&label) {
            return Err(error::duplicate_label(&label, previous));
        }
        let addr = self.cursor();
        self.symbols.bind(label, addr);
        Ok(())
    }

    /// Address bound to `label`, if it has been defined.
    ///
    /// Addresses are 16 bits: labels defined after emission has passed the
    /// 64KB bound report a wrapped address here, and `assemble` rejects any
    /// such program outright.
    pub fn address_of(&self, label: impl Into<Label>) -> Option<u16> {
        self.symbols.lookup(&label.into())
    }

    /// Patch all recorded forward references and return the final image,
    /// truncated to the emission cursor. Consumes the assembler; the symbol
    /// table is not reusable afterwards.
    pub fn assemble(mut self) -> Result<Vec<u8>> {
        if self.image.len() > MEMORY_SIZE {
            return Err(error::image_too_large(self.image.len()));
        }
        for (label, sites) in self.symbols.take_pending() {
            let addr = self
                .symbols
                .lookup(&label)
                .ok_or_else(|| error::undefined_label(&label, sites.len()))?;
            let [hi, lo] = addr.to_be_bytes();
            for site in sites {
                self.image[site] = hi;
                self.image[site + 1] = lo;
            }
        }
        Ok(self.image)
    }

    ////////////////////////////////////////////////////////////////////////
    // Directives

    /// Emit literal bytes at the cursor.
    pub fn db(&mut self, bytes: &[u8]) {
        self.image.extend_from_slice(bytes);
    }

    /// Emit literal 16-bit words at the cursor, big-endian.
    pub fn dd(&mut self, words: &[u16]) {
        for word in words {
            self.image.extend_from_slice(&word.to_be_bytes());
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // The primitive

    /// Emit one SBNZ instruction: `[c] = [a] - [b]`, branch to `d` if the
    /// result is nonzero, else fall through.
    pub fn sbnz(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        c: impl Into<Operand>,
        d: impl Into<Operand>,
    ) {
        for field in [a.into(), b.into(), c.into(), d.into()] {
            self.emit_operand(field);
        }
    }

    fn emit_operand(&mut self, operand: Operand) {
        let addr = match operand {
            Operand::Addr(addr) => addr,
            // An unbound label emits the halt sentinel as a placeholder,
            // overwritten when the reference is patched.
            Operand::Label(label) => self
                .symbols
                .resolve(&label, self.image.len())
                .unwrap_or(HALT),
        };
        self.image.extend_from_slice(&addr.to_be_bytes());
    }

    fn define_internal(&mut self, label: Label) {
        let addr = self.cursor();
        let previous = self.symbols.bind(label, addr);
        debug_assert!(previous.is_none());
    }

    ////////////////////////////////////////////////////////////////////////
    // Macro instructions. Each internal branch target is a fresh unique
    // label, so expansions nest without offset bookkeeping.

    /// Copy the cell at `src` into `dst`.
    pub fn mov(&mut self, src: impl Into<Operand>, dst: impl Into<Operand>) {
        // Subtracting the zero cell copies the value. The result is usually
        // nonzero, so the branch target must be the next instruction.
        let next = self.symbols.uniq_label();
        self.sbnz(src, self.support.zero, dst, next.clone());
        self.define_internal(next);
    }

    /// Unconditional jump: `1 - 0` is always nonzero.
    pub fn jmp(&mut self, target: impl Into<Operand>) {
        self.sbnz(self.support.one, self.support.zero, self.support.junk, target);
    }

    /// Halt by jumping to the halt sentinel address.
    pub fn hlt(&mut self) {
        self.jmp(HALT);
    }

    /// Branch to `target` iff the cells at `a` and `b` are equal.
    pub fn beq(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        target: impl Into<Operand>,
    ) {
        // Unequal operands skip over the jump; equal ones fall into it.
        let skip = self.symbols.uniq_label();
        self.sbnz(a, b, self.support.junk, skip.clone());
        self.jmp(target);
        self.define_internal(skip);
    }

    /// `dst = -src`.
    pub fn neg(&mut self, src: impl Into<Operand>, dst: impl Into<Operand>) {
        let next = self.symbols.uniq_label();
        self.sbnz(self.support.zero, src, dst, next.clone());
        self.define_internal(next);
    }

    /// `dst = a + b`, via `a - (-b)`.
    pub fn add(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        dst: impl Into<Operand>,
    ) {
        self.neg(b, self.support.junk);
        let next = self.symbols.uniq_label();
        self.sbnz(a, self.support.junk, dst, next.clone());
        self.define_internal(next);
    }

    /// `dst = a - b`.
    pub fn sub(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        dst: impl Into<Operand>,
    ) {
        let next = self.symbols.uniq_label();
        self.sbnz(a, b, dst, next.clone());
        self.define_internal(next);
    }

    /// Increment the cell at `cell` by one.
    pub fn inc(&mut self, cell: impl Into<Operand>) {
        let cell = cell.into();
        self.add(cell.clone(), self.support.one, cell);
    }

    /// Decrement the cell at `cell` by one.
    pub fn dec(&mut self, cell: impl Into<Operand>) {
        let cell = cell.into();
        let next = self.symbols.uniq_label();
        self.sbnz(cell.clone(), self.support.one, cell, next.clone());
        self.define_internal(next);
    }

    /// Bitwise complement: `dst = ~src`, via `~x == -(x + 1)`.
    pub fn not(&mut self, src: impl Into<Operand>, dst: impl Into<Operand>) {
        let dst = dst.into();
        self.add(src, self.support.one, dst.clone());
        self.neg(dst.clone(), dst);
    }

    /// Does nothing for one instruction: `junk - junk` is always zero.
    pub fn nop(&mut self) {
        let next = self.symbols.uniq_label();
        self.sbnz(self.support.junk, self.support.junk, self.support.junk, next.clone());
        self.define_internal(next);
    }

    ////////////////////////////////////////////////////////////////////////
    // Stack protocol. Push and pop share one subroutine body each, entered
    // by patching the body's return jump with the call site's address.
    // There is exactly one return cell per body, so the protocol is not
    // reentrant: a push (or pop) must complete before the next one starts.

    /// Push the cell at `src` onto the stack.
    pub fn push(&mut self, src: impl Into<Operand>) {
        let ra = self.symbols.uniq_label();
        let ret = self.symbols.uniq_label();
        self.mov(src, self.support.staging);
        // Patch the shared return cell, then enter the body.
        self.mov(ra.clone(), self.support.push_ret);
        self.jmp(self.support.push_entry);
        // Inline word holding the return address; never executed, the body
        // jumps back past it.
        self.define_internal(ra);
        self.emit_operand(Operand::Label(ret.clone()));
        self.define_internal(ret);
    }

    /// Pop the top of the stack into the cell at `dst`.
    pub fn pop(&mut self, dst: impl Into<Operand>) {
        let ra = self.symbols.uniq_label();
        let ret = self.symbols.uniq_label();
        self.mov(ra.clone(), self.support.pop_ret);
        self.jmp(self.support.pop_entry);
        self.define_internal(ra);
        self.emit_operand(Operand::Label(ret.clone()));
        self.define_internal(ret);
        self.mov(self.support.staging, dst);
    }

    ////////////////////////////////////////////////////////////////////////
    // Preamble

    fn emit_preamble(&mut self) {
        // The reserved cells land directly behind the entry jump, so their
        // addresses are known before they are emitted.
        let cells = self.cursor().wrapping_add(8);
        self.support.zero = cells;
        self.support.one = cells + 2;
        self.support.junk = cells + 4;
        self.support.sp = cells + 6;
        self.support.staging = cells + 8;

        let start = self.symbols.uniq_label();
        self.sbnz(
            self.support.one,
            self.support.zero,
            self.support.junk,
            start.clone(),
        );
        self.dd(&[0, 1, 0]);
        self.dd(&[STACK_TOP]);
        self.dd(&[0]);
        self.emit_push_body();
        self.emit_pop_body();
        self.define_internal(start);
    }

    fn emit_push_body(&mut self) {
        self.support.push_entry = self.cursor();
        // Patch the C field of the store below with the stack pointer.
        let store_c = self.cursor() + 12;
        self.mov(self.support.sp, store_c);
        // Store the staged value at the top of the stack. The C field is
        // rewritten at run time before this executes; junk is a benign
        // initial value.
        let next = self.symbols.uniq_label();
        self.sbnz(
            self.support.staging,
            self.support.zero,
            self.support.junk,
            next.clone(),
        );
        self.define_internal(next);
        // One cell is two bytes.
        self.dec(self.support.sp);
        self.dec(self.support.sp);
        // Return jump; every call site rewrites the D field before entry.
        // Unpatched, it halts.
        self.support.push_ret = self.cursor() + 6;
        self.sbnz(self.support.one, self.support.zero, self.support.junk, HALT);
    }

    fn emit_pop_body(&mut self) {
        self.support.pop_entry = self.cursor();
        // The stack pointer names the first free cell; step back to the
        // live top before reading.
        self.inc(self.support.sp);
        self.inc(self.support.sp);
        // Patch the A field of the load below with the stack pointer.
        let load_a = self.cursor() + 8;
        self.mov(self.support.sp, load_a);
        let next = self.symbols.uniq_label();
        self.sbnz(
            self.support.junk,
            self.support.zero,
            self.support.staging,
            next.clone(),
        );
        self.define_internal(next);
        self.support.pop_ret = self.cursor() + 6;
        self.sbnz(self.support.one, self.support.zero, self.support.junk, HALT);
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}
