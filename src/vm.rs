/// The machine addresses 64KB of memory, shared by code and data.
pub const MEMORY_SIZE: usize = 0x10000;

/// Transferring control to this address halts the machine. There is no
/// dedicated halt instruction.
pub const HALT: u16 = u16::MAX;

/// One instruction is four big-endian 16-bit address fields.
const INSTRUCTION_BYTES: u16 = 8;

/// Represents complete machine state during runtime.
///
/// The only instruction is SBNZ: subtract the cell at B from the cell at A,
/// store the result at C, and branch to D if the result is nonzero. A, B and
/// C are dereferenced; D is used directly as the next program counter.
pub struct Computer {
    /// System memory - 64KB in size.
    mem: Box<[u8; MEMORY_SIZE]>,
    /// Program counter
    pc: u16,
}

impl Computer {
    pub fn new() -> Self {
        Computer {
            mem: Box::new([0; MEMORY_SIZE]),
            pc: 0,
        }
    }

    /// Copy a flat binary image into memory starting at address 0.
    ///
    /// Bytes past the end of the image keep their prior value. An image
    /// longer than memory is truncated.
    pub fn load_memory(&mut self, image: &[u8]) {
        let len = image.len().min(MEMORY_SIZE);
        self.mem[..len].copy_from_slice(&image[..len]);
    }

    /// The machine is halted once the program counter reaches [`HALT`].
    pub fn halted(&self) -> bool {
        self.pc == HALT
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// Read the 16-bit cell at `addr` for inspection.
    pub fn peek(&self, addr: u16) -> i16 {
        self.fetch_operand(addr)
    }

    /// Overwrite the 16-bit cell at `addr`.
    pub fn poke(&mut self, addr: u16, value: i16) {
        self.put_operand(addr, value);
    }

    /// Execute one instruction. Does nothing if the machine is halted.
    ///
    /// Subtraction wraps on overflow; that is defined behavior, not a fault.
    /// No operation here can fail: every 16-bit address is in bounds by
    /// construction.
    pub fn step(&mut self) {
        if self.halted() {
            return;
        }
        let a = self.fetch_operand(self.fetch_address(self.pc));
        let b = self.fetch_operand(self.fetch_address(self.pc.wrapping_add(2)));
        let r = a.wrapping_sub(b);
        let dest = self.fetch_address(self.pc.wrapping_add(4));
        self.put_operand(dest, r);
        if r != 0 {
            self.pc = self.fetch_address(self.pc.wrapping_add(6));
        } else {
            self.pc = self.pc.wrapping_add(INSTRUCTION_BYTES);
        }
    }

    /// Drive the step loop for at most `max_steps` instructions, returning
    /// whether the machine halted within the budget.
    ///
    /// Non-terminating programs are not detected; the budget is the only
    /// bound. `step` remains the primitive for callers that need finer
    /// control.
    pub fn run(&mut self, max_steps: usize) -> bool {
        for _ in 0..max_steps {
            if self.halted() {
                return true;
            }
            self.step();
        }
        self.halted()
    }

    #[inline]
    fn byte(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    #[inline]
    fn fetch_address(&self, p: u16) -> u16 {
        u16::from_be_bytes([self.byte(p), self.byte(p.wrapping_add(1))])
    }

    #[inline]
    fn fetch_operand(&self, p: u16) -> i16 {
        i16::from_be_bytes([self.byte(p), self.byte(p.wrapping_add(1))])
    }

    #[inline]
    fn put_operand(&mut self, p: u16, value: i16) {
        let [hi, lo] = value.to_be_bytes();
        self.mem[p as usize] = hi;
        self.mem[p.wrapping_add(1) as usize] = lo;
    }
}

impl Default for Computer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Encode one instruction as its four big-endian fields.
    fn instr(a: u16, b: u16, c: u16, d: u16) -> Vec<u8> {
        [a, b, c, d].iter().flat_map(|f| f.to_be_bytes()).collect()
    }

    // One instruction at address 0 with two operand cells at 8 and 10,
    // destination cell at 12.
    fn image(x: i16, y: i16, d: u16) -> Vec<u8> {
        let mut img = instr(8, 10, 12, d);
        img.extend(x.to_be_bytes());
        img.extend(y.to_be_bytes());
        img.extend([0, 0]);
        img
    }

    #[test]
    fn starts_at_pc_zero() {
        let c = Computer::new();
        assert_eq!(c.pc(), 0);
        assert!(!c.halted());
    }

    #[test]
    fn step_branches_on_nonzero() {
        let mut c = Computer::new();
        c.load_memory(&image(5, 2, 42));
        c.step();
        assert_eq!(c.peek(12), 3);
        assert_eq!(c.pc(), 42);
    }

    #[test]
    fn step_falls_through_on_zero() {
        let mut c = Computer::new();
        c.load_memory(&image(5, 5, 42));
        c.step();
        assert_eq!(c.peek(12), 0);
        assert_eq!(c.pc(), 8);
    }

    #[test]
    fn step_subtraction_wraps() {
        let mut c = Computer::new();
        c.load_memory(&image(i16::MIN, 1, 42));
        c.step();
        assert_eq!(c.peek(12), i16::MAX);
        assert_eq!(c.pc(), 42);
    }

    #[test]
    fn step_destination_aliases_operand() {
        // C == A: the write must land after both operands are read.
        let mut c = Computer::new();
        c.load_memory(&instr(8, 10, 8, 42));
        c.poke(8, 5);
        c.poke(10, 2);
        c.step();
        assert_eq!(c.peek(8), 3);
        assert_eq!(c.peek(10), 2);
        assert_eq!(c.pc(), 42);
    }

    #[test]
    fn step_destination_aliases_both_operands() {
        // A == B == C always stores zero and falls through.
        let mut c = Computer::new();
        c.load_memory(&instr(8, 8, 8, 42));
        c.poke(8, 7);
        c.step();
        assert_eq!(c.peek(8), 0);
        assert_eq!(c.pc(), 8);
    }

    #[test]
    fn halt_freezes_machine() {
        let mut c = Computer::new();
        // 1 - 0 = 1, branch to HALT
        c.load_memory(&image(1, 0, HALT));
        c.step();
        assert!(c.halted());
        let before = (c.peek(8), c.peek(10), c.peek(12), c.pc());
        c.step();
        c.step();
        assert_eq!((c.peek(8), c.peek(10), c.peek(12), c.pc()), before);
    }

    #[test]
    fn run_halts_within_budget() {
        let mut c = Computer::new();
        c.load_memory(&image(1, 0, HALT));
        assert!(c.run(10));
        assert!(c.halted());
        // Already halted: the budget is untouched.
        assert!(c.run(0));
    }

    #[test]
    fn run_exhausts_budget_on_non_terminating_program() {
        // 5 - 2 is nonzero, so this instruction branches back to itself.
        let mut c = Computer::new();
        c.load_memory(&image(5, 2, 0));
        assert!(!c.run(100));
        assert!(!c.halted());
    }

    #[test]
    fn load_memory_keeps_remaining_bytes() {
        let mut c = Computer::new();
        c.poke(100, 0x1234);
        c.load_memory(&[0xAB, 0xCD]);
        assert_eq!(c.peek(0), 0xABCDu16 as i16);
        assert_eq!(c.peek(100), 0x1234);
    }
}
