// Assembling
mod asm;
pub use asm::{Assembler, Operand};
mod symbol;
pub use symbol::Label;

// Running
mod vm;
pub use vm::{Computer, HALT, MEMORY_SIZE};

mod error;
