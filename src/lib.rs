//! hcb-vm
//!
//! A small, self-contained parser + bytecode VM for the FVP `.hcb` script
//! format: header/metadata parsing, an ahead-of-time instruction decoder for
//! listings, and a stack machine that calls back into host-provided syscalls.
//!
//! The crate is engine-agnostic. Everything observable outside the VM
//! (rendering, audio, input, persistence) goes through the [`syscall`]
//! boundary; hosts register their services on a [`SyscallResolver`] and drive
//! a [`ScriptContext`] until it halts.

pub mod context;
pub mod error;
pub mod inst;
pub mod nls;
pub mod opcode;
pub mod parser;
pub mod reader;
pub mod stack;
pub mod syscall;
pub mod variant;

pub use context::{ScriptContext, StepOutcome};
pub use error::{Result, RuntimeResult, ScriptError, ScriptRuntimeError, StackBreakError};
pub use inst::{Instruction, Operand};
pub use nls::Nls;
pub use opcode::Opcode;
pub use parser::{ScriptMetadata, SyscallDesc};
pub use reader::Reader;
pub use stack::{CallStack, StackFrame};
pub use syscall::{SyscallExport, SyscallModule, SyscallResolver, Syscaller};
pub use variant::Variant;
