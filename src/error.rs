use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScriptError>;

/// Result of an executed instruction; the error carries the failing PC.
pub type RuntimeResult<T> = std::result::Result<T, ScriptRuntimeError>;

/// Faults raised by the call stack: operand underflow, invalid local
/// addressing, and frame-discipline violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackBreakError {
    #[error("operand stack underflow")]
    Underflow,
    #[error("local index {0} out of range")]
    InvalidLocal(i32),
    #[error("operand region not empty on return ({0} values left)")]
    NonEmptyFrame(usize),
    #[error("saved frame record is missing or corrupt")]
    BadFrame,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unexpected end of stream at offset {0:#x}")]
    EndOfStream(u32),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    StackBreak(#[from] StackBreakError),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("global {0} read before initialization")]
    UninitializedGlobal(u16),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("syscall name already registered: {0}")]
    DuplicateName(String),
    #[error("syscall {name} failed")]
    Syscall {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// An execution-time fault annotated with the address of the opcode that
/// raised it. Parser-level errors propagate as plain [`ScriptError`]s; once
/// the dispatcher is running, every fault is wrapped into this.
#[derive(Debug, Error)]
#[error("script fault at pc={pc:#x}: {source}")]
pub struct ScriptRuntimeError {
    pub pc: u32,
    #[source]
    pub source: ScriptError,
}
