use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, RuntimeResult, ScriptError, ScriptRuntimeError};
use crate::opcode::Opcode;
use crate::parser::ScriptMetadata;
use crate::reader::Reader;
use crate::stack::CallStack;
use crate::syscall::SyscallResolver;
use crate::variant::{vm_add, vm_cmp, vm_div, vm_mod, vm_mul, vm_neg, vm_sub, Variant};

/// Outcome of one dispatched instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// The root frame returned; the context is finished.
    Halt,
}

/// The executing VM: program counter, call stack, global variables and the
/// return-value register, driven over one script image.
///
/// A context is strictly single-threaded. The driver calls [`step`] (or the
/// [`run`]/[`run_for`] wrappers) until the root frame returns or a fault
/// surfaces as [`ScriptRuntimeError`].
///
/// [`step`]: ScriptContext::step
/// [`run`]: ScriptContext::run
/// [`run_for`]: ScriptContext::run_for
pub struct ScriptContext {
    reader: Reader,
    meta: Arc<ScriptMetadata>,
    stack: CallStack,
    globals: Vec<Option<Variant>>,
    return_value: Option<Variant>,
    halted: bool,
}

impl ScriptContext {
    /// The reader must cover the same image the metadata was parsed from;
    /// execution starts at the entry point, which must hold `initstack`.
    pub fn new(mut reader: Reader, meta: Arc<ScriptMetadata>) -> Self {
        reader.seek_to(meta.entry_point());
        let globals = vec![None; meta.global_count() as usize];
        Self {
            reader,
            meta,
            stack: CallStack::new(),
            globals,
            return_value: None,
            halted: false,
        }
    }

    #[inline]
    pub fn pc(&self) -> u32 {
        self.reader.position()
    }

    #[inline]
    pub fn halted(&self) -> bool {
        self.halted
    }

    #[inline]
    pub fn metadata(&self) -> &ScriptMetadata {
        &self.meta
    }

    #[inline]
    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    /// The most recent syscall or function result, until `push_return`
    /// consumes it.
    #[inline]
    pub fn return_value(&self) -> Option<&Variant> {
        self.return_value.as_ref()
    }

    pub fn global(&self, id: u16) -> Option<&Variant> {
        self.globals.get(id as usize).and_then(|slot| slot.as_ref())
    }

    /// Execute until the root frame returns or a fault occurs.
    pub fn run(&mut self, syscalls: &SyscallResolver) -> RuntimeResult<()> {
        while !self.halted {
            self.step(syscalls)?;
        }
        Ok(())
    }

    /// Execute at most `budget` instructions; returns how many ran. Lets an
    /// outer loop bound the time spent in script per slice.
    pub fn run_for(&mut self, syscalls: &SyscallResolver, budget: usize) -> RuntimeResult<usize> {
        let mut steps = 0;
        while steps < budget && !self.halted {
            self.step(syscalls)?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Fetch, decode and execute one instruction. Faults carry the address
    /// of the opcode byte that raised them.
    pub fn step(&mut self, syscalls: &SyscallResolver) -> RuntimeResult<StepOutcome> {
        if self.halted {
            return Ok(StepOutcome::Halt);
        }
        let pc = self.reader.position();
        self.dispatch(pc, syscalls)
            .map_err(|source| ScriptRuntimeError { pc, source })
    }

    fn dispatch(&mut self, pc: u32, syscalls: &SyscallResolver) -> Result<StepOutcome> {
        let op = self.reader.read_u8()?;
        let Some(opcode) = Opcode::from_u8(op) else {
            return Err(ScriptError::NotImplemented(format!("opcode {:#04x}", op)));
        };

        match opcode {
            Opcode::Nop => Ok(StepOutcome::Continue),
            Opcode::InitStack => self.op_init_stack(pc),
            Opcode::Call => self.op_call(),
            Opcode::Syscall => self.op_syscall(syscalls),
            Opcode::Ret => self.op_ret(),
            Opcode::RetV => self.op_retv(),
            Opcode::Jmp => self.op_jmp(),
            Opcode::Jz => self.op_jz(),
            Opcode::PushNil => self.op_push(Variant::Nil),
            Opcode::PushTrue => self.op_push(Variant::Bool(true)),
            Opcode::PushI32 => {
                let v = self.reader.read_i32()?;
                self.op_push(Variant::Int(v))
            }
            Opcode::PushI16 => {
                let v = self.reader.read_i16()?;
                self.op_push(Variant::Int(v as i32))
            }
            Opcode::PushI8 => {
                let v = self.reader.read_i8()?;
                self.op_push(Variant::Int(v as i32))
            }
            Opcode::PushF32 => {
                let v = self.reader.read_f32()?;
                self.op_push(Variant::Float(v))
            }
            Opcode::PushString => {
                let s = self.reader.read_string()?;
                self.op_push(Variant::String(s))
            }
            Opcode::PushGlobal => self.op_push_global(),
            Opcode::PushLocal => self.op_push_local(),
            Opcode::PushGlobalTable => self.op_push_global_table(),
            Opcode::PushLocalTable => self.op_push_local_table(),
            Opcode::PushTop => self.op_push_top(),
            Opcode::PushReturn => self.op_push_return(),
            Opcode::PopGlobal => self.op_pop_global(),
            Opcode::PopLocal => self.op_pop_local(),
            Opcode::PopGlobalTable => self.op_pop_global_table(),
            Opcode::PopLocalTable => self.op_pop_local_table(),
            Opcode::Neg => {
                let v = self.stack.pop()?;
                self.op_push(vm_neg(v)?)
            }
            Opcode::Add => self.op_binary(vm_add),
            Opcode::Sub => self.op_binary(vm_sub),
            Opcode::Mul => self.op_binary(vm_mul),
            Opcode::Div => self.op_binary(vm_div),
            Opcode::Mod => self.op_binary(vm_mod),
            Opcode::BitTest => self.op_bittest(),
            Opcode::And => self.op_and(),
            Opcode::Or => self.op_or(),
            Opcode::SetEq => self.op_set_eq(false),
            Opcode::SetNe => self.op_set_eq(true),
            Opcode::SetGt => self.op_compare(|ord| ord == std::cmp::Ordering::Greater),
            Opcode::SetLe => self.op_compare(|ord| ord != std::cmp::Ordering::Greater),
            Opcode::SetLt => self.op_compare(|ord| ord == std::cmp::Ordering::Less),
            Opcode::SetGe => self.op_compare(|ord| ord != std::cmp::Ordering::Less),
        }
    }

    /// Seat the root frame. Only the entry point may carry a bare
    /// `initstack`; every other routine's header is consumed by `call`.
    fn op_init_stack(&mut self, pc: u32) -> Result<StepOutcome> {
        let arg_count = self.reader.read_u8()?;
        let local_count = self.reader.read_u8()?;

        if self.stack.depth() != 0 {
            return Err(ScriptError::InvalidData(
                "initstack outside a function entry".into(),
            ));
        }
        if pc != self.meta.entry_point() {
            return Err(ScriptError::InvalidData(format!(
                "initstack at {:#x} is not the entry point",
                pc
            )));
        }

        log::trace!("initstack: args {} locals {}", arg_count, local_count);
        self.stack.push_call(0, arg_count, local_count);
        Ok(StepOutcome::Continue)
    }

    /// Jump into a routine. The callee's `initstack` header is read here so
    /// the frame is seated with the declared argument and local counts.
    fn op_call(&mut self) -> Result<StepOutcome> {
        let target = self.reader.read_u32()?;
        let return_address = self.reader.position();

        if !self.meta.is_code_area(target) {
            return Err(ScriptError::InvalidData(format!(
                "call target outside the code area: {:#x}",
                target
            )));
        }

        self.reader.seek_to(target);
        let header = self.reader.read_u8()?;
        if Opcode::from_u8(header) != Some(Opcode::InitStack) {
            self.reader.seek_to(target);
            return Err(ScriptError::InvalidData(format!(
                "call target {:#x} does not begin with initstack",
                target
            )));
        }
        let arg_count = self.reader.read_u8()?;
        let local_count = self.reader.read_u8()?;

        log::trace!(
            "call {:#x}: args {} locals {}",
            target,
            arg_count,
            local_count
        );
        self.stack.push_call(return_address, arg_count, local_count);
        Ok(StepOutcome::Continue)
    }

    /// Pop the declared argument count and hand off to the host. The value
    /// on top of the stack lands in the last argument slot.
    fn op_syscall(&mut self, syscalls: &SyscallResolver) -> Result<StepOutcome> {
        let id = self.reader.read_u16()?;
        let Some(desc) = self.meta.get_syscall(id) else {
            return Err(ScriptError::NotImplemented(format!("syscall id {}", id)));
        };
        let name = desc.name.clone();
        let arg_count = desc.arg_count as usize;

        let mut args = Vec::with_capacity(arg_count);
        for _ in 0..arg_count {
            args.push(self.stack.pop()?);
        }
        args.reverse();

        log::debug!("syscall {} {:?}", name, args);
        let ret = syscalls.invoke(&name, &mut args)?;
        self.return_value = Some(ret.unwrap_or(Variant::Nil));
        Ok(StepOutcome::Continue)
    }

    fn op_ret(&mut self) -> Result<StepOutcome> {
        self.return_value = None;
        self.leave_frame()
    }

    fn op_retv(&mut self) -> Result<StepOutcome> {
        let value = self.stack.pop()?;
        log::trace!("retv {}", value);
        self.return_value = Some(value);
        self.leave_frame()
    }

    fn leave_frame(&mut self) -> Result<StepOutcome> {
        let return_address = self.stack.pop_call()?;
        if self.stack.depth() == 0 {
            self.halted = true;
            return Ok(StepOutcome::Halt);
        }
        self.reader.seek_to(return_address);
        Ok(StepOutcome::Continue)
    }

    fn branch_target(&mut self) -> Result<u32> {
        let target = self.reader.read_u32()?;
        if !self.meta.is_code_area(target) {
            return Err(ScriptError::InvalidData(format!(
                "jump target outside the code area: {:#x}",
                target
            )));
        }
        Ok(target)
    }

    fn op_jmp(&mut self) -> Result<StepOutcome> {
        let target = self.branch_target()?;
        self.reader.seek_to(target);
        Ok(StepOutcome::Continue)
    }

    fn op_jz(&mut self) -> Result<StepOutcome> {
        let target = self.branch_target()?;
        let cond = self.stack.pop()?;
        if !cond.truthy() {
            self.reader.seek_to(target);
        }
        Ok(StepOutcome::Continue)
    }

    #[inline]
    fn op_push(&mut self, value: Variant) -> Result<StepOutcome> {
        self.stack.push(value);
        Ok(StepOutcome::Continue)
    }

    fn op_push_global(&mut self) -> Result<StepOutcome> {
        let id = self.reader.read_u16()?;
        let slot = self
            .globals
            .get(id as usize)
            .ok_or_else(|| ScriptError::InvalidData(format!("global id out of range: {}", id)))?;
        let value = slot
            .clone()
            .ok_or(ScriptError::UninitializedGlobal(id))?;
        self.op_push(value)
    }

    fn op_push_local(&mut self) -> Result<StepOutcome> {
        let idx = self.reader.read_i8()?;
        let value = self.stack.get_local(idx as i32)?;
        self.op_push(value)
    }

    fn op_pop_global(&mut self) -> Result<StepOutcome> {
        let id = self.reader.read_u16()?;
        let value = self.stack.pop()?;
        let slot = self
            .globals
            .get_mut(id as usize)
            .ok_or_else(|| ScriptError::InvalidData(format!("global id out of range: {}", id)))?;
        *slot = Some(value);
        Ok(StepOutcome::Continue)
    }

    fn op_pop_local(&mut self) -> Result<StepOutcome> {
        let idx = self.reader.read_i8()?;
        let value = self.stack.pop()?;
        self.stack.set_local(idx as i32, value)?;
        Ok(StepOutcome::Continue)
    }

    fn table_key(value: Variant) -> Result<i32> {
        value.as_int().ok_or_else(|| {
            ScriptError::TypeError(format!("table key must be int, got {}", value.type_name()))
        })
    }

    /// Missing keys, uninitialized globals and non-table values all read as
    /// Nil; scripts probe tables before they exist.
    fn op_push_global_table(&mut self) -> Result<StepOutcome> {
        let id = self.reader.read_u16()?;
        let key = Self::table_key(self.stack.pop()?)?;
        let value = match self.globals.get(id as usize) {
            Some(Some(Variant::Table(table))) => table.get(&key).cloned().unwrap_or(Variant::Nil),
            Some(_) => Variant::Nil,
            None => {
                return Err(ScriptError::InvalidData(format!(
                    "global id out of range: {}",
                    id
                )))
            }
        };
        self.op_push(value)
    }

    fn op_push_local_table(&mut self) -> Result<StepOutcome> {
        let idx = self.reader.read_i8()?;
        let key = Self::table_key(self.stack.pop()?)?;
        let local = self.stack.get_local(idx as i32)?;
        let value = match local.as_table() {
            Some(table) => table.get(&key).cloned().unwrap_or(Variant::Nil),
            None => {
                log::warn!("local {} is not a table", idx);
                Variant::Nil
            }
        };
        self.op_push(value)
    }

    fn op_pop_global_table(&mut self) -> Result<StepOutcome> {
        let id = self.reader.read_u16()?;
        let value = self.stack.pop()?;
        let key = Self::table_key(self.stack.pop()?)?;
        let slot = self
            .globals
            .get_mut(id as usize)
            .ok_or_else(|| ScriptError::InvalidData(format!("global id out of range: {}", id)))?;
        if !matches!(slot, Some(Variant::Table(_))) {
            *slot = Some(Variant::Table(HashMap::new()));
        }
        if let Some(table) = slot.as_mut().and_then(|v| v.as_table_mut()) {
            table.insert(key, value);
        }
        Ok(StepOutcome::Continue)
    }

    fn op_pop_local_table(&mut self) -> Result<StepOutcome> {
        let idx = self.reader.read_i8()?;
        let value = self.stack.pop()?;
        let key = Self::table_key(self.stack.pop()?)?;
        let mut local = self.stack.get_local(idx as i32)?;
        if !local.is_table() {
            local = Variant::Table(HashMap::new());
        }
        if let Some(table) = local.as_table_mut() {
            table.insert(key, value);
        }
        self.stack.set_local(idx as i32, local)?;
        Ok(StepOutcome::Continue)
    }

    fn op_push_top(&mut self) -> Result<StepOutcome> {
        let top = self.stack.peek()?.clone();
        self.op_push(top)
    }

    fn op_push_return(&mut self) -> Result<StepOutcome> {
        let value = self.return_value.take().ok_or_else(|| {
            ScriptError::InvalidData("push_return without a pending return value".into())
        })?;
        self.op_push(value)
    }

    /// Binary arithmetic. The top of the stack is the right operand.
    fn op_binary(&mut self, op: fn(Variant, Variant) -> Result<Variant>) -> Result<StepOutcome> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.op_push(op(b, a)?)
    }

    fn op_bittest(&mut self) -> Result<StepOutcome> {
        let bit = self.stack.pop()?;
        let value = self.stack.pop()?;
        let (Some(bit), Some(value)) = (bit.as_int(), value.as_int()) else {
            return Err(ScriptError::TypeError(format!(
                "bittest: {} and {}",
                value.type_name(),
                bit.type_name()
            )));
        };
        if !(0..32).contains(&bit) {
            return Err(ScriptError::TypeError(format!(
                "bittest: bit index {} out of range",
                bit
            )));
        }
        self.op_push(Variant::Bool(value & (1 << bit) != 0))
    }

    /// Not a short-circuit conjunction: true when both operands are equal
    /// and the first popped is not Nil.
    fn op_and(&mut self) -> Result<StepOutcome> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.op_push(Variant::Bool(a == b && !a.is_nil()))
    }

    /// True when either operand is non-Nil.
    fn op_or(&mut self) -> Result<StepOutcome> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.op_push(Variant::Bool(!a.is_nil() || !b.is_nil()))
    }

    fn op_set_eq(&mut self, negate: bool) -> Result<StepOutcome> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.op_push(Variant::Bool((a == b) != negate))
    }

    /// Ordering opcodes pop the right operand first, so the value pushed
    /// earlier is the left side of the comparison.
    fn op_compare(&mut self, pred: fn(std::cmp::Ordering) -> bool) -> Result<StepOutcome> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        let ord = vm_cmp(&a, &b)?;
        self.op_push(Variant::Bool(pred(ord)))
    }
}
