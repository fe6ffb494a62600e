//! Byte-level script builder for tests: emits a minimal but complete image
//! (code region at offset 4, metadata block behind it).

use std::sync::Arc;

use hcb_vm::{Nls, Opcode, Reader, ScriptContext, ScriptMetadata};

pub struct ScriptBuilder {
    code: Vec<u8>,
    entry_point: u32,
    global_count: u16,
    syscalls: Vec<(u8, String)>,
}

#[allow(dead_code)]
impl ScriptBuilder {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            entry_point: 4,
            global_count: 0,
            syscalls: Vec::new(),
        }
    }

    /// Address the next emitted byte will land at.
    pub fn here(&self) -> u32 {
        4 + self.code.len() as u32
    }

    pub fn set_entry_here(&mut self) -> &mut Self {
        self.entry_point = self.here();
        self
    }

    pub fn globals(&mut self, count: u16) -> &mut Self {
        self.global_count = count;
        self
    }

    /// Declare an imported syscall; ids follow declaration order.
    pub fn import(&mut self, name: &str, arg_count: u8) -> u16 {
        self.syscalls.push((arg_count, name.to_string()));
        (self.syscalls.len() - 1) as u16
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    pub fn raw_u8(&mut self, v: u8) -> &mut Self {
        self.code.push(v);
        self
    }

    pub fn raw_u16(&mut self, v: u16) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn raw_u32(&mut self, v: u32) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Back-patch a u32 at a file address, for forward branch targets.
    pub fn patch_u32(&mut self, addr: u32, v: u32) -> &mut Self {
        let at = addr as usize - 4;
        self.code[at..at + 4].copy_from_slice(&v.to_le_bytes());
        self
    }

    pub fn init_stack(&mut self, args: u8, locals: u8) -> &mut Self {
        self.op(Opcode::InitStack).raw_u8(args).raw_u8(locals)
    }

    pub fn push_i8(&mut self, v: i8) -> &mut Self {
        self.op(Opcode::PushI8).raw_u8(v as u8)
    }

    pub fn push_i16(&mut self, v: i16) -> &mut Self {
        self.op(Opcode::PushI16).raw_u16(v as u16)
    }

    pub fn push_i32(&mut self, v: i32) -> &mut Self {
        self.op(Opcode::PushI32).raw_u32(v as u32)
    }

    pub fn push_f32(&mut self, v: f32) -> &mut Self {
        self.op(Opcode::PushF32).raw_u32(v.to_bits())
    }

    pub fn push_string(&mut self, s: &str) -> &mut Self {
        self.op(Opcode::PushString);
        put_string(&mut self.code, s);
        self
    }

    pub fn push_local(&mut self, idx: i8) -> &mut Self {
        self.op(Opcode::PushLocal).raw_u8(idx as u8)
    }

    pub fn pop_local(&mut self, idx: i8) -> &mut Self {
        self.op(Opcode::PopLocal).raw_u8(idx as u8)
    }

    pub fn push_global(&mut self, id: u16) -> &mut Self {
        self.op(Opcode::PushGlobal).raw_u16(id)
    }

    pub fn pop_global(&mut self, id: u16) -> &mut Self {
        self.op(Opcode::PopGlobal).raw_u16(id)
    }

    pub fn call(&mut self, addr: u32) -> &mut Self {
        self.op(Opcode::Call).raw_u32(addr)
    }

    pub fn jmp(&mut self, addr: u32) -> &mut Self {
        self.op(Opcode::Jmp).raw_u32(addr)
    }

    pub fn jz(&mut self, addr: u32) -> &mut Self {
        self.op(Opcode::Jz).raw_u32(addr)
    }

    pub fn syscall(&mut self, id: u16) -> &mut Self {
        self.op(Opcode::Syscall).raw_u16(id)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = vec![0u8; 4];
        image.extend_from_slice(&self.code);
        let meta_off = image.len() as u32;
        image[0..4].copy_from_slice(&meta_off.to_le_bytes());

        image.extend_from_slice(&self.entry_point.to_le_bytes());
        image.extend_from_slice(&self.global_count.to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes()); // volatile_global_count
        image.extend_from_slice(&0u16.to_le_bytes()); // resolution_mode
        put_string(&mut image, "testcase");
        image.push(self.syscalls.len() as u8);
        for (arg_count, name) in &self.syscalls {
            image.push(*arg_count);
            put_string(&mut image, name);
        }
        image
    }

    /// Parse the built image and seat a fresh context on it.
    pub fn boot(&self) -> anyhow::Result<ScriptContext> {
        let mut reader = Reader::new(self.build(), Nls::UTF8);
        let meta = Arc::new(ScriptMetadata::parse(&mut reader)?);
        Ok(ScriptContext::new(reader, meta))
    }
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.push((s.len() + 1) as u8);
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}
