use std::fmt;

use crate::error::Result;
use crate::opcode::Opcode;
use crate::parser::ScriptMetadata;
use crate::reader::Reader;

/// Inline operand decoded next to an opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    /// `initstack` header: argument count, local count.
    Frame(u8, u8),
    Address(u32),
    SyscallId(u16),
    I8(i8),
    I16(i16),
    I32(i32),
    F32(f32),
    Str(String),
    GlobalId(u16),
    LocalId(i8),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Frame(args, locals) => write!(f, "{} {}", args, locals),
            Operand::Address(addr) => write!(f, "{:#x}", addr),
            Operand::SyscallId(id) => write!(f, "{}", id),
            Operand::I8(v) => write!(f, "{}", v),
            Operand::I16(v) => write!(f, "{}", v),
            Operand::I32(v) => write!(f, "{}", v),
            Operand::F32(v) => write!(f, "{}", v),
            Operand::Str(s) => write!(f, "{:?}", s),
            Operand::GlobalId(id) => write!(f, "{}", id),
            Operand::LocalId(id) => write!(f, "{}", id),
        }
    }
}

/// One decoded instruction. Only the ahead-of-time decoder materializes
/// these; the executing VM reads operands inline off the reader.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub address: u32,
    /// `None` for a byte outside the known opcode set.
    pub opcode: Option<Opcode>,
    pub raw: u8,
    pub operand: Operand,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}: ", self.address)?;
        match self.opcode {
            Some(op) if self.operand == Operand::None => write!(f, "{}", op.mnemonic()),
            Some(op) => write!(f, "{:8} {}", op.mnemonic(), self.operand),
            None => write!(f, "{:8} {:#04x}", "db", self.raw),
        }
    }
}

/// Streaming decoder over the code region `[4, metadata_offset)`.
///
/// Unknown bytes yield an operand-less record instead of an error so a
/// listing can continue past data the assembler interleaved with code.
pub struct InstructionDecoder<'a> {
    reader: &'a mut Reader,
    end: u32,
}

impl<'a> InstructionDecoder<'a> {
    pub fn new(reader: &'a mut Reader, meta: &ScriptMetadata) -> Self {
        reader.seek_to(4);
        Self {
            reader,
            end: meta.metadata_offset(),
        }
    }

    fn decode_one(&mut self) -> Result<Instruction> {
        let address = self.reader.position();
        let raw = self.reader.read_u8()?;
        let opcode = Opcode::from_u8(raw);

        let operand = match opcode {
            Some(Opcode::InitStack) => {
                Operand::Frame(self.reader.read_u8()?, self.reader.read_u8()?)
            }
            Some(Opcode::Call) | Some(Opcode::Jmp) | Some(Opcode::Jz) => {
                Operand::Address(self.reader.read_u32()?)
            }
            Some(Opcode::Syscall) => Operand::SyscallId(self.reader.read_u16()?),
            Some(Opcode::PushI8) => Operand::I8(self.reader.read_i8()?),
            Some(Opcode::PushI16) => Operand::I16(self.reader.read_i16()?),
            Some(Opcode::PushI32) => Operand::I32(self.reader.read_i32()?),
            Some(Opcode::PushF32) => Operand::F32(self.reader.read_f32()?),
            Some(Opcode::PushString) => Operand::Str(self.reader.read_string()?),
            Some(Opcode::PushGlobal)
            | Some(Opcode::PopGlobal)
            | Some(Opcode::PushGlobalTable)
            | Some(Opcode::PopGlobalTable) => Operand::GlobalId(self.reader.read_u16()?),
            Some(Opcode::PushLocal)
            | Some(Opcode::PopLocal)
            | Some(Opcode::PushLocalTable)
            | Some(Opcode::PopLocalTable) => Operand::LocalId(self.reader.read_i8()?),
            _ => Operand::None,
        };

        Ok(Instruction {
            address,
            opcode,
            raw,
            operand,
        })
    }
}

impl Iterator for InstructionDecoder<'_> {
    type Item = Result<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.position() >= self.end {
            return None;
        }
        Some(self.decode_one())
    }
}

/// Decode the whole code region into a listing.
pub fn disassemble(reader: &mut Reader, meta: &ScriptMetadata) -> Result<Vec<Instruction>> {
    InstructionDecoder::new(reader, meta).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nls::Nls;

    fn put_string(buf: &mut Vec<u8>, s: &str) {
        buf.push((s.len() + 1) as u8);
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }

    fn image_with_code(code: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; 4];
        image.extend_from_slice(code);
        let meta_off = image.len() as u32;
        image[0..4].copy_from_slice(&meta_off.to_le_bytes());
        image.extend_from_slice(&4u32.to_le_bytes()); // entry_point
        image.extend_from_slice(&0u16.to_le_bytes()); // global_count
        image.extend_from_slice(&0u16.to_le_bytes()); // volatile_global_count
        image.extend_from_slice(&0u16.to_le_bytes()); // resolution_mode
        put_string(&mut image, "t");
        image.push(0); // syscall_count
        image
    }

    #[test]
    fn decodes_operands_per_opcode() {
        let mut code = vec![
            0x01, 0x00, 0x02, // initstack 0 2
            0x0A, 0x2A, 0x00, 0x00, 0x00, // push_i32 42
            0x0E, 0x03, b'h', b'i', 0x00, // push_string "hi"
            0x16, 0x01, // pop_local 1
            0x05, // retv
        ];
        code.extend_from_slice(&[0x03, 0x07, 0x00]); // syscall 7
        let image = image_with_code(&code);

        let mut reader = Reader::new(image, Nls::UTF8);
        let meta = ScriptMetadata::parse(&mut reader).unwrap();
        let listing = disassemble(&mut reader, &meta).unwrap();

        assert_eq!(listing.len(), 6);
        assert_eq!(listing[0].address, 4);
        assert_eq!(listing[0].operand, Operand::Frame(0, 2));
        assert_eq!(listing[1].operand, Operand::I32(42));
        assert_eq!(listing[2].operand, Operand::Str("hi".into()));
        assert_eq!(listing[3].operand, Operand::LocalId(1));
        assert_eq!(listing[4].opcode, Some(Opcode::RetV));
        assert_eq!(listing[5].operand, Operand::SyscallId(7));
    }

    #[test]
    fn tolerates_unknown_bytes() {
        let image = image_with_code(&[0x00, 0xEE, 0x04]);
        let mut reader = Reader::new(image, Nls::UTF8);
        let meta = ScriptMetadata::parse(&mut reader).unwrap();
        let listing = disassemble(&mut reader, &meta).unwrap();

        assert_eq!(listing.len(), 3);
        assert_eq!(listing[1].opcode, None);
        assert_eq!(listing[1].raw, 0xEE);
        assert_eq!(listing[1].operand, Operand::None);
        assert_eq!(listing[2].opcode, Some(Opcode::Ret));
    }

    #[test]
    fn listing_format() {
        let image = image_with_code(&[0x0A, 0x07, 0x00, 0x00, 0x00]);
        let mut reader = Reader::new(image, Nls::UTF8);
        let meta = ScriptMetadata::parse(&mut reader).unwrap();
        let listing = disassemble(&mut reader, &meta).unwrap();
        assert_eq!(listing[0].to_string(), "000004: push_i32 7");
    }
}
