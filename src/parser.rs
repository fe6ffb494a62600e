use crate::error::{Result, ScriptError};
use crate::reader::Reader;

/// An imported syscall as declared in the metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallDesc {
    /// how many arguments the syscall takes from the stack
    pub arg_count: u8,
    /// name of the syscall
    pub name: String,
}

/// Immutable descriptor of a script image, parsed once per context.
///
/// The first u32 of the file points at the metadata block; everything in
/// between is the code region, `[4, metadata_offset)`.
#[derive(Debug, Clone)]
pub struct ScriptMetadata {
    metadata_offset: u32,
    entry_point: u32,
    global_count: u16,
    volatile_global_count: u16,
    resolution_mode: u16,
    game_title: String,
    syscalls: Vec<SyscallDesc>,
}

impl ScriptMetadata {
    pub fn parse(reader: &mut Reader) -> Result<Self> {
        reader.seek_to(0);
        let metadata_offset = reader.read_u32()?;
        if (metadata_offset as usize) < 4 || metadata_offset as usize > reader.len() {
            return Err(ScriptError::InvalidData(format!(
                "metadata offset out of bounds: {:#x}",
                metadata_offset
            )));
        }

        reader.seek_to(metadata_offset);
        let entry_point = reader.read_u32()?;
        let global_count = reader.read_u16()?;
        let volatile_global_count = reader.read_u16()?;
        let resolution_mode = reader.read_u16()?;
        let game_title = reader.read_string()?;

        let syscall_count = reader.read_u8()?;
        let mut syscalls = Vec::with_capacity(syscall_count as usize);
        for _ in 0..syscall_count {
            let arg_count = reader.read_u8()?;
            let name = reader.read_string()?;
            syscalls.push(SyscallDesc { arg_count, name });
        }

        let meta = ScriptMetadata {
            metadata_offset,
            entry_point,
            global_count,
            volatile_global_count,
            resolution_mode,
            game_title,
            syscalls,
        };

        if !meta.is_code_area(meta.entry_point) {
            return Err(ScriptError::InvalidData(format!(
                "entry point outside the code area: {:#x}",
                meta.entry_point
            )));
        }

        Ok(meta)
    }

    #[inline]
    pub fn metadata_offset(&self) -> u32 {
        self.metadata_offset
    }

    #[inline]
    pub fn entry_point(&self) -> u32 {
        self.entry_point
    }

    #[inline]
    pub fn global_count(&self) -> u16 {
        self.global_count
    }

    #[inline]
    pub fn volatile_global_count(&self) -> u16 {
        self.volatile_global_count
    }

    #[inline]
    pub fn resolution_mode(&self) -> u16 {
        self.resolution_mode
    }

    #[inline]
    pub fn game_title(&self) -> &str {
        &self.game_title
    }

    #[inline]
    pub fn syscalls(&self) -> &[SyscallDesc] {
        &self.syscalls
    }

    pub fn get_syscall(&self, id: u16) -> Option<&SyscallDesc> {
        self.syscalls.get(id as usize)
    }

    #[inline]
    pub fn is_code_area(&self, addr: u32) -> bool {
        addr >= 4 && addr < self.metadata_offset
    }

    /// Window size for the resolution mode. The VM itself never looks at
    /// this; it is carried for whichever frontend opens the window.
    pub fn screen_size(&self) -> (u32, u32) {
        match self.resolution_mode {
            0 => (640, 480),
            1 => (800, 600),
            2 => (1024, 768),
            3 => (1280, 960),
            4 => (1600, 1200),
            5 => (640, 480),
            6 => (1024, 576),
            7 => (1024, 640),
            8 => (1280, 720),
            9 => (1280, 800),
            10 => (1440, 810),
            11 => (1440, 900),
            12 => (1680, 945),
            13 => (1680, 1050),
            14 => (1920, 1080),
            15 => (1920, 1200),
            mode => {
                log::warn!("unknown resolution mode {}, defaulting to 640x480", mode);
                (640, 480)
            }
        }
    }
}
