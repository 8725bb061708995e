//! Program images: the raw word dump loaded at address 0, or an ELF
//! executable placed by its program headers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use goblin::elf::{
    Elf,
    header::{self, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, EM_RISCV, ET_DYN, ET_EXEC},
    program_header::PT_LOAD,
};
use thiserror::Error;

use crate::config::Xlen;
use crate::mem::{MemError, Memory};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("cannot read image {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed ELF: {0}")]
    Elf(#[from] goblin::error::Error),

    #[error("unsupported ELF: {0}")]
    Unsupported(String),

    #[error("image does not fit in memory: {0}")]
    Mem(#[from] MemError),
}

pub fn read_image(path: &Path) -> Result<Vec<u8>, ImageError> {
    fs::read(path).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub addr: u64,
    pub data: Vec<u8>,
    /// Size in memory; the part past `data` is zero-filled.
    pub mem_size: u64,
}

#[derive(Debug, Clone)]
pub struct ElfImage {
    pub entry: u64,
    /// Address of the `tohost` symbol, when the symbol table has one.
    pub tohost: Option<u64>,
    pub segments: Vec<Segment>,
}

impl ElfImage {
    pub fn parse(bytes: &[u8], xlen: Xlen) -> Result<Self, ImageError> {
        let elf = Elf::parse(bytes)?;

        let class = match xlen {
            Xlen::Rv32 => ELFCLASS32,
            Xlen::Rv64 => ELFCLASS64,
        };
        if elf.header.e_ident[header::EI_CLASS] != class {
            return Err(ImageError::Unsupported(format!(
                "expected a {}-bit ELF",
                xlen.bits()
            )));
        }
        if elf.header.e_ident[header::EI_DATA] != ELFDATA2LSB {
            return Err(ImageError::Unsupported("expected little-endian ELF".into()));
        }
        if elf.header.e_machine != EM_RISCV {
            return Err(ImageError::Unsupported("expected RISC-V ELF".into()));
        }
        if elf.header.e_type != ET_EXEC && elf.header.e_type != ET_DYN {
            return Err(ImageError::Unsupported(
                "want ET_EXEC or ET_DYN".into(),
            ));
        }

        let mut segments = Vec::new();
        for ph in elf.program_headers.iter().filter(|ph| ph.p_type == PT_LOAD) {
            let off = ph.p_offset as usize;
            let file_sz = ph.p_filesz as usize;
            let data = off
                .checked_add(file_sz)
                .and_then(|end| bytes.get(off..end))
                .ok_or_else(|| {
                    ImageError::Unsupported(format!(
                        "segment outside file: off=0x{off:x} size=0x{file_sz:x}"
                    ))
                })?;
            if ph.p_memsz < ph.p_filesz {
                return Err(ImageError::Unsupported(format!(
                    "p_memsz smaller than p_filesz for segment at off=0x{off:x}"
                )));
            }
            segments.push(Segment {
                addr: ph.p_paddr,
                data: data.to_vec(),
                mem_size: ph.p_memsz,
            });
        }

        let tohost = elf
            .syms
            .iter()
            .find(|sym| elf.strtab.get_at(sym.st_name) == Some("tohost"))
            .map(|sym| sym.st_value);

        Ok(Self {
            entry: elf.entry,
            tohost,
            segments,
        })
    }

    pub fn load_into(&self, mem: &mut Memory) -> Result<(), ImageError> {
        for seg in &self.segments {
            mem.write_bytes(seg.addr, &seg.data)?;
            let file_len = seg.data.len() as u64;
            let bss = seg.mem_size.saturating_sub(file_len);
            if bss > 0 {
                mem.zero(seg.addr.wrapping_add(file_len), bss)?;
            }
        }
        tracing::info!(
            segments = self.segments.len(),
            entry = format_args!("0x{:x}", self.entry),
            "ELF image loaded"
        );
        Ok(())
    }
}
