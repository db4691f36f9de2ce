//! Save states for the core model.
//!
//! Captures everything the core latches plus data memory, serialized with
//! bincode and deflate-compressed. Program memory is ROM and is left out;
//! load the same image before restoring.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "AVRS"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{event, Level};

use crate::alu::Alu;
use crate::control::ControlUnit;
use crate::error::StateError;
use crate::prog_addr::ProgramAddressUnit;
use crate::regfile::RegisterFile;
use crate::{Avr, Pins};

const MAGIC: &[u8; 4] = b"AVRS";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    pub control: ControlUnit,
    pub alu: Alu,
    pub pau: ProgramAddressUnit,
    pub regs: RegisterFile,
    pub data: Vec<u8>,
    pub pins: Pins,
    pub tick: u64,
}

impl Avr {
    pub fn save_state(&self) -> SaveState {
        SaveState {
            control: self.control,
            alu: self.alu,
            pau: self.pau,
            regs: self.regs.clone(),
            data: self.data.bytes().to_vec(),
            pins: self.pins,
            tick: self.tick,
        }
    }

    pub fn load_state(&mut self, s: &SaveState) {
        self.control = s.control;
        self.alu = s.alu;
        self.pau = s.pau;
        self.regs = RegisterFile::new();
        self.regs.load_slots(s.regs.slots());
        self.data.load_bytes(&s.data);
        self.pins = s.pins;
        self.tick = s.tick;
        event!(Level::DEBUG, "state restored at tick {}, PC={:04X}", s.tick, s.pau.pc);
    }
}

/// Header plus compressed payload.
pub fn encode(state: &SaveState) -> Result<Vec<u8>, StateError> {
    let payload = bincode::serialize(state)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<SaveState, StateError> {
    if data.len() < HEADER_LEN {
        return Err(StateError::Truncated);
    }
    if &data[0..4] != MAGIC {
        return Err(StateError::BadMagic);
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(StateError::Version(version));
    }
    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| StateError::Inflate(format!("{:?}", e)))?;
    Ok(bincode::deserialize(&decompressed)?)
}

pub fn save_to_file(state: &SaveState, path: &Path) -> Result<(), StateError> {
    std::fs::write(path, encode(state)?)?;
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<SaveState, StateError> {
    decode(&std::fs::read(path)?)
}

/// `prog.hex` → `prog.state`, next to the program.
pub fn state_path(program_path: &Path) -> PathBuf {
    program_path.with_extension("state")
}
