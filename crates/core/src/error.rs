//! Error types for the core model and its loaders.

use thiserror::Error;

/// Fault raised while clocking the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The instruction register holds a word outside the implemented set.
    /// Nothing is committed for the tick that hit it.
    #[error("unimplemented opcode 0x{opcode:04X} at word address 0x{address:04X}")]
    UnimplementedOpcode { opcode: u16, address: u16 },

    /// Combinational feedback did not settle.
    #[error("control signals did not settle within {0} passes")]
    Unsettled(usize),
}

/// Intel HEX parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: checksum mismatch (sum 0x{sum:02X})")]
    Checksum { line: usize, sum: u8 },

    #[error("image ends at byte 0x{0:X}, past the end of program memory")]
    TooLarge(usize),
}

/// Save-state encode or decode failure.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("not a save state (bad magic)")]
    BadMagic,

    #[error("unsupported save state version {0}")]
    Version(u32),

    #[error("save state truncated")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decompression failed: {0}")]
    Inflate(String),

    #[error("serialization error: {0}")]
    Codec(#[from] bincode::Error),
}
