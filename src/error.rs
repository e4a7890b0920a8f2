// Configuration error types

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("card in slot {slot} has no expansion bus to attach to")]
    MissingDependency { slot: String },

    #[error(
        "RAM window {start:#06X}-{end:#06X} overlaps installed window {existing_start:#06X}-{existing_end:#06X}"
    )]
    Overlap {
        start: u32,
        end: u32,
        existing_start: u32,
        existing_end: u32,
    },

    #[error("RAM window {start:#06X}-{end:#06X} is outside the bus address space")]
    OutOfBounds { start: u32, end: u32 },

    #[error("RAM window {start:#06X}-{end:#06X} does not match a buffer of {len} bytes")]
    SizeMismatch { start: u32, end: u32, len: usize },

    #[error("no card named {0:?} is registered")]
    UnknownCard(String),

    #[error("expansion bus was dropped while a card still referenced it")]
    BusGone,

    #[error("line {0} is not wired")]
    InvalidLine(u8),

    #[error("port {0:#04X} has no external strobe")]
    NoStrobe(u8),

    #[error("firmware layout error: {0}")]
    Firmware(String),
}
