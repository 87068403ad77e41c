//! Serial port access
//!
//! This module provides functionality for:
//! - Opening a serial device for capture
//! - Reading raw chunks with a bounded wait
//! - Listing available serial ports (USB-to-serial adapters)

pub mod port;

pub use port::{ChunkSource, PortConfig, PortReader, RawChunk};
