//! FOCAL-RS: raw data decoder and per-trigger event builder for the FOCAL
//! pad/pixel readout
//!
//! Raw pad and pixel fragments are decoded, grouped by heartbeat frame and
//! flattened into one batch of trigger records per cycle. The binaries
//! connect the assembler to ZeroMQ sources and sinks.

pub mod assembler;
pub mod common;
pub mod config;
pub mod dataformat;
pub mod decoder;
pub mod emulator;
