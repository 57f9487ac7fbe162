//! Reassembly of inbound logical payloads.

mod payload_assembler;

pub use payload_assembler::PayloadAssembler;
