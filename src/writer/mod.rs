//! Asynchronous multi-stream append writer.
//!
//! Producers enqueue opaque payloads against logical stream keys and get
//! back the exact byte range the payload will occupy; a single background
//! worker thread performs all file I/O.

mod config;
mod registry;
mod scheduler;

pub use config::WriterConfig;
pub use scheduler::DataWriter;
