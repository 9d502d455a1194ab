pub use interface::{ChunkPriority, ChunkSink, EngineEvent, EngineStatus, TransferEngine};
pub use layout::{DownloadLayout, FileEntry};
pub use simulated_engine::SimulatedEngine;

pub use crate::error::{EngineError, Result};

mod error;
mod interface;
mod layout;
mod simulated_engine;
