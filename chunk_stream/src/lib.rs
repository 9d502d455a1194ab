mod chunk_store;
mod error;
mod flush;
mod orchestrator;
mod output;
mod prebuffer;
mod scheduler;
mod stream_range;

pub use chunk_store::{ChunkStore, PeekOutcome};
pub use error::{Result, StreamError};
pub use flush::{DrainOutcome, FlushController, StreamCursor};
pub use orchestrator::{StreamControl, StreamOrchestrator, StreamState};
pub use output::StreamOutput;
pub use prebuffer::PrebufferGate;
pub use scheduler::{ChunkRequest, RequestScheduler};
pub use stream_range::StreamRange;
