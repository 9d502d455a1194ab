use std::time::Duration;

use utils::ByteSize;

crate::config_group!({

    /// The maximum amount of chunk data the stream holds in memory waiting to be
    /// delivered. The request window is sized as memory_budget / chunk_size, so a
    /// budget smaller than one chunk disables look-ahead entirely.
    ///
    /// The default value is 100MB.
    ///
    /// Use the environment variable `PIECESTREAM_STREAMING_MEMORY_BUDGET` to set this value.
    ref memory_budget: ByteSize = ByteSize::from("100mb");

    /// How many consecutive leading chunks must be complete before the first byte
    /// is delivered to the consumer. Zero delivers as soon as the first chunk lands.
    ///
    /// The default value is 4 chunks.
    ///
    /// Use the environment variable `PIECESTREAM_STREAMING_PREBUFFER_CHUNKS` to set this value.
    ref prebuffer_chunks: u64 = 4;

    /// How long the poll loop sleeps between engine event batches. Shorter intervals
    /// reduce delivery latency at the cost of more polling overhead.
    ///
    /// The default value is 1 second.
    ///
    /// Use the environment variable `PIECESTREAM_STREAMING_POLL_INTERVAL` to set this value.
    ref poll_interval: Duration = Duration::from_secs(1);

    /// The fetch deadline attached to the most urgent chunk of the request window.
    ///
    /// The default value is 1 second.
    ///
    /// Use the environment variable `PIECESTREAM_STREAMING_DEADLINE_BASE` to set this value.
    ref deadline_base: Duration = Duration::from_millis(1000);

    /// The additional deadline attached per slot further into the request window,
    /// biasing the engine toward fetching earlier chunks first.
    ///
    /// The default value is 1 millisecond.
    ///
    /// Use the environment variable `PIECESTREAM_STREAMING_DEADLINE_STEP` to set this value.
    ref deadline_step: Duration = Duration::from_millis(1);
});
