crate::config_group!({

    /// Download rate limit handed to the transfer engine, in bytes per second.
    /// Zero means unlimited.
    ///
    /// Use the environment variable `PIECESTREAM_ENGINE_DOWNLOAD_RATE_LIMIT` to set this value.
    ref download_rate_limit: u64 = 0;

    /// Upload rate limit handed to the transfer engine, in bytes per second.
    /// Zero means unlimited.
    ///
    /// Use the environment variable `PIECESTREAM_ENGINE_UPLOAD_RATE_LIMIT` to set this value.
    ref upload_rate_limit: u64 = 0;
});
