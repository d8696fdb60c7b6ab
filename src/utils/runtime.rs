use anyhow::Result;

/// Every event, tick and command of the host runs on this one thread, which is what keeps the
/// accounting free of interleaved mutation.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
