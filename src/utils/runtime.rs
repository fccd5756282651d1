use anyhow::Result;

/// The tracker is driven by a single timer, so a current-thread runtime is enough. Git work is
/// moved onto the blocking pool.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
