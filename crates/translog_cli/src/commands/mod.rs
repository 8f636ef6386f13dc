//! CLI command implementations.

pub mod dump;
pub mod inspect;

use std::path::Path;
use std::sync::Arc;
use translog_core::{Domain, DomainConfig, Executor, ThreadExecutor};

/// Opens an existing domain for offline use.
pub(crate) fn open_domain(base: &Path, name: &str) -> Result<Domain, Box<dyn std::error::Error>> {
    let dir = base.join(name);
    if !dir.is_dir() {
        return Err(format!("domain directory {} not found", dir.display()).into());
    }

    let sync_executor: Arc<dyn Executor> = Arc::new(ThreadExecutor::new("tls-sync", 1)?);
    let session_executor: Arc<dyn Executor> = Arc::new(ThreadExecutor::new("tls-visit", 2)?);
    let domain = Domain::open(
        name,
        base,
        sync_executor,
        session_executor,
        DomainConfig::default(),
    )?;
    Ok(domain)
}
