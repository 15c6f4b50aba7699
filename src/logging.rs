use std::path::Path;

use flexi_logger::{Age, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<()> = OnceCell::new();

/// Starts file logging under `log_dir`, duplicated to stderr. `RUST_LOG`
/// overrides the default `info` level. Later calls are no-ops.
pub fn init(log_dir: &Path) -> anyhow::Result<()> {
    LOGGER.get_or_try_init(|| -> anyhow::Result<()> {
        std::fs::create_dir_all(log_dir)?;
        Logger::try_with_env_or_str("info")?
            .log_to_file(
                FileSpec::default()
                    .directory(log_dir)
                    .basename("reader-sync")
                    .suffix("log"),
            )
            .rotate(
                Criterion::AgeOrSize(Age::Day, 5_000_000),
                Naming::Numbers,
                Cleanup::KeepLogFiles(5),
            )
            .duplicate_to_stderr(Duplicate::Info)
            .start()?;
        Ok(())
    })?;
    Ok(())
}
