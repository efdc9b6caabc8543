//! Database export command.
//!
//! # Usage
//!
//! ```bash
//! # Export everything to ./data_dump.json
//! ce-cli dumpdata
//!
//! # Choose the file and leave out reviews
//! ce-cli dumpdata --output backup.json --exclude base.review
//! ```
//!
//! `contenttypes` and `auth.permission` are always excluded; `--exclude`
//! adds to them. The output file is overwritten on every run.

use std::path::Path;

use cheap_electra_backend::export::{self, DEFAULT_EXCLUDES, Exclusions, ExportError};

use super::{CommandError, connect};

/// Errors that can occur during an export.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Exclusion set: the defaults plus anything given on the command line.
fn exclusions(extra: &[String]) -> Exclusions {
    Exclusions::new(
        DEFAULT_EXCLUDES
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str)),
    )
}

/// Export the database to `output`.
pub async fn run(output: &Path, exclude: &[String]) -> Result<usize, DumpError> {
    let pool = connect().await?;
    let count = export::dump(&pool, output, &exclusions(exclude)).await?;

    tracing::info!("Wrote {} records to {}", count, output.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusions_extend_defaults() {
        let exclusions = exclusions(&["base.review".to_string()]);
        assert!(exclusions.excludes("base.review"));
        assert!(exclusions.excludes("auth.permission"));
        assert!(exclusions.excludes("contenttypes.contenttype"));
        assert!(!exclusions.excludes("base.product"));
    }
}
