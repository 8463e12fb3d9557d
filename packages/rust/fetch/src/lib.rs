//! Retrieval of vendor XML documents.
//!
//! This crate provides:
//! - [`RemoteSource`]: the seam every document source implements
//! - [`FtpSource`]: a scoped FTP session, closed when dropped
//! - [`LocalSource`]: a directory on disk, for offline conversion
//! - [`fetch_documents`]: retrieves a list of names from a source

mod ftp;
mod local;

use feedbuilder_shared::Result;
use tracing::{info, instrument, warn};

pub use ftp::FtpSource;
pub use local::LocalSource;

/// A place vendor documents can be retrieved from by name.
pub trait RemoteSource {
    /// Short description for logs (e.g. `ftp://host:21/dir`).
    fn describe(&self) -> String;

    /// Retrieve one document as raw bytes.
    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>>;
}

/// A retrieved document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Name as listed in the input list.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Options for [`fetch_documents`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Log and skip names that fail instead of aborting.
    pub skip_failed: bool,
}

/// Result of retrieving a list of documents.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub documents: Vec<FetchedDocument>,
    /// `(name, error)` for each skipped document.
    pub skipped: Vec<(String, String)>,
}

/// Retrieve every name in order. The first failure aborts unless
/// `opts.skip_failed` is set.
#[instrument(skip_all, fields(source = %source.describe(), files = names.len()))]
pub fn fetch_documents(
    source: &mut dyn RemoteSource,
    names: &[String],
    opts: &FetchOptions,
) -> Result<FetchOutcome> {
    let mut outcome = FetchOutcome::default();

    for name in names {
        match source.retrieve(name) {
            Ok(bytes) => {
                info!(file = %name, bytes = bytes.len(), "retrieved");
                outcome.documents.push(FetchedDocument {
                    name: name.clone(),
                    bytes,
                });
            }
            Err(e) if opts.skip_failed => {
                warn!(file = %name, error = %e, "retrieval failed, skipping file");
                outcome.skipped.push((name.clone(), e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outcome)
}
