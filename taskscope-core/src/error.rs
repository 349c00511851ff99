//! Error taxonomy for snapshot and predicate evaluation.

use thiserror::Error;

/// Everything that can go wrong while inspecting the target.
///
/// `TargetRead` and `MissingSymbol` abort the operation that hit them; a
/// partially built snapshot is never handed out. Recoverable conditions
/// (corrupt list entries, an uninitialized scheduler) never surface here —
/// the first is logged and skipped, the second is a distinct
/// [`Snapshot`](crate::snapshot::Snapshot) variant.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A memory read against the target failed. Names what was being read.
    #[error("target read of {what} failed: {source}")]
    TargetRead {
        /// Symbol or member the read was servicing.
        what: String,
        /// Underlying probe error.
        #[source]
        source: probe_rs::Error,
    },

    /// A kernel symbol the snapshot depends on is absent from the image.
    #[error("symbol `{0}` is not present in the target image")]
    MissingSymbol(String),

    /// The kernel record type does not carry the requested member.
    #[error("type `{record}` has no member `{member}` in this build")]
    MissingMember {
        /// Kernel record type name.
        record: String,
        /// Member that was asked for.
        member: String,
    },

    /// The firmware image could not be read from disk.
    #[error("failed to read image file: {0}")]
    Io(#[from] std::io::Error),

    /// The firmware image could not be parsed as an object file.
    #[error("failed to parse image: {0}")]
    Object(#[from] object::Error),
}

impl SnapshotError {
    pub(crate) fn read(what: &str, source: probe_rs::Error) -> Self {
        Self::TargetRead { what: what.to_string(), source }
    }
}
