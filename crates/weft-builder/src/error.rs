//! Build errors

use std::path::PathBuf;

use weft_core::CanonicalId;
use weft_indexer::DiscoveryError;

use crate::prebuild::PrebuildError;

/// A failure that aborts a build. The session keeps its previous state when
/// any of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("entry module not found: {}", path.display())]
    EntryNotFound { path: PathBuf },

    #[error("no prebuild payload for {id}")]
    ElementNotFound { id: CanonicalId },

    #[error(transparent)]
    Prebuild(#[from] PrebuildError),

    #[error("session has no committed build")]
    NotInitialized,

    #[error("artifact I/O failed at {}: {source}", path.display())]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact at {} is not valid JSON: {source}", path.display())]
    ArtifactFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl BuildError {
    /// Stable kind for callers that match on error categories.
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::EntryNotFound { .. } => "ENTRY_NOT_FOUND",
            BuildError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            BuildError::Prebuild(_) => "PREBUILD_FAILED",
            BuildError::NotInitialized => "NOT_INITIALIZED",
            BuildError::ArtifactIo { .. } | BuildError::ArtifactFormat { .. } => "ARTIFACT_IO",
        }
    }
}

impl From<DiscoveryError> for BuildError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::EntryNotFound { path } => BuildError::EntryNotFound { path },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = BuildError::from(DiscoveryError::EntryNotFound {
            path: PathBuf::from("/src/app.ts"),
        });
        assert_eq!(err.code(), "ENTRY_NOT_FOUND");
        insta::assert_snapshot!(err.to_string(), @"entry module not found: /src/app.ts");
        assert_eq!(BuildError::NotInitialized.code(), "NOT_INITIALIZED");
        let err = BuildError::ElementNotFound {
            id: CanonicalId::from_raw("/a.ts::x"),
        };
        assert_eq!(err.code(), "ELEMENT_NOT_FOUND");
    }
}
