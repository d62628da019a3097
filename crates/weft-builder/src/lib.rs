//! Artifact assembly and the incremental builder session

pub mod artifact;
pub mod error;
pub mod prebuild;
pub mod session;

pub use artifact::{
    build_artifact, collect_warnings, intermediate_modules, ArtifactBuilder, ArtifactElement,
    ArtifactInput, ArtifactMeta, ArtifactRequest, BuildReport, BuildStats, BuilderArtifact,
    ElementMetadata,
};
pub use error::BuildError;
pub use prebuild::{
    DescriptorPrebuildSource, PrebuildError, PrebuildMap, PrebuildRequest, PrebuildSource,
    Prebuilt, StaticPrebuildSource,
};
pub use session::{BuildInput, BuilderSession, Changeset};
