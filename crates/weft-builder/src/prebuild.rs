//! Prebuild payload sources
//!
//! The artifact builder does not interpret definitions. It asks a
//! [`PrebuildSource`] for an opaque payload per canonical id and copies the
//! result into the artifact.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::json;
use weft_core::{CanonicalId, DependencyGraphNode, ElementType};

/// What a source needs to know about one definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuildRequest {
    pub id: CanonicalId,
    pub file_path: PathBuf,
    pub ast_path: String,
    pub element_type: Option<ElementType>,
    pub dependencies: Vec<CanonicalId>,
}

impl From<&DependencyGraphNode> for PrebuildRequest {
    fn from(node: &DependencyGraphNode) -> Self {
        PrebuildRequest {
            id: node.id.clone(),
            file_path: node.file_path.clone(),
            ast_path: node.ast_path.clone(),
            element_type: node.element_type,
            dependencies: node.dependencies.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prebuilt {
    pub element_type: ElementType,
    pub payload: serde_json::Value,
}

pub type PrebuildMap = BTreeMap<CanonicalId, Prebuilt>;

#[derive(Debug, thiserror::Error)]
pub enum PrebuildError {
    #[error("prebuild of {id} failed: {reason}")]
    Element { id: CanonicalId, reason: String },

    #[error("prebuild source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies prebuild payloads. Ids a source cannot describe are left out of
/// the returned map; the artifact builder reports them.
#[async_trait::async_trait]
pub trait PrebuildSource: Send + Sync {
    async fn prebuild(&self, requests: &[PrebuildRequest]) -> Result<PrebuildMap, PrebuildError>;

    fn name(&self) -> &str;
}

/// Fixed payloads registered up front.
#[derive(Debug, Clone, Default)]
pub struct StaticPrebuildSource {
    entries: PrebuildMap,
}

impl StaticPrebuildSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: CanonicalId, element_type: ElementType, payload: serde_json::Value) {
        self.entries.insert(id, Prebuilt { element_type, payload });
    }
}

#[async_trait::async_trait]
impl PrebuildSource for StaticPrebuildSource {
    async fn prebuild(&self, requests: &[PrebuildRequest]) -> Result<PrebuildMap, PrebuildError> {
        Ok(requests
            .iter()
            .filter_map(|req| {
                self.entries
                    .get(&req.id)
                    .map(|prebuilt| (req.id.clone(), prebuilt.clone()))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Describes each definition from what discovery already knows: its builder
/// kind, location and dependencies. Definitions of unknown kind get no
/// payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorPrebuildSource;

impl DescriptorPrebuildSource {
    fn describe(request: &PrebuildRequest) -> Option<Prebuilt> {
        let element_type = request.element_type?;
        let payload = json!({
            "kind": element_type.as_str(),
            "astPath": request.ast_path,
            "dependencies": request
                .dependencies
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>(),
        });
        Some(Prebuilt {
            element_type,
            payload,
        })
    }
}

#[async_trait::async_trait]
impl PrebuildSource for DescriptorPrebuildSource {
    async fn prebuild(&self, requests: &[PrebuildRequest]) -> Result<PrebuildMap, PrebuildError> {
        let mut out = PrebuildMap::new();
        for request in requests {
            match Self::describe(request) {
                Some(prebuilt) => {
                    out.insert(request.id.clone(), prebuilt);
                }
                None => tracing::debug!("No descriptor for {} (unknown builder kind)", request.id),
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "descriptor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ast_path: &str, element_type: Option<ElementType>) -> PrebuildRequest {
        PrebuildRequest {
            id: CanonicalId::new(std::path::Path::new("/src/a.ts"), ast_path),
            file_path: PathBuf::from("/src/a.ts"),
            ast_path: ast_path.to_string(),
            element_type,
            dependencies: vec![CanonicalId::from_raw("/src/b.ts::userModel")],
        }
    }

    #[tokio::test]
    async fn descriptor_describes_known_kinds_only() {
        let requests = vec![
            request("userQuery", Some(ElementType::Operation)),
            request("mystery", None),
        ];
        let map = DescriptorPrebuildSource.prebuild(&requests).await.unwrap();
        assert_eq!(map.len(), 1);

        let prebuilt = &map[&requests[0].id];
        assert_eq!(prebuilt.element_type, ElementType::Operation);
        insta::assert_json_snapshot!(prebuilt.payload, @r#"
        {
          "astPath": "userQuery",
          "dependencies": [
            "/src/b.ts::userModel"
          ],
          "kind": "operation"
        }
        "#);
    }

    #[tokio::test]
    async fn static_source_returns_requested_subset() {
        let mut source = StaticPrebuildSource::new();
        let wanted = request("a", None);
        source.insert(wanted.id.clone(), ElementType::Model, json!({ "typename": "User" }));
        source.insert(CanonicalId::from_raw("/src/z.ts::z"), ElementType::Slice, json!({}));

        let map = source.prebuild(&[wanted.clone()]).await.unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![&wanted.id]);
    }
}
