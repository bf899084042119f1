// src/api/meta.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// API version stamped on owner references of generated children.
pub const API_VERSION: &str = "rundag.dev/v1beta1";

/// Label keys used to tie generated children back to their run.
pub mod labels {
    pub const GROUP: &str = "rundag.dev";
    pub const PIPELINE: &str = "rundag.dev/pipeline";
    pub const PIPELINE_RUN: &str = "rundag.dev/pipelineRun";
    pub const PIPELINE_TASK: &str = "rundag.dev/pipelineTask";
    pub const CONDITION_CHECK: &str = "rundag.dev/conditionCheck";
    pub const CONDITION_NAME: &str = "rundag.dev/conditionName";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Bumped by the store on every write; `0` means "never stored".
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// `namespace/name`, or just `name` for cluster-scoped objects.
    pub fn key(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.namespace, self.name)
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// The controlling owner, if any.
    pub fn controller(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|o| o.controller)
    }

    pub fn is_controlled_by(&self, owner: &OwnerReference) -> bool {
        self.controller().is_some_and(|o| {
            o.kind == owner.kind && o.name == owner.name && o.api_version == owner.api_version
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub controller: bool,
    #[serde(default)]
    pub block_owner_deletion: bool,
}

/// Uniform access to the metadata of stored objects.
pub trait Object: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

macro_rules! impl_object {
    ($ty:ty, $kind:literal) => {
        impl $crate::api::meta::Object for $ty {
            const KIND: &'static str = $kind;

            fn metadata(&self) -> &$crate::api::meta::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::api::meta::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}
pub(crate) use impl_object;

/// Split a `namespace/name` work key.
///
/// Anything other than exactly two non-empty segments is rejected.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let mut parts = key.split('/');
    let namespace = parts.next()?;
    let name = parts.next()?;
    if parts.next().is_some() || namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some((namespace, name))
}
