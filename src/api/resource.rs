// src/api/resource.rs

use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, impl_object};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Git,
    Image,
    Storage,
    PullRequest,
    Cluster,
    CloudEvent,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceType::Git => "git",
            ResourceType::Image => "image",
            ResourceType::Storage => "storage",
            ResourceType::PullRequest => "pullRequest",
            ResourceType::Cluster => "cluster",
            ResourceType::CloudEvent => "cloudEvent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResource {
    pub metadata: ObjectMeta,
    pub spec: PipelineResourceSpec,
}

impl_object!(PipelineResource, "PipelineResource");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResourceSpec {
    #[serde(rename = "type")]
    pub type_: ResourceType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ResourceParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceParam {
    pub name: String,
    pub value: String,
}

/// Either a reference to a stored resource or an inline spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceSource {
    Ref { name: String },
    Inline(PipelineResourceSpec),
}

/// A run-level binding of a declared pipeline resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResourceBinding {
    pub name: String,
    pub resource: ResourceSource,
}
