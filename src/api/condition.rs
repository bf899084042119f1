// src/api/condition.rs

//! The gating object referenced from a node's `conditions`.

use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, impl_object};
use super::params::ParamSpec;
use super::task::{Step, TaskResource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metadata: ObjectMeta,
    pub spec: ConditionSpec,
}

impl_object!(Condition, "Condition");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionSpec {
    pub check: Step,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<TaskResource>,
}
