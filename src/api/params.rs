// src/api/params.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Array,
}

/// A parameter value: a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArrayOrString {
    String(String),
    Array(Vec<String>),
}

impl ArrayOrString {
    pub fn param_type(&self) -> ParamType {
        match self {
            ArrayOrString::String(_) => ParamType::String,
            ArrayOrString::Array(_) => ParamType::Array,
        }
    }

    /// Apply `f` to every string in the value.
    pub fn map_strings(&self, mut f: impl FnMut(&str) -> String) -> ArrayOrString {
        match self {
            ArrayOrString::String(s) => ArrayOrString::String(f(s)),
            ArrayOrString::Array(items) => {
                ArrayOrString::Array(items.iter().map(|s| f(s)).collect())
            }
        }
    }

    pub fn strings(&self) -> Vec<&str> {
        match self {
            ArrayOrString::String(s) => vec![s.as_str()],
            ArrayOrString::Array(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for ArrayOrString {
    fn from(s: &str) -> Self {
        ArrayOrString::String(s.to_string())
    }
}

impl From<Vec<&str>> for ArrayOrString {
    fn from(v: Vec<&str>) -> Self {
        ArrayOrString::Array(v.into_iter().map(str::to_string).collect())
    }
}

/// A declared parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ArrayOrString>,
}

/// A bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: ArrayOrString,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<ArrayOrString>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}
