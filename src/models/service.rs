//! Service descriptions registered with the platform.

use super::common::{LinkT, validate_uri};
use crate::errors::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceT {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterOptT {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefT {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParameterOptT>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowT {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<Value>,
}

/// Body of `POST /1/services` and `PUT /1/services/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptionT {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(default)]
    pub references: Vec<ReferenceT>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefT>,
    pub workflow: WorkflowT,
}

impl ServiceDescriptionT {
    pub fn validate(&self) -> ServiceResult<()> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::invalid_parameter(
                "name",
                Some(&self.name),
                "must not be empty",
            ));
        }
        if self.workflow.type_.trim().is_empty() {
            return Err(ServiceError::invalid_parameter(
                "workflow.type",
                None,
                "must not be empty",
            ));
        }
        let mut seen = HashSet::new();
        for p in &self.parameters {
            if p.name.trim().is_empty() {
                return Err(ServiceError::invalid_parameter(
                    "parameters.name",
                    None,
                    "must not be empty",
                ));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(ServiceError::invalid_parameter(
                    "parameters.name",
                    Some(&p.name),
                    "parameter names must be unique",
                ));
            }
        }
        for r in &self.references {
            validate_uri("references.uri", &r.uri)?;
        }
        Ok(())
    }
}

/// Full service status; `views::service` projects it onto the `tiny` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatusRT {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub banner: Option<String>,
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefT>,
    #[serde(default)]
    pub references: Vec<ReferenceT>,
    pub workflow: Option<WorkflowT>,
    pub policy: Option<String>,
    pub account: Option<String>,
    pub published_at: Option<String>,
    #[serde(default)]
    pub links: Vec<LinkT>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceListItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceListRT {
    pub services: Vec<ServiceListItem>,
    pub at_time: String,
    pub links: Vec<LinkT>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description() -> ServiceDescriptionT {
        ServiceDescriptionT {
            name: "gradient".into(),
            description: "renders a gradient".into(),
            banner: None,
            policy_id: None,
            references: vec![ReferenceT {
                title: None,
                uri: "https://example.com/docs".into(),
            }],
            tags: vec!["demo".into()],
            parameters: vec![ParameterDefT {
                name: "width".into(),
                label: None,
                type_: "int".into(),
                description: None,
                unit: None,
                optional: None,
                default: Some("100".into()),
                options: vec![],
            }],
            workflow: WorkflowT {
                type_: "basic".into(),
                image: Some("gradient:latest".into()),
                command: vec![],
                opts: None,
            },
        }
    }

    #[test]
    fn valid_description_passes() {
        assert!(description().validate().is_ok());
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        let mut d = description();
        d.parameters.push(d.parameters[0].clone());
        assert!(matches!(d.validate(), Err(ServiceError::InvalidParameter(_))));
    }

    #[test]
    fn bad_reference_uri_is_rejected() {
        let mut d = description();
        d.references[0].uri = "not a uri".into();
        assert!(d.validate().is_err());
    }

    #[test]
    fn empty_workflow_type_is_rejected() {
        let mut d = description();
        d.workflow.type_ = " ".into();
        assert!(d.validate().is_err());
    }
}
