//! Views of [`ServiceStatusRT`].

use super::{View, ViewError, require};
use crate::models::{
    common::LinkT,
    service::{ParameterDefT, ReferenceT, ServiceStatusRT, WorkflowT},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatusRTView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ParameterDefT>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<ReferenceT>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowT>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<LinkT>>,
}

pub fn project(res: &ServiceStatusRT, view: View) -> ServiceStatusRTView {
    let tiny = ServiceStatusRTView {
        id: Some(res.id.clone()),
        name: res.name.clone(),
        status: Some(res.status.clone()),
        ..Default::default()
    };
    match view {
        View::Tiny => tiny,
        View::Default => ServiceStatusRTView {
            description: res.description.clone(),
            banner: res.banner.clone(),
            tags: Some(res.tags.clone()),
            parameters: Some(res.parameters.clone()),
            references: Some(res.references.clone()),
            workflow: res.workflow.clone(),
            policy: res.policy.clone(),
            account: res.account.clone(),
            published_at: res.published_at.clone(),
            links: Some(res.links.clone()),
            ..tiny
        },
    }
}

impl ServiceStatusRTView {
    pub fn validate(&self, view: View) -> Result<(), ViewError> {
        require(&self.id, view, "id")?;
        require(&self.status, view, "status")?;
        if view == View::Default {
            require(&self.parameters, view, "parameters")?;
            require(&self.links, view, "links")?;
        }
        Ok(())
    }

    pub fn into_result(self) -> ServiceStatusRT {
        ServiceStatusRT {
            id: self.id.unwrap_or_default(),
            name: self.name,
            description: self.description,
            banner: self.banner,
            status: self.status.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            parameters: self.parameters.unwrap_or_default(),
            references: self.references.unwrap_or_default(),
            workflow: self.workflow,
            policy: self.policy,
            account: self.account,
            published_at: self.published_at,
            links: self.links.unwrap_or_default(),
        }
    }
}
