//! Views of [`ArtifactStatusRT`]: `default` (everything) and `tiny`
//! (`id`, `name`, `status`).

use super::{View, ViewError, require};
use crate::models::{artifact::ArtifactStatusRT, common::LinkT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactStatusRTView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<LinkT>>,
}

pub fn project(res: &ArtifactStatusRT, view: View) -> ArtifactStatusRTView {
    match view {
        View::Tiny => ArtifactStatusRTView {
            id: Some(res.id.clone()),
            name: res.name.clone(),
            status: Some(res.status.clone()),
            ..Default::default()
        },
        View::Default => ArtifactStatusRTView {
            id: Some(res.id.clone()),
            name: res.name.clone(),
            status: Some(res.status.clone()),
            mime_type: res.mime_type.clone(),
            size: res.size,
            etag: res.etag.clone(),
            collection: res.collection.clone(),
            policy: res.policy.clone(),
            account: res.account.clone(),
            created_at: res.created_at.clone(),
            last_modified_at: res.last_modified_at.clone(),
            data_href: res.data_href.clone(),
            links: Some(res.links.clone()),
        },
    }
}

impl ArtifactStatusRTView {
    pub fn validate(&self, view: View) -> Result<(), ViewError> {
        require(&self.id, view, "id")?;
        require(&self.status, view, "status")?;
        if view == View::Default {
            require(&self.links, view, "links")?;
        }
        Ok(())
    }

    /// Convert back into the full result; fields outside the view stay empty.
    pub fn into_result(self) -> ArtifactStatusRT {
        ArtifactStatusRT {
            id: self.id.unwrap_or_default(),
            name: self.name,
            status: self.status.unwrap_or_default(),
            mime_type: self.mime_type,
            size: self.size,
            etag: self.etag,
            collection: self.collection,
            policy: self.policy,
            account: self.account,
            created_at: self.created_at,
            last_modified_at: self.last_modified_at,
            data_href: self.data_href,
            links: self.links.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> ArtifactStatusRT {
        ArtifactStatusRT {
            id: "0f8c7e4e-0000-4000-8000-000000000001".into(),
            name: Some("scan.png".into()),
            status: "ready".into(),
            mime_type: Some("image/png".into()),
            size: Some(42),
            etag: Some("abc".into()),
            collection: None,
            policy: None,
            account: Some("alice".into()),
            created_at: Some("2024-01-01T00:00:00Z".into()),
            last_modified_at: Some("2024-01-01T00:00:00Z".into()),
            data_href: Some("http://h/1/artifacts/x/blob".into()),
            links: vec![LinkT::new("self", "application/json", "http://h/1/artifacts/x")],
        }
    }

    #[test]
    fn tiny_view_keeps_only_whitelisted_fields() {
        let viewed = project(&status(), View::Tiny);
        assert_eq!(viewed.id.as_deref(), Some("0f8c7e4e-0000-4000-8000-000000000001"));
        assert_eq!(viewed.status.as_deref(), Some("ready"));
        assert!(viewed.size.is_none());
        assert!(viewed.links.is_none());
        let json = serde_json::to_value(&viewed).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn default_view_is_lossless() {
        let full = status();
        let back = project(&full, View::Default).into_result();
        assert_eq!(back, full);
    }

    #[test]
    fn tiny_body_fails_default_validation() {
        let viewed = project(&status(), View::Tiny);
        assert!(viewed.validate(View::Tiny).is_ok());
        let err = viewed.validate(View::Default).unwrap_err();
        assert_eq!(err.field, "links");
    }

    #[test]
    fn missing_id_fails_every_view() {
        let viewed = ArtifactStatusRTView {
            status: Some("ready".into()),
            ..Default::default()
        };
        assert_eq!(viewed.validate(View::Tiny).unwrap_err().field, "id");
    }
}
