//! View projection for result types that support more than one view.
//!
//! A "viewed" type has every field optional. Projecting copies the fields
//! whitelisted by a view; validating checks that the fields a view requires
//! are present; converting back fills in what the view left out.

pub mod artifact;
pub mod service;

use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Default,
    Tiny,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Default => "default",
            View::Tiny => "tiny",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(View::Default),
            "tiny" => Ok(View::Tiny),
            other => Err(ServiceError::invalid_parameter(
                "view",
                Some(other),
                "must be one of default, tiny",
            )),
        }
    }
}

/// A field required by the view was absent from the viewed body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}` is required by the `{view}` view")]
pub struct ViewError {
    pub view: View,
    pub field: &'static str,
}

pub(crate) fn require<T>(
    value: &Option<T>,
    view: View,
    field: &'static str,
) -> Result<(), ViewError> {
    match value {
        Some(_) => Ok(()),
        None => Err(ViewError { view, field }),
    }
}
