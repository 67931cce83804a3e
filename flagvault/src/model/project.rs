//! Projects, environments and project-level membership.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Role granted to a member at project level.
///
/// Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    /// Can read every config in the project.
    Viewer,
    /// Edits values of every config in the project.
    Maintainer,
    /// Full control over the project and its configs.
    Admin,
}

impl ProjectRole {
    /// Returns the stored representation of this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Maintainer => "maintainer",
            Self::Admin => "admin",
        }
    }

    /// Parses a stored role.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown roles.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "viewer" => Ok(Self::Viewer),
            "maintainer" => Ok(Self::Maintainer),
            // Some older records call the top role "owner".
            "admin" | "owner" => Ok(Self::Admin),
            other => Err(Error::validation(
                "role",
                format!("unknown project role '{other}'"),
            )),
        }
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A project: the container of configs, environments and members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Whether config changes must go through proposals.
    pub require_proposals: bool,
    /// Whether a proposer may approve their own proposal.
    pub allow_self_approvals: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last settings change.
    pub updated_at: DateTime<Utc>,
}

/// A named deployment stage within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Environment id.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Display name, unique per project.
    pub name: String,
    /// Sort position within the project.
    pub position: i64,
    /// Stricter-than-project proposal requirement.
    pub require_proposals: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Environment {
    /// Returns true if direct edits in this environment are disallowed.
    #[must_use]
    pub fn requires_proposals(&self, project: &Project) -> bool {
        project.require_proposals || self.require_proposals
    }
}

/// A project member and their role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMember {
    /// Normalized member email.
    pub email: String,
    /// Granted role.
    pub role: ProjectRole,
}
