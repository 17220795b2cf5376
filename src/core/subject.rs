//! Caller identity and attributes used for audience filtering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attributes consulted by audience criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAttributes {
    #[serde(default)]
    pub role: Option<String>,
    /// Free-form attributes; carried for callers, not consulted by bucketing.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl SubjectAttributes {
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            extra: BTreeMap::new(),
        }
    }
}

/// Who is asking: an authenticated user, an anonymous session, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub attributes: SubjectAttributes,
}

/// A resolved identity for one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Stable bucketing key: user id, else session id
    pub id: String,
    /// Session scope for events: session id, else the user id
    pub session_id: String,
}

impl SubjectContext {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.attributes.role = Some(role.into());
        self
    }

    /// Resolve the identity, or `None` for a fully anonymous caller.
    ///
    /// Blank ids count as absent. No identity is ever generated here.
    pub fn resolve(&self) -> Option<Subject> {
        let user = non_blank(self.user_id.as_deref());
        let session = non_blank(self.session_id.as_deref());
        let id = user.or(session)?;
        Some(Subject {
            id: id.to_string(),
            session_id: session.unwrap_or(id).to_string(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
