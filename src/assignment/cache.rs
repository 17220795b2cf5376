//! Per-session assignment cache.
//!
//! Owned by the caller and passed into each request; it never outlives the
//! session it was created for and is never shared between sessions.

use std::collections::HashMap;

use crate::core::Variant;

/// A remembered assignment for one `(test, subject)` within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAssignment {
    pub test_id: String,
    pub subject_id: String,
    /// `None` when the subject was excluded by the audience
    pub variant: Option<Variant>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionAssignments {
    session_id: Option<String>,
    entries: HashMap<(String, String), CachedAssignment>,
}

impl SessionAssignments {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            entries: HashMap::new(),
        }
    }

    /// A cache for a caller that has no session identity yet.
    pub fn unscoped() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn get(&self, test_name: &str, subject_id: &str) -> Option<&CachedAssignment> {
        self.entries
            .get(&(test_name.to_string(), subject_id.to_string()))
    }

    /// Remember an assignment. Returns `true` if this is the first one for
    /// the `(test, subject)` pair in this session.
    pub fn insert(&mut self, test_name: &str, entry: CachedAssignment) -> bool {
        let key = (test_name.to_string(), entry.subject_id.clone());
        self.entries.insert(key, entry).is_none()
    }

    /// Forget one test, e.g. after it completed.
    pub fn invalidate(&mut self, test_name: &str) {
        self.entries.retain(|(name, _), _| name != test_name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
