use serde::{Deserialize, Serialize};

/// What a caller is allowed to do in general, independent of ownership of
/// any particular record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Read records
    View,
    /// Create records and mutate shared entities
    Edit,
    /// Everything, regardless of ownership
    Admin,
}

/// Identity of the user on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    username: String,
    capabilities: Vec<Capability>,
}

impl Caller {
    pub fn new(username: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            username: username.into(),
            capabilities,
        }
    }

    /// A signed-on contributor: may view and edit.
    pub fn editor(username: impl Into<String>) -> Self {
        Self::new(username, vec![Capability::View, Capability::Edit])
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self::new(username, vec![Capability::Admin])
    }

    /// Visitor who has not signed on.
    pub fn anonymous() -> Self {
        Self::new("", vec![Capability::View])
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&Capability::Admin) || self.capabilities.contains(&capability)
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.capabilities.contains(&Capability::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_has_everything() {
        let admin = Caller::admin("master");
        assert!(admin.has(Capability::View));
        assert!(admin.has(Capability::Edit));
        assert!(admin.is_admin());
    }

    #[test]
    fn test_editor() {
        let editor = Caller::editor("jcobban");
        assert!(editor.has(Capability::Edit));
        assert!(!editor.has(Capability::Admin));
        assert!(!editor.is_anonymous());
    }

    #[test]
    fn test_anonymous_can_only_view() {
        let visitor = Caller::anonymous();
        assert!(visitor.is_anonymous());
        assert!(visitor.has(Capability::View));
        assert!(!visitor.has(Capability::Edit));
    }
}
