use serde::Serialize;
use std::collections::BTreeSet;

/// Capability token that lets a principal see dotfiles.
pub const SEE_HIDDEN: &str = "see-hidden";

const LEGACY_SEE_HIDDEN: &str = "!see_hidden";

/// Capability tokens parsed once from a comma-separated group list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    primary: Option<String>,
    tokens: BTreeSet<String>,
}

impl Capabilities {
    pub fn parse(groups: &str) -> Self {
        let mut primary = None;
        let mut tokens = BTreeSet::new();
        for raw in groups.split(',') {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            if primary.is_none() {
                primary = Some(token.to_string());
            }
            let token = if token == LEGACY_SEE_HIDDEN { SEE_HIDDEN } else { token };
            tokens.insert(token.to_string());
        }
        Self { primary, tokens }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    /// The first listed group, as written.
    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}

/// An authenticated actor with the grant snapshot read for this request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub identity: String,
    pub capabilities: Capabilities,
    /// Union of the principal's private-folder grants.
    pub folders: BTreeSet<String>,
}

impl Principal {
    pub fn new(identity: impl Into<String>, capabilities: Capabilities, folders: BTreeSet<String>) -> Self {
        Self {
            identity: identity.into(),
            capabilities,
            folders,
        }
    }

    pub fn sees_hidden(&self) -> bool {
        self.capabilities.contains(SEE_HIDDEN)
    }

    pub fn has_folder(&self, folder: &str) -> bool {
        self.folders.contains(folder)
    }
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub username: String,
    pub group: Option<String>,
    pub folders: Vec<String>,
}

impl From<&Principal> for WhoAmI {
    fn from(principal: &Principal) -> Self {
        Self {
            username: principal.identity.clone(),
            group: principal.capabilities.primary().map(str::to_string),
            folders: principal.folders.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_group_list() {
        let caps = Capabilities::parse(" family, ,see-hidden,friends ");
        assert_eq!(caps.primary(), Some("family"));
        assert!(caps.contains("friends"));
        assert!(caps.contains(SEE_HIDDEN));
        assert_eq!(caps.iter().count(), 3);
    }

    #[test]
    fn accepts_legacy_hidden_token() {
        let caps = Capabilities::parse("admins,!see_hidden");
        assert!(caps.contains(SEE_HIDDEN));
    }

    #[test]
    fn primary_group_keeps_legacy_spelling() {
        let caps = Capabilities::parse("!see_hidden,family");
        assert_eq!(caps.primary(), Some("!see_hidden"));
        assert!(caps.contains(SEE_HIDDEN));
        assert!(!caps.contains("!see_hidden"));

        let principal = Principal::new("bob", caps, BTreeSet::new());
        assert_eq!(WhoAmI::from(&principal).group.as_deref(), Some("!see_hidden"));
    }

    #[test]
    fn empty_groups() {
        let caps = Capabilities::parse("");
        assert_eq!(caps.primary(), None);
        assert!(!caps.contains(SEE_HIDDEN));
    }
}
