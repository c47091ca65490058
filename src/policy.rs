//! Role-based command policy
//!
//! A flat declarative table: users map to roles, roles map to command lists.
//! Loaded from YAML; when no policy file exists, a built-in default table is
//! used. The check itself is a pure, stateless predicate — the storage core
//! only learns ALLOW or DENY.
//!
//! ```yaml
//! users:
//!   root: admin
//!   backup-op: operator
//! roles:
//!   admin: [init, backup, list, verify, restore, audit-verify, audit-show]
//!   operator: [backup, list, verify, restore, audit-verify, audit-show]
//!   auditor: [list, verify, audit-verify, audit-show]
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// The declarative policy table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// User name to role name
    pub users: BTreeMap<String, String>,
    /// Role name to allowed commands
    pub roles: BTreeMap<String, Vec<String>>,
}

impl Default for Policy {
    /// Built-in table used when no policy file is present: `root` and
    /// `admin` hold the admin role; the three standard roles are defined.
    fn default() -> Self {
        let all = [
            "init",
            "backup",
            "list",
            "verify",
            "restore",
            "audit-verify",
            "audit-show",
        ];
        let mut users = BTreeMap::new();
        users.insert("root".to_string(), "admin".to_string());
        users.insert("admin".to_string(), "admin".to_string());

        let mut roles = BTreeMap::new();
        roles.insert(
            "admin".to_string(),
            all.iter().map(|s| s.to_string()).collect(),
        );
        roles.insert(
            "operator".to_string(),
            all.iter().skip(1).map(|s| s.to_string()).collect(),
        );
        roles.insert(
            "auditor".to_string(),
            vec![
                "list".to_string(),
                "verify".to_string(),
                "audit-verify".to_string(),
                "audit-show".to_string(),
            ],
        );

        Self { users, roles }
    }
}

impl Policy {
    /// Parse a policy table from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a policy from a file, falling back to the default table when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no policy file at {:?}, using default table", path);
            return Ok(Policy::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Pure permission predicate: is `user` allowed to run `command`?
    ///
    /// Unknown users, unknown roles and unlisted commands all deny.
    pub fn allow(&self, user: &str, command: &str) -> bool {
        self.users
            .get(user)
            .and_then(|role| self.roles.get(role))
            .map(|commands| commands.iter().any(|c| c == command))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_roles() {
        let policy = Policy::default();
        assert!(policy.allow("root", "init"));
        assert!(policy.allow("root", "backup"));
        assert!(policy.allow("admin", "audit-verify"));
    }

    #[test]
    fn test_unknown_user_denied() {
        let policy = Policy::default();
        assert!(!policy.allow("mallory", "backup"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
users:
  root: admin
  viewer: auditor
roles:
  admin: [init, backup, list, verify, restore, audit-verify]
  auditor: [list, verify, audit-verify]
"#;
        let policy = Policy::from_yaml(yaml).unwrap();
        assert!(policy.allow("viewer", "list"));
        assert!(!policy.allow("viewer", "backup"));
        assert!(!policy.allow("viewer", "restore"));
        assert!(policy.allow("root", "restore"));
    }

    #[test]
    fn test_user_with_undefined_role_denied() {
        let yaml = r#"
users:
  ghost: phantom
roles:
  admin: [init]
"#;
        let policy = Policy::from_yaml(yaml).unwrap();
        assert!(!policy.allow("ghost", "init"));
    }

    #[test]
    fn test_load_missing_file_uses_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let policy = Policy::load(&dir.path().join("policy.yaml")).unwrap();
        assert!(policy.allow("root", "backup"));
    }
}
