use serde::{Deserialize, Serialize};

use crate::error::{CmisError, Result};

/// Access control entry: a principal and the permissions granted to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    pub principal_id: String,
    pub permissions: Vec<String>,
    /// False when the entry is inherited rather than set on the object itself.
    #[serde(default = "direct_default")]
    pub direct: bool,
}

fn direct_default() -> bool {
    true
}

impl Ace {
    pub fn new(principal_id: impl Into<String>, permissions: Vec<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            permissions,
            direct: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Acl {
    pub aces: Vec<Ace>,
    pub exact: Option<bool>,
}

impl Acl {
    /// Compute the ACL resulting from removing `remove` then adding `add`.
    ///
    /// Only direct entries are carried over. Removing a permission the
    /// principal does not hold is a no-op; entries left without permissions
    /// are dropped. Used by bindings that can only replace a whole ACL.
    pub fn merged(&self, add: &[Ace], remove: &[Ace]) -> Acl {
        let mut aces: Vec<Ace> = self.aces.iter().filter(|a| a.direct).cloned().collect();

        for removal in remove {
            if let Some(ace) = aces
                .iter_mut()
                .find(|a| a.principal_id == removal.principal_id)
            {
                ace.permissions.retain(|p| !removal.permissions.contains(p));
            }
        }
        aces.retain(|a| !a.permissions.is_empty());

        for addition in add {
            match aces
                .iter_mut()
                .find(|a| a.principal_id == addition.principal_id)
            {
                Some(ace) => {
                    for permission in &addition.permissions {
                        if !ace.permissions.contains(permission) {
                            ace.permissions.push(permission.clone());
                        }
                    }
                }
                None => aces.push(Ace {
                    principal_id: addition.principal_id.clone(),
                    permissions: addition.permissions.clone(),
                    direct: true,
                }),
            }
        }

        Acl { aces, exact: None }
    }
}

/// How ACL changes propagate to dependent objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclPropagation {
    #[default]
    RepositoryDetermined,
    ObjectOnly,
    Propagate,
}

impl AclPropagation {
    pub fn wire(&self) -> &'static str {
        match self {
            AclPropagation::RepositoryDetermined => "repositorydetermined",
            AclPropagation::ObjectOnly => "objectonly",
            AclPropagation::Propagate => "propagate",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "repositorydetermined" => Ok(Self::RepositoryDetermined),
            "objectonly" => Ok(Self::ObjectOnly),
            "propagate" => Ok(Self::Propagate),
            other => Err(CmisError::InvalidArgument(format!(
                "unknown ACL propagation '{}'",
                other
            ))),
        }
    }
}
