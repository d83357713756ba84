//! Roles and capabilities

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of staff roles carried in the access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// Something a role may do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "replacement:read")]
    ReplacementRead,
    #[serde(rename = "replacement:write")]
    ReplacementWrite,
    #[serde(rename = "ledger:read")]
    LedgerRead,
    #[serde(rename = "ledger:write")]
    LedgerWrite,
    #[serde(rename = "invoice:create")]
    InvoiceCreate,
    #[serde(rename = "invoice:delete")]
    InvoiceDelete,
    #[serde(rename = "catalog:read")]
    CatalogRead,
    #[serde(rename = "catalog:write")]
    CatalogWrite,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::ReplacementRead,
        Capability::ReplacementWrite,
        Capability::LedgerRead,
        Capability::LedgerWrite,
        Capability::InvoiceCreate,
        Capability::InvoiceDelete,
        Capability::CatalogRead,
        Capability::CatalogWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReplacementRead => "replacement:read",
            Capability::ReplacementWrite => "replacement:write",
            Capability::LedgerRead => "ledger:read",
            Capability::LedgerWrite => "ledger:write",
            Capability::InvoiceCreate => "invoice:create",
            Capability::InvoiceDelete => "invoice:delete",
            Capability::CatalogRead => "catalog:read",
            Capability::CatalogWrite => "catalog:write",
        }
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str() == s)
            .ok_or_else(|| format!("unknown capability: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionTableError {
    #[error("unknown role in permission table: {0}")]
    UnknownRole(String),

    #[error("unknown capability {capability} for role {role}")]
    UnknownCapability { role: String, capability: String },
}

/// Role to capability mapping, loaded from configuration at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissions {
    grants: HashMap<Role, HashSet<Capability>>,
}

impl Default for RolePermissions {
    fn default() -> Self {
        let read_only = [
            Capability::ReplacementRead,
            Capability::LedgerRead,
            Capability::CatalogRead,
        ];
        let manager = Capability::ALL
            .into_iter()
            .filter(|cap| *cap != Capability::InvoiceDelete);

        Self {
            grants: HashMap::from([
                (Role::Admin, Capability::ALL.into_iter().collect()),
                (Role::Manager, manager.collect()),
                (Role::Staff, read_only.into_iter().collect()),
            ]),
        }
    }
}

impl RolePermissions {
    /// Build from a `role name -> [capability name]` table. Roles missing from
    /// the table get no capabilities.
    pub fn from_table(table: &HashMap<String, Vec<String>>) -> Result<Self, PermissionTableError> {
        let mut grants = HashMap::new();
        for (role_name, capabilities) in table {
            let role: Role = role_name
                .parse()
                .map_err(|_| PermissionTableError::UnknownRole(role_name.clone()))?;
            let caps = capabilities
                .iter()
                .map(|name| {
                    name.parse::<Capability>()
                        .map_err(|_| PermissionTableError::UnknownCapability {
                            role: role_name.clone(),
                            capability: name.clone(),
                        })
                })
                .collect::<Result<HashSet<_>, _>>()?;
            grants.insert(role, caps);
        }
        Ok(Self { grants })
    }

    pub fn allows(&self, role: Role, capability: Capability) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|caps| caps.contains(&capability))
    }
}
