//! Permission checks for mutating operations.
//!
//! A missing permission never surfaces as an error: [`authorize`] returns
//! [`Access::LoginRequired`] carrying the location the caller wanted, so the
//! front end can send the user to log in and come back.

use crate::types::User;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Location of the login page that denied requests are redirected to.
pub const LOGIN_PATH: &str = "/account/login/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    ManageProducts,
    ManageEnvironments,
    ManageCases,
    ManageRuns,
    ManageUsers,
    Execute,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::ManageProducts,
        Permission::ManageEnvironments,
        Permission::ManageCases,
        Permission::ManageRuns,
        Permission::ManageUsers,
        Permission::Execute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageProducts => "manage-products",
            Permission::ManageEnvironments => "manage-environments",
            Permission::ManageCases => "manage-cases",
            Permission::ManageRuns => "manage-runs",
            Permission::ManageUsers => "manage-users",
            Permission::Execute => "execute",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission: {s}"))
    }
}

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    LoginRequired { next: String },
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted)
    }

    /// Login location including the `next` parameter, if access was denied.
    pub fn redirect(&self) -> Option<String> {
        match self {
            Access::Granted => None,
            Access::LoginRequired { next } => Some(format!("{LOGIN_PATH}?next={next}")),
        }
    }
}

/// Check that `user` holds `permission`; anonymous users are always sent to login.
pub fn authorize(user: Option<&User>, permission: Permission, next: &str) -> Access {
    match user {
        Some(user) if user.has_permission(permission) => Access::Granted,
        _ => {
            tracing::debug!(
                user = user.map(|u| u.username.as_str()).unwrap_or("<anonymous>"),
                %permission,
                "permission check failed"
            );
            Access::LoginRequired {
                next: next.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_with_permission() {
        let user = User::new("admin").with_permission(Permission::ManageProducts);
        assert!(authorize(Some(&user), Permission::ManageProducts, "/manage/products/").is_granted());
    }

    #[test]
    fn test_missing_permission_redirects_to_login() {
        let user = User::new("tester");
        let access = authorize(Some(&user), Permission::ManageProducts, "/manage/product/add/");
        assert_eq!(
            access.redirect().as_deref(),
            Some("/account/login/?next=/manage/product/add/")
        );
    }

    #[test]
    fn test_anonymous_redirects_to_login() {
        let access = authorize(None, Permission::Execute, "run");
        assert_eq!(
            access,
            Access::LoginRequired {
                next: "run".to_string()
            }
        );
    }

    #[test]
    fn test_permission_round_trips_through_str() {
        for permission in Permission::ALL {
            assert_eq!(permission.as_str().parse::<Permission>(), Ok(permission));
        }
        assert!("manage-everything".parse::<Permission>().is_err());
    }
}
