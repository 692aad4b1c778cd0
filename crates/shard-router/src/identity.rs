//! Canonical backend server identity.

use std::fmt;

/// Identity of one backend server replica.
///
/// Renders as `{group_id:09}.{server_name}.{server_id:09}`. The rendered form
/// is the connection registry key and the hash ring node for the server.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ServerIdentity {
    /// Group the server belongs to.
    pub group_id: u32,
    /// Logical server name.
    pub server_name: String,
    /// Server id within the group.
    pub server_id: u32,
}

impl ServerIdentity {
    /// Creates a new server identity.
    pub fn new(group_id: u32, server_name: impl Into<String>, server_id: u32) -> Self {
        Self {
            group_id,
            server_name: server_name.into(),
            server_id,
        }
    }

    /// Returns the canonical node string for this identity.
    #[must_use]
    pub fn to_node(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:09}.{}.{:09}",
            self.group_id, self.server_name, self.server_id
        )
    }
}
