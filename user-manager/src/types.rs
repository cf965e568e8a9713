use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key of the `users` table.
pub type UserId = i64;

/// Logical database holding the user accounts.
pub const USERS_DB: &str = "users";

/// Which physical target of a logical database a connection is routed to.
///
/// Writes (and reads that must observe their own writes) go to [`ConnectionRole::Primary`];
/// listing and search go to [`ConnectionRole::ReadOnly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    #[serde(alias = "master")]
    Primary,
    #[serde(alias = "replica")]
    ReadOnly,
}

impl ConnectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Primary => "primary",
            ConnectionRole::ReadOnly => "read_only",
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" | "master" => Ok(ConnectionRole::Primary),
            "read_only" | "replica" => Ok(ConnectionRole::ReadOnly),
            other => Err(format!("unknown connection role '{other}', expected primary or read_only")),
        }
    }
}

/// The `(database name, role)` pair that identifies exactly one engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionIdentity {
    name: String,
    role: ConnectionRole,
}

impl ConnectionIdentity {
    pub fn new(name: impl Into<String>, role: ConnectionRole) -> Self {
        Self { name: name.into(), role }
    }

    pub fn primary(name: impl Into<String>) -> Self {
        Self::new(name, ConnectionRole::Primary)
    }

    pub fn read_only(name: impl Into<String>) -> Self {
        Self::new(name, ConnectionRole::ReadOnly)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.role)
    }
}

/// Strip credentials from a connection URI so it can be logged.
pub fn redact_uri(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable uri>".to_string(),
    }
}
