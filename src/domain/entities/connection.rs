use serde::{Deserialize, Serialize};

/// One external exchange account. Owned by configuration storage; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub active: bool,
    #[serde(default)]
    pub live_trading: bool,
}

impl Connection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            active: true,
            live_trading: false,
        }
    }

    /// Why `start_all` passes this connection by, if it does.
    pub fn skip_reason(&self) -> Option<&'static str> {
        match (self.enabled, self.active) {
            (true, true) => None,
            (false, _) => Some("connection disabled"),
            (true, false) => Some("connection inactive"),
        }
    }
}
