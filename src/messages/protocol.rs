//! Protocol numbers and endpoint roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An ETP sub-protocol number as carried in the message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Protocol(pub u32);

impl Protocol {
    pub const CORE: Protocol = Protocol(0);
    pub const CHANNEL_STREAMING: Protocol = Protocol(1);
    pub const CHANNEL_DATA_FRAME: Protocol = Protocol(2);
    pub const DISCOVERY: Protocol = Protocol(3);
    pub const STORE: Protocol = Protocol(4);
    pub const STORE_NOTIFICATION: Protocol = Protocol(5);
    pub const GROWING_OBJECT: Protocol = Protocol(6);

    pub const fn id(self) -> u32 {
        self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "Core",
            1 => "ChannelStreaming",
            2 => "ChannelDataFrame",
            3 => "Discovery",
            4 => "Store",
            5 => "StoreNotification",
            6 => "GrowingObject",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// One side of a protocol interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
    Customer,
    Store,
    Producer,
    Consumer,
}

impl Role {
    pub const fn counterpart(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
            Role::Customer => Role::Store,
            Role::Store => Role::Customer,
            Role::Producer => Role::Consumer,
            Role::Consumer => Role::Producer,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
            Role::Customer => "customer",
            Role::Store => "store",
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "server" => Ok(Role::Server),
            "customer" => Ok(Role::Customer),
            "store" => Ok(Role::Store),
            "producer" => Ok(Role::Producer),
            "consumer" => Ok(Role::Consumer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counterpart_is_an_involution() {
        for role in [
            Role::Client,
            Role::Server,
            Role::Customer,
            Role::Store,
            Role::Producer,
            Role::Consumer,
        ] {
            assert_eq!(role.counterpart().counterpart(), role);
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn protocol_display_includes_number() {
        assert_eq!(Protocol::DISCOVERY.to_string(), "Discovery(3)");
        assert_eq!(Protocol(42).to_string(), "Unknown(42)");
    }
}
