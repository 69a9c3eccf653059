//! Layer enum shared by both services' wire types.
//!
//! `Layer` is the Rust stand-in for the original's proto `Layer` enum —
//! since this workspace's RPC surface is JSON over `axum` rather than
//! protobuf, the wire representation is just the lowercase string, but the
//! type still exists separately from a bare `String` so invalid layer
//! values are rejected at deserialization instead of drifting into the
//! executor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bronze" => Some(Layer::Bronze),
            "silver" => Some(Layer::Silver),
            "gold" => Some(Layer::Gold),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for layer in [Layer::Bronze, Layer::Silver, Layer::Gold] {
            assert_eq!(Layer::parse(layer.as_str()), Some(layer));
        }
    }

    #[test]
    fn rejects_unknown_layer_string() {
        assert_eq!(Layer::parse("platinum"), None);
    }
}
