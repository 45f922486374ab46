//! Human-readable identifiers.
//!
//! The game keys everything by HRID: an opaque `/scope/name` token such as
//! `/items/cheese_sword` or `/actions/combat/chimerical_den`. HRIDs are
//! never parsed for meaning; they are compared, hashed, and displayed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed HRID wrapper around a string token
macro_rules! define_hrid {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string-like token
            pub fn new(token: impl Into<String>) -> Self {
                Self(token.into())
            }

            /// The raw token
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Last path segment of the token, e.g. `cheese_sword` for
            /// `/items/cheese_sword`. Falls back to the whole token when
            /// there is no separator.
            pub fn leaf(&self) -> &str {
                self.0.rsplit('/').next().unwrap_or(&self.0)
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_hrid!(ItemHrid);
define_hrid!(ActionHrid);
define_hrid!(SkillHrid);
define_hrid!(AbilityHrid);
define_hrid!(HouseRoomHrid);
define_hrid!(BuffHrid);

impl ItemHrid {
    /// The coin item. Priced 1/1 unconditionally by the market cache.
    pub fn coin() -> Self {
        Self::new("/items/coin")
    }

    pub fn is_coin(&self) -> bool {
        self.0 == "/items/coin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_segment() {
        let hrid = ItemHrid::new("/items/cheese_sword");
        assert_eq!(hrid.leaf(), "cheese_sword");

        let bare = ItemHrid::new("cheese");
        assert_eq!(bare.leaf(), "cheese");
    }

    #[test]
    fn test_coin_sentinel() {
        assert!(ItemHrid::coin().is_coin());
        assert!(!ItemHrid::new("/items/cheese").is_coin());
    }

    #[test]
    fn test_serde_transparent() {
        let hrid = ActionHrid::new("/actions/combat/chimerical_den");
        let json = serde_json::to_string(&hrid).expect("serialize");
        assert_eq!(json, "\"/actions/combat/chimerical_den\"");
        let back: ActionHrid = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, hrid);
    }
}
