use serde::{Deserialize, Serialize};

// Backend identifiers are opaque strings; the client never parses them.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First eight characters, for log lines.
            pub fn short(&self) -> &str {
                let end = self
                    .0
                    .char_indices()
                    .nth(8)
                    .map(|(i, _)| i)
                    .unwrap_or(self.0.len());
                &self.0[..end]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
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
    };
}

string_id!(
    /// Identity of a conversation as assigned by the backend.
    ConversationId
);
string_id!(
    /// Identity of a message as assigned by the backend.
    MessageId
);
string_id!(
    /// Identity of a staff member / user account.
    UserId
);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Direct,
    Group,
    Emergency,
}

impl ConversationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    File,
    Emergency,
    Handover,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let id = ConversationId::new("conv-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conv-1\"");
        let back: ConversationId = serde_json::from_str("\"conv-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_short_handles_short_and_multibyte_ids() {
        assert_eq!(UserId::new("abc").short(), "abc");
        assert_eq!(UserId::new("0123456789abcdef").short(), "01234567");
        assert_eq!(UserId::new("ééééééééé").short(), "éééééééé");
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConversationType::Emergency).unwrap(),
            "\"emergency\""
        );
        let t: MessageType = serde_json::from_str("\"handover\"").unwrap();
        assert_eq!(t, MessageType::Handover);
    }
}
