use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of side effect an approval covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    Shell,
    FileWrite,
    NetworkAccess,
}

impl ApprovalKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::FileWrite => "file_write",
            Self::NetworkAccess => "network_access",
        }
    }
}

/// Request handed to an approval callback for one gated tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    #[serde(rename = "type")]
    pub kind: ApprovalKind,
    /// Tool name and arguments of the gated call.
    pub details: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ApprovalKind, ApprovalRequest};

    #[test]
    fn kind_serializes_under_type() {
        let request = ApprovalRequest {
            kind: ApprovalKind::FileWrite,
            details: json!({"tool": "write_file"}),
            context: None,
        };

        assert_eq!(
            serde_json::to_value(&request).expect("request should serialize"),
            json!({"type": "file_write", "details": {"tool": "write_file"}})
        );
        assert_eq!(ApprovalKind::NetworkAccess.as_str(), "network_access");
    }
}
