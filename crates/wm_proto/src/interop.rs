//! Server-to-server bodies for `/interop`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ProtoError;

pub const INTEROP_PATH: &str = "/interop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteropMethod {
    GetRecipient,
    SendMessage,
}

impl InteropMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetRecipient => "getRecipient",
            Self::SendMessage => "sendMessage",
        }
    }
}

impl FromStr for InteropMethod {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "getRecipient" => Ok(Self::GetRecipient),
            "sendMessage" => Ok(Self::SendMessage),
            other => Err(ProtoError::validation(format!("unsupported interop method {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteropRequest {
    pub method: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl InteropRequest {
    pub fn new(method: InteropMethod, payload: serde_json::Value) -> Self {
        Self { method: method.as_str().to_string(), payload }
    }

    pub fn method(&self) -> Result<InteropMethod, ProtoError> {
        if self.payload.is_null() {
            return Err(ProtoError::validation("missing payload"));
        }
        self.method.parse()
    }
}

/// `getRecipient` payload: the bare username on the receiving server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteropGetRecipient {
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_method_and_missing_payload() {
        let req = InteropRequest { method: "deregister".into(), payload: serde_json::json!({}) };
        assert!(req.method().is_err());

        let req = InteropRequest { method: "getRecipient".into(), payload: serde_json::Value::Null };
        assert!(req.method().is_err());

        let req = InteropRequest::new(InteropMethod::SendMessage, serde_json::json!({}));
        assert_eq!(req.method().unwrap(), InteropMethod::SendMessage);
    }
}
