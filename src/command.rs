// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Caller-facing method calls.
//!
//! A UI bridge sends named calls with JSON arguments and gets back either a
//! JSON value or an error code and message.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::session::SessionManager;

/// The four supported methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GetPairedDevices,
    Connect,
    Disconnect,
    Send,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "getPairedDevices" => Some(Self::GetPairedDevices),
            "connect" => Some(Self::Connect),
            "disconnect" => Some(Self::Disconnect),
            "send" => Some(Self::Send),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetPairedDevices => "getPairedDevices",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Send => "send",
        }
    }
}

/// A named call with its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,

    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json.trim())?)
    }

    fn string_arg(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(Value::as_str)
    }
}

/// Error half of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: String,
    pub message: String,
}

impl ErrorReply {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    fn not_implemented(method: &str) -> Self {
        Self::new("NOT_IMPLEMENTED", format!("Method '{}' is not implemented", method))
    }
}

impl From<SessionError> for ErrorReply {
    fn from(e: SessionError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

/// Serialized reply: `{"ok": value}` or `{"error": {"code", "message"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok(Value),
    Error(ErrorReply),
}

impl From<Result<Value, ErrorReply>> for Response {
    fn from(result: Result<Value, ErrorReply>) -> Self {
        match result {
            Ok(value) => Response::Ok(value),
            Err(e) => Response::Error(e),
        }
    }
}

/// Run one call against the session and wait for its outcome.
pub async fn dispatch(session: &SessionManager, call: &MethodCall) -> Result<Value, ErrorReply> {
    let Some(method) = Method::parse(&call.method) else {
        warn!("Unknown method: {}", call.method);
        return Err(ErrorReply::not_implemented(&call.method));
    };
    debug!("Dispatching {}", method.as_str());

    match method {
        Method::GetPairedDevices => {
            let devices = session.list_devices().await?;
            serde_json::to_value(devices)
                .map_err(|e| ErrorReply::new("INTERNAL_ERROR", e.to_string()))
        }
        Method::Connect => {
            let address = call.string_arg("address").ok_or_else(|| {
                ErrorReply::from(SessionError::InvalidArgument(
                    "Address cannot be null".to_string(),
                ))
            })?;
            session.connect(address).await?;
            Ok(Value::Bool(true))
        }
        Method::Disconnect => {
            session.disconnect();
            Ok(Value::Null)
        }
        Method::Send => {
            let data = call.string_arg("data").ok_or_else(|| {
                ErrorReply::from(SessionError::InvalidArgument(
                    "Data cannot be null".to_string(),
                ))
            })?;
            session.send(data.as_bytes()).await?;
            Ok(Value::Null)
        }
    }
}

/// Parse a JSON call, dispatch it, and render the response as one JSON line.
pub async fn handle_json(session: &SessionManager, json: &str) -> String {
    let response = match MethodCall::from_json(json) {
        Ok(call) => Response::from(dispatch(session, &call).await),
        Err(e) => Response::Error(ErrorReply::new(
            "INVALID_ARGUMENT",
            format!("Malformed call: {}", e),
        )),
    };

    let mut line = serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(
            r#"{{"error":{{"code":"INTERNAL_ERROR","message":"{}"}}}}"#,
            e.to_string().replace('"', "'")
        )
    });
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names() {
        for method in [
            Method::GetPairedDevices,
            Method::Connect,
            Method::Disconnect,
            Method::Send,
        ] {
            assert_eq!(Method::parse(method.as_str()), Some(method));
        }
        assert_eq!(Method::parse("Connect"), None);
    }

    #[test]
    fn test_call_parsing() {
        let call = MethodCall::from_json(r#"{"method":"connect","arguments":{"address":"00:11:22:33:44:55"}}"#)
            .unwrap();
        assert_eq!(call.method, "connect");
        assert_eq!(call.string_arg("address"), Some("00:11:22:33:44:55"));

        let call = MethodCall::from_json(r#"{"method":"disconnect"}"#).unwrap();
        assert!(call.arguments.is_null());
        assert_eq!(call.string_arg("address"), None);
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(Response::Ok(json!(true))).unwrap();
        assert_eq!(ok, json!({"ok": true}));

        let err = Response::from(Err(ErrorReply::from(SessionError::NotConnected)));
        assert_eq!(
            serde_json::to_value(err).unwrap(),
            json!({"error": {"code": "NOT_CONNECTED", "message": "Not connected to any device"}})
        );
    }
}
