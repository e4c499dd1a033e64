use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LebaiError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Decoded JSON-RPC response. `result` and `error` are mutually exclusive in well-behaved
/// controllers; success is judged solely by the presence of `result`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

// Keeps `"result": null` distinguishable from a missing `result`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RpcResponse {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Result<&Value, LebaiError> {
        match (&self.result, &self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(err)) => Err(LebaiError::Rpc {
                code: err.code,
                message: err.message.clone(),
            }),
            (None, None) => Err(LebaiError::Protocol(
                "response carries neither result nor error".to_string(),
            )),
        }
    }
}

/// A response together with the body it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub body: String,
    pub response: RpcResponse,
}

impl RawResponse {
    pub fn parse(body: String) -> Result<Self, LebaiError> {
        let response = serde_json::from_str::<RpcResponse>(&body)
            .map_err(|e| LebaiError::Protocol(format!("invalid JSON-RPC body: {}", e)))?;
        Ok(Self { body, response })
    }

    pub fn is_success(&self) -> bool {
        self.response.is_success()
    }

    pub fn result(&self) -> Result<&Value, LebaiError> {
        self.response.result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_result_still_counts_as_success() {
        let raw = RawResponse::parse(r#"{"jsonrpc":"2.0","result":null,"id":1}"#.to_string())
            .unwrap();
        assert!(raw.is_success());
        assert_eq!(raw.result().unwrap(), &Value::Null);
    }

    #[test]
    fn error_response_maps_to_rpc_error() {
        let raw = RawResponse::parse(
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":2}"#
                .to_string(),
        )
        .unwrap();
        assert!(!raw.is_success());
        assert!(matches!(raw.result(), Err(LebaiError::Rpc { code: -32601, .. })));
    }

    #[test]
    fn empty_object_is_a_protocol_error() {
        let raw = RawResponse::parse("{}".to_string()).unwrap();
        assert!(matches!(raw.result(), Err(LebaiError::Protocol(_))));
        assert!(RawResponse::parse("not json".to_string()).is_err());
    }
}
