use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{ApiCallError, Result};

/// Successful payload returned by a transport call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    /// Response headers with lowercase names. Non-UTF-8 values are dropped.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Builds a `200 OK` response carrying `value` as JSON.
    pub fn json_body(value: &serde_json::Value) -> Self {
        let mut response = Self::new(200, value.to_string());
        response
            .headers
            .insert("content-type".to_owned(), "application/json".to_owned());
        response
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name: String = name.into();
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|err| {
            ApiCallError::Decode(format!(
                "invalid response JSON: {err}; body: {}",
                self.text()
            ))
        })
    }

    /// Body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Direction of a byte transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    Upload,
    Download,
}

/// Raw progress notification from the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub transfer: Transfer,
    pub loaded: u64,
    /// `None` for transfers of unknown length.
    pub total: Option<u64>,
}

impl ProgressEvent {
    pub fn upload(loaded: u64, total: Option<u64>) -> Self {
        Self {
            transfer: Transfer::Upload,
            loaded,
            total,
        }
    }

    pub fn download(loaded: u64, total: Option<u64>) -> Self {
        Self {
            transfer: Transfer::Download,
            loaded,
            total,
        }
    }
}

/// Observable state of a [`CallController`](crate::CallController).
#[derive(Clone, Debug, Default)]
pub struct CallSnapshot {
    pub response: Option<Arc<ApiResponse>>,
    pub loading: bool,
    pub error: Option<Arc<ApiCallError>>,
    pub progress: u8,
    pub upload_progress: u8,
    pub download_progress: u8,
    pub retry_count: u32,
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::ApiResponse;
    use crate::ApiCallError;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
        name: String,
    }

    #[test]
    fn json_decodes_body() {
        let response = ApiResponse::json_body(&json!({"id": 7, "name": "kit"}));
        let item: Item = response.json().expect("body must decode");
        assert_eq!(
            item,
            Item {
                id: 7,
                name: "kit".to_owned()
            }
        );
        assert_eq!(response.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn json_reports_decode_error_with_body() {
        let response = ApiResponse::new(200, "not json");
        match response.json::<Item>() {
            Err(ApiCallError::Decode(message)) => assert!(message.contains("not json")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
