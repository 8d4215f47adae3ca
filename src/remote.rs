use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};

use crate::config::extension_of;
use crate::error::RemoteError;

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const XLS_MIME: &str = "application/vnd.ms-excel";

/// The external service that turns an uploaded spreadsheet into delimited text.
///
/// Its processing semantics are opaque; all this crate relies on is "200 with
/// a body" versus "anything else".
#[async_trait]
pub trait Processor: Send + Sync {
    /// Submit one spreadsheet and return the delimited-text response body
    async fn process(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, RemoteError>;
}

/// MIME type sent with an upload, chosen from its extension
pub fn spreadsheet_mime(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("xls") => XLS_MIME,
        _ => XLSX_MIME,
    }
}

/// [`Processor`] posting a multipart form to a fixed URL
pub struct HttpProcessor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpProcessor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpProcessor {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Processor for HttpProcessor {
    async fn process(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, RemoteError> {
        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(spreadsheet_mime(file_name))
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let form = Form::new().part("file", part);

        log::info!(
            "Submitting {} ({} bytes) to {}",
            file_name,
            size,
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            log::warn!("Remote endpoint answered {} for {}", status, file_name);
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        log::info!("Remote endpoint returned {} bytes for {}", body.len(), file_name);

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spreadsheet_mime() {
        assert_eq!(spreadsheet_mime("data.xlsx"), XLSX_MIME);
        assert_eq!(spreadsheet_mime("DATA.XLS"), XLS_MIME);
        assert_eq!(spreadsheet_mime("noext"), XLSX_MIME);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transport_fault() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let processor = HttpProcessor::new(format!("http://{}/upload/", addr));
        let err = processor
            .process("data.xlsx", b"PK".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }
}
