use crate::error::ApiError;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::types::{Conversation, MessageRecord, Notification, TEMP_ID_PREFIX, User};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// An image attached to an outgoing message.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// REST collaborator for the messaging/notification subsystem.
///
/// All calls carry the session cookie; responses are JSON. The collaborator
/// itself is out of scope, this wrapper only shapes requests and tolerates
/// the quirks the endpoints are known for (null lists, non-array bodies).
pub struct ApiClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    session_cookie: String,
}

impl ApiClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        session_cookie: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            session_cookie: session_cookie.into(),
        }
    }

    fn with_credentials(&self, request: HttpRequest) -> HttpRequest {
        request.with_header("Cookie", self.session_cookie.clone())
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let response = self
            .http
            .execute(self.with_credentials(request))
            .await
            .map_err(ApiError::Http)?;
        if !response.is_success() {
            return Err(ApiError::Status {
                code: response.status_code,
            });
        }
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Fetch the conversation list. A null body is an empty list, not an
    /// error.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let request = HttpRequest::get(format!("{}/api/conversation", self.base_url));
        let response = self.execute(request).await?;
        let value: Value = Self::decode(&response)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch message history for one conversation. A body that is not an
    /// array is treated as empty.
    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
        let request = HttpRequest::get(format!(
            "{}/api/message?conversationId={}",
            self.base_url,
            urlencoding::encode(conversation_id)
        ));
        let response = self.execute(request).await?;
        let value: Value = Self::decode(&response)?;
        if !value.is_array() {
            debug!(target: "Api", "Message history response is not an array, treating as empty");
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Send a message as a multipart form. The conversation id is omitted
    /// for temporary conversations so the server creates one and returns
    /// its id in the response record.
    pub async fn send_message(
        &self,
        receivers: &[String],
        content: &str,
        image: Option<&ImageAttachment>,
        conversation_id: Option<&str>,
    ) -> Result<MessageRecord, ApiError> {
        let mut form = MultipartForm::new();
        for receiver in receivers {
            form.text("receiver", receiver);
        }
        if let Some(image) = image {
            form.file("image", &image.file_name, &image.content_type, &image.bytes);
        } else {
            form.text("content", content);
        }
        if let Some(id) = conversation_id
            && !id.starts_with(TEMP_ID_PREFIX)
        {
            form.text("conversationId", id);
        }

        let (content_type, body) = form.finish();
        let request = HttpRequest::post(format!("{}/api/message", self.base_url))
            .with_header("Content-Type", content_type)
            .with_body(body);
        let response = self.execute(request).await?;
        Self::decode(&response)
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        let request = HttpRequest::get(format!("{}/api/notifications", self.base_url));
        let response = self.execute(request).await?;
        let value: Value = Self::decode(&response)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), ApiError> {
        let request = HttpRequest::patch(format!(
            "{}/api/notifications/read/{}",
            self.base_url,
            urlencoding::encode(id)
        ));
        self.execute(request).await?;
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        let request = HttpRequest::patch(format!("{}/api/notifications/read-all", self.base_url));
        self.execute(request).await?;
        Ok(())
    }

    pub async fn user_profile(&self, user_id: &str) -> Result<User, ApiError> {
        let request = HttpRequest::get(format!(
            "{}/api/user/{}",
            self.base_url,
            urlencoding::encode(user_id)
        ));
        let response = self.execute(request).await?;
        Self::decode(&response)
    }
}

/// Minimal multipart/form-data encoder for the message send endpoint.
struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    fn new() -> Self {
        Self {
            boundary: format!("----socialnet-{:016x}", rand::random::<u64>()),
            body: Vec::new(),
        }
    }

    fn text(&mut self, name: &str, value: &str) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
    }

    fn file(&mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        self.body
            .extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
    }

    fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_form_layout() {
        let mut form = MultipartForm::new();
        form.text("receiver", "u-1");
        form.text("content", "hello");
        let (content_type, body) = form.finish();
        let body = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("multipart/form-data; boundary="));
        assert!(body.contains("Content-Disposition: form-data; name=\"receiver\""));
        assert!(body.contains("hello"));
        assert!(body.trim_end().ends_with("--"));
    }

    #[test]
    fn file_part_carries_content_type() {
        let mut form = MultipartForm::new();
        form.file("image", "photo.png", "image/png", &[1, 2, 3]);
        let (_, body) = form.finish();
        let body = String::from_utf8_lossy(&body).into_owned();
        assert!(body.contains("filename=\"photo.png\""));
        assert!(body.contains("Content-Type: image/png"));
    }
}
