use crate::models::{preview, ImageRef, UploadedImage};
use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Failure at the network boundary. Prior workflow state is never touched by
/// one of these; every action that produces one is retryable.
#[derive(Debug, Error, PartialEq)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// The sole path to the remote media service, one method per capability.
/// Stateless per call.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    async fn analyze_text(&self, text: &str) -> Result<Value, RemoteError>;
    /// An absent or empty `enhanced` field is an empty suggestion, not a failure.
    async fn enhance_text(&self, prompt: &str) -> Result<String, RemoteError>;
    async fn generate_image(&self, prompt: &str) -> Result<ImageRef, RemoteError>;
    async fn analyze_image(&self, file: &UploadedImage) -> Result<Value, RemoteError>;
    async fn generate_variations(
        &self,
        file: &UploadedImage,
        count: usize,
    ) -> Result<Vec<ImageRef>, RemoteError>;
}

// The source behavior had no request timeout; close that gap at the client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// Helper to truncate image payloads in JSON for cleaner logging
fn truncate_long_strings(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.len() > 120 && s.is_ascii() {
                *s = format!("{}...[truncated {} chars]", &s[..60], s.len() - 60);
            }
        }
        Value::Object(map) => {
            for val in map.values_mut() {
                truncate_long_strings(val);
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_long_strings(val);
            }
        }
        _ => {}
    }
}

fn loggable(value: &Value) -> String {
    let mut copy = value.clone();
    truncate_long_strings(&mut copy);
    serde_json::to_string(&copy).unwrap_or_default()
}

pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, base_url: base_url.into() })
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let request_id = Uuid::new_v4();
        info!(%request_id, %url, body = %loggable(&body), "sending request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Self::read_response(request_id, response).await
    }

    async fn post_multipart(&self, path: &str, form: Form) -> Result<Value, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let request_id = Uuid::new_v4();
        info!(%request_id, %url, "sending multipart request");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Self::read_response(request_id, response).await
    }

    async fn read_response(
        request_id: Uuid,
        response: reqwest::Response,
    ) -> Result<Value, RemoteError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if !status.is_success() {
            error!(%request_id, %status, body = %text, "request failed");
            return Err(RemoteError::Status { status: status.as_u16(), body: text });
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| RemoteError::Malformed(format!("invalid json: {e}")))?;
        debug!(%request_id, response = %loggable(&parsed), "response received");
        Ok(parsed)
    }

    fn image_part(file: &UploadedImage) -> Part {
        Part::bytes(file.data.to_vec()).file_name(file.file_name.clone())
    }
}

#[derive(Debug, Deserialize)]
struct EnhanceResponse {
    #[serde(default)]
    enhanced: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateImageResponse {
    image: ImageRef,
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    caption: Value,
}

#[derive(Debug, Deserialize)]
struct VariationsResponse {
    #[serde(default)]
    variations: Vec<ImageRef>,
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, RemoteError> {
    serde_json::from_value(value).map_err(|e| RemoteError::Malformed(e.to_string()))
}

#[async_trait]
impl MediaGateway for HttpGateway {
    async fn analyze_text(&self, text: &str) -> Result<Value, RemoteError> {
        // Response shape is whatever the analyzer produces; kept opaque.
        self.post_json("/api/analyze-text", json!({ "text": text })).await
    }

    async fn enhance_text(&self, prompt: &str) -> Result<String, RemoteError> {
        let value = self.post_json("/api/enhance-text", json!({ "prompt": prompt })).await?;
        let parsed: EnhanceResponse = decode(value)?;
        Ok(parsed.enhanced.unwrap_or_default())
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageRef, RemoteError> {
        let value = self.post_json("/api/generate-image", json!({ "prompt": prompt })).await?;
        let parsed: GenerateImageResponse = decode(value)?;
        info!(image = %preview(&parsed.image), "image generated");
        Ok(parsed.image)
    }

    async fn analyze_image(&self, file: &UploadedImage) -> Result<Value, RemoteError> {
        let form = Form::new().part("image", Self::image_part(file));
        let value = self.post_multipart("/api/analyze-image", form).await?;
        let parsed: CaptionResponse = decode(value)?;
        Ok(parsed.caption)
    }

    async fn generate_variations(
        &self,
        file: &UploadedImage,
        count: usize,
    ) -> Result<Vec<ImageRef>, RemoteError> {
        let form = Form::new()
            .part("image", Self::image_part(file))
            .text("count", count.to_string());
        let value = self.post_multipart("/api/generate-variations", form).await?;
        let parsed: VariationsResponse = decode(value)?;
        info!(returned = parsed.variations.len(), requested = count, "variations generated");
        Ok(parsed.variations)
    }
}

/// Offline gateway for running the client without a service. Returns
/// placeholder SVG data URIs and synthetic analysis payloads.
pub struct DemoGateway;

fn placeholder_image(label: &str) -> ImageRef {
    use rand::Rng;

    let palette = ["#3B82F6", "#EF4444", "#10B981", "#F59E0B", "#8B5CF6"];
    let color = palette[rand::thread_rng().gen_range(0..palette.len())];
    let title: String = label.chars().take(48).collect();

    let svg = format!(
        r##"<svg width="400" height="300" xmlns="http://www.w3.org/2000/svg">
            <rect width="400" height="300" fill="{color}" />
            <text x="200" y="150" font-family="Arial, sans-serif" font-size="16"
                  text-anchor="middle" fill="white">{title}</text>
            <text x="200" y="200" font-family="Arial, sans-serif" font-size="10"
                  text-anchor="middle" fill="white" opacity="0.8">placeholder</text>
        </svg>"##
    );

    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
    )
}

#[async_trait]
impl MediaGateway for DemoGateway {
    async fn analyze_text(&self, text: &str) -> Result<Value, RemoteError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(json!({
            "words": text.split_whitespace().count(),
            "characters": text.len(),
            "mood": "calm",
        }))
    }

    async fn enhance_text(&self, prompt: &str) -> Result<String, RemoteError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(format!("{prompt}, highly detailed, soft natural light"))
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageRef, RemoteError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(placeholder_image(prompt))
    }

    async fn analyze_image(&self, file: &UploadedImage) -> Result<Value, RemoteError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(json!({
            "file": file.file_name,
            "bytes": file.data.len(),
            "caption": "an uploaded image",
        }))
    }

    async fn generate_variations(
        &self,
        file: &UploadedImage,
        count: usize,
    ) -> Result<Vec<ImageRef>, RemoteError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok((0..count)
            .map(|i| placeholder_image(&format!("{} variation {}", file.file_name, i + 1)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn truncation_shortens_image_payloads_only() {
        let mut v = json!({
            "image": "A".repeat(500),
            "caption": "short",
            "variations": ["B".repeat(300), "ok"],
        });
        truncate_long_strings(&mut v);
        assert!(v["image"].as_str().unwrap().len() < 120);
        assert_eq!(v["caption"], "short");
        assert!(v["variations"][0].as_str().unwrap().contains("truncated"));
        assert_eq!(v["variations"][1], "ok");
    }

    #[test]
    fn missing_enhanced_field_is_empty_not_failure() {
        let parsed: EnhanceResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parsed.enhanced.unwrap_or_default(), "");
        let parsed: EnhanceResponse = serde_json::from_value(json!({ "enhanced": null })).unwrap();
        assert_eq!(parsed.enhanced.unwrap_or_default(), "");
    }

    #[test]
    fn missing_image_field_is_malformed() {
        let result: Result<GenerateImageResponse, _> = decode(json!({ "picture": "x" }));
        assert!(matches!(result, Err(RemoteError::Malformed(_))));
    }

    #[test]
    fn placeholder_is_a_data_uri() {
        let p = placeholder_image("a cat");
        assert!(p.starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn demo_gateway_honors_requested_count() {
        let file = UploadedImage {
            file_name: "cat.png".into(),
            data: bytes::Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
        };
        let variations = DemoGateway.generate_variations(&file, 3).await.unwrap();
        assert_eq!(variations.len(), 3);
    }
}
