use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Cursor;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::payload::ImagePayload;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("no image in response: {0}")] NoImage(String),
    #[error("no text in response: {0}")] NoText(String),
    #[error("Other: {0}")] Other(String),
}

/// The four harm categories Gemini lets callers tune.
pub const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// One image-generation call: a text instruction plus an optional reference image.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub reference: Option<ImagePayload>,
    pub aspect_ratio: Option<String>,
}

/// Remote model operations the pipeline depends on.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Free-text answer to `instruction` about `image`.
    async fn describe_image(&self, model: &str, image: &ImagePayload, instruction: &str) -> Result<String, GeminiError>;

    /// Generates one image. Safety thresholds are relaxed to high-severity-only.
    async fn generate_image(&self, model: &str, request: &ImageRequest) -> Result<ImagePayload, GeminiError>;

    /// JSON-mode text generation constrained by `schema`.
    async fn generate_json(&self, model: &str, prompt: &str, schema: &Value) -> Result<Value, GeminiError>;
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && is_base64(s) {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

/// ASCII only, so byte slicing is always on a char boundary.
fn is_base64(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

fn loggable(value: &Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    serde_json::to_string(&copy).unwrap_or_default()
}

pub fn permissive_safety_settings() -> Vec<Value> {
    HARM_CATEGORIES
        .iter()
        .map(|category| json!({ "category": category, "threshold": "BLOCK_ONLY_HIGH" }))
        .collect()
}

fn inline_part(image: &ImagePayload) -> Value {
    json!({ "inlineData": { "mimeType": image.mime(), "data": image.base64() } })
}

pub fn describe_body(image: &ImagePayload, instruction: &str) -> Value {
    json!({
        "contents": [{ "parts": [inline_part(image), { "text": instruction }] }],
        "generationConfig": { "temperature": 0.4, "maxOutputTokens": 512 }
    })
}

pub fn image_body(request: &ImageRequest) -> Value {
    let mut parts = Vec::new();
    if let Some(reference) = &request.reference {
        parts.push(inline_part(reference));
    }
    parts.push(json!({ "text": request.prompt }));

    let mut generation_config = json!({
        "responseModalities": ["TEXT", "IMAGE"],
        "candidateCount": 1
    });
    if let Some(ratio) = &request.aspect_ratio {
        generation_config["imageConfig"] = json!({ "aspectRatio": ratio });
    }

    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": generation_config,
        "safetySettings": permissive_safety_settings()
    })
}

pub fn json_body(prompt: &str, schema: &Value) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": 0.9,
            "responseMimeType": "application/json",
            "responseSchema": schema
        }
    })
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    demo: bool,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_api_base.clone(),
            demo: config.demo_mode(),
        }
    }

    async fn perform_api_call(&self, model: &str, body: &Value) -> Result<GeminiResponse, GeminiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        info!(model, "🔗 Making request to: {}", url);
        info!("📤 Request body: {}", loggable(body));

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!(model, "📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(model, "❌ API Error response: {}", error_body);
            return Err(GeminiError::Http(format!("status={} body={}", status, error_body)));
        }

        let raw: Value = response.json().await
            .map_err(|e| GeminiError::Other(format!("parse error: {}", e)))?;
        info!(model, "📥 Raw Gemini API response: {}", loggable(&raw));

        serde_json::from_value(raw).map_err(|e| GeminiError::Other(format!("parse error: {}", e)))
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn describe_image(&self, model: &str, image: &ImagePayload, instruction: &str) -> Result<String, GeminiError> {
        if self.demo {
            info!("Using demo mode - returning canned description");
            if instruction.contains("'VALID'") {
                return Ok("VALID".to_string());
            }
            return Ok("Demo description: dramatic high-contrast lighting, warm skin tones, short dark hair.".to_string());
        }
        let parsed = self.perform_api_call(model, &describe_body(image, instruction)).await?;
        extract_text(&parsed).ok_or_else(|| GeminiError::NoText(parsed.explain()))
    }

    async fn generate_image(&self, model: &str, request: &ImageRequest) -> Result<ImagePayload, GeminiError> {
        if self.demo {
            info!("Using demo mode - composing placeholder poster locally");
            return demo_poster(request.reference.as_ref());
        }
        let parsed = self.perform_api_call(model, &image_body(request)).await?;
        match extract_first_image(&parsed) {
            Some(image) => {
                info!(model, "🖼️ Extracted image from API response: {}", image.preview());
                Ok(image)
            }
            None => {
                warn!(model, "⚠️ No image data found in API response");
                Err(GeminiError::NoImage(parsed.explain()))
            }
        }
    }

    async fn generate_json(&self, model: &str, prompt: &str, schema: &Value) -> Result<Value, GeminiError> {
        if self.demo {
            info!("Using demo mode - returning empty JSON so defaults apply");
            return Ok(json!({}));
        }
        let parsed = self.perform_api_call(model, &json_body(prompt, schema)).await?;
        let text = extract_text(&parsed).ok_or_else(|| GeminiError::NoText(parsed.explain()))?;
        serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| GeminiError::Other(format!("model returned invalid JSON: {}", e)))
    }
}

/// Placeholder used in demo mode: the reference photo framed on a dark 2:3 backdrop.
fn demo_poster(reference: Option<&ImagePayload>) -> Result<ImagePayload, GeminiError> {
    let (w, h) = (832u32, 1248u32);
    let mut canvas = RgbaImage::from_fn(w, h, |_, y| {
        let shade = 20 + (y * 60 / h) as u8;
        Rgba([shade, shade / 2, shade / 3, 255])
    });

    let photo = reference
        .and_then(|p| p.decode().ok())
        .and_then(|bytes| image::load_from_memory(&bytes).ok());
    if let Some(photo) = photo {
        let framed = photo.resize(w * 3 / 4, h * 3 / 5, FilterType::Triangle).to_rgba8();
        let x = (w - framed.width()) / 2;
        let y = h / 8;
        image::imageops::overlay(&mut canvas, &framed, x as i64, y as i64);
    }

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| GeminiError::Other(e.to_string()))?;
    Ok(ImagePayload::from_bytes("image/png", &buf.into_inner()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|t| t.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GeminiResponse {
    /// Why a response carried nothing usable, for error messages.
    fn explain(&self) -> String {
        if let Some(reason) = self.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref()) {
            return format!("prompt blocked ({reason})");
        }
        match self.candidates.first().and_then(|c| c.finish_reason.as_deref()) {
            Some(reason) => format!("finish reason {reason}"),
            None if self.candidates.is_empty() => "no candidates returned".to_string(),
            None => "empty candidate".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData", alias = "inline_data")]
        inline_data: InlineData,
    },
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType", alias = "mime_type", default = "default_mime")]
    mime_type: String,
}

fn default_mime() -> String {
    "image/png".to_string()
}

fn extract_first_image(resp: &GeminiResponse) -> Option<ImagePayload> {
    resp.candidates
        .iter()
        .flat_map(|c| &c.content.parts)
        .find_map(|p| match p {
            Part::Inline { inline_data } if !inline_data.data.is_empty() => {
                Some(ImagePayload::new(inline_data.mime_type.clone(), inline_data.data.clone()))
            }
            _ => None,
        })
}

fn extract_text(resp: &GeminiResponse) -> Option<String> {
    let text: Vec<&str> = resp
        .candidates
        .iter()
        .take(1)
        .flat_map(|c| &c.content.parts)
        .filter_map(|p| match p {
            Part::Text { text, thought: false } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let joined = text.join("").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}
