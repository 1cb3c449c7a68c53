//! Scripted collaborators shared by the unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::{HashMap, VecDeque},
    io::Cursor,
};

use crate::descriptors::{IDENTITY_INSTRUCTION, STYLE_INSTRUCTION};
use crate::fetcher::{FetchError, HttpGet};
use crate::gemini::{GeminiError, GenerativeModel, ImageRequest};
use crate::payload::ImagePayload;
use crate::progress::StageObserver;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 90]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn sample_png(width: u32, height: u32) -> ImagePayload {
    ImagePayload::from_bytes("image/png", &png_bytes(width, height))
}

pub fn sample_photo() -> ImagePayload {
    sample_png(64, 48)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelCall {
    Describe { model: String, instruction: String },
    Image { model: String, prompt: String, has_reference: bool },
    Json { model: String, prompt: String },
}

/// A `GenerativeModel` whose answers are set up front and whose calls are recorded.
pub struct ScriptedModel {
    identity: Result<String, String>,
    style: Result<String, String>,
    other: Result<String, String>,
    images: Mutex<HashMap<String, VecDeque<Result<ImagePayload, String>>>>,
    json: Result<Value, String>,
    calls: Mutex<Vec<ModelCall>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self {
            identity: Ok("green eyes, short black hair, olive skin".into()),
            style: Ok("cold blue backlight, low angle, burning city".into()),
            other: Ok("VALID".into()),
            images: Mutex::new(HashMap::new()),
            json: Ok(Value::Null),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one outcome for `model`; unqueued calls fail.
    pub fn with_image(self, model: &str, outcome: Result<ImagePayload, &str>) -> Self {
        self.images
            .lock()
            .entry(model.to_string())
            .or_default()
            .push_back(outcome.map_err(str::to_string));
        self
    }

    pub fn with_identity(mut self, outcome: Result<&str, &str>) -> Self {
        self.identity = outcome.map(str::to_string).map_err(str::to_string);
        self
    }

    pub fn with_style(mut self, outcome: Result<&str, &str>) -> Self {
        self.style = outcome.map(str::to_string).map_err(str::to_string);
        self
    }

    pub fn with_other_description(mut self, outcome: Result<&str, &str>) -> Self {
        self.other = outcome.map(str::to_string).map_err(str::to_string);
        self
    }

    pub fn with_json(mut self, outcome: Result<Value, &str>) -> Self {
        self.json = outcome.map_err(str::to_string);
        self
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().clone()
    }

    pub fn image_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ModelCall::Image { model, prompt, .. } => Some((model, prompt)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn describe_image(&self, model: &str, _image: &ImagePayload, instruction: &str) -> Result<String, GeminiError> {
        self.calls.lock().push(ModelCall::Describe { model: model.into(), instruction: instruction.into() });
        let outcome = if instruction == IDENTITY_INSTRUCTION {
            &self.identity
        } else if instruction == STYLE_INSTRUCTION {
            &self.style
        } else {
            &self.other
        };
        outcome.clone().map_err(GeminiError::Http)
    }

    async fn generate_image(&self, model: &str, request: &ImageRequest) -> Result<ImagePayload, GeminiError> {
        self.calls.lock().push(ModelCall::Image {
            model: model.into(),
            prompt: request.prompt.clone(),
            has_reference: request.reference.is_some(),
        });
        let next = self.images.lock().get_mut(model).and_then(VecDeque::pop_front);
        match next {
            Some(Ok(image)) => Ok(image),
            Some(Err(e)) => Err(GeminiError::Http(e)),
            None => Err(GeminiError::NoImage("unscripted".into())),
        }
    }

    async fn generate_json(&self, model: &str, prompt: &str, _schema: &Value) -> Result<Value, GeminiError> {
        self.calls.lock().push(ModelCall::Json { model: model.into(), prompt: prompt.into() });
        self.json.clone().map_err(GeminiError::Other)
    }
}

/// An `HttpGet` serving fixed bodies per URL; unknown URLs fail.
#[derive(Default)]
pub struct ScriptedHttp {
    bodies: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl HttpGet for ScriptedHttp {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        self.requested.lock().push(url.to_string());
        self.bodies
            .get(url)
            .map(|b| Bytes::from(b.clone()))
            .ok_or_else(|| FetchError::Http(format!("connection refused: {url}")))
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    messages: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl StageObserver for RecordingObserver {
    fn on_stage(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}
