use serde::{Serialize, Deserialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::payload::ImagePayload;
use crate::speculative::{SpeculativeKey, SpeculativeSynthesis};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PosterTemplate {
    pub id: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub movie_title: String,
    pub costume: String,
}

/// Controls tone and face-visibility constraints of the synthesis prompt.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStrategy {
    #[default]
    Cinematic,
    Parody,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tone {
    #[default]
    Funny,
    Action,
    Horror,
    Romance,
}

impl Tone {
    pub fn strategy(self) -> GenerationStrategy {
        match self {
            Tone::Funny => GenerationStrategy::Parody,
            Tone::Action | Tone::Horror | Tone::Romance => GenerationStrategy::Cinematic,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tone::Funny => "Funny",
            Tone::Action => "Action",
            Tone::Horror => "Horror",
            Tone::Romance => "Romance",
        }
    }
}

/// Title, slogan and plot blurb suggested for a template.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PosterCopy {
    pub movie_title: String,
    pub slogan: String,
    pub cover_text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PhotoCheck {
    pub valid: bool,
    pub message: String,
}

/// Everything the wizard collects before a "Generate" action.
///
/// Built incrementally; only valid for generation once both a photo and an
/// actor name are present.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub photo: Option<ImagePayload>,
    pub template_id: String,
    #[serde(default)]
    pub template_ref: Option<String>,
    #[serde(default)]
    pub costume: String,
    #[serde(default)]
    pub tone: Tone,
    /// Explicit override; otherwise derived from the tone.
    #[serde(default)]
    pub strategy: Option<GenerationStrategy>,
    #[serde(default)]
    pub actor_name: String,
    #[serde(default)]
    pub movie_title: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub cover_text: String,
    /// Synthesis already running or finished for this request.
    #[serde(skip)]
    pub speculative: Option<SpeculativeSynthesis>,
}

impl GenerationRequest {
    pub fn for_template(template: &PosterTemplate) -> Self {
        Self {
            template_id: template.id.clone(),
            template_ref: Some(template.cover_image.clone()).filter(|r| !r.is_empty()),
            costume: template.costume.clone(),
            movie_title: template.movie_title.clone(),
            ..Self::default()
        }
    }

    pub fn effective_strategy(&self) -> GenerationStrategy {
        self.strategy.unwrap_or_else(|| self.tone.strategy())
    }

    pub fn is_complete(&self) -> bool {
        self.photo.is_some() && !self.actor_name.trim().is_empty()
    }

    /// Key identifying the synthesis this request would trigger, if a photo is present.
    pub fn speculative_key(&self, template_ref: &str) -> Option<SpeculativeKey> {
        self.photo
            .as_ref()
            .map(|photo| SpeculativeKey::new(photo, template_ref, self.effective_strategy()))
    }

    /// Drops a speculative handle that no longer matches the current inputs.
    pub fn discard_stale_speculation(&mut self) {
        let current = self
            .template_ref
            .as_deref()
            .and_then(|r| self.speculative_key(r));
        let stale = match (&self.speculative, current) {
            (Some(handle), Some(key)) => !handle.is_fresh_for(&key),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if stale {
            self.speculative = None;
        }
    }
}

/// Partial update sent by the wizard; absent fields are left untouched.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdate {
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub photo: Option<ImagePayload>,
    pub template_ref: Option<String>,
    pub costume: Option<String>,
    pub tone: Option<Tone>,
    pub strategy: Option<GenerationStrategy>,
    pub actor_name: Option<String>,
    pub movie_title: Option<String>,
    pub tagline: Option<String>,
    pub cover_text: Option<String>,
}

impl DraftUpdate {
    pub fn apply(self, request: &mut GenerationRequest) {
        if let Some(photo) = self.photo { request.photo = Some(photo); }
        if let Some(r) = self.template_ref { request.template_ref = Some(r); }
        if let Some(c) = self.costume { request.costume = c; }
        if let Some(t) = self.tone { request.tone = t; }
        if let Some(s) = self.strategy { request.strategy = Some(s); }
        if let Some(n) = self.actor_name { request.actor_name = n; }
        if let Some(t) = self.movie_title { request.movie_title = t; }
        if let Some(t) = self.tagline { request.tagline = t; }
        if let Some(t) = self.cover_text { request.cover_text = t; }
        request.discard_stale_speculation();
    }
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeBody {
    #[serde_as(as = "DisplayFromStr")]
    pub photo: ImagePayload,
    pub template_ref: String,
    #[serde(default)]
    pub costume: String,
    #[serde(default)]
    pub strategy: GenerationStrategy,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ComposeBody {
    #[serde_as(as = "DisplayFromStr")]
    pub base_image: ImagePayload,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub plot: String,
    #[serde(default)]
    pub credits: String,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(flatten)]
    pub request: GenerationRequest,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub pre_synthesized: Option<ImagePayload>,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    #[serde_as(as = "DisplayFromStr")]
    pub image: ImagePayload,
    pub log: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CopyBody {
    pub template_id: String,
    #[serde(default)]
    pub tone: Tone,
}

#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PhotoBody {
    #[serde_as(as = "DisplayFromStr")]
    pub photo: ImagePayload,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateDraftBody {
    pub template_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackgroundBody {
    pub prompt: String,
}
