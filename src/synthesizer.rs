use tracing::{error, info, warn};

use crate::descriptors::Descriptors;
use crate::error::PipelineError;
use crate::gemini::{GenerativeModel, ImageRequest};
use crate::models::GenerationStrategy;
use crate::payload::ImagePayload;
use crate::progress::{emit, StageObserver};

/// Output ratio matching the 1200x1800 compositor canvas.
pub const POSTER_ASPECT_RATIO: &str = "2:3";

pub const FACE_COVERINGS_ALLOWED: &str =
    "Costume accessories may partially cover the face if the costume calls for it.";
pub const FACE_UNOBSTRUCTED: &str =
    "The face must stay completely unobstructed: no masks, no sunglasses, no helmets, no visors, nothing in front of the eyes or mouth.";
pub const PARODY_TONE: &str =
    "Make it an exaggerated, funny parody: over-the-top expression and pose, comedic energy, while staying a polished poster image.";
pub const CINEMATIC_TONE: &str =
    "Make it photorealistic and serious: a high-budget Hollywood key art photograph with natural skin texture and dramatic intensity.";

/// Primary and fallback image models tried in order.
#[derive(Debug, Clone)]
pub struct ModelChain {
    pub primary: String,
    pub fallback: String,
}

/// Inputs for one synthesis call.
pub struct SynthesisInputs<'a> {
    pub photo: &'a ImagePayload,
    pub descriptors: &'a Descriptors,
    pub costume: &'a str,
    pub strategy: GenerationStrategy,
}

pub fn build_prompt(descriptors: &Descriptors, costume: &str, strategy: GenerationStrategy) -> String {
    let costume = if costume.trim().is_empty() { "the outfit that suits the poster's genre" } else { costume.trim() };
    let (face_rule, tone) = match strategy {
        GenerationStrategy::Parody => (FACE_UNOBSTRUCTED, PARODY_TONE),
        GenerationStrategy::Cinematic => (FACE_COVERINGS_ALLOWED, CINEMATIC_TONE),
    };

    format!(
        "Create a vertical movie poster image starring the person in the attached reference photo.\n\
         IDENTITY (hard constraint): the face must match the reference photo exactly. \
         Keep their facial features: {identity}.\n\
         COSTUME: the character wears {costume}.\n\
         STYLE AND BACKGROUND: {style}.\n\
         {face_rule}\n\
         {tone}\n\
         NEGATIVE: do not use the likeness of the original poster's actor. \
         Do not render any text, letters, titles, logos, taglines or credits anywhere in the image.",
        identity = descriptors.identity,
        style = descriptors.style,
    )
}

/// Synthesizes with the primary model, falling back once to the secondary model.
pub async fn synthesize(
    model: &dyn GenerativeModel,
    chain: &ModelChain,
    inputs: SynthesisInputs<'_>,
    observer: &dyn StageObserver,
) -> Result<ImagePayload, PipelineError> {
    let request = ImageRequest {
        prompt: build_prompt(inputs.descriptors, inputs.costume, inputs.strategy),
        reference: Some(inputs.photo.clone()),
        aspect_ratio: Some(POSTER_ASPECT_RATIO.to_string()),
    };
    generate_with_fallback(model, chain, &request, observer).await
}

/// Shared by synthesis and admin background generation.
pub async fn generate_with_fallback(
    model: &dyn GenerativeModel,
    chain: &ModelChain,
    request: &ImageRequest,
    observer: &dyn StageObserver,
) -> Result<ImagePayload, PipelineError> {
    emit(observer, "Synthesizing…");
    let primary_err = match model.generate_image(&chain.primary, request).await {
        Ok(image) => {
            info!(model = %chain.primary, "✅ Synthesized on primary model: {}", image.preview());
            return Ok(image);
        }
        Err(e) => e,
    };

    warn!(model = %chain.primary, "⚠️ Primary model failed: {}", primary_err);
    emit(observer, &format!("Primary model failed ({primary_err}), retrying with fallback model…"));

    match model.generate_image(&chain.fallback, request).await {
        Ok(image) => {
            info!(model = %chain.fallback, "✅ Synthesized on fallback model: {}", image.preview());
            emit(observer, "Fallback model succeeded");
            Ok(image)
        }
        Err(fallback_err) => {
            error!(model = %chain.fallback, "❌ Fallback model failed: {}", fallback_err);
            Err(PipelineError::Synthesis(format!(
                "primary model {} failed: {}; fallback model {} failed: {}",
                chain.primary, primary_err, chain.fallback, fallback_err
            )))
        }
    }
}
