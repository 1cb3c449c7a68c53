use tracing::{info, warn};

use crate::gemini::GenerativeModel;
use crate::payload::ImagePayload;
use crate::progress::{emit, StageObserver};

pub const IDENTITY_INSTRUCTION: &str = "Describe the face of the person in this photo so an artist could paint them \
without seeing it: eye shape and color, eyebrows, hair style and color, skin tone, face shape and bone structure, \
facial hair, and any distinguishing marks. One dense paragraph, physical appearance only, no guesses about identity.";

pub const STYLE_INSTRUCTION: &str = "Describe the visual style of this movie poster for a set designer: lighting, \
color palette and grade, camera angle and framing, and the background setting. Never describe the main character's \
face or who they are, and never mention the movie title or any text on the poster. One dense paragraph.";

pub const IDENTITY_PLACEHOLDER: &str = "the person in the reference image";

pub const STYLE_PLACEHOLDER: &str = "dramatic cinematic lighting with high contrast, rich color grading, \
and an epic blockbuster background";

/// Free-text characterizations that stand in for the raw images in the synthesis prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptors {
    pub identity: String,
    pub style: String,
}

/// Runs both vision calls; either failure degrades to a generic placeholder.
pub async fn extract(
    model: &dyn GenerativeModel,
    vision_model: &str,
    photo: &ImagePayload,
    template: &ImagePayload,
    observer: &dyn StageObserver,
) -> Descriptors {
    emit(observer, "Analyzing ID…");
    emit(observer, "Extracting style…");

    let (identity, style) = tokio::join!(
        model.describe_image(vision_model, photo, IDENTITY_INSTRUCTION),
        model.describe_image(vision_model, template, STYLE_INSTRUCTION)
    );

    let identity = match identity {
        Ok(text) if !text.trim().is_empty() => {
            info!("✅ Identity described ({} chars)", text.len());
            text
        }
        other => {
            let reason = other.err().map(|e| e.to_string()).unwrap_or_else(|| "empty answer".into());
            warn!("⚠️ Identity analysis failed: {}", reason);
            emit(observer, "ID analysis unavailable, using the reference photo alone");
            IDENTITY_PLACEHOLDER.to_string()
        }
    };

    let style = match style {
        Ok(text) if !text.trim().is_empty() => {
            info!("✅ Style described ({} chars)", text.len());
            text
        }
        other => {
            let reason = other.err().map(|e| e.to_string()).unwrap_or_else(|| "empty answer".into());
            warn!("⚠️ Style extraction failed: {}", reason);
            emit(observer, "Style extraction unavailable, using generic cinematic lighting");
            STYLE_PLACEHOLDER.to_string()
        }
    };

    Descriptors { identity, style }
}
