use parking_lot::RwLock;
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};
use tracing::{info, warn};

use crate::blobs::BlobStore;
use crate::catalog::TemplateCatalog;
use crate::compositor::{self, PosterText};
use crate::config::Config;
use crate::copywriter::billing_block;
use crate::descriptors;
use crate::error::PipelineError;
use crate::fetcher::RemoteFetcher;
use crate::gemini::GenerativeModel;
use crate::models::{GenerationRequest, GenerationStrategy, PosterTemplate};
use crate::normalizer::normalize;
use crate::payload::ImagePayload;
use crate::progress::{emit, StageObserver, TracingObserver};
use crate::speculative::SpeculativeSynthesis;
use crate::synthesizer::{self, ModelChain, SynthesisInputs};

/// Runs the poster pipeline: normalize, fetch, describe, synthesize, compose.
///
/// Cheap to clone; every clone shares the same catalog, model client and blob store.
#[derive(Clone)]
pub struct Studio {
    pub(crate) config: Arc<Config>,
    pub(crate) model: Arc<dyn GenerativeModel>,
    pub(crate) fetcher: RemoteFetcher,
    pub(crate) blobs: BlobStore,
    pub(crate) catalog: Arc<RwLock<TemplateCatalog>>,
    pub(crate) chain: ModelChain,
    /// Serializes catalog promotions so concurrent admin writes never drop each other.
    pub(crate) catalog_writes: Arc<tokio::sync::Mutex<()>>,
}

impl Studio {
    pub fn new(
        config: Arc<Config>,
        model: Arc<dyn GenerativeModel>,
        fetcher: RemoteFetcher,
        blobs: BlobStore,
        catalog: Arc<RwLock<TemplateCatalog>>,
    ) -> Self {
        let chain = ModelChain {
            primary: config.primary_image_model.clone(),
            fallback: config.fallback_image_model.clone(),
        };
        Self { config, model, fetcher, blobs, catalog, chain, catalog_writes: Arc::default() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &dyn GenerativeModel {
        self.model.as_ref()
    }

    pub fn templates(&self) -> Vec<PosterTemplate> {
        self.catalog.read().list().to_vec()
    }

    pub fn template(&self, id: &str) -> Result<PosterTemplate, PipelineError> {
        self.catalog
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::TemplateNotFound(id.to_string()))
    }

    /// Explicit reference on the request, else the template's current cover.
    pub fn resolve_template_ref(&self, request: &GenerationRequest) -> Result<String, PipelineError> {
        if let Some(reference) = request.template_ref.as_deref().filter(|r| !r.trim().is_empty()) {
            return Ok(reference.to_string());
        }
        let catalog = self.catalog.read();
        match catalog.get(&request.template_id) {
            None => Err(PipelineError::TemplateNotFound(request.template_id.clone())),
            Some(_) => catalog
                .cover(&request.template_id)
                .map(str::to_string)
                .ok_or_else(|| PipelineError::TemplateNotFound(format!("{} has no poster image", request.template_id))),
        }
    }

    /// Produces the textless synthesized image for one (photo, poster, costume, strategy).
    pub async fn synthesize(
        &self,
        photo: &ImagePayload,
        template_ref: &str,
        costume: &str,
        strategy: GenerationStrategy,
        observer: &dyn StageObserver,
    ) -> Result<ImagePayload, PipelineError> {
        emit(observer, "Preparing inputs…");
        let photo = normalize(photo, self.config.max_photo_dimension);

        emit(observer, "Fetching poster…");
        let template = self.fetcher.fetch(template_ref).await.map_err(|e| {
            warn!(template_ref, "⚠️ Template download failed: {}", e);
            PipelineError::TemplateDownload { reference: template_ref.to_string(), reason: e.to_string() }
        })?;
        let template = normalize(&template, self.config.max_template_dimension);

        let descriptors =
            descriptors::extract(self.model(), &self.config.vision_model, &photo, &template, observer).await;

        synthesizer::synthesize(
            self.model(),
            &self.chain,
            SynthesisInputs { photo: &photo, descriptors: &descriptors, costume, strategy },
            observer,
        )
        .await
    }

    /// Starts a background synthesis for the request unless a fresh one already exists.
    ///
    /// Returns whether a new synthesis was spawned.
    pub fn prewarm(&self, request: &mut GenerationRequest) -> Result<bool, PipelineError> {
        let template_ref = self.resolve_template_ref(request)?;
        request.template_ref = Some(template_ref.clone());
        request.discard_stale_speculation();

        let (Some(photo), Some(key)) = (request.photo.clone(), request.speculative_key(&template_ref)) else {
            return Ok(false);
        };
        if request.speculative.as_ref().is_some_and(|h| h.is_fresh_for(&key)) {
            return Ok(false);
        }

        info!(template_id = %request.template_id, "🔮 Starting speculative synthesis");
        let studio = self.clone();
        let costume = request.costume.clone();
        let strategy = request.effective_strategy();
        request.speculative = Some(SpeculativeSynthesis::spawn(key, async move {
            studio.synthesize(&photo, &template_ref, &costume, strategy, &TracingObserver).await
        }));
        Ok(true)
    }

    /// Attaches an image the caller synthesized earlier, keyed to the request's current inputs.
    pub fn attach_presynthesized(&self, request: &mut GenerationRequest, image: ImagePayload) -> Result<(), PipelineError> {
        let template_ref = self.resolve_template_ref(request)?;
        let key = request
            .speculative_key(&template_ref)
            .ok_or_else(|| PipelineError::InvalidRequest("a photo is required".into()))?;
        request.template_ref = Some(template_ref);
        request.speculative = Some(SpeculativeSynthesis::ready(key, image));
        Ok(())
    }

    /// Synthesis (or the awaited speculative result) followed by text composition.
    pub async fn full_generate(
        &self,
        request: &GenerationRequest,
        observer: &dyn StageObserver,
    ) -> Result<ImagePayload, PipelineError> {
        let photo = match &request.photo {
            Some(photo) if request.is_complete() => photo,
            Some(_) => return Err(PipelineError::InvalidRequest("an actor name is required".into())),
            None => return Err(PipelineError::InvalidRequest("a photo is required".into())),
        };
        let template_ref = self.resolve_template_ref(request)?;
        let strategy = request.effective_strategy();

        let fresh = request
            .speculative
            .as_ref()
            .zip(request.speculative_key(&template_ref))
            .filter(|(handle, key)| handle.is_fresh_for(key))
            .map(|(handle, _)| handle);

        let base = match fresh {
            Some(handle) => {
                emit(observer, "Using pre-generated image…");
                handle.wait().await?
            }
            None => {
                self.synthesize(photo, &template_ref, &request.costume, strategy, observer)
                    .await?
            }
        };

        emit(observer, "Composing text…");
        let credits = billing_block(request.tone, credits_seed(request));
        let poster = compositor::compose(&base, poster_text(request, &credits));
        info!(template_id = %request.template_id, "🎉 Poster ready: {}", poster.preview());
        Ok(poster)
    }
}

fn poster_text<'a>(request: &'a GenerationRequest, credits: &'a str) -> PosterText<'a> {
    PosterText {
        name: &request.actor_name,
        title: &request.movie_title,
        tagline: &request.tagline,
        plot: &request.cover_text,
        credits,
    }
}

fn credits_seed(request: &GenerationRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    request.template_id.hash(&mut hasher);
    request.actor_name.hash(&mut hasher);
    request.movie_title.hash(&mut hasher);
    request.tone.hash(&mut hasher);
    hasher.finish()
}
