use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    future::Future,
    hash::{Hash, Hasher},
};
use tokio::sync::watch;

use crate::error::PipelineError;
use crate::models::GenerationStrategy;
use crate::payload::ImagePayload;

type Outcome = Option<Result<ImagePayload, PipelineError>>;

/// Identity of one synthesis: the (photo, poster, strategy) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpeculativeKey {
    photo_digest: u64,
    template_ref: String,
    strategy: GenerationStrategy,
}

impl SpeculativeKey {
    pub fn new(photo: &ImagePayload, template_ref: &str, strategy: GenerationStrategy) -> Self {
        let mut hasher = DefaultHasher::new();
        photo.hash(&mut hasher);
        Self { photo_digest: hasher.finish(), template_ref: template_ref.to_string(), strategy }
    }
}

/// A synthesis that is running or already finished.
///
/// Cloning shares the same underlying work; every clone observes the same
/// result. Dropping all handles does not cancel the task, its result is
/// simply discarded.
#[derive(Clone)]
pub struct SpeculativeSynthesis {
    key: SpeculativeKey,
    rx: watch::Receiver<Outcome>,
}

impl SpeculativeSynthesis {
    /// Starts `work` on the runtime and returns a handle to its eventual result.
    pub fn spawn<F>(key: SpeculativeKey, work: F) -> Self
    where
        F: Future<Output = Result<ImagePayload, PipelineError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let outcome = work.await;
            // nobody may be listening any more
            let _ = tx.send(Some(outcome));
        });
        Self { key, rx }
    }

    /// A handle that is already complete, e.g. an image the caller synthesized earlier.
    pub fn ready(key: SpeculativeKey, image: ImagePayload) -> Self {
        let (_tx, rx) = watch::channel(Some(Ok(image)));
        Self { key, rx }
    }

    pub fn is_fresh_for(&self, key: &SpeculativeKey) -> bool {
        &self.key == key
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub async fn wait(&self) -> Result<ImagePayload, PipelineError> {
        let mut rx = self.rx.clone();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| PipelineError::Speculative("synthesis task ended without a result".into()))?;
        outcome
            .clone()
            .unwrap_or_else(|| Err(PipelineError::Speculative("synthesis result missing".into())))
    }
}

impl fmt::Debug for SpeculativeSynthesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeculativeSynthesis")
            .field("key", &self.key)
            .field("finished", &self.is_finished())
            .finish()
    }
}
