use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{DraftUpdate, GenerationRequest};

/// A wizard session: the request being filled in plus bookkeeping.
#[derive(Debug, Clone)]
pub struct Draft {
    pub id: Uuid,
    pub request: GenerationRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PreGeneration {
    Idle,
    Running,
    Ready,
}

/// What the UI sees of a draft; enough to rehydrate every form field.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    pub id: Uuid,
    #[serde(flatten)]
    pub request: GenerationRequest,
    pub pre_generation: PreGeneration,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn view(&self) -> DraftView {
        let pre_generation = match &self.request.speculative {
            None => PreGeneration::Idle,
            Some(handle) if handle.is_finished() => PreGeneration::Ready,
            Some(_) => PreGeneration::Running,
        };
        DraftView {
            id: self.id,
            request: self.request.clone(),
            pre_generation,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// In-memory drafts, bounded by an idle TTL and a maximum count.
///
/// Limits are enforced whenever a draft is created: idle drafts go first, then
/// the least recently updated ones until there is room.
#[derive(Clone)]
pub struct DraftStore {
    drafts: Arc<RwLock<HashMap<Uuid, Draft>>>,
    ttl: Duration,
    max: usize,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DraftStore {
    pub fn new(ttl: Duration, max: usize) -> Self {
        Self { drafts: Arc::default(), ttl, max: max.max(1) }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_secs(config.draft_ttl_secs), config.max_drafts)
    }

    pub fn create(&self, request: GenerationRequest) -> Draft {
        let now = Utc::now();
        let draft = Draft { id: Uuid::new_v4(), request, created_at: now, updated_at: now };
        let mut guard = self.drafts.write();
        self.prune_locked(&mut guard, now, 1);
        guard.insert(draft.id, draft.clone());
        draft
    }

    /// Drops drafts idle longer than the TTL.
    pub fn prune(&self) -> usize {
        self.prune_locked(&mut self.drafts.write(), Utc::now(), 0)
    }

    /// Removes expired drafts, then evicts the stalest until `room` more fit under the cap.
    fn prune_locked(&self, drafts: &mut HashMap<Uuid, Draft>, now: DateTime<Utc>, room: usize) -> usize {
        let before = drafts.len();
        drafts.retain(|_, d| {
            now.signed_duration_since(d.updated_at).to_std().unwrap_or_default() <= self.ttl
        });
        while !drafts.is_empty() && drafts.len() + room > self.max {
            let stalest = drafts.values().min_by_key(|d| d.updated_at).map(|d| d.id);
            match stalest {
                Some(id) => drafts.remove(&id),
                None => break,
            };
        }
        let removed = before - drafts.len();
        if removed > 0 {
            debug!("🧹 Dropped {} stale drafts", removed);
        }
        removed
    }

    pub fn get(&self, id: &Uuid) -> Option<Draft> {
        self.drafts.read().get(id).cloned()
    }

    /// Applies a partial update, dropping any speculative result it made stale.
    pub fn apply(&self, id: &Uuid, update: DraftUpdate) -> Option<Draft> {
        self.modify(id, |request| update.apply(request))
    }

    pub fn modify(&self, id: &Uuid, f: impl FnOnce(&mut GenerationRequest)) -> Option<Draft> {
        let mut guard = self.drafts.write();
        let draft = guard.get_mut(id)?;
        f(&mut draft.request);
        draft.updated_at = Utc::now();
        Some(draft.clone())
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.drafts.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.drafts.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationStrategy, Tone};
    use crate::payload::ImagePayload;
    use crate::speculative::{SpeculativeKey, SpeculativeSynthesis};
    use crate::test_support::sample_photo;
    use pretty_assertions::assert_eq;

    fn with_ready_speculation() -> GenerationRequest {
        let photo = sample_photo();
        let mut request = GenerationRequest {
            template_id: "terminator".into(),
            template_ref: Some("https://poster".into()),
            photo: Some(photo.clone()),
            tone: Tone::Action,
            ..Default::default()
        };
        let key = SpeculativeKey::new(&photo, "https://poster", GenerationStrategy::Cinematic);
        request.speculative = Some(SpeculativeSynthesis::ready(key, ImagePayload::new("image/png", "AAAA")));
        request
    }

    #[test]
    fn lifecycle_create_update_remove() {
        let store = DraftStore::default();
        let draft = store.create(GenerationRequest { template_id: "matrix".into(), ..Default::default() });
        assert_eq!(store.len(), 1);

        let updated = store
            .apply(&draft.id, DraftUpdate { actor_name: Some("ALEX".into()), ..Default::default() })
            .unwrap();
        assert_eq!(updated.request.actor_name, "ALEX");
        assert!(updated.updated_at >= draft.updated_at);

        assert!(store.remove(&draft.id));
        assert!(!store.remove(&draft.id));
        assert!(store.get(&draft.id).is_none());
        assert!(store.apply(&draft.id, DraftUpdate::default()).is_none());
    }

    #[test]
    fn text_edits_keep_speculation_but_photo_changes_drop_it() {
        let store = DraftStore::default();
        let draft = store.create(with_ready_speculation());
        assert_eq!(draft.view().pre_generation, PreGeneration::Ready);

        let kept = store
            .apply(&draft.id, DraftUpdate { tagline: Some("I'll be back.".into()), ..Default::default() })
            .unwrap();
        assert!(kept.request.speculative.is_some());

        let dropped = store
            .apply(&draft.id, DraftUpdate { photo: Some(ImagePayload::new("image/png", "BBBB")), ..Default::default() })
            .unwrap();
        assert!(dropped.request.speculative.is_none());
        assert_eq!(dropped.view().pre_generation, PreGeneration::Idle);
    }

    #[test]
    fn switching_strategy_or_poster_drops_speculation() {
        let store = DraftStore::default();
        let draft = store.create(with_ready_speculation());
        let updated = store
            .apply(&draft.id, DraftUpdate { strategy: Some(GenerationStrategy::Parody), ..Default::default() })
            .unwrap();
        assert!(updated.request.speculative.is_none());

        let draft = store.create(with_ready_speculation());
        let updated = store
            .apply(&draft.id, DraftUpdate { template_ref: Some("https://other".into()), ..Default::default() })
            .unwrap();
        assert!(updated.request.speculative.is_none());
    }

    fn backdate(store: &DraftStore, id: &Uuid, secs: i64) {
        let mut guard = store.drafts.write();
        let draft = guard.get_mut(id).unwrap();
        draft.updated_at -= chrono::Duration::seconds(secs);
    }

    #[test]
    fn idle_drafts_expire() {
        let store = DraftStore::new(Duration::from_secs(60), 100);
        let stale = store.create(GenerationRequest::default());
        let fresh = store.create(GenerationRequest::default());
        backdate(&store, &stale.id, 61);
        backdate(&store, &fresh.id, 30);

        assert_eq!(store.prune(), 1);
        assert!(store.get(&stale.id).is_none());
        assert!(store.get(&fresh.id).is_some());

        backdate(&store, &fresh.id, 31);
        let newest = store.create(GenerationRequest::default());
        assert!(store.get(&fresh.id).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.get(&newest.id).is_some());
    }

    #[test]
    fn cap_evicts_least_recently_updated() {
        let store = DraftStore::new(Duration::from_secs(3600), 2);
        let a = store.create(GenerationRequest::default());
        let b = store.create(GenerationRequest::default());
        backdate(&store, &a.id, 10);
        backdate(&store, &b.id, 20);

        let c = store.create(GenerationRequest::default());
        assert_eq!(store.len(), 2);
        assert!(store.get(&b.id).is_none());
        assert!(store.get(&a.id).is_some());
        assert!(store.get(&c.id).is_some());
    }

    #[test]
    fn view_serializes_form_fields() {
        let store = DraftStore::default();
        let draft = store.create(with_ready_speculation());
        let json = serde_json::to_value(draft.view()).unwrap();
        assert_eq!(json["templateId"], "terminator");
        assert_eq!(json["preGeneration"], "ready");
        assert_eq!(json["tone"], "Action");
        assert!(json["photo"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }
}
