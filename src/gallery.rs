use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PlanError;
use crate::llm::sketch::SketchDispatcher;
use crate::plan::generator::PlanGenerator;
use crate::plan::layout::LayoutReport;
use crate::plan::records::DroppedRecord;
use crate::plan::types::{PlanRecord, UserInput};

/// Shared flag that tells an in-flight sketch task whether its card still
/// exists. Revoked when the card is replaced or the gallery is torn down.
#[derive(Debug, Clone)]
pub struct LivenessToken(Arc<AtomicBool>);

impl LivenessToken {
    fn new() -> Self {
        LivenessToken(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn ptr_eq(&self, other: &LivenessToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "uri", rename_all = "camelCase")]
pub enum SketchState {
    Pending,
    Ready(String),
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum GenerationState {
    Idle,
    GeneratingText,
    Complete,
    Error(String),
}

#[derive(Debug)]
struct Card {
    plan: PlanRecord,
    sketch: SketchState,
    token: LivenessToken,
}

#[derive(Debug)]
struct GalleryInner {
    state: GenerationState,
    cards: Vec<Card>,
    dropped: Vec<DroppedRecord>,
    layout: Option<LayoutReport>,
    epoch: u64,
}

impl GalleryInner {
    fn revoke_all(&mut self) {
        for card in &self.cards {
            card.token.revoke();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSnapshot {
    pub index: usize,
    pub plan: PlanRecord,
    pub sketch: SketchState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GallerySnapshot {
    pub state: GenerationState,
    pub cards: Vec<CardSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutReport>,
}

/// Host-side view of one generation: the plan cards in order and the sketch
/// attached to each.
#[derive(Clone)]
pub struct Gallery {
    generator: Arc<PlanGenerator>,
    inner: Arc<Mutex<GalleryInner>>,
}

impl Gallery {
    pub fn new(generator: Arc<PlanGenerator>) -> Self {
        Gallery {
            generator,
            inner: Arc::new(Mutex::new(GalleryInner {
                state: GenerationState::Idle,
                cards: Vec::new(),
                dropped: Vec::new(),
                layout: None,
                epoch: 0,
            })),
        }
    }

    /// Replaces the current cards with a fresh batch. Returns the number of
    /// cards on success.
    pub async fn generate(&self, input: UserInput) -> Result<usize, PlanError> {
        let epoch = {
            let mut inner = self.inner.lock();
            if inner.state == GenerationState::GeneratingText {
                return Err(PlanError::GenerationInProgress);
            }
            inner.revoke_all();
            inner.cards.clear();
            inner.dropped.clear();
            inner.layout = None;
            inner.state = GenerationState::GeneratingText;
            inner.epoch += 1;
            inner.epoch
        };

        let result = self.generator.generate(input).await;

        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            debug!("Discarding plans from a torn-down generation");
            return result.map(|batch| batch.plans.len());
        }
        match result {
            Ok(batch) => {
                inner.cards = batch
                    .plans
                    .into_iter()
                    .map(|plan| Card {
                        plan,
                        sketch: SketchState::Pending,
                        token: LivenessToken::new(),
                    })
                    .collect();
                inner.dropped = batch.dropped;
                inner.layout = batch.layout;
                inner.state = GenerationState::Complete;
                Ok(inner.cards.len())
            }
            Err(err) => {
                inner.state = GenerationState::Error(err.to_string());
                Err(err)
            }
        }
    }

    /// One task per pending card. Results land only while the card's token
    /// is live.
    pub fn spawn_sketches(&self, dispatcher: Arc<SketchDispatcher>) -> Vec<JoinHandle<()>> {
        let jobs: Vec<(usize, PlanRecord, LivenessToken)> = {
            let inner = self.inner.lock();
            inner
                .cards
                .iter()
                .enumerate()
                .filter(|(_, card)| card.sketch == SketchState::Pending)
                .map(|(index, card)| (index, card.plan.clone(), card.token.clone()))
                .collect()
        };
        info!(count = jobs.len(), "Dispatching composition sketches");

        jobs.into_iter()
            .map(|(index, plan, token)| {
                let gallery = self.clone();
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let uri = dispatcher.dispatch_for(&plan).await;
                    gallery.apply_sketch(index, &token, uri);
                })
            })
            .collect()
    }

    /// `false` when the result was discarded because its card is gone.
    pub fn apply_sketch(&self, index: usize, token: &LivenessToken, uri: Option<String>) -> bool {
        let mut inner = self.inner.lock();
        if !token.is_live() {
            debug!(index, "Discarding sketch for a revoked card");
            return false;
        }
        let Some(card) = inner.cards.get_mut(index) else {
            warn!(index, "Sketch result for a card that does not exist");
            return false;
        };
        if !card.token.ptr_eq(token) {
            return false;
        }
        card.sketch = match uri {
            Some(uri) => SketchState::Ready(uri),
            None => SketchState::Unavailable,
        };
        true
    }

    /// Revokes every token. Pending sketches become unavailable and late
    /// results are dropped; finished cards are kept.
    pub fn teardown(&self) {
        let mut inner = self.inner.lock();
        inner.revoke_all();
        for card in inner.cards.iter_mut() {
            if card.sketch == SketchState::Pending {
                card.sketch = SketchState::Unavailable;
            }
        }
        if inner.state == GenerationState::GeneratingText {
            inner.state = GenerationState::Idle;
            inner.epoch += 1;
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> GenerationState {
        self.inner.lock().state.clone()
    }

    #[cfg(test)]
    pub(crate) fn token(&self, index: usize) -> Option<LivenessToken> {
        self.inner
            .lock()
            .cards
            .get(index)
            .map(|card| card.token.clone())
    }

    pub fn snapshot(&self) -> GallerySnapshot {
        let inner = self.inner.lock();
        GallerySnapshot {
            state: inner.state.clone(),
            cards: inner
                .cards
                .iter()
                .enumerate()
                .map(|(index, card)| CardSnapshot {
                    index,
                    plan: card.plan.clone(),
                    sketch: card.sketch.clone(),
                })
                .collect(),
            dropped: inner.dropped.clone(),
            layout: inner.layout.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    use super::*;
    use crate::config::test_config;
    use crate::llm::gemini::tests::{text_response, FakeTransport};
    use crate::llm::gemini::{GeminiResponse, GenerateContent};
    use crate::plan::records::tests::record_json;

    fn brief(portrait: u32, landscape: u32) -> UserInput {
        UserInput {
            subject: "woman in red dress".to_string(),
            location: "old library".to_string(),
            environment: "sunset".to_string(),
            style: "moody".to_string(),
            portrait_count: portrait,
            landscape_count: landscape,
        }
    }

    fn plans_response(titles: &[&str]) -> Value {
        let records: Vec<String> = titles.iter().map(|title| record_json(title, "9:16")).collect();
        text_response(&format!("{{\"plans\":[{}]}}", records.join(",")))
    }

    fn gallery(responses: Vec<Result<Value, PlanError>>) -> Gallery {
        let transport = Arc::new(FakeTransport::with(responses));
        Gallery::new(Arc::new(PlanGenerator::new(Arc::new(test_config()), transport)))
    }

    /// Answers sketch requests by prompt so concurrent tasks get stable results.
    struct PromptKeyedTransport;

    #[async_trait]
    impl GenerateContent for PromptKeyedTransport {
        async fn generate_content(
            &self,
            _model: &str,
            payload: Value,
            _label: &str,
        ) -> Result<GeminiResponse, PlanError> {
            let prompt = payload["contents"][0]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            if prompt.starts_with("Broken") {
                return Err(PlanError::Http {
                    status: 500,
                    message: "internal".into(),
                });
            }
            let body = if prompt.starts_with("Wordy") {
                text_response("no image today")
            } else {
                json!({ "candidates": [{ "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                ] } }] })
            };
            Ok(serde_json::from_value(body).unwrap())
        }
    }

    /// Holds every sketch request until released, announcing when one starts.
    struct GatedTransport {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl GenerateContent for GatedTransport {
        async fn generate_content(
            &self,
            _model: &str,
            _payload: Value,
            _label: &str,
        ) -> Result<GeminiResponse, PlanError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(serde_json::from_value(json!({ "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
            ] } }] }))
            .unwrap())
        }
    }

    #[tokio::test]
    async fn generation_populates_pending_cards() {
        let gallery = gallery(vec![Ok(plans_response(&["A", "B"]))]);
        assert_eq!(gallery.state(), GenerationState::Idle);
        assert_eq!(gallery.generate(brief(2, 0)).await.unwrap(), 2);

        let snapshot = gallery.snapshot();
        assert_eq!(snapshot.state, GenerationState::Complete);
        assert_eq!(snapshot.cards.len(), 2);
        assert!(snapshot
            .cards
            .iter()
            .all(|card| card.sketch == SketchState::Pending));
        assert_eq!(snapshot.cards[1].plan.title, "B");
    }

    #[tokio::test]
    async fn resubmission_is_rejected_while_generating() {
        let gallery = gallery(vec![]);
        gallery.inner.lock().state = GenerationState::GeneratingText;
        let err = gallery.generate(brief(1, 0)).await.unwrap_err();
        assert!(matches!(err, PlanError::GenerationInProgress));
        assert_eq!(gallery.state(), GenerationState::GeneratingText);
    }

    #[tokio::test]
    async fn stale_sketch_results_are_discarded() {
        let gallery = gallery(vec![
            Ok(plans_response(&["Old"])),
            Ok(plans_response(&["New"])),
        ]);
        gallery.generate(brief(1, 0)).await.unwrap();
        let old_token = gallery.token(0).unwrap();

        gallery.generate(brief(1, 0)).await.unwrap();
        assert!(!old_token.is_live());
        assert!(!gallery.apply_sketch(0, &old_token, Some("data:image/png;base64,AAAA".into())));

        let snapshot = gallery.snapshot();
        assert_eq!(snapshot.cards[0].plan.title, "New");
        assert_eq!(snapshot.cards[0].sketch, SketchState::Pending);

        let fresh = gallery.token(0).unwrap();
        assert!(gallery.apply_sketch(0, &fresh, None));
        assert_eq!(gallery.snapshot().cards[0].sketch, SketchState::Unavailable);
    }

    #[tokio::test]
    async fn failed_generation_records_the_error() {
        let gallery = gallery(vec![
            Ok(plans_response(&["Kept?"])),
            Ok(text_response("not json at all")),
        ]);
        gallery.generate(brief(1, 0)).await.unwrap();
        assert!(gallery.generate(brief(1, 0)).await.is_err());

        let snapshot = gallery.snapshot();
        assert!(matches!(snapshot.state, GenerationState::Error(_)));
        assert!(snapshot.cards.is_empty());
    }

    #[tokio::test]
    async fn one_failed_sketch_leaves_the_others_alone() {
        let gallery = gallery(vec![Ok(plans_response(&["Fine", "Broken", "Wordy"]))]);
        gallery.generate(brief(3, 0)).await.unwrap();

        let dispatcher = Arc::new(SketchDispatcher::new(
            Arc::new(test_config()),
            Arc::new(PromptKeyedTransport),
        ));
        for handle in gallery.spawn_sketches(dispatcher) {
            handle.await.unwrap();
        }

        let sketches: Vec<SketchState> = gallery
            .snapshot()
            .cards
            .into_iter()
            .map(|card| card.sketch)
            .collect();
        assert_eq!(
            sketches,
            vec![
                SketchState::Ready("data:image/png;base64,AAAA".to_string()),
                SketchState::Unavailable,
                SketchState::Unavailable,
            ]
        );
    }

    #[tokio::test]
    async fn teardown_blocks_late_results() {
        let gallery = gallery(vec![Ok(plans_response(&["A", "B"]))]);
        gallery.generate(brief(2, 0)).await.unwrap();
        let token = gallery.token(1).unwrap();

        gallery.teardown();
        assert!(!gallery.apply_sketch(1, &token, Some("data:image/png;base64,AAAA".into())));
        let snapshot = gallery.snapshot();
        assert_eq!(snapshot.cards.len(), 2);
        assert!(snapshot
            .cards
            .iter()
            .all(|card| card.sketch == SketchState::Unavailable));
    }

    #[tokio::test]
    async fn teardown_during_in_flight_sketch_discards_its_result() {
        let gallery = gallery(vec![Ok(plans_response(&["Slow"]))]);
        gallery.generate(brief(1, 0)).await.unwrap();

        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let dispatcher = Arc::new(SketchDispatcher::new(
            Arc::new(test_config()),
            Arc::new(GatedTransport {
                started: started.clone(),
                release: release.clone(),
            }),
        ));
        let handles = gallery.spawn_sketches(dispatcher);

        started.notified().await;
        gallery.teardown();
        release.notify_one();
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = gallery.snapshot();
        assert_eq!(snapshot.cards[0].sketch, SketchState::Unavailable);
    }

    #[test]
    fn snapshot_serializes_sketch_state() {
        let value = serde_json::to_value(SketchState::Ready("data:x".into())).unwrap();
        assert_eq!(value, json!({ "status": "ready", "uri": "data:x" }));
        let value = serde_json::to_value(SketchState::Pending).unwrap();
        assert_eq!(value, json!({ "status": "pending" }));
    }
}
