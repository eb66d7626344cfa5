//! Scripted collaborators for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveTime;

use pinbot_config::BrowseConfig;
use pinbot_cron::dispatcher::JobDispatcher;
use pinbot_hooks::{StatusEvent, StatusRegistry};
use pinbot_storage::AgentStore;
use pinbot_types::{Agent, AgentProfile, CommentItem, ContentItem, Interval};

use crate::backend::{
    ActionBackend, BackendError, Backends, BearerToken, ContentSource, CreatePayload,
    GenerationPurpose, GenerationRequest, Oracle, TokenProvider,
};
use crate::executor::ActionExecutor;
use crate::service::AgentService;
use crate::pipeline::CommandPipeline;
use crate::recorder::RelationshipRecorder;
use crate::slots::{AgentSlot, AgentSlots};

pub fn item(id: &str) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        text: format!("Post {id}"),
        tags: vec!["food".to_string()],
        like_count: 0,
        comment_count: 0,
        author_id: None,
    }
}

pub fn comment(id: &str, text: &str) -> CommentItem {
    CommentItem {
        id: id.to_string(),
        text: text.to_string(),
        author_id: None,
    }
}

pub fn agent_with(functions: &[&str]) -> Agent {
    Agent::from_profile(
        AgentProfile {
            username: "tester".into(),
            password: None,
            nickname: "tess".into(),
            name: "Tess Ter".into(),
            gender: None,
            age: Some(28),
            location: Some("Lisbon".into()),
            occupation: None,
            locale: "en_US".into(),
            interests: vec!["food".into(), "travel".into()],
            intervals: vec![Interval::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                4,
            )],
            functions: functions.iter().map(|f| f.to_string()).collect(),
        },
        "secret".into(),
    )
}

// ──────────────────── Content ────────────────────

#[derive(Default)]
pub struct FakeContent {
    default_page: Vec<ContentItem>,
    fetched: Mutex<Vec<u32>>,
    comments: Mutex<HashMap<String, Vec<CommentItem>>>,
}

impl FakeContent {
    /// Every page returns `page`.
    pub fn with_page(page: Vec<ContentItem>) -> Self {
        Self {
            default_page: page,
            ..Self::default()
        }
    }

    pub fn set_comments(&self, item_id: &str, comments: Vec<CommentItem>) {
        self.comments
            .lock()
            .unwrap()
            .insert(item_id.to_string(), comments);
    }

    pub fn fetched_pages(&self) -> Vec<u32> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSource for FakeContent {
    async fn list_items(
        &self,
        _sort: &str,
        page: u32,
        _page_size: u32,
    ) -> Result<Vec<ContentItem>, BackendError> {
        self.fetched.lock().unwrap().push(page);
        Ok(self.default_page.clone())
    }

    async fn list_comments(&self, item_id: &str) -> Result<Vec<CommentItem>, BackendError> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ──────────────────── Oracle ────────────────────

pub struct FakeOracle {
    scripted: Mutex<VecDeque<String>>,
    fallback: String,
    reply: Mutex<String>,
    decide_calls: AtomicUsize,
    generated: Mutex<Vec<GenerationPurpose>>,
}

impl FakeOracle {
    /// Answers `decisions` in order, then `"none"`.
    pub fn deciding(decisions: &[&str]) -> Self {
        Self {
            scripted: Mutex::new(decisions.iter().map(|d| d.to_string()).collect()),
            ..Self::always("none")
        }
    }

    pub fn always(decision: &str) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback: decision.to_string(),
            reply: Mutex::new("1 - agreed".to_string()),
            decide_calls: AtomicUsize::new(0),
            generated: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reply(&self, answer: &str) {
        *self.reply.lock().unwrap() = answer.to_string();
    }

    pub fn decide_calls(&self) -> usize {
        self.decide_calls.load(Ordering::SeqCst)
    }

    pub fn generated(&self) -> Vec<GenerationPurpose> {
        self.generated.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for FakeOracle {
    async fn decide(
        &self,
        _profile: &str,
        _interests: &str,
        _listing: &str,
    ) -> Result<String, BackendError> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.scripted.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        self.generated.lock().unwrap().push(request.purpose);
        Ok(match request.purpose {
            GenerationPurpose::Reply => self.reply.lock().unwrap().clone(),
            GenerationPurpose::Comment => "Looks delicious".to_string(),
            GenerationPurpose::Post => "My lunch today".to_string(),
        })
    }
}

// ──────────────────── Actions ────────────────────

#[derive(Default)]
pub struct FakeActions {
    calls: Mutex<Vec<String>>,
    created: AtomicUsize,
    fail_likes: AtomicBool,
    stop_on_like: Mutex<Option<Arc<AgentSlot>>>,
}

impl FakeActions {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_likes(&self) {
        self.fail_likes.store(true, Ordering::SeqCst);
    }

    /// Request a stop on `slot` from inside the next like call.
    pub fn stop_on_like(&self, slot: Arc<AgentSlot>) {
        *self.stop_on_like.lock().unwrap() = Some(slot);
    }
}

#[async_trait]
impl ActionBackend for FakeActions {
    async fn like(&self, _token: &BearerToken, item_id: &str) -> Result<(), BackendError> {
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection reset".into()));
        }
        if let Some(slot) = self.stop_on_like.lock().unwrap().as_ref() {
            slot.request_stop();
        }
        self.calls.lock().unwrap().push(format!("like:{item_id}"));
        Ok(())
    }

    async fn comment(
        &self,
        _token: &BearerToken,
        item_id: &str,
        _text: &str,
    ) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(format!("comment:{item_id}"));
        Ok(())
    }

    async fn reply_to_comment(
        &self,
        _token: &BearerToken,
        comment_id: &str,
        text: &str,
    ) -> Result<(), BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("reply:{comment_id}:{text}"));
        Ok(())
    }

    async fn create(
        &self,
        _token: &BearerToken,
        _payload: &CreatePayload,
    ) -> Result<String, BackendError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().unwrap().push("create".to_string());
        Ok(format!("created-{n}"))
    }
}

// ──────────────────── Tokens ────────────────────

#[derive(Default)]
pub struct FakeTokens {
    pub fail: AtomicBool,
    pub issued: AtomicUsize,
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn agent_token(&self, agent: &Agent) -> Result<BearerToken, BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Auth(format!("bad password for {}", agent.username)));
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(BearerToken::new(format!("token-{}", agent.username), Some(3600)))
    }
}

// ──────────────────── Harness ────────────────────

/// A stored agent wired to fresh fakes.
pub struct Harness {
    pub agent_id: String,
    pub store: Arc<AgentStore>,
    pub slots: Arc<AgentSlots>,
    pub status: Arc<StatusRegistry>,
    pub events: Arc<Mutex<Vec<StatusEvent>>>,
    pub content: Arc<FakeContent>,
    pub oracle: Arc<FakeOracle>,
    pub actions: Arc<FakeActions>,
    pub tokens: Arc<FakeTokens>,
}

impl Harness {
    pub async fn new(functions: &[&str]) -> Self {
        Self::with(
            functions,
            FakeContent::with_page(vec![item("x")]),
            FakeOracle::always("0"),
        )
        .await
    }

    pub async fn with(functions: &[&str], content: FakeContent, oracle: FakeOracle) -> Self {
        let store = Arc::new(AgentStore::open_in_memory().unwrap());
        let agent = agent_with(functions);
        store.save_agent(&agent).await.unwrap();

        let status = Arc::new(StatusRegistry::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        status
            .on(
                "*",
                Arc::new(move |event: StatusEvent| {
                    let sink = sink.clone();
                    Box::pin(async move {
                        sink.lock().unwrap().push(event);
                    })
                }),
            )
            .await;

        Self {
            agent_id: agent.id,
            store,
            slots: Arc::new(AgentSlots::new()),
            status,
            events,
            content: Arc::new(content),
            oracle: Arc::new(oracle),
            actions: Arc::new(FakeActions::default()),
            tokens: Arc::new(FakeTokens::default()),
        }
    }

    pub async fn stored_agent(&self) -> Agent {
        self.store.get_agent(&self.agent_id).await.unwrap().unwrap()
    }

    pub fn backends(&self) -> Backends {
        Backends {
            content: self.content.clone(),
            oracle: self.oracle.clone(),
            actions: self.actions.clone(),
            tokens: self.tokens.clone(),
        }
    }

    pub fn pipeline(&self) -> CommandPipeline {
        CommandPipeline::new(
            self.content.clone(),
            self.oracle.clone(),
            self.actions.clone(),
            Arc::new(RelationshipRecorder::new(self.store.clone(), self.slots.clone())),
            self.status.clone(),
        )
    }

    pub fn executor(&self, browse: BrowseConfig) -> ActionExecutor {
        ActionExecutor::new(
            self.store.clone(),
            self.slots.clone(),
            self.status.clone(),
            self.backends(),
            browse,
        )
    }

    /// Service over this harness with its own dispatcher.
    pub fn service(&self, browse: BrowseConfig) -> (AgentService, Arc<JobDispatcher>) {
        let dispatcher = Arc::new(JobDispatcher::new());
        let service = AgentService::new(
            self.store.clone(),
            dispatcher.clone(),
            self.slots.clone(),
            Arc::new(self.executor(browse)),
            self.status.clone(),
        );
        (service, dispatcher)
    }

    /// Status messages seen so far, after letting spawned handlers run.
    pub async fn status_messages(&self) -> Vec<String> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.channel() == pinbot_hooks::events::AGENT_STATUS)
            .map(|e| e.message())
            .collect()
    }
}
