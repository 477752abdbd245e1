//! The chat relay: turns one user message into a streamed assistant reply.
//!
//! A turn validates the session and input, resolves or opens a conversation,
//! persists the user's message, then opens a single streaming completion.
//! Tokens are handed to the caller through a bounded channel while a spawned
//! pump task accumulates them and persists the assistant reply once the
//! provider finishes, fails, or the caller goes away.

pub mod guard;
pub mod provider;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::auth::Session;
use crate::models::chat::{Message, MessageRole};
use crate::store::{conversation_title, find_owned_conversation, ChatStore};
use provider::{ChatMessage, CompletionProvider, CompletionRequest, TokenChunks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    /// Every message is relayed.
    Open,
    /// Off-topic messages get the canned refusal and touch nothing.
    TopicGuarded,
}

impl TurnMode {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            TurnMode::Open => guard::OPEN_SYSTEM_PROMPT,
            TurnMode::TopicGuarded => guard::GUARDED_SYSTEM_PROMPT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub channel_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            model: "llama3-70b-8192".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnCompletion {
    Finished,
    Cancelled,
    ProviderFailed(String),
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub conversation_id: Uuid,
    pub content: String,
    pub completion: TurnCompletion,
    pub persisted: bool,
}

pub enum TurnOutcome {
    Streaming(Turn),
    Refused(&'static str),
}

pub struct Turn {
    pub conversation_id: Uuid,
    pub tokens: TokenStream,
    pub finished: JoinHandle<TurnReport>,
}

/// Receiving end of a turn. Dropping it cancels the turn.
pub struct TokenStream {
    receiver: mpsc::Receiver<Result<String, AppError>>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl TokenStream {
    fn new(receiver: mpsc::Receiver<Result<String, AppError>>, cancel: CancellationToken) -> Self {
        Self {
            receiver,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for TokenStream {
    type Item = Result<String, AppError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

pub struct ChatRelay {
    store: Arc<dyn ChatStore>,
    provider: Arc<dyn CompletionProvider>,
    settings: RelaySettings,
}

impl ChatRelay {
    pub fn new(
        store: Arc<dyn ChatStore>,
        provider: Arc<dyn CompletionProvider>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn submit_turn(
        &self,
        session: &Session,
        user_text: &str,
        conversation_id: Option<Uuid>,
        mode: TurnMode,
    ) -> Result<TurnOutcome, AppError> {
        if !self.store.user_exists(session.user_id).await? {
            return Err(AppError::Unauthorized);
        }

        if user_text.trim().is_empty() {
            return Err(AppError::InvalidInput("Message cannot be empty".to_string()));
        }

        if mode == TurnMode::TopicGuarded && !guard::is_on_topic(user_text) {
            tracing::info!(user_id = %session.user_id, "Refusing off-topic guarded message");
            return Ok(TurnOutcome::Refused(guard::REFUSAL_MESSAGE));
        }

        let conversation = match conversation_id {
            Some(id) => find_owned_conversation(self.store.as_ref(), id, session.user_id)
                .await?
                .ok_or(AppError::NotFound)?,
            None => {
                self.store
                    .create_conversation(session.user_id, &conversation_title(user_text))
                    .await?
            }
        };

        self.store
            .append_message(conversation.id, MessageRole::User, user_text)
            .await?;

        let history = self.store.list_messages(conversation.id).await?;
        let request = self.completion_request(mode, &history);

        tracing::info!(
            conversation_id = %conversation.id,
            history_len = history.len(),
            provider = self.provider.name(),
            "Starting chat turn"
        );

        let chunks = self.provider.stream_completion(request).await.map_err(|e| {
            tracing::error!(conversation_id = %conversation.id, "Provider setup failed: {}", e);
            AppError::from(e)
        })?;

        let (sender, receiver) = mpsc::channel(self.settings.channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let finished = tokio::spawn(pump(
            self.store.clone(),
            conversation.id,
            chunks,
            sender,
            cancel.clone(),
        ));

        Ok(TurnOutcome::Streaming(Turn {
            conversation_id: conversation.id,
            tokens: TokenStream::new(receiver, cancel),
            finished,
        }))
    }

    fn completion_request(&self, mode: TurnMode, history: &[Message]) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(mode.system_prompt()));
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
        }));

        CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }
}

async fn pump(
    store: Arc<dyn ChatStore>,
    conversation_id: Uuid,
    mut chunks: TokenChunks,
    sender: mpsc::Sender<Result<String, AppError>>,
    cancel: CancellationToken,
) -> TurnReport {
    let mut content = String::new();

    let completion = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = chunks.next() => Some(next),
        };
        let Some(next) = next else {
            break TurnCompletion::Cancelled;
        };

        match next {
            Some(Ok(token)) => {
                if token.is_empty() {
                    continue;
                }
                content.push_str(&token);

                let delivered = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    sent = sender.send(Ok(token)) => sent.is_ok(),
                };
                if !delivered {
                    break TurnCompletion::Cancelled;
                }
            }
            Some(Err(e)) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    "Provider stream failed: {}",
                    e
                );
                let message = e.to_string();
                let _ = sender.send(Err(AppError::from(e))).await;
                break TurnCompletion::ProviderFailed(message);
            }
            None => break TurnCompletion::Finished,
        }
    };

    // Close the consumer's stream before touching the store.
    drop(sender);
    drop(chunks);

    if completion == TurnCompletion::Cancelled {
        tracing::info!(
            conversation_id = %conversation_id,
            received_chars = content.len(),
            "Chat turn cancelled by client"
        );
    }

    let persisted = if completion == TurnCompletion::Finished || !content.is_empty() {
        match store
            .append_message(conversation_id, MessageRole::Assistant, &content)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    "Failed to persist assistant reply: {}", e
                );
                false
            }
        }
    } else {
        false
    };

    TurnReport {
        conversation_id,
        content,
        completion,
        persisted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::{NewUser, Role};
    use crate::models::chat::Conversation;
    use crate::store::{MemoryStore, StoreError, StoreResult, UserStore};
    use async_trait::async_trait;
    use provider::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Step {
        Token(&'static str),
        Fail(&'static str),
    }

    #[derive(Default)]
    struct ScriptedProvider {
        steps: Vec<&'static str>,
        fail_mid_stream: Option<&'static str>,
        fail_setup: bool,
        hang_after_script: bool,
        calls: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn replying(steps: &[&'static str]) -> Self {
            Self {
                steps: steps.to_vec(),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> CompletionRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn stream_completion(
            &self,
            request: CompletionRequest,
        ) -> Result<TokenChunks, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);

            if self.fail_setup {
                return Err(ProviderError::Api {
                    status: 503,
                    message: "overloaded".to_string(),
                });
            }

            let mut steps: Vec<Step> = self.steps.iter().map(|t| Step::Token(*t)).collect();
            if let Some(reason) = self.fail_mid_stream {
                steps.push(Step::Fail(reason));
            }
            let items = futures::stream::iter(steps.into_iter().map(|step| match step {
                Step::Token(t) => Ok(t.to_string()),
                Step::Fail(reason) => Err(ProviderError::Stream(reason.to_string())),
            }));

            if self.hang_after_script {
                Ok(Box::pin(items.chain(futures::stream::pending())))
            } else {
                Ok(Box::pin(items))
            }
        }
    }

    /// Delegates to a MemoryStore but refuses to store messages with `failing_role`.
    struct FlakyStore {
        inner: MemoryStore,
        failing_role: MessageRole,
    }

    #[async_trait]
    impl ChatStore for FlakyStore {
        async fn user_exists(&self, user_id: Uuid) -> StoreResult<bool> {
            self.inner.user_exists(user_id).await
        }

        async fn create_conversation(
            &self,
            user_id: Uuid,
            title: &str,
        ) -> StoreResult<Conversation> {
            self.inner.create_conversation(user_id, title).await
        }

        async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
            self.inner.find_conversation(id).await
        }

        async fn list_conversations(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
            self.inner.list_conversations(user_id).await
        }

        async fn append_message(
            &self,
            conversation_id: Uuid,
            role: MessageRole,
            content: &str,
        ) -> StoreResult<Message> {
            if role == self.failing_role {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.append_message(conversation_id, role, content).await
        }

        async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
            self.inner.list_messages(conversation_id).await
        }

        async fn delete_conversation(&self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_conversation(id).await
        }
    }

    async fn register(store: &MemoryStore, email: &str) -> Session {
        let user = store
            .create_user(NewUser {
                name: "Wanjiru".to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
                role: Role::User,
            })
            .await
            .unwrap();
        Session {
            user_id: user.id,
            role: user.role,
        }
    }

    fn relay(store: Arc<dyn ChatStore>, provider: Arc<ScriptedProvider>) -> ChatRelay {
        ChatRelay::new(store, provider, RelaySettings::default())
    }

    fn streaming(outcome: TurnOutcome) -> Turn {
        match outcome {
            TurnOutcome::Streaming(turn) => turn,
            TurnOutcome::Refused(_) => panic!("expected a streaming turn"),
        }
    }

    async fn drain(tokens: TokenStream) -> Vec<Result<String, AppError>> {
        tokens.collect().await
    }

    #[tokio::test]
    async fn test_new_turn_creates_conversation_with_two_messages() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "a@example.com").await;
        let provider = Arc::new(ScriptedProvider::replying(&[
            "Bhang ",
            "can ",
            "trigger ",
            "psychosis.",
        ]));
        let relay = relay(store.clone(), provider.clone());

        let turn = streaming(
            relay
                .submit_turn(&session, "Can bhang cause psychosis?", None, TurnMode::Open)
                .await
                .unwrap(),
        );
        let tokens: Vec<String> = drain(turn.tokens)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let report = turn.finished.await.unwrap();

        assert_eq!(tokens, vec!["Bhang ", "can ", "trigger ", "psychosis."]);
        assert_eq!(report.completion, TurnCompletion::Finished);
        assert!(report.persisted);

        let conversations = store.list_conversations(session.user_id).await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, turn.conversation_id);
        assert_eq!(conversations[0].title, "Can bhang cause psychosis?...");

        let messages = store.list_messages(turn.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, tokens.concat());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_history_is_prefixed_with_system_prompt() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "h@example.com").await;
        let provider = Arc::new(ScriptedProvider::replying(&["First reply"]));
        let relay = relay(store.clone(), provider.clone());

        let first = streaming(
            relay
                .submit_turn(&session, "hello", None, TurnMode::Open)
                .await
                .unwrap(),
        );
        drain(first.tokens).await;
        first.finished.await.unwrap();

        let second = streaming(
            relay
                .submit_turn(&session, "and again", Some(first.conversation_id), TurnMode::Open)
                .await
                .unwrap(),
        );
        drain(second.tokens).await;
        second.finished.await.unwrap();

        let request = provider.last_request();
        let roles: Vec<MessageRole> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
            ]
        );
        assert_eq!(request.messages[0].content, guard::OPEN_SYSTEM_PROMPT);
        assert_eq!(request.messages[3].content, "and again");
        assert_eq!(request.model, "llama3-70b-8192");
        assert_eq!(request.max_tokens, 1024);
    }

    #[tokio::test]
    async fn test_blank_message_touches_nothing() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "b@example.com").await;
        let provider = Arc::new(ScriptedProvider::replying(&["unused"]));
        let relay = relay(store.clone(), provider.clone());

        for text in ["", "   ", "\n\t"] {
            let result = relay.submit_turn(&session, text, None, TurnMode::Open).await;
            assert!(matches!(result, Err(AppError::InvalidInput(_))));
        }

        assert!(store.list_conversations(session.user_id).await.unwrap().is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_unauthorized() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::replying(&["unused"]));
        let relay = relay(store.clone(), provider.clone());
        let ghost = Session {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };

        let result = relay.submit_turn(&ghost, "hello", None, TurnMode::Open).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_foreign_conversation_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let owner = register(&store, "owner@example.com").await;
        let intruder = register(&store, "intruder@example.com").await;
        let conversation = store.create_conversation(owner.user_id, "mine...").await.unwrap();
        let provider = Arc::new(ScriptedProvider::replying(&["unused"]));
        let relay = relay(store.clone(), provider.clone());

        let result = relay
            .submit_turn(&intruder, "hello", Some(conversation.id), TurnMode::Open)
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));

        let missing = relay
            .submit_turn(&owner, "hello", Some(Uuid::new_v4()), TurnMode::Open)
            .await;
        assert!(matches!(missing, Err(AppError::NotFound)));

        assert!(store.list_messages(conversation.id).await.unwrap().is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_guarded_mode_refuses_off_topic() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "g@example.com").await;
        let provider = Arc::new(ScriptedProvider::replying(&["unused"]));
        let relay = relay(store.clone(), provider.clone());

        let outcome = relay
            .submit_turn(&session, "what's the capital of France", None, TurnMode::TopicGuarded)
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Refused(text) => assert_eq!(text, guard::REFUSAL_MESSAGE),
            TurnOutcome::Streaming(_) => panic!("off-topic message was relayed"),
        }
        assert_eq!(provider.calls(), 0);
        assert!(store.list_conversations(session.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guarded_mode_relays_on_topic() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "g2@example.com").await;
        let provider = Arc::new(ScriptedProvider::replying(&["I hear you."]));
        let relay = relay(store.clone(), provider.clone());

        let turn = streaming(
            relay
                .submit_turn(
                    &session,
                    "I've been having paranoid thoughts since smoking bhang",
                    None,
                    TurnMode::TopicGuarded,
                )
                .await
                .unwrap(),
        );
        drain(turn.tokens).await;
        turn.finished.await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(provider.last_request().messages[0].content, guard::GUARDED_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_open_mode_relays_off_topic() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "o@example.com").await;
        let provider = Arc::new(ScriptedProvider::replying(&["Paris."]));
        let relay = relay(store.clone(), provider.clone());

        let outcome = relay
            .submit_turn(&session, "what's the capital of France", None, TurnMode::Open)
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Streaming(_)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_setup_failure() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "f@example.com").await;
        let provider = Arc::new(ScriptedProvider {
            fail_setup: true,
            ..Default::default()
        });
        let relay = relay(store.clone(), provider.clone());

        let result = relay.submit_turn(&session, "hello", None, TurnMode::Open).await;
        assert!(matches!(result, Err(AppError::ProviderFailure(_))));
        assert_eq!(provider.calls(), 1);

        let conversations = store.list_conversations(session.user_id).await.unwrap();
        let messages = store.list_messages(conversations[0].id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_persists_partial_reply() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "m@example.com").await;
        let provider = Arc::new(ScriptedProvider {
            steps: vec!["Hel", "lo"],
            fail_mid_stream: Some("connection reset"),
            ..Default::default()
        });
        let relay = relay(store.clone(), provider.clone());

        let turn = streaming(
            relay
                .submit_turn(&session, "hi", None, TurnMode::Open)
                .await
                .unwrap(),
        );
        let items = drain(turn.tokens).await;
        let report = turn.finished.await.unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_deref().unwrap(), "Hel");
        assert_eq!(items[1].as_deref().unwrap(), "lo");
        assert!(matches!(items[2], Err(AppError::ProviderFailure(_))));

        assert!(matches!(report.completion, TurnCompletion::ProviderFailed(_)));
        assert!(report.persisted);
        let messages = store.list_messages(turn.conversation_id).await.unwrap();
        assert_eq!(messages[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_failure_before_any_token_persists_nothing_more() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "e@example.com").await;
        let provider = Arc::new(ScriptedProvider {
            fail_mid_stream: Some("boom"),
            ..Default::default()
        });
        let relay = relay(store.clone(), provider.clone());

        let turn = streaming(
            relay
                .submit_turn(&session, "hi", None, TurnMode::Open)
                .await
                .unwrap(),
        );
        drain(turn.tokens).await;
        let report = turn.finished.await.unwrap();

        assert!(!report.persisted);
        assert_eq!(store.list_messages(turn.conversation_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_the_stream_cancels_and_saves_partial_text() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "c@example.com").await;
        let provider = Arc::new(ScriptedProvider {
            steps: vec!["Take ", "a breath"],
            hang_after_script: true,
            ..Default::default()
        });
        let relay = relay(store.clone(), provider.clone());

        let mut turn = streaming(
            relay
                .submit_turn(&session, "hi", None, TurnMode::Open)
                .await
                .unwrap(),
        );
        assert_eq!(turn.tokens.next().await.unwrap().unwrap(), "Take ");
        assert_eq!(turn.tokens.next().await.unwrap().unwrap(), "a breath");
        drop(turn.tokens);

        let report = turn.finished.await.unwrap();
        assert_eq!(report.completion, TurnCompletion::Cancelled);
        assert!(report.persisted);

        let messages = store.list_messages(turn.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Take a breath");
    }

    #[tokio::test]
    async fn test_explicit_cancel_stops_the_turn() {
        let store = Arc::new(MemoryStore::new());
        let session = register(&store, "x@example.com").await;
        let provider = Arc::new(ScriptedProvider {
            hang_after_script: true,
            ..Default::default()
        });
        let relay = relay(store.clone(), provider.clone());

        let turn = streaming(
            relay
                .submit_turn(&session, "hi", None, TurnMode::Open)
                .await
                .unwrap(),
        );
        turn.tokens.cancel();
        let report = turn.finished.await.unwrap();

        assert_eq!(report.completion, TurnCompletion::Cancelled);
        assert!(!report.persisted);
        drop(turn.tokens);
    }

    #[tokio::test]
    async fn test_user_message_persistence_failure_skips_provider() {
        let inner = MemoryStore::new();
        let session = register(&inner, "p@example.com").await;
        let store = Arc::new(FlakyStore {
            inner,
            failing_role: MessageRole::User,
        });
        let provider = Arc::new(ScriptedProvider::replying(&["unused"]));
        let relay = relay(store, provider.clone());

        let result = relay.submit_turn(&session, "hello", None, TurnMode::Open).await;
        assert!(matches!(result, Err(AppError::PersistenceFailure(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_reply_persistence_failure_does_not_break_the_stream() {
        let inner = MemoryStore::new();
        let session = register(&inner, "q@example.com").await;
        let store = Arc::new(FlakyStore {
            inner,
            failing_role: MessageRole::Assistant,
        });
        let provider = Arc::new(ScriptedProvider::replying(&["all ", "good"]));
        let relay = relay(store.clone(), provider.clone());

        let turn = streaming(
            relay
                .submit_turn(&session, "hello", None, TurnMode::Open)
                .await
                .unwrap(),
        );
        let items = drain(turn.tokens).await;
        let report = turn.finished.await.unwrap();

        assert!(items.iter().all(Result::is_ok));
        assert_eq!(report.content, "all good");
        assert_eq!(report.completion, TurnCompletion::Finished);
        assert!(!report.persisted);
        assert_eq!(store.list_messages(turn.conversation_id).await.unwrap().len(), 1);
    }
}
