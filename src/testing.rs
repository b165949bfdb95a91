//! Fakes shared by unit tests.

use crate::backend::{Completion, InferenceBackend, LoadedModel, ResolvedMessage};
use crate::conversation::Message;
use crate::core::error::QllamaError;
use crate::handlers::{
    Device, GenerationOptions, GenerationOverrides, HandlerKind, ModelHandler,
};
use crate::media::{DecodedImage, MediaLoader};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct FakeBackend {
    reply: String,
    fail_load: bool,
    fail_generation: bool,
    loads: AtomicUsize,
    completes: AtomicUsize,
    chats: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_options: Mutex<Option<GenerationOptions>>,
    last_chat: Mutex<Option<Vec<ResolvedMessage>>>,
}

impl FakeBackend {
    /// Completion output is the prompt followed by `reply`.
    pub fn with_completion(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::default()
        }
    }

    pub fn with_chat_reply(reply: &str) -> Self {
        Self::with_completion(reply)
    }

    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }

    pub fn failing_generation() -> Self {
        Self {
            fail_generation: true,
            ..Self::default()
        }
    }

    pub fn load_calls(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.completes.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chats.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> Option<GenerationOptions> {
        *self.last_options.lock().unwrap()
    }

    pub fn last_chat(&self) -> Option<Vec<ResolvedMessage>> {
        self.last_chat.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for FakeBackend {
    async fn load(&self, model_id: &str, _device: &Device) -> Result<LoadedModel, QllamaError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(QllamaError::BackendUnavailable("fake backend is down".into()));
        }
        Ok(LoadedModel {
            model_id: model_id.to_string(),
            endpoint: "fake://backend".to_string(),
        })
    }

    async fn complete(
        &self,
        _model: &LoadedModel,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Completion, QllamaError> {
        self.completes.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        *self.last_options.lock().unwrap() = Some(*options);
        if self.fail_generation {
            return Err(QllamaError::Generation("fake failure".into()));
        }
        Ok(Completion {
            prompt: prompt.to_string(),
            text: format!("{} {}", prompt, self.reply),
        })
    }

    async fn chat(
        &self,
        _model: &LoadedModel,
        messages: &[ResolvedMessage],
        options: &GenerationOptions,
    ) -> Result<String, QllamaError> {
        self.chats.fetch_add(1, Ordering::SeqCst);
        *self.last_chat.lock().unwrap() = Some(messages.to_vec());
        *self.last_options.lock().unwrap() = Some(*options);
        if self.fail_generation {
            return Err(QllamaError::Generation("fake failure".into()));
        }
        Ok(self.reply.clone())
    }
}

#[derive(Default)]
pub struct FakeMediaLoader {
    video_frames: usize,
    missing: bool,
    video_requests: Mutex<Vec<(String, usize)>>,
}

impl FakeMediaLoader {
    pub fn with_video_frames(frames: usize) -> Self {
        Self {
            video_frames: frames,
            ..Self::default()
        }
    }

    /// Every locator is reported missing.
    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn video_requests(&self) -> Vec<(String, usize)> {
        self.video_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaLoader for FakeMediaLoader {
    async fn load_image(&self, locator: &str) -> Result<DecodedImage, QllamaError> {
        if self.missing {
            return Err(QllamaError::MediaNotFound(locator.to_string()));
        }
        Ok(DecodedImage::new_rgb8(1, 1))
    }

    async fn load_video(
        &self,
        locator: &str,
        max_frames: usize,
    ) -> Result<Vec<DecodedImage>, QllamaError> {
        self.video_requests
            .lock()
            .unwrap()
            .push((locator.to_string(), max_frames));
        if self.missing {
            return Err(QllamaError::MediaNotFound(locator.to_string()));
        }
        Ok((0..self.video_frames.min(max_frames))
            .map(|_| DecodedImage::new_rgb8(1, 1))
            .collect())
    }
}

#[derive(Clone)]
pub enum Outcome {
    Reply(String),
    Fail,
    Hang,
}

/// Handler with a fixed outcome that records every message list it receives.
pub struct ScriptedHandler {
    /// Consumed front to back; the last outcome repeats.
    outcomes: Vec<Outcome>,
    loaded: bool,
    pub seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedHandler {
    pub fn new(outcome: Outcome) -> Self {
        Self::sequence(vec![outcome])
    }

    pub fn sequence(outcomes: Vec<Outcome>) -> Self {
        assert!(!outcomes.is_empty());
        Self {
            outcomes,
            loaded: false,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ModelHandler for ScriptedHandler {
    fn model_id(&self) -> &str {
        "scripted"
    }

    fn device(&self) -> &Device {
        &Device::Cpu
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Text
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn endpoint(&self) -> Option<&str> {
        self.loaded.then_some("scripted://endpoint")
    }

    fn default_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_new_tokens: 8,
            temperature: 0.0,
            top_p: 1.0,
            sampling_enabled: false,
        }
    }

    async fn load(&mut self) -> Result<(), QllamaError> {
        self.loaded = true;
        Ok(())
    }

    async fn generate(
        &mut self,
        messages: &[Message],
        _overrides: &GenerationOverrides,
    ) -> Result<String, QllamaError> {
        self.loaded = true;
        self.seen.lock().unwrap().push(messages.to_vec());
        let outcome = if self.outcomes.len() > 1 {
            self.outcomes.remove(0)
        } else {
            self.outcomes[0].clone()
        };
        match outcome {
            Outcome::Reply(text) => Ok(text),
            Outcome::Fail => Err(QllamaError::Generation("scripted failure".into())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
