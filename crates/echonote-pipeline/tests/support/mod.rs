//! In-memory fixtures for pipeline integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use echonote_core::{
    AudioObject, AudioStore, Error, ErrorCategory, KnowledgeRepository, Note, NoteRepository,
    Result,
};
use echonote_inference::{
    AnalysisBackend, NoteAnalysis, TranscriptionBackend, TranscriptionResult,
};
use echonote_pipeline::{
    BatchScheduler, BreakerConfig, CircuitBreaker, MetricsCollector, NoteProcessor, RetryQueue,
    SchedulerConfig,
};

pub fn sample_note() -> Note {
    Note {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        audio_ref: "notes/sample.ogg".to_string(),
        mime_type: Some("audio/ogg".to_string()),
        transcription: None,
        analysis: None,
        attempts: 0,
        last_error_category: None,
        last_error_message: None,
        recorded_at: Utc::now(),
        expected_duration_secs: Some(30),
        lock_started_at: None,
        completed_at: None,
        created_at: Utc::now(),
    }
}

/// Note repository backed by a mutex-held map. Lease acquisition holds
/// the map lock for the whole check-and-set, mirroring the atomicity of
/// the conditional UPDATE in the real implementation.
#[derive(Default)]
pub struct InMemoryNoteRepository {
    notes: Mutex<HashMap<Uuid, Note>>,
    pub acquire_calls: AtomicUsize,
}

impl InMemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, note: Note) {
        self.notes.lock().unwrap().insert(note.id, note);
    }

    pub fn get_note(&self, note_id: Uuid) -> Option<Note> {
        self.notes.lock().unwrap().get(&note_id).cloned()
    }

    /// Backdate a held lease, as if it had been taken `minutes` ago.
    pub fn age_lock(&self, note_id: Uuid, minutes: i64) {
        let mut notes = self.notes.lock().unwrap();
        if let Some(note) = notes.get_mut(&note_id) {
            note.lock_started_at = Some(Utc::now() - Duration::minutes(minutes));
        }
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn get(&self, note_id: Uuid) -> Result<Option<Note>> {
        Ok(self.notes.lock().unwrap().get(&note_id).cloned())
    }

    async fn fetch_eligible(&self, limit: i64, lease_timeout: Duration) -> Result<Vec<Note>> {
        let now = Utc::now();
        let notes = self.notes.lock().unwrap();
        Ok(notes
            .values()
            .filter(|n| n.is_leasable_at(now, lease_timeout))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn acquire_lock(&self, note_id: Uuid, lease_timeout: Duration) -> Result<bool> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let mut notes = self.notes.lock().unwrap();
        let Some(note) = notes.get_mut(&note_id) else {
            return Ok(false);
        };
        if !note.is_leasable_at(now, lease_timeout) {
            return Ok(false);
        }
        note.lock_started_at = Some(now);
        Ok(true)
    }

    async fn acquire_lock_for_reprocess(
        &self,
        note_id: Uuid,
        lease_timeout: Duration,
    ) -> Result<bool> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let mut notes = self.notes.lock().unwrap();
        let Some(note) = notes.get_mut(&note_id) else {
            return Ok(false);
        };
        if let Some(started) = note.lock_started_at {
            if started + lease_timeout > now {
                return Ok(false);
            }
        }
        note.lock_started_at = Some(now);
        note.completed_at = None;
        Ok(true)
    }

    async fn release_lock(&self, note_id: Uuid) -> Result<()> {
        let mut notes = self.notes.lock().unwrap();
        if let Some(note) = notes.get_mut(&note_id) {
            note.lock_started_at = None;
        }
        Ok(())
    }

    async fn release_lock_with_error(
        &self,
        note_id: Uuid,
        category: ErrorCategory,
        message: &str,
    ) -> Result<()> {
        let mut notes = self.notes.lock().unwrap();
        if let Some(note) = notes.get_mut(&note_id) {
            note.lock_started_at = None;
            note.attempts += 1;
            note.last_error_category = Some(category);
            note.last_error_message = Some(message.to_string());
        }
        Ok(())
    }

    async fn sweep_abandoned(&self, timeout: Duration) -> Result<u64> {
        let now = Utc::now();
        let mut notes = self.notes.lock().unwrap();
        let mut swept = 0;
        for note in notes.values_mut() {
            if let Some(started) = note.lock_started_at {
                if started + timeout <= now {
                    note.lock_started_at = None;
                    swept += 1;
                }
            }
        }
        Ok(swept)
    }

    async fn persist_transcription(&self, note_id: Uuid, text: &str) -> Result<()> {
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .get_mut(&note_id)
            .ok_or(Error::NoteNotFound(note_id))?;
        note.transcription = Some(text.to_string());
        Ok(())
    }

    async fn persist_result(
        &self,
        note_id: Uuid,
        transcription: &str,
        analysis: &JsonValue,
    ) -> Result<()> {
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .get_mut(&note_id)
            .ok_or(Error::NoteNotFound(note_id))?;
        note.transcription = Some(transcription.to_string());
        note.analysis = Some(analysis.clone());
        note.completed_at = Some(Utc::now());
        note.lock_started_at = None;
        note.last_error_category = None;
        note.last_error_message = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryKnowledge {
    pub context: String,
    pub fail_context: bool,
    /// Simulated latency for context assembly.
    pub context_delay: Option<std::time::Duration>,
    pub folded: Mutex<Vec<(Uuid, JsonValue)>>,
}

#[async_trait]
impl KnowledgeRepository for InMemoryKnowledge {
    async fn context_for(&self, _owner_id: Uuid) -> Result<String> {
        if let Some(delay) = self.context_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_context {
            return Err(Error::Internal("knowledge store unavailable".to_string()));
        }
        Ok(self.context.clone())
    }

    async fn fold_insights(&self, owner_id: Uuid, insights: &JsonValue) -> Result<()> {
        self.folded
            .lock()
            .unwrap()
            .push((owner_id, insights.clone()));
        Ok(())
    }
}

pub struct StaticAudioStore {
    pub calls: AtomicUsize,
    mime_type: String,
}

impl StaticAudioStore {
    pub fn new() -> Self {
        Self::with_mime("audio/ogg")
    }

    pub fn with_mime(mime_type: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            mime_type: mime_type.to_string(),
        }
    }
}

#[async_trait]
impl AudioStore for StaticAudioStore {
    async fn fetch(&self, _audio_ref: &str) -> Result<AudioObject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AudioObject {
            bytes: vec![0u8; 64],
            mime_type: self.mime_type.clone(),
        })
    }
}

/// Transcriber that pops scripted results; when the script is empty it
/// succeeds with a fixed transcript.
pub struct ScriptedTranscriber {
    pub calls: AtomicUsize,
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
}

impl ScriptedTranscriber {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_ok(&self, text: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    /// Queue a failure; the message flows through keyword categorization.
    pub fn push_err(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }
}

#[async_trait]
impl TranscriptionBackend for ScriptedTranscriber {
    async fn transcribe(
        &self,
        _audio_data: &[u8],
        _mime_type: &str,
        _language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Err(message)) => Err(Error::Transcription(message)),
            Some(Ok(text)) => Ok(transcript(text)),
            None => Ok(transcript("remember to water the plants".to_string())),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted-whisper"
    }
}

fn transcript(text: String) -> TranscriptionResult {
    TranscriptionResult {
        full_text: text,
        segments: Vec::new(),
        language: Some("en".to_string()),
        duration_secs: Some(3.0),
    }
}

/// Analyzer that pops scripted results; when the script is empty it
/// succeeds with a fixed analysis carrying insights.
pub struct ScriptedAnalyzer {
    pub calls: AtomicUsize,
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_ok(&self, summary: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(summary.to_string()));
    }

    pub fn push_err(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedAnalyzer {
    async fn analyze(&self, _transcript: &str, _context: &str) -> Result<NoteAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Err(message)) => Err(Error::Analysis(message)),
            Some(Ok(summary)) => Ok(analysis(summary)),
            None => Ok(analysis("a short reminder".to_string())),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted-analyst"
    }
}

fn analysis(summary: String) -> NoteAnalysis {
    NoteAnalysis {
        insights: Some(json!({ "topics": [summary.clone()] })),
        summary,
        key_points: vec!["a key point".to_string()],
        action_items: Vec::new(),
    }
}

/// Everything a pipeline test needs, wired together.
pub struct Harness {
    pub repo: Arc<InMemoryNoteRepository>,
    pub knowledge: Arc<InMemoryKnowledge>,
    pub audio: Arc<StaticAudioStore>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub breaker: Arc<CircuitBreaker>,
    pub metrics: Arc<MetricsCollector>,
    pub processor: Arc<NoteProcessor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(InMemoryNoteRepository::new()),
            Arc::new(InMemoryKnowledge::default()),
            Arc::new(StaticAudioStore::new()),
            Arc::new(CircuitBreaker::default()),
        )
    }

    pub fn with_parts(
        repo: Arc<InMemoryNoteRepository>,
        knowledge: Arc<InMemoryKnowledge>,
        audio: Arc<StaticAudioStore>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let transcriber = Arc::new(ScriptedTranscriber::new());
        let analyzer = Arc::new(ScriptedAnalyzer::new());
        let metrics = Arc::new(MetricsCollector::new());
        let processor = Arc::new(NoteProcessor::new(
            repo.clone(),
            knowledge.clone(),
            audio.clone(),
            transcriber.clone(),
            analyzer.clone(),
            breaker.clone(),
            metrics.clone(),
        ));
        Self {
            repo,
            knowledge,
            audio,
            transcriber,
            analyzer,
            breaker,
            metrics,
            processor,
        }
    }

    pub fn with_breaker(config: BreakerConfig) -> Self {
        Self::with_parts(
            Arc::new(InMemoryNoteRepository::new()),
            Arc::new(InMemoryKnowledge::default()),
            Arc::new(StaticAudioStore::new()),
            Arc::new(CircuitBreaker::new(config)),
        )
    }

    pub fn scheduler(&self, config: SchedulerConfig) -> BatchScheduler {
        BatchScheduler::new(
            self.repo.clone(),
            self.processor.clone(),
            self.breaker.clone(),
            Arc::new(RetryQueue::new(self.metrics.clone())),
            self.metrics.clone(),
            config,
        )
    }

    pub fn scheduler_with_retries(
        &self,
        config: SchedulerConfig,
        retries: Arc<RetryQueue>,
    ) -> BatchScheduler {
        BatchScheduler::new(
            self.repo.clone(),
            self.processor.clone(),
            self.breaker.clone(),
            retries,
            self.metrics.clone(),
            config,
        )
    }
}
