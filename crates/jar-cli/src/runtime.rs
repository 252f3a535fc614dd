//! One jar: durable store, session state machine and the live drag, wired
//! together with the loaded config. Shared by the CLI commands and the MCP
//! server.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jar_core::{
    DragGesture, JarError, MemoryKind, MemoryRecord, PointerEvent, PopRequest, PopTrigger,
    SaveOutcome, SaveStart, SessionStateMachine, Shape, now_unix_millis, unix_millis_to_iso8601,
};
use jar_store::{CONFIG_FILE, DB_FILE, JarConfig, MemoryStore, StagedWrite};
use rand::SeedableRng;
use rand::rngs::SmallRng;

pub struct JarRuntime {
    pub store: MemoryStore,
    pub session: SessionStateMachine,
    pub drag: DragGesture,
    pub rng: SmallRng,
    pub config: JarConfig,
}

impl JarRuntime {
    /// Open `<base>/jar.db` with `<base>/config.toml`, creating the
    /// directory when needed.
    pub fn open(base: &Path) -> Result<Self> {
        fs::create_dir_all(base)
            .with_context(|| format!("failed to create {}", base.display()))?;
        let config = JarConfig::load(&base.join(CONFIG_FILE)).context("failed to load config")?;
        let db_path = base.join(DB_FILE);
        let store = MemoryStore::open_path(&db_path, config.max_bytes)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        tracing::info!("opened jar at {}", db_path.display());
        Ok(Self::with_store(store, config))
    }

    #[cfg(test)]
    pub fn open_in_memory(config: JarConfig) -> Result<Self> {
        let store = jar_store::Store::open_in_memory().context("failed to open in-memory store")?;
        Ok(Self::with_store(MemoryStore::open(store, config.max_bytes), config))
    }

    fn with_store(store: MemoryStore, config: JarConfig) -> Self {
        Self {
            store,
            session: SessionStateMachine::new(config.session),
            drag: DragGesture::new(config.gesture),
            rng: SmallRng::from_os_rng(),
            config,
        }
    }

    /// Author and save one memory in a single step.
    pub fn create(&mut self, kind: MemoryKind, payload: &str, shape: Shape) -> Result<MemoryRecord> {
        let staged = self.begin_create(kind, payload, shape)?;
        let written = self.store.writer().write(&staged).map(|()| staged);
        self.complete_create(written)
    }

    /// Fill a draft, mint its record and stage the new collection. The
    /// session stays pending until [`complete_create`](Self::complete_create)
    /// hears how the write went.
    pub fn begin_create(
        &mut self,
        kind: MemoryKind,
        payload: &str,
        shape: Shape,
    ) -> Result<StagedWrite> {
        if !self.session.start_create() {
            bail!("cannot create a memory while the jar is {}", self.session.state().name());
        }
        if let Some(draft) = self.session.draft_mut() {
            draft.kind = kind;
            draft.shape = shape;
            match kind {
                MemoryKind::Text => draft.text = payload.to_string(),
                MemoryKind::Drawing | MemoryKind::Audio => draft.media = payload.to_string(),
            }
        }

        let record = match self.session.begin_save(now_unix_millis(), &mut self.rng) {
            SaveStart::Ready(record) => record,
            SaveStart::Incomplete(msg) => {
                self.session.cancel();
                bail!("{msg}")
            }
            SaveStart::Ignored | SaveStart::InFlight => bail!("no draft to save"),
        };
        match self.store.stage_append(record) {
            Ok(staged) => Ok(staged),
            Err(e) => {
                let _ = self.session.finish_save(Err(JarError::Persistence(e.to_string())));
                self.session.cancel();
                Err(anyhow::Error::new(e).context("failed to save memory"))
            }
        }
    }

    /// Adopt a staged write once it has landed, or drop the draft if it
    /// failed. One-shot callers have no way to retry a kept draft.
    pub fn complete_create(
        &mut self,
        written: jar_store::Result<StagedWrite>,
    ) -> Result<MemoryRecord> {
        let (staged, result) = match written {
            Ok(staged) => (Some(staged), Ok(())),
            Err(e) => (None, Err(JarError::from(e))),
        };
        match self.session.finish_save(result) {
            Ok(SaveOutcome::Saved(record)) => {
                if let Some(staged) = staged {
                    self.store.commit(staged);
                }
                tracing::info!(id = record.id(), kind = record.kind().as_str(), "memory saved");
                Ok(record)
            }
            Ok(_) => bail!("no save in progress"),
            Err(e) => {
                self.session.cancel();
                Err(anyhow::Error::new(e).context("failed to save memory"))
            }
        }
    }

    /// Feed one pointer event. A shake or tap asks the session for a pop.
    pub fn feed(&mut self, event: PointerEvent) -> Option<(PopTrigger, PopRequest)> {
        let trigger = self.drag.apply(event, self.session.is_shaking())?;
        let request = self.session.request_pop(&self.store, now_unix_millis());
        tracing::debug!(?trigger, ?request, energy = self.drag.energy(), "gesture fired");
        Some((trigger, request))
    }

    /// Complete a pop whose deadline has passed.
    pub fn finish_pop(&mut self, ready_at: u64) -> Result<Option<MemoryRecord>> {
        let now = now_unix_millis().max(ready_at);
        let popped = self
            .session
            .tick(now, &self.store, &mut self.rng)
            .context("failed to pop a memory")?;
        if let Some(record) = &popped {
            tracing::info!(id = record.id(), kind = record.kind().as_str(), "memory popped");
        }
        Ok(popped)
    }

    pub fn stats_json(&self) -> serde_json::Value {
        let count = |kind: MemoryKind| self.store.records().iter().filter(|r| r.kind() == kind).count();
        serde_json::json!({
            "memories": self.store.len(),
            "text": count(MemoryKind::Text),
            "drawing": count(MemoryKind::Drawing),
            "audio": count(MemoryKind::Audio),
            "stored_bytes": self.store.stored_bytes().unwrap_or(0),
            "max_bytes": self.store.max_bytes(),
            "last_write": self.store.last_write().map(unix_millis_to_iso8601),
            "state": self.session.state().name(),
        })
    }
}

pub fn record_json(record: &MemoryRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id(),
        "type": record.kind().as_str(),
        "shape": record.shape().as_str(),
        "styleColor": record.display_color(),
        "created": unix_millis_to_iso8601(record.created_at()),
        "content": record.payload(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> JarRuntime {
        let mut config = JarConfig::default();
        config.session.pop_duration_ms = 0;
        let mut rt = JarRuntime::open_in_memory(config).unwrap();
        rt.rng = SmallRng::seed_from_u64(42);
        rt
    }

    #[test]
    fn test_create_and_reject_empty() {
        let mut rt = runtime();
        let rec = rt.create(MemoryKind::Text, "hello", Shape::Star).unwrap();
        assert_eq!(rec.shape(), Shape::Star);
        assert_eq!(rt.store.len(), 1);

        assert!(rt.create(MemoryKind::Drawing, "", Shape::Rect).is_err());
        assert_eq!(rt.session.state().name(), "idle");
        assert_eq!(rt.store.len(), 1);
    }

    #[test]
    fn test_tap_pops() {
        let mut rt = runtime();
        rt.create(MemoryKind::Text, "tap me", Shape::Heart).unwrap();

        assert!(rt.feed(PointerEvent::Start { x: 1.0, y: 1.0, t: 0.0 }).is_none());
        let (trigger, request) = rt.feed(PointerEvent::End).unwrap();
        assert_eq!(trigger, PopTrigger::Tap);
        let PopRequest::Started { ready_at } = request else {
            panic!("expected a pop, got {request:?}");
        };
        let popped = rt.finish_pop(ready_at).unwrap().unwrap();
        assert_eq!(popped.payload(), "tap me");
        assert!(rt.session.viewing().is_some());
    }

    #[test]
    fn test_stats_json() {
        let mut rt = runtime();
        rt.create(MemoryKind::Text, "a", Shape::Rect).unwrap();
        rt.create(MemoryKind::Audio, "data:audio/webm;base64,AA", Shape::Rect).unwrap();

        let stats = rt.stats_json();
        assert_eq!(stats["memories"], 2);
        assert_eq!(stats["text"], 1);
        assert_eq!(stats["audio"], 1);
        assert_eq!(stats["drawing"], 0);
        assert_eq!(stats["state"], "idle");
        assert!(stats["last_write"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_stats_before_any_write() {
        let rt = runtime();
        assert!(rt.stats_json()["last_write"].is_null());
    }

    #[test]
    fn test_split_create_stays_pending_until_written() {
        let mut rt = runtime();
        let staged = rt.begin_create(MemoryKind::Text, "later", Shape::Circle).unwrap();
        assert!(rt.session.is_pending());
        assert!(rt.store.is_empty());
        assert!(rt.create(MemoryKind::Text, "cut in", Shape::Rect).is_err());

        rt.store.writer().write(&staged).unwrap();
        let rec = rt.complete_create(Ok(staged)).unwrap();
        assert_eq!(rec.payload(), "later");
        assert_eq!(rt.store.records(), &[rec]);
        assert_eq!(rt.session.state().name(), "idle");
    }

    #[test]
    fn test_failed_write_drops_draft() {
        let mut rt = runtime();
        rt.begin_create(MemoryKind::Text, "lost", Shape::Rect).unwrap();

        let err = rt
            .complete_create(Err(jar_store::StoreError::InvalidData("disk gone".into())))
            .unwrap_err();
        assert!(format!("{err:#}").contains("disk gone"));
        assert_eq!(rt.session.state().name(), "idle");
        assert!(!rt.session.is_pending());
        assert!(rt.store.is_empty());
        assert!(rt.stats_json()["last_write"].is_null());
    }

    #[test]
    fn test_quota_rejection_at_stage() {
        let mut config = JarConfig::default();
        config.max_bytes = 64;
        let mut rt = JarRuntime::open_in_memory(config).unwrap();
        assert!(rt.create(MemoryKind::Text, &"q".repeat(200), Shape::Rect).is_err());
        assert_eq!(rt.session.state().name(), "idle");
        assert!(rt.store.is_empty());
    }
}
