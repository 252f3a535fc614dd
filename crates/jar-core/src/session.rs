//! Memory lifecycle: Idle → Creating → Idle, Idle → (shaking) → Viewing → Idle.
//!
//! Every transition is a method; nothing else mutates the state. Time is an
//! explicit `now_ms` argument and randomness is an injected `Rng`, so a
//! session replays identically under a seeded source.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::collection::MemoryRepository;
use crate::constants::POP_DURATION_MS;
use crate::error::{JarError, Result};
use crate::memory::{MemoryKind, MemoryRecord, Shape};
use crate::oracle::{OracleError, OracleReading, OracleRequest, OracleStatus, OracleTicket};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long the jar shakes before showing the popped memory.
    pub pop_duration_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pop_duration_ms: POP_DURATION_MS,
        }
    }
}

/// The unsaved memory being authored.
///
/// Text and media are kept separately so switching kind back and forth does
/// not lose what was already entered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draft {
    pub kind: MemoryKind,
    pub text: String,
    pub media: String,
    pub shape: Shape,
}

impl Draft {
    /// The field that becomes the record payload for the current kind.
    pub fn payload(&self) -> &str {
        match self.kind {
            MemoryKind::Text => &self.text,
            MemoryKind::Drawing | MemoryKind::Audio => &self.media,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.payload().is_empty() {
            return Ok(());
        }
        Err(JarError::Validation(match self.kind {
            MemoryKind::Text => "text memory needs some text",
            MemoryKind::Drawing => "drawing memory needs a drawing",
            MemoryKind::Audio => "audio memory needs a recording",
        }))
    }
}

/// The memory currently shown, with its oracle progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Viewing {
    record: MemoryRecord,
    oracle: OracleStatus,
    session: u64,
}

impl Viewing {
    pub fn record(&self) -> &MemoryRecord {
        &self.record
    }

    pub fn oracle(&self) -> &OracleStatus {
        &self.oracle
    }

    /// Identifier of this viewing; changes every time a memory is popped.
    pub fn session(&self) -> u64 {
        self.session
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Creating(Draft),
    Viewing(Viewing),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Creating(_) => "creating",
            Self::Viewing(_) => "viewing",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Persisted; the machine is back to Idle.
    Saved(MemoryRecord),
    /// The draft is missing its payload; still Creating.
    Incomplete(&'static str),
    /// Not in Creating.
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopRequest {
    /// The jar is shaking; call `tick` at or after `ready_at`.
    Started { ready_at: u64 },
    /// A pop is already underway.
    AlreadyShaking,
    /// Nothing to pop. Tell the user to create a memory first.
    EmptyJar,
    /// Pops are only accepted from Idle.
    NotIdle,
}

/// First half of a save whose write is carried out by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveStart {
    /// Persist this record, then report back through `finish_save`.
    Ready(MemoryRecord),
    Incomplete(&'static str),
    /// Not in Creating.
    Ignored,
    /// A write for this draft is already outstanding.
    InFlight,
}

/// Drives one user's session with the jar.
#[derive(Clone, Debug, Default)]
pub struct SessionStateMachine {
    config: SessionConfig,
    state: SessionState,
    pop_deadline: Option<u64>,
    viewings: u64,
    saving: Option<MemoryRecord>,
}

impl SessionStateMachine {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True while a pop is counting down. Feed this to the gesture
    /// classifier so it does not fire again mid-pop.
    pub fn is_shaking(&self) -> bool {
        self.pop_deadline.is_some()
    }

    pub fn pop_deadline(&self) -> Option<u64> {
        self.pop_deadline
    }

    /// True between `begin_save` and `finish_save`.
    pub fn is_saving(&self) -> bool {
        self.saving.is_some()
    }

    /// True while a pop, a save or an oracle call is in flight, so the
    /// interface can disable duplicate triggers.
    pub fn is_pending(&self) -> bool {
        self.is_shaking()
            || self.is_saving()
            || self.viewing().is_some_and(|v| v.oracle.is_pending())
    }

    pub fn viewing(&self) -> Option<&Viewing> {
        match &self.state {
            SessionState::Viewing(v) => Some(v),
            _ => None,
        }
    }

    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            SessionState::Creating(d) => Some(d),
            _ => None,
        }
    }

    pub fn draft_mut(&mut self) -> Option<&mut Draft> {
        match &mut self.state {
            SessionState::Creating(d) => Some(d),
            _ => None,
        }
    }

    // --- Creating ---

    /// Idle → Creating with an empty draft. Refused mid-pop.
    pub fn start_create(&mut self) -> bool {
        if !matches!(self.state, SessionState::Idle) || self.is_shaking() {
            return false;
        }
        self.state = SessionState::Creating(Draft::default());
        true
    }

    /// Creating → Idle, discarding the draft. Refused while a write is
    /// outstanding.
    pub fn cancel(&mut self) -> bool {
        if !matches!(self.state, SessionState::Creating(_)) || self.is_saving() {
            return false;
        }
        self.state = SessionState::Idle;
        true
    }

    /// Creating → Idle once the record is durably appended.
    ///
    /// An incomplete draft is a no-op. A persistence failure keeps the
    /// machine in Creating with the draft intact and is returned as `Err`.
    pub fn save<S, R>(&mut self, store: &mut S, now_ms: u64, rng: &mut R) -> Result<SaveOutcome>
    where
        S: MemoryRepository + ?Sized,
        R: Rng + ?Sized,
    {
        let record = match self.begin_save(now_ms, rng) {
            SaveStart::Ready(record) => record,
            SaveStart::Incomplete(msg) => return Ok(SaveOutcome::Incomplete(msg)),
            SaveStart::Ignored | SaveStart::InFlight => return Ok(SaveOutcome::Ignored),
        };
        let written = store.append(record);
        self.finish_save(written)
    }

    /// Validate the draft and mint its record without touching storage.
    /// The machine stays in Creating, pending, until [`finish_save`](Self::finish_save).
    pub fn begin_save<R: Rng + ?Sized>(&mut self, now_ms: u64, rng: &mut R) -> SaveStart {
        let SessionState::Creating(draft) = &self.state else {
            return SaveStart::Ignored;
        };
        if self.saving.is_some() {
            return SaveStart::InFlight;
        }
        if let Err(JarError::Validation(msg)) = draft.validate() {
            return SaveStart::Incomplete(msg);
        }

        let record = MemoryRecord::new(
            draft.kind,
            draft.payload().to_string(),
            draft.shape,
            now_ms,
            rng,
        );
        self.saving = Some(record.clone());
        SaveStart::Ready(record)
    }

    /// Report how the write of the record from `begin_save` went. Success
    /// moves to Idle; failure keeps the draft and is handed back.
    pub fn finish_save(&mut self, written: Result<()>) -> Result<SaveOutcome> {
        let Some(record) = self.saving.take() else {
            return Ok(SaveOutcome::Ignored);
        };
        written?;
        self.state = SessionState::Idle;
        Ok(SaveOutcome::Saved(record))
    }

    // --- Popping ---

    /// Ask for a pop. On a non-empty jar this starts the shaking countdown;
    /// the memory is chosen when [`tick`](Self::tick) passes the deadline.
    pub fn request_pop<S>(&mut self, store: &S, now_ms: u64) -> PopRequest
    where
        S: MemoryRepository + ?Sized,
    {
        if !matches!(self.state, SessionState::Idle) {
            return PopRequest::NotIdle;
        }
        if self.is_shaking() {
            return PopRequest::AlreadyShaking;
        }
        if store.is_empty() {
            return PopRequest::EmptyJar;
        }
        let ready_at = now_ms.saturating_add(self.config.pop_duration_ms);
        self.pop_deadline = Some(ready_at);
        PopRequest::Started { ready_at }
    }

    /// Advance the clock. Once the shaking deadline has passed, a memory is
    /// picked uniformly at random and the machine enters Viewing; the popped
    /// record is returned. Before the deadline, or with no pop underway,
    /// returns `Ok(None)`.
    pub fn tick<S, R>(&mut self, now_ms: u64, store: &S, rng: &mut R) -> Result<Option<MemoryRecord>>
    where
        S: MemoryRepository + ?Sized,
        R: Rng + ?Sized,
    {
        let Some(deadline) = self.pop_deadline else {
            return Ok(None);
        };
        if now_ms < deadline {
            return Ok(None);
        }
        self.pop_deadline = None;

        let record = store.collection().pick_random(rng)?.clone();
        self.viewings += 1;
        self.state = SessionState::Viewing(Viewing {
            record: record.clone(),
            oracle: OracleStatus::NotRequested,
            session: self.viewings,
        });
        Ok(Some(record))
    }

    // --- Viewing ---

    /// Viewing → Idle. The record and any oracle result are dropped.
    pub fn close(&mut self) -> bool {
        if !matches!(self.state, SessionState::Viewing(_)) {
            return false;
        }
        self.state = SessionState::Idle;
        true
    }

    /// Mark the oracle as pending for the viewed memory and return the
    /// ticket plus the request to send. `None` when not viewing or when a
    /// call is already outstanding. Asking again after a reading arrived is
    /// an explicit re-request and is allowed.
    pub fn consult_oracle(&mut self) -> Option<(OracleTicket, OracleRequest)> {
        let SessionState::Viewing(viewing) = &mut self.state else {
            return None;
        };
        if viewing.oracle.is_pending() {
            return None;
        }
        let ticket = OracleTicket {
            session: viewing.session,
            record_id: viewing.record.id().to_string(),
        };
        viewing.oracle = OracleStatus::Pending(ticket.clone());
        Some((ticket, OracleRequest::for_record(&viewing.record)))
    }

    /// Deliver the oracle's answer. Failures become the fallback reading.
    ///
    /// Returns false and changes nothing when the ticket does not belong to
    /// the call currently pending (the viewer was closed or moved on).
    pub fn resolve_oracle(
        &mut self,
        ticket: &OracleTicket,
        result: std::result::Result<OracleReading, OracleError>,
    ) -> bool {
        let SessionState::Viewing(viewing) = &mut self.state else {
            return false;
        };
        if viewing.oracle != OracleStatus::Pending(ticket.clone()) {
            return false;
        }
        viewing.oracle = OracleStatus::Resolved(result.unwrap_or_else(|_| OracleReading::fallback()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryCollection;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    /// A store whose writes are always rejected.
    struct ReadOnlyStore(MemoryCollection);

    impl MemoryRepository for ReadOnlyStore {
        fn collection(&self) -> &MemoryCollection {
            &self.0
        }

        fn append(&mut self, _record: MemoryRecord) -> Result<()> {
            Err(JarError::Persistence("quota exceeded".to_string()))
        }
    }

    fn seeded_jar(n: usize, rng: &mut SmallRng) -> MemoryCollection {
        let mut jar = MemoryCollection::new();
        for i in 0..n {
            jar.push(MemoryRecord::new(MemoryKind::Text, format!("m{i}"), Shape::Rect, i as u64, rng))
                .unwrap();
        }
        jar
    }

    fn viewing_machine(rng: &mut SmallRng) -> (SessionStateMachine, MemoryCollection) {
        let jar = seeded_jar(3, rng);
        let mut sm = SessionStateMachine::default();
        sm.request_pop(&jar, 0);
        sm.tick(800, &jar, rng).unwrap();
        (sm, jar)
    }

    #[test]
    fn test_create_cancel() {
        let mut sm = SessionStateMachine::default();
        assert!(sm.start_create());
        assert_eq!(sm.draft(), Some(&Draft::default()));
        assert!(!sm.start_create());
        assert!(sm.cancel());
        assert_eq!(sm.state(), &SessionState::Idle);
        assert!(!sm.cancel());
    }

    #[test]
    fn test_empty_text_save_stays_creating() {
        let mut rng = rng();
        let mut jar = MemoryCollection::new();
        let mut sm = SessionStateMachine::default();
        sm.start_create();

        let outcome = sm.save(&mut jar, 1, &mut rng).unwrap();
        assert!(matches!(outcome, SaveOutcome::Incomplete(_)));
        assert_eq!(sm.state().name(), "creating");
        assert!(jar.is_empty());
    }

    #[test]
    fn test_text_save_appends_one() {
        let mut rng = rng();
        let mut jar = seeded_jar(2, &mut rng);
        let mut sm = SessionStateMachine::default();
        sm.start_create();
        sm.draft_mut().unwrap().text = "a summer night".to_string();
        sm.draft_mut().unwrap().shape = Shape::Star;

        let SaveOutcome::Saved(record) = sm.save(&mut jar, 1234, &mut rng).unwrap() else {
            panic!("expected save");
        };
        assert_eq!(sm.state(), &SessionState::Idle);
        assert_eq!(jar.len(), 3);
        assert_eq!(record.payload(), "a summer night");
        assert_eq!(record.shape(), Shape::Star);
        assert_eq!(record.created_at(), 1234);
        assert_eq!(jar.records().last(), Some(&record));
    }

    #[test]
    fn test_media_kinds_need_media() {
        let mut rng = rng();
        let mut jar = MemoryCollection::new();
        let mut sm = SessionStateMachine::default();
        sm.start_create();
        {
            let draft = sm.draft_mut().unwrap();
            draft.kind = MemoryKind::Drawing;
            draft.text = "text does not count".to_string();
        }
        assert!(matches!(sm.save(&mut jar, 0, &mut rng).unwrap(), SaveOutcome::Incomplete(_)));

        sm.draft_mut().unwrap().media = "data:image/png;base64,AA".to_string();
        let SaveOutcome::Saved(record) = sm.save(&mut jar, 0, &mut rng).unwrap() else {
            panic!("expected save");
        };
        assert_eq!(record.kind(), MemoryKind::Drawing);
        assert_eq!(record.payload(), "data:image/png;base64,AA");
    }

    #[test]
    fn test_persistence_failure_keeps_draft() {
        let mut rng = rng();
        let mut store = ReadOnlyStore(MemoryCollection::new());
        let mut sm = SessionStateMachine::default();
        sm.start_create();
        sm.draft_mut().unwrap().text = "keep me".to_string();

        let err = sm.save(&mut store, 0, &mut rng).unwrap_err();
        assert!(matches!(err, JarError::Persistence(_)));
        assert_eq!(sm.draft().map(|d| d.text.as_str()), Some("keep me"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_split_save_is_pending_until_finished() {
        let mut rng = rng();
        let mut sm = SessionStateMachine::default();
        sm.start_create();
        sm.draft_mut().unwrap().text = "slow disk".to_string();

        let SaveStart::Ready(record) = sm.begin_save(5, &mut rng) else {
            panic!("expected a record to write");
        };
        assert!(sm.is_saving());
        assert!(sm.is_pending());
        assert_eq!(sm.begin_save(6, &mut rng), SaveStart::InFlight);
        assert!(!sm.cancel(), "cannot drop a draft mid-write");
        assert_eq!(sm.state().name(), "creating");

        assert_eq!(sm.finish_save(Ok(())).unwrap(), SaveOutcome::Saved(record));
        assert_eq!(sm.state(), &SessionState::Idle);
        assert!(!sm.is_pending());
        assert_eq!(sm.finish_save(Ok(())).unwrap(), SaveOutcome::Ignored);
    }

    #[test]
    fn test_split_save_failure_keeps_draft() {
        let mut rng = rng();
        let mut sm = SessionStateMachine::default();
        sm.start_create();
        sm.draft_mut().unwrap().text = "retry me".to_string();

        assert!(matches!(sm.begin_save(0, &mut rng), SaveStart::Ready(_)));
        let err = sm
            .finish_save(Err(JarError::Persistence("disk full".to_string())))
            .unwrap_err();
        assert!(matches!(err, JarError::Persistence(_)));
        assert!(!sm.is_saving());
        assert_eq!(sm.draft().map(|d| d.text.as_str()), Some("retry me"));

        // The kept draft can be saved again.
        assert!(matches!(sm.begin_save(1, &mut rng), SaveStart::Ready(_)));
    }

    #[test]
    fn test_save_outside_creating_ignored() {
        let mut jar = MemoryCollection::new();
        let mut sm = SessionStateMachine::default();
        assert_eq!(sm.save(&mut jar, 0, &mut rng()).unwrap(), SaveOutcome::Ignored);
    }

    #[test]
    fn test_pop_on_empty_jar() {
        let jar = MemoryCollection::new();
        let mut sm = SessionStateMachine::default();
        assert_eq!(sm.request_pop(&jar, 0), PopRequest::EmptyJar);
        assert_eq!(sm.state(), &SessionState::Idle);
        assert!(!sm.is_shaking());
    }

    #[test]
    fn test_pop_waits_for_shake_duration() {
        let mut rng = rng();
        let jar = seeded_jar(3, &mut rng);
        let mut sm = SessionStateMachine::default();

        assert_eq!(sm.request_pop(&jar, 1000), PopRequest::Started { ready_at: 1800 });
        assert!(sm.is_shaking());
        assert!(sm.is_pending());
        assert_eq!(sm.tick(1799, &jar, &mut rng).unwrap(), None);
        assert_eq!(sm.state(), &SessionState::Idle);

        let popped = sm.tick(1800, &jar, &mut rng).unwrap().unwrap();
        assert!(jar.contains(popped.id()));
        assert!(!sm.is_shaking());
        let viewing = sm.viewing().unwrap();
        assert_eq!(viewing.record(), &popped);
        assert_eq!(viewing.oracle(), &OracleStatus::NotRequested);
    }

    #[test]
    fn test_pop_requests_ignored_while_shaking() {
        let mut rng = rng();
        let jar = seeded_jar(2, &mut rng);
        let mut sm = SessionStateMachine::default();
        sm.request_pop(&jar, 0);

        assert_eq!(sm.request_pop(&jar, 100), PopRequest::AlreadyShaking);
        assert_eq!(sm.request_pop(&jar, 799), PopRequest::AlreadyShaking);
        assert_eq!(sm.pop_deadline(), Some(800));
        assert!(!sm.start_create());
    }

    #[test]
    fn test_pop_outside_idle() {
        let mut rng = rng();
        let jar = seeded_jar(1, &mut rng);
        let mut sm = SessionStateMachine::default();
        sm.start_create();
        assert_eq!(sm.request_pop(&jar, 0), PopRequest::NotIdle);
    }

    #[test]
    fn test_close_returns_to_idle() {
        let mut rng = rng();
        let (mut sm, jar) = viewing_machine(&mut rng);
        assert!(sm.close());
        assert_eq!(sm.state(), &SessionState::Idle);
        assert_eq!(jar.len(), 3);
    }

    #[test]
    fn test_oracle_success() {
        let mut rng = rng();
        let (mut sm, _) = viewing_machine(&mut rng);
        let (ticket, request) = sm.consult_oracle().unwrap();
        assert_eq!(request.kind, MemoryKind::Text);
        assert!(sm.is_pending());
        assert!(sm.consult_oracle().is_none(), "second call while pending");

        let reading = OracleReading {
            interpretation: "cassette dreams".to_string(),
            mood: "Nostalgic".to_string(),
        };
        assert!(sm.resolve_oracle(&ticket, Ok(reading.clone())));
        assert_eq!(sm.viewing().unwrap().oracle().reading(), Some(&reading));
        assert!(!sm.is_pending());
    }

    #[test]
    fn test_oracle_failure_resolves_to_fallback() {
        let mut rng = rng();
        let (mut sm, _) = viewing_machine(&mut rng);
        let (ticket, _) = sm.consult_oracle().unwrap();

        assert!(sm.resolve_oracle(&ticket, Err(OracleError::Transport("timeout".to_string()))));
        let reading = sm.viewing().unwrap().oracle().reading().unwrap();
        assert_eq!(reading.mood, "Disconnected");
        assert!(reading.is_fallback());
        assert!(!sm.is_pending());
        // Explicit re-request after resolution is allowed.
        assert!(sm.consult_oracle().is_some());
    }

    #[test]
    fn test_stale_oracle_response_dropped() {
        let mut rng = rng();
        let (mut sm, jar) = viewing_machine(&mut rng);
        let (stale, _) = sm.consult_oracle().unwrap();

        sm.close();
        assert!(!sm.resolve_oracle(&stale, Ok(OracleReading::fallback())));
        assert_eq!(sm.state(), &SessionState::Idle);

        // A new viewing of possibly the same record must not accept it either.
        sm.request_pop(&jar, 5000);
        sm.tick(6000, &jar, &mut rng).unwrap();
        let (fresh, _) = sm.consult_oracle().unwrap();
        assert_ne!(fresh, stale);
        assert!(!sm.resolve_oracle(&stale, Ok(OracleReading::fallback())));
        assert!(sm.viewing().unwrap().oracle().is_pending());
        assert!(sm.resolve_oracle(&fresh, Err(OracleError::Unavailable("no key".to_string()))));
    }

    #[test]
    fn test_consult_outside_viewing() {
        let mut sm = SessionStateMachine::default();
        assert!(sm.consult_oracle().is_none());
    }

    #[test]
    fn test_custom_pop_duration() {
        let mut rng = rng();
        let jar = seeded_jar(1, &mut rng);
        let mut sm = SessionStateMachine::new(SessionConfig { pop_duration_ms: 0 });
        assert_eq!(sm.request_pop(&jar, 42), PopRequest::Started { ready_at: 42 });
        assert!(sm.tick(42, &jar, &mut rng).unwrap().is_some());
    }
}
