//! VaporJar engine.
//!
//! Turns a raw pointer-drag stream into a tilt angle and a one-shot shake
//! event, and runs the memory lifecycle (create, store, pop at random, view,
//! ask the oracle) as an explicit state machine.
//!
//! Zero I/O: time, randomness and persistence are all handed in by the
//! caller.

pub mod collection;
pub mod constants;
pub mod drag;
pub mod error;
pub mod gesture;
pub mod memory;
pub mod oracle;
pub mod pointer;
pub mod session;
pub mod time;
pub mod wire;

pub use collection::{MemoryCollection, MemoryRepository};
pub use constants::{
    DECAY_RATE, ENERGY_THRESHOLD, MAX_TILT_DEG, PASTEL_PALETTE, POP_DURATION_MS, SPEED_THRESHOLD,
    STORAGE_KEY, TILT_GAIN,
};
pub use drag::{DragGesture, GestureState, PointerEvent, PopTrigger};
pub use error::{JarError, Result};
pub use gesture::{GestureClassifier, GestureConfig, GestureOutput};
pub use memory::{MemoryKind, MemoryRecord, Shape};
pub use oracle::{
    ORACLE_SYSTEM_INSTRUCTION, OracleError, OracleReading, OracleRequest, OracleStatus,
    OracleTicket, RequestPart, parse_data_uri,
};
pub use pointer::{MotionSample, Point, PointerTracker};
pub use session::{
    Draft, PopRequest, SaveOutcome, SaveStart, SessionConfig, SessionState, SessionStateMachine, Viewing,
};
pub use time::{now_unix_millis, unix_millis_to_iso8601};
pub use wire::{decode_collection, encode_collection, export_json, import_json};
