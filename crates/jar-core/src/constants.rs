/// Tilt gain: degrees of tilt per px/ms of horizontal velocity.
pub const TILT_GAIN: f64 = 10.0;

/// Maximum jar tilt in either direction, degrees.
pub const MAX_TILT_DEG: f64 = 20.0;

/// Per-sample distance (px) above which motion counts toward shake energy.
pub const SPEED_THRESHOLD: f64 = 10.0;

/// Energy removed per slow sample.
pub const DECAY_RATE: f64 = 5.0;

/// Energy level that fires a shake.
pub const ENERGY_THRESHOLD: f64 = 300.0;

/// How long the jar shakes before the popped memory is shown (ms).
pub const POP_DURATION_MS: u64 = 800;

/// Fixed key the whole collection is persisted under.
pub const STORAGE_KEY: &str = "vaporjar_memories";

/// Pastel backgrounds assigned to new memories.
pub const PASTEL_PALETTE: [&str; 5] = ["#fce7f3", "#e0e7ff", "#fae8ff", "#dcfce7", "#ffedd5"];

/// Maximum characters of a text memory sent to the oracle.
pub const ORACLE_TEXT_LIMIT: usize = 1000;

/// Interpretation shown when the oracle cannot be reached.
pub const FALLBACK_INTERPRETATION: &str =
    "The signal is weak... static interferes with destiny. Try again later.";

/// Mood shown when the oracle cannot be reached.
pub const FALLBACK_MOOD: &str = "Disconnected";
