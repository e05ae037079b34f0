//! Id Generator
//!
//! Trace identifiers look like `202302122007-63e93a56c9b7f1a2d3000001`: a
//! local-time prefix with minute resolution, then an object id made of the
//! unix time in seconds, a per-process random discriminator and a counter.
//! Within one process identifiers are unique and strictly increasing in
//! generation order, so sorting them lexically sorts them by creation.
use chrono::{DateTime, Local};
use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

const PREFIX_FORMAT: &str = "%Y%m%d%H%M";
const COUNTER_MAX: u32 = 0x00FF_FFFF;

/// Interface for generating IDs
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new trace identifier.
    fn new_trace_id(&self) -> String;
}

/// Default [`IdGenerator`] implementation.
///
/// All instances share the process-wide state, so identifiers generated
/// through different tracers never collide.
#[derive(Clone, Debug, Default)]
pub struct TimeOrderedIdGenerator {
    _private: (),
}

impl IdGenerator for TimeOrderedIdGenerator {
    fn new_trace_id(&self) -> String {
        new_trace_id()
    }
}

/// Generate a new trace identifier using the process-wide generator.
pub fn new_trace_id() -> String {
    let (secs, counter) = next_object_id_parts();

    let mut id = String::with_capacity(PREFIX_FORMAT.len() + 1 + 24);
    let prefix = DateTime::from_timestamp(i64::from(secs), 0)
        .map(|utc| utc.with_timezone(&Local).format(PREFIX_FORMAT).to_string())
        .unwrap_or_else(|| "000000000000".to_string());
    id.push_str(&prefix);
    id.push('-');
    let _ = write!(id, "{secs:08x}");
    for byte in process_discriminator() {
        let _ = write!(id, "{byte:02x}");
    }
    let _ = write!(id, "{counter:06x}");
    id
}

#[derive(Debug)]
struct ObjectIdState {
    secs: u32,
    counter: u32,
}

static OBJECT_ID_STATE: OnceLock<Mutex<ObjectIdState>> = OnceLock::new();
static PROCESS_DISCRIMINATOR: OnceLock<[u8; 5]> = OnceLock::new();

fn process_discriminator() -> &'static [u8; 5] {
    PROCESS_DISCRIMINATOR.get_or_init(rand::random::<[u8; 5]>)
}

fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}

fn random_counter_seed() -> u32 {
    // lower half of the counter space, so a busy second has room to grow
    rand::random::<u32>() & (COUNTER_MAX >> 1)
}

// Returns a (seconds, counter) pair strictly greater than every pair
// returned before in this process.
fn next_object_id_parts() -> (u32, u32) {
    let state = OBJECT_ID_STATE.get_or_init(|| {
        Mutex::new(ObjectIdState {
            secs: 0,
            counter: 0,
        })
    });
    // the state is two integers, a poisoned lock still holds a consistent value
    let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let now = unix_seconds();
    if now > state.secs {
        state.secs = now;
        state.counter = random_counter_seed();
    } else if state.counter >= COUNTER_MAX {
        state.secs += 1;
        state.counter = 0;
    } else {
        state.counter += 1;
    }
    (state.secs, state.counter)
}

/// [`IdGenerator`] implementation that increments a counter for each new ID. This helps produce
/// predictable IDs for testing.
#[derive(Clone, Debug)]
pub struct IncrementIdGenerator(Arc<AtomicU64>);

impl IncrementIdGenerator {
    /// Create a new [`IncrementIdGenerator`]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for IncrementIdGenerator {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }
}

impl IdGenerator for IncrementIdGenerator {
    fn new_trace_id(&self) -> String {
        format!("{:024x}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}
