//! Process-wide tracer.
//!
//! Libraries that cannot be handed a [`Tracer`] reach for [`tracer`]. Until
//! an application installs one with [`set_tracer`] or [`init_from_env`],
//! it is a discarding tracer.
use crate::config;
use crate::error::TraceResult;
use crate::trace::Tracer;
use std::mem;
use std::sync::{OnceLock, RwLock};

/// The current global tracer.
static GLOBAL_TRACER: OnceLock<RwLock<Tracer>> = OnceLock::new();

/// Ensures the `GLOBAL_TRACER` is initialized with a discarding tracer.
#[inline]
fn global_tracer() -> &'static RwLock<Tracer> {
    GLOBAL_TRACER.get_or_init(|| RwLock::new(Tracer::discard()))
}

/// Returns a handle to the current global tracer.
pub fn tracer() -> Tracer {
    global_tracer()
        .read()
        .map(|tracer| tracer.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
}

/// Installs `new_tracer` as the global tracer and returns the previous one.
///
/// Spans already started keep reporting to the tracer they were started
/// with.
pub fn set_tracer(new_tracer: Tracer) -> Tracer {
    let mut tracer = global_tracer()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    mem::replace(&mut *tracer, new_tracer)
}

/// Builds a tracer from the `HAR_*` environment variables and installs it.
///
/// Returns the installed tracer; call [`Tracer::shutdown`] on it before the
/// process exits so queued spans are written.
pub fn init_from_env() -> TraceResult<Tracer> {
    let tracer = config::from_env().build()?;
    let previous = set_tracer(tracer.clone());
    har_info!(
        name: "Global.TracerInstalled",
        kind = tracer.kind().as_str(),
        previous = previous.kind().as_str()
    );
    Ok(tracer)
}
