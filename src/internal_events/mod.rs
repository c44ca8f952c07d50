//! Internal events emitted while a run progresses.
//!
//! Each event logs through `tracing` and records its counters and
//! histograms through `metrics`. Emit them with [`emit!`].

mod http_client;
mod ingest;
mod postgres;
pub mod prelude;
mod prometheus;

pub use self::http_client::*;
pub use self::ingest::*;
pub use self::postgres::*;
pub use self::prometheus::*;

pub trait InternalEvent: Sized {
    fn emit(self);

    // Used by tests to assert which events fired.
    fn name(&self) -> Option<&'static str> {
        None
    }
}

#[cfg(test)]
pub fn emit(event: impl InternalEvent) {
    if let Some(name) = event.name() {
        event_test_util::record_internal_event(name);
    }
    event.emit();
}

#[cfg(not(test))]
pub fn emit(event: impl InternalEvent) {
    event.emit();
}

#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::internal_events::emit($event)
    };
}
