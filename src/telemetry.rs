// src/telemetry.rs

//! Optional in-process diagnostics for the channel protocol.
//!
//! With the `telemetry` feature enabled, the core records named counters and
//! timestamped events (rendezvous handoffs, stale-waiter skips, select
//! submission outcomes) in a global collector that tests and debugging
//! sessions can dump with [`print_report`]. Without the feature every entry
//! point is an empty `#[inline(always)]` stub and the call sites cost
//! nothing.

#[cfg(feature = "telemetry")]
pub mod enabled {
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::thread::{self, ThreadId};
  use std::time::Instant;

  static NEXT_SEQ: AtomicUsize = AtomicUsize::new(0);

  #[derive(Debug, Clone)]
  pub struct TelemetryEvent {
    pub seq: usize,
    pub timestamp: Instant,
    pub os_thread: ThreadId,
    pub location: &'static str,
    pub event: &'static str,
    pub message: Option<String>,
  }

  struct Collector {
    events: Vec<TelemetryEvent>,
    counters: HashMap<(&'static str, &'static str), usize>,
    start: Instant,
  }

  lazy_static::lazy_static! {
    static ref COLLECTOR: Mutex<Collector> = Mutex::new(Collector {
      events: Vec::new(),
      counters: HashMap::new(),
      start: Instant::now(),
    });
  }

  pub fn log_event(location: &'static str, event: &'static str, message: Option<String>) {
    let entry = TelemetryEvent {
      seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
      timestamp: Instant::now(),
      os_thread: thread::current().id(),
      location,
      event,
      message,
    };
    if let Ok(mut collector) = COLLECTOR.lock() {
      collector.events.push(entry);
    }
  }

  pub fn increment_counter(location: &'static str, counter: &'static str) {
    if let Ok(mut collector) = COLLECTOR.lock() {
      *collector.counters.entry((location, counter)).or_insert(0) += 1;
    }
  }

  pub fn counter_value(location: &'static str, counter: &'static str) -> usize {
    COLLECTOR
      .lock()
      .map(|collector| collector.counters.get(&(location, counter)).copied().unwrap_or(0))
      .unwrap_or(0)
  }

  pub fn print_report() {
    let Ok(collector) = COLLECTOR.lock() else {
      eprintln!("[chansel telemetry] collector mutex poisoned, no report");
      return;
    };

    println!("--- chansel telemetry report ---");
    for event in &collector.events {
      let offset = event.timestamp.duration_since(collector.start);
      println!(
        "  +{:<10.6}s [{:<5}] {:?} {:<18} {:<28} {}",
        offset.as_secs_f64(),
        event.seq,
        event.os_thread,
        event.location,
        event.event,
        event.message.as_deref().unwrap_or("")
      );
    }
    let mut counters: Vec<_> = collector.counters.iter().collect();
    counters.sort_by_key(|(key, _)| *key);
    for ((location, counter), value) in counters {
      println!("  {location:<18} {counter:<28} {value}");
    }
    println!("--- end of report ---");
  }

  pub fn clear() {
    if let Ok(mut collector) = COLLECTOR.lock() {
      collector.events.clear();
      collector.counters.clear();
      collector.start = Instant::now();
    }
    NEXT_SEQ.store(0, Ordering::Relaxed);
  }
}

#[cfg(not(feature = "telemetry"))]
pub mod disabled {
  #[inline(always)]
  pub fn log_event(_location: &'static str, _event: &'static str, _message: Option<String>) {}
  #[inline(always)]
  pub fn increment_counter(_location: &'static str, _counter: &'static str) {}
  #[inline(always)]
  pub fn print_report() {}
  #[inline(always)]
  pub fn clear() {}
}

#[cfg(feature = "telemetry")]
pub use enabled::{clear, increment_counter, log_event, print_report};

#[cfg(not(feature = "telemetry"))]
pub use disabled::{clear, increment_counter, log_event, print_report};
