//! Fan-out of work across a bounded pool of tokio workers.
//!
//! `per_unit` runs one submission pipeline per worker and writes nothing
//! shared. `grouped` is for work that streams into one output per outer key:
//! the key is the unit of parallelism and everything under it runs in order.

pub mod grouped;
pub mod per_unit;

use std::any::Any;

/// Default pool size: one worker per available CPU.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
