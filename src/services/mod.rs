//! Background services
//!
//! - `watcher`: debounced filesystem watcher feeding the processor queue
//! - `processor`: single-consumer classification and placement pipeline
//! - `resources`: memory / battery backpressure

pub mod processor;
pub mod resources;
pub mod watcher;

pub use processor::{ProcessOutcome, Processor, Route, RouteSource, SkipReason, NEEDS_REVIEW_FOLDER, QUEUE_CAPACITY};
pub use resources::ResourceGuard;
pub use watcher::{create_watcher_handle, start_watcher, stop_watcher, WatcherHandle};
