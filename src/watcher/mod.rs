//! Rule watchers and the change-notification pipeline.
//!
//! # Architecture
//!
//! ```text
//! WatcherRegistry (rule id -> RuleWatcher, reference counted)
//!   RuleWatcher
//!     - Subscription on a ChangeSource (notify or in-memory)
//!     - mpsc channel of raw ChangeEvents
//!     - debounce task: PatternFilter -> Debouncer -> `reload` frame
//! ```

mod debouncer;
mod error;
mod filter;
mod registry;
mod rule;
mod source;

pub use debouncer::{DEFAULT_QUIET_PERIOD, DebounceState, Debouncer};
pub use error::{PatternKind, WatchError};
pub use filter::PatternFilter;
pub use registry::{StartOutcome, StopOutcome, WatcherRegistry};
pub use rule::{DEFAULT_EVENT_BUFFER, RuleConfig, RuleWatcher, WatchOptions};
pub use source::{
    ChangeEvent, ChangeKind, ChangeSource, ManualSource, NotifySource, Subscription,
};
