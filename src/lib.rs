//! Native messaging host for the FileWatcher browser extension.
//!
//! The extension asks the host to watch directories on its behalf; the host
//! coalesces filesystem changes and answers with `reload` messages keyed by
//! the extension's rule identifiers.

pub mod cli;
pub mod config;
pub mod logging;
pub mod manifest;
pub mod picker;
pub mod protocol;
pub mod session;
pub mod watcher;

pub use config::{RuntimeConfig, Settings};
pub use picker::{DirectoryPicker, SystemPicker};
pub use protocol::{FrameReader, FrameWriter, ProtocolError, Request, Response};
pub use session::{Session, SessionEnd, SessionError};
pub use watcher::{ChangeSource, ManualSource, NotifySource, WatchError, WatcherRegistry};
