//! Reference-counted collection of rule watchers.
//!
//! The registry is owned and mutated by the control loop only. It is the
//! sole owner of every [`RuleWatcher`]; a watcher is closed before its entry
//! disappears.

use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::FrameWriter;

use super::error::WatchError;
use super::rule::{RuleConfig, RuleWatcher, WatchOptions};
use super::source::ChangeSource;

/// Outcome of a `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new watcher was created.
    Created,
    /// An existing watcher was reused; carries the new usage count.
    Shared { usage: usize },
}

/// Outcome of a `stop` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No watcher exists for the rule.
    Unknown,
    /// Usage decremented; carries the remaining count.
    Released { usage: usize },
    /// Last user gone, watcher closed and removed.
    Removed,
}

/// Watchers keyed by rule identifier.
pub struct WatcherRegistry {
    watchers: HashMap<String, RuleWatcher>,
    source: Arc<dyn ChangeSource>,
    outbound: Arc<FrameWriter>,
    options: WatchOptions,
}

impl WatcherRegistry {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        outbound: Arc<FrameWriter>,
        options: WatchOptions,
    ) -> Self {
        Self {
            watchers: HashMap::new(),
            source,
            outbound,
            options,
        }
    }

    /// Create the watcher for `config.rule_id`, or add a user to the
    /// existing one.
    ///
    /// An existing watcher keeps its original directory and patterns even if
    /// `config` differs. On error the registry is left unchanged.
    pub fn start(&mut self, config: RuleConfig) -> Result<StartOutcome, WatchError> {
        if let Some(watcher) = self.watchers.get_mut(&config.rule_id) {
            let usage = watcher.acquire();
            if watcher.directory() != config.directory {
                crate::debug_event!(
                    "registry",
                    "kept first directory",
                    "{} ignoring {}",
                    watcher.directory().display(),
                    config.directory.display()
                );
            }
            crate::log_event!(
                "registry",
                "shared",
                "rule '{}' (usage = {usage})",
                config.rule_id
            );
            return Ok(StartOutcome::Shared { usage });
        }

        let rule_id = config.rule_id.clone();
        let directory = config.directory.clone();
        let watcher = RuleWatcher::start(
            config,
            self.source.as_ref(),
            Arc::clone(&self.outbound),
            self.options,
        )?;
        self.watchers.insert(rule_id.clone(), watcher);

        crate::log_event!(
            "registry",
            "started",
            "rule '{rule_id}' on {}",
            directory.display()
        );
        Ok(StartOutcome::Created)
    }

    /// Remove one user of the rule's watcher, closing it when none remain.
    pub async fn stop(&mut self, rule_id: &str) -> StopOutcome {
        let Some(watcher) = self.watchers.get_mut(rule_id) else {
            crate::debug_event!("registry", "stop ignored", "unknown rule '{rule_id}'");
            return StopOutcome::Unknown;
        };

        let usage = watcher.release();
        if usage > 0 {
            crate::log_event!(
                "registry",
                "released",
                "rule '{rule_id}' (usage = {usage})"
            );
            return StopOutcome::Released { usage };
        }

        if let Some(watcher) = self.watchers.remove(rule_id) {
            watcher.close().await;
        }
        crate::log_event!("registry", "deleted", "rule '{rule_id}'");
        StopOutcome::Removed
    }

    /// Close and remove every watcher regardless of usage.
    ///
    /// Returns how many watchers were closed.
    pub async fn stop_all(&mut self) -> usize {
        let count = self.watchers.len();
        for (_, watcher) in self.watchers.drain() {
            watcher.close().await;
        }
        crate::log_event!("registry", "deleted all", "{count} watchers");
        count
    }

    /// Usage count of the rule's watcher, if one exists.
    pub fn usage(&self, rule_id: &str) -> Option<usize> {
        self.watchers.get(rule_id).map(RuleWatcher::usage)
    }

    pub fn get(&self, rule_id: &str) -> Option<&RuleWatcher> {
        self.watchers.get(rule_id)
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.watchers.contains_key(rule_id)
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.watchers.keys().map(String::as_str)
    }
}
