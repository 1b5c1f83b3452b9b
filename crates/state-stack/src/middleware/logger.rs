//! LoggerMiddleware - records every action together with the states around it

use super::{Middleware, MiddlewareApi};
use crate::action::{Action, Dispatchable, Dispatched};
use crate::config::LoggerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, ROOT_SLICE};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Names of the top-level keys that differ between two states.
pub trait ShallowDiff {
    fn changed_keys(&self, next: &Self) -> Vec<String>;
}

impl ShallowDiff for Value {
    fn changed_keys(&self, next: &Self) -> Vec<String> {
        match (self, next) {
            (Value::Object(prev), Value::Object(next)) => {
                let mut changed: Vec<String> = next
                    .iter()
                    .filter(|(key, value)| prev.get(key.as_str()) != Some(*value))
                    .map(|(key, _)| key.clone())
                    .collect();
                changed.extend(prev.keys().filter(|key| !next.contains_key(key.as_str())).cloned());
                changed.sort();
                changed
            }
            (prev, next) if prev != next => vec![ROOT_SLICE.to_string()],
            _ => Vec::new(),
        }
    }
}

/// One recorded dispatch.
pub struct LogEntry<S> {
    pub at: DateTime<Local>,
    pub action: Action,
    pub prev_state: Arc<S>,
    pub next_state: Arc<S>,
    pub duration: Duration,
    /// Empty unless diffing is enabled.
    pub changed_keys: Vec<String>,
}

impl<S> LogEntry<S> {
    /// Whether the reducer produced a new state.
    pub fn changed(&self) -> bool {
        !Arc::ptr_eq(&self.prev_state, &self.next_state)
    }
}

impl<S> Clone for LogEntry<S> {
    fn clone(&self) -> Self {
        Self {
            at: self.at,
            action: self.action.clone(),
            prev_state: Arc::clone(&self.prev_state),
            next_state: Arc::clone(&self.next_state),
            duration: self.duration,
            changed_keys: self.changed_keys.clone(),
        }
    }
}

impl<S> fmt::Debug for LogEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEntry")
            .field("at", &self.at)
            .field("action", &self.action.kind)
            .field("duration", &self.duration)
            .field("changed_keys", &self.changed_keys)
            .finish()
    }
}

type ActionFilter = Box<dyn Fn(&Action) -> bool + Send + Sync>;
type Differ<S> = fn(&S, &S) -> Vec<String>;

/// Logs every action passing through and keeps a bounded history.
///
/// Never changes what the rest of the chain returns. Thunks are passed on
/// without being recorded; the actions they dispatch are.
pub struct LoggerMiddleware<S> {
    enabled: bool,
    level: log::Level,
    max_entries: usize,
    differ: Option<Differ<S>>,
    filter: Option<ActionFilter>,
    history: Mutex<VecDeque<LogEntry<S>>>,
}

impl<S> Default for LoggerMiddleware<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> LoggerMiddleware<S> {
    pub fn new() -> Self {
        Self {
            enabled: true,
            level: log::Level::Debug,
            max_entries: 100,
            differ: None,
            filter: None,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_level(mut self, level: log::Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Only record actions for which `filter` returns true.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Action) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Snapshot of the recorded history, oldest first.
    pub fn entries(&self) -> Vec<LogEntry<S>> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, entry: LogEntry<S>) {
        if self.max_entries == 0 {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.max_entries {
            history.pop_front();
        }
        history.push_back(entry);
    }
}

impl<S: ShallowDiff> LoggerMiddleware<S> {
    /// Also compute the changed top-level keys for every entry.
    pub fn with_diff(mut self) -> Self {
        self.differ = Some(S::changed_keys);
        self
    }

    /// Build from the `[logger]` table of a [`StackConfig`](crate::config::StackConfig).
    pub fn from_config(config: &LoggerConfig) -> Self {
        let logger = Self {
            enabled: config.enabled,
            ..Self::new()
                .with_level(config.level())
                .with_max_entries(config.max_entries)
        };
        if config.diff { logger.with_diff() } else { logger }
    }
}

impl<S> Middleware<S> for LoggerMiddleware<S>
where
    S: Send + Sync + 'static,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S>,
        next: &Dispatcher<S>,
        action: Dispatchable<S>,
    ) -> Result<Dispatched> {
        let action = match action {
            Dispatchable::Action(action)
                if self.enabled && self.filter.as_ref().is_none_or(|keep| keep(&action)) =>
            {
                action
            }
            other => return next.dispatch(other),
        };

        // Unreadable state (a dispatch from inside a reducer) is not recorded.
        let Ok(prev_state) = api.get_state() else {
            return next.dispatch(action);
        };
        let started = Instant::now();
        let result = next.dispatch(action.clone());
        let duration = started.elapsed();

        if let Err(e) = &result {
            log::log!(self.level, "Action: {} failed: {}", action.kind, e);
            return result;
        }

        let Ok(next_state) = api.get_state() else {
            return result;
        };
        let changed_keys = self
            .differ
            .map(|diff| diff(&prev_state, &next_state))
            .unwrap_or_default();
        log::log!(
            self.level,
            "Action: {} ({:?}) changed {:?}",
            action.kind,
            duration,
            changed_keys
        );

        self.record(LogEntry {
            at: Local::now(),
            action,
            prev_state,
            next_state,
            duration,
            changed_keys,
        });
        result
    }
}
