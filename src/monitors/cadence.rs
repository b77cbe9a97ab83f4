//! Poll cadence decision table
//!
//! | path    | pool mode | local time  | period | batch            |
//! |---------|-----------|-------------|--------|------------------|
//! | proxied | any       | any         | 20s    | full set         |
//! | direct  | enabled   | any         | 11s    | 2 from rotation  |
//! | direct  | disabled  | 09:00-23:59 | 60s    | full set         |
//! | direct  | disabled  | 00:00-08:59 | 300s   | full set         |
//!
//! All values come from [`PollingConfig`]; the table shows the defaults.

use std::time::Duration;

use chrono::{NaiveTime, Timelike};

use crate::config::PollingConfig;

/// How upstream requests leave the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPath {
    Direct,
    Proxied,
}

/// Which subscribed rooms a tick looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSelection {
    Full,
    Rotating { batch_size: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub period: Duration,
    pub selection: BatchSelection,
}

#[derive(Debug, Clone)]
pub struct CadencePolicy {
    path: NetworkPath,
    polling: PollingConfig,
}

impl CadencePolicy {
    pub fn new(path: NetworkPath, polling: PollingConfig) -> Self {
        Self { path, polling }
    }

    /// A configured proxy selects the proxied path
    pub fn from_config(polling: &PollingConfig, proxy: Option<&str>) -> Self {
        let path = match proxy {
            Some(_) => NetworkPath::Proxied,
            None => NetworkPath::Direct,
        };
        Self::new(path, polling.clone())
    }

    pub fn path(&self) -> NetworkPath {
        self.path
    }

    pub fn plan(&self, now: NaiveTime) -> Cadence {
        let polling = &self.polling;

        let (secs, selection) = match self.path {
            NetworkPath::Proxied => (polling.proxied_period_secs, BatchSelection::Full),
            NetworkPath::Direct if polling.pool_mode => (
                polling.pool_period_secs,
                BatchSelection::Rotating {
                    batch_size: polling.pool_batch_size.max(1),
                },
            ),
            NetworkPath::Direct if now.hour() >= polling.day_start_hour => {
                (polling.day_period_secs, BatchSelection::Full)
            }
            NetworkPath::Direct => (polling.night_period_secs, BatchSelection::Full),
        };

        Cadence {
            period: Duration::from_secs(secs.max(1)),
            selection,
        }
    }
}
