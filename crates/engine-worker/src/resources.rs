//! Engine options derived from host resources

use serde::Serialize;
use sysinfo::System;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Share of available memory handed to the engine's hash table, in percent.
const HASH_PERCENT: u64 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineOptions {
    /// Transposition table size in MB
    pub hash_mb: u64,
    pub threads: usize,
}

impl EngineOptions {
    /// hash = floor(70% of available MB), threads = logical cores (at least 1).
    pub fn derive(available_mb: u64, logical_cores: usize) -> Self {
        Self {
            hash_mb: available_mb * HASH_PERCENT / 100,
            threads: logical_cores.max(1),
        }
    }

    pub fn from_host() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self::derive(sys.available_memory() / BYTES_PER_MB, num_cpus::get())
    }

    /// `(name, value)` pairs in the order they are sent.
    pub fn as_uci_options(&self) -> [(&'static str, String); 2] {
        [
            ("Hash", self.hash_mb.to_string()),
            ("Threads", self.threads.to_string()),
        ]
    }
}
