use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;

/// Output formatting mode for serialised objects.
///
/// `Clean` inserts a newline after each dictionary entry and array element
/// and is meant for debugging; `Compact` separates tokens with single spaces
/// and is the production default. Both modes are byte-stable: identical
/// input produces identical output across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    Clean,
    #[default]
    Compact,
}

bitflags! {
    /// Encryption algorithms the engine is willing to construct.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlgorithmSet: u32 {
        const RC4_V1 = 1;
        const RC4_V2 = 2;
        const AES_V2 = 4;
        const AES_V3 = 8;
    }
}

impl Default for AlgorithmSet {
    fn default() -> Self {
        AlgorithmSet::all()
    }
}

/// Cooperative cancellation token polled between objects during parse and
/// write. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Engine-wide configuration passed into [`crate::document::Document`]
/// construction. There is no process-global state; two documents with
/// different configurations coexist.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Algorithms accepted when reading encrypted documents.
    pub enabled_algorithms: AlgorithmSet,
    /// Formatting mode used by save operations.
    pub write_mode: WriteMode,
    /// Bytes reserved for a detached signature in signing workflows.
    pub signature_capacity: usize,
    /// Optional cancellation token; `None` disables polling.
    pub cancel: Option<CancelToken>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            enabled_algorithms: AlgorithmSet::default(),
            write_mode: WriteMode::default(),
            // Room for a typical detached PKCS#7 with one timestamp.
            signature_capacity: 8192,
            cancel: None,
        }
    }
}

impl EngineConfig {
    /// True when the configured token has been cancelled.
    pub fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
