//! Engine configuration
//!
//! [`EngineOptions`] collects the knobs a host can turn before loading a game.
//! The defaults suit interactive play; tests usually fix `random_seed`.

/// Tunable limits and feature switches for an [`Engine`](crate::interpreter::engine::Engine)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Cap on total game memory in bytes (`setmemsize` and heap growth)
    pub max_memory: u32,
    /// Cap on the heap region in bytes; 0 leaves only `max_memory`
    pub max_heap_extent: u32,
    /// Whether `fyrecall` is available at all
    pub fyre_enabled: bool,
    /// Whether the game may install native veneer routines
    pub veneer_enabled: bool,
    /// Fixed RNG seed, or `None` for entropy
    pub random_seed: Option<u64>,
    /// Memory budget for the built-in undo history
    pub undo_limit: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_memory: 64 * 1024 * 1024,
            max_heap_extent: 0,
            fyre_enabled: true,
            veneer_enabled: true,
            random_seed: None,
            undo_limit: 8 * 1024 * 1024,
        }
    }
}

impl EngineOptions {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_max_memory(mut self, bytes: u32) -> Self {
        self.max_memory = bytes;
        self
    }

    pub fn with_max_heap_extent(mut self, bytes: u32) -> Self {
        self.max_heap_extent = bytes;
        self
    }

    pub fn with_fyre(mut self, enabled: bool) -> Self {
        self.fyre_enabled = enabled;
        self
    }

    pub fn with_veneer(mut self, enabled: bool) -> Self {
        self.veneer_enabled = enabled;
        self
    }

    pub fn with_undo_limit(mut self, bytes: usize) -> Self {
        self.undo_limit = bytes;
        self
    }
}
