use serde::{Deserialize, Serialize};

/// Options for opening an environment.
///
/// The environment is a single file (no subdirectory) opened with relaxed
/// sync flags for throughput; durability of the last few commits is traded
/// away deliberately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Maximum size of the memory map, and so of the whole environment
    /// (default: 1 GiB). Grows are handled by reopening logic, not here.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Maximum number of simultaneously live read transactions
    /// (default: 126, the LMDB default).
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            map_size: default_map_size(),
            max_readers: default_max_readers(),
        }
    }
}

impl OpenOptions {
    pub fn with_map_size(map_size: usize) -> Self {
        Self {
            map_size,
            ..Self::default()
        }
    }
}

fn default_map_size() -> usize {
    1 << 30
}

fn default_max_readers() -> u32 {
    126
}
