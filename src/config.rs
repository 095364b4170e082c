use std::path::PathBuf;

/// Configuration for a database instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the collection files.
    pub dir: PathBuf,

    /// Whether newly opened collections compress their commits (default:
    /// false). Toggle per collection with `Collection::set_compression`.
    pub compression: bool,

    /// Whether commits issue a durability barrier before returning
    /// (default: true). Disabling trades crash durability for throughput.
    pub sync_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./emberdb"),
            compression: false,
            sync_on_commit: true,
        }
    }
}

impl Config {
    /// Create a new config rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Compress commits of newly opened collections.
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Control the durability barrier on commit.
    pub fn sync_on_commit(mut self, enabled: bool) -> Self {
        self.sync_on_commit = enabled;
        self
    }
}
