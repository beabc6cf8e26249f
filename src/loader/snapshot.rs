//! Snapshot loader.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use super::{GraphLoader, LoadEnv, LoadResult};
use crate::graph::{GraphBuilder, GraphSnapshot};

/// Loads a graph previously saved with [`GraphSnapshot::save`].
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    path: PathBuf,
}

impl SnapshotLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl GraphLoader for SnapshotLoader {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn supports(&self, _env: &LoadEnv) -> bool {
        self.path.exists()
    }

    async fn load(&self, sink: &mut GraphBuilder) -> LoadResult<()> {
        let snapshot = GraphSnapshot::load(&self.path)?;
        snapshot.apply(sink)?;
        info!(
            path = %self.path.display(),
            classes = snapshot.classes.len(),
            version = %snapshot.version,
            "loaded snapshot"
        );
        Ok(())
    }
}
