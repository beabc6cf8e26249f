//! Graph loaders.
//!
//! Loaders populate a [`GraphBuilder`] from one source each and run once, in
//! ascending priority order, so later loaders extend or override what earlier
//! ones wrote:
//!
//! | Loader | Priority | Runs when |
//! |--------|----------|-----------|
//! | [`SnapshotLoader`] | 0 | the snapshot file exists |
//! | [`IntrospectionLoader`] | 10 | a database handle of its dialect is present |
//! | [`OverrideLoader`] | 100 | always |
//!
//! A failing loader is recorded in the [`LoadReport`] and the build carries
//! on, unless the loader is listed in `loaders.required`.

pub mod introspect;
pub mod overrides;
pub mod snapshot;

pub use introspect::{
    IntrospectionLoader, SchemaMetadata, SchemaSource, SourceError, MYSQL_MIN_VERSION,
    POSTGRES_MIN_VERSION,
};
pub use overrides::OverrideLoader;
pub use snapshot::SnapshotLoader;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{Settings, SettingsError};
use crate::graph::{EntityGraph, GraphBuilder, GraphError, SnapshotError};
use crate::naming::Namer;
use crate::sql::Dialect;

/// Error type for loaders.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Metadata query failed: {0}")]
    Source(#[from] SourceError),

    #[error("{engine} version {found} is below the supported minimum {minimum}")]
    UnsupportedVersion {
        engine: &'static str,
        found: u64,
        minimum: u64,
    },

    #[error("No tables found in schema '{schema}'")]
    NoTables { schema: String },

    #[error("Malformed metadata payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Invalid override for class '{class}': {message}")]
    InvalidOverride { class: String, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Required loader '{loader}' failed: {source}")]
    Required {
        loader: String,
        #[source]
        source: Box<LoadError>,
    },
}

pub type LoadResult<T> = Result<T, LoadError>;

/// What the running process has available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadEnv {
    pub dialect: Dialect,
    pub has_database: bool,
}

/// A source of classes and foreign keys.
#[async_trait]
pub trait GraphLoader: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    fn supports(&self, _env: &LoadEnv) -> bool {
        true
    }

    async fn load(&self, sink: &mut GraphBuilder) -> LoadResult<()>;
}

/// Outcome of one graph build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
    /// Loader name and error message.
    pub failed: Vec<(String, String)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `loaders` in priority order and build the graph.
pub async fn load_graph(
    settings: &Settings,
    loaders: &[Box<dyn GraphLoader>],
    env: &LoadEnv,
) -> LoadResult<(EntityGraph, LoadReport)> {
    let mut ordered: Vec<&dyn GraphLoader> = loaders.iter().map(|l| l.as_ref()).collect();
    ordered.sort_by_key(|l| l.priority());

    let mut builder = GraphBuilder::new();
    let mut report = LoadReport::default();

    for loader in ordered {
        let name = loader.name().to_string();
        if !loader.supports(env) {
            debug!(loader = %name, "loader not supported in this environment");
            report.skipped.push(name);
            continue;
        }

        match loader.load(&mut builder).await {
            Ok(()) => {
                info!(
                    loader = %name,
                    classes = builder.class_count(),
                    foreign_keys = builder.foreign_keys().len(),
                    "loader finished"
                );
                report.loaded.push(name);
            }
            Err(err) if settings.loaders.required.contains(&name) => {
                return Err(LoadError::Required {
                    loader: name,
                    source: Box::new(err),
                });
            }
            Err(err) => {
                warn!(loader = %name, error = %err, "loader failed; continuing");
                report.failed.push((name, err.to_string()));
            }
        }
    }

    let graph = builder.build(&Namer::new(&settings.naming));
    info!(
        classes = graph.class_count(),
        version = %graph.version(),
        "entity graph ready"
    );
    Ok((graph, report))
}

/// Snapshot (when configured) and static override loaders for `settings`.
///
/// Database introspection needs a live [`SchemaSource`]; callers that have
/// one push an [`IntrospectionLoader`] onto the returned list.
pub fn configured_loaders(settings: &Settings) -> LoadResult<Vec<Box<dyn GraphLoader>>> {
    let mut loaders: Vec<Box<dyn GraphLoader>> = Vec::new();
    if let Some(path) = settings.snapshot_path()? {
        loaders.push(Box::new(SnapshotLoader::new(path)));
    }
    loaders.push(Box::new(OverrideLoader::new(settings)));
    Ok(loaders)
}
