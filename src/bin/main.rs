//! tablegraph CLI - Compile graph operations to SQL
//!
//! Usage:
//!   tablegraph compile <operation.json> [--config <file>] [--snapshot <file>]
//!                      [--variables <json>] [--dialect <dialect>]
//!   tablegraph inspect [--config <file>] [--snapshot <file>]
//!
//! Examples:
//!   tablegraph compile query.json --snapshot graph.json
//!   tablegraph compile insert.json --snapshot graph.json --dialect mysql
//!   tablegraph inspect --config tablegraph.toml

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tablegraph::compile::{CompileOptions, Compiler, Operation, Variables};
use tablegraph::config::Settings;
use tablegraph::graph::{ClassKind, EntityGraph};
use tablegraph::loader::{configured_loaders, load_graph, LoadEnv};
use tablegraph::sql::Dialect;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tablegraph")]
#[command(about = "tablegraph - Compile graph queries over a relational schema to SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an operation to one SQL statement
    Compile {
        /// Path to the operation JSON
        file: PathBuf,

        /// Variables as inline JSON or a path to a JSON file
        #[arg(long)]
        variables: Option<String>,

        /// SQL dialect to generate (defaults to the configured one)
        #[arg(short, long)]
        dialect: Option<DialectArg>,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        output: OutputFormat,

        #[command(flatten)]
        source: GraphSource,
    },

    /// List the classes, root fields and relations of a graph
    Inspect {
        #[command(flatten)]
        source: GraphSource,
    },
}

#[derive(Args)]
struct GraphSource {
    /// Path to tablegraph.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Graph snapshot to load (overrides the configured one)
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Mysql,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// SQL followed by one parameter per line
    Sql,
    /// `{"sql": .., "params": [..]}`
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            file,
            variables,
            dialect,
            output,
            source,
        } => cmd_compile(file, variables, dialect, output, source).await,
        Commands::Inspect { source } => cmd_inspect(source).await,
    }
}

async fn cmd_compile(
    file: PathBuf,
    variables: Option<String>,
    dialect: Option<DialectArg>,
    output: OutputFormat,
    source: GraphSource,
) -> ExitCode {
    let (settings, graph) = match open_graph(&source).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let parsed = read_to_string(&file).and_then(|s| {
        Operation::from_json(&s)
            .map_err(|e| format!("Invalid operation '{}': {}", file.display(), e))
    });
    let operation = match parsed {
        Ok(op) => op,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let variables = match variables.as_deref().map(parse_variables).transpose() {
        Ok(vars) => vars.unwrap_or_default(),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut options = CompileOptions::from_settings(&settings);
    if let Some(dialect) = dialect {
        options = options.with_dialect(dialect.into());
    }

    let compiler = Compiler::new(Arc::new(graph), options);
    match compiler.compile(&operation, &variables) {
        Ok(stmt) => {
            match output {
                OutputFormat::Sql => {
                    println!("{}", stmt.sql);
                    for (i, param) in stmt.params.iter().enumerate() {
                        println!("-- ${} = {}", i + 1, param);
                    }
                }
                OutputFormat::Json => match serde_json::to_string_pretty(&stmt) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Failed to serialize statement: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_inspect(source: GraphSource) -> ExitCode {
    let graph = match open_graph(&source).await {
        Ok((_, graph)) => graph,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Graph version: {}", graph.version());
    println!();

    println!("Classes:");
    for (_, class) in graph.classes() {
        if class.kind == ClassKind::Virtual || class.alias_of.is_some() {
            continue;
        }
        let table = class.table.as_deref().unwrap_or("-");
        let marker = if class.kind == ClassKind::Through { " [junction]" } else { "" };
        println!("  - {} (table: \"{}\"){}", class.name, table, marker);
        for field in class.fields() {
            match field.relation {
                Some(id) => {
                    let relation = graph.relation(id);
                    let target = graph.class_by_id(relation.target.class);
                    let shape = if relation.is_list() { "[]" } else { "" };
                    println!(
                        "      {}: {}{} ({})",
                        field.name,
                        target.name,
                        shape,
                        relation.kind.name()
                    );
                }
                None => {
                    let null = if field.nullable { "" } else { "!" };
                    println!("      {}: {}{}", field.name, field.scalar, null);
                }
            }
        }
    }
    println!();

    let mut roots: Vec<_> = graph.roots().collect();
    roots.sort_by(|a, b| a.0.cmp(b.0));
    println!("Root fields:");
    for (name, root) in roots {
        let class = graph.class_by_id(root.class);
        let shape = if root.list { "[]" } else { "" };
        println!("  - {}: {}{}", name, class.name, shape);
    }

    ExitCode::SUCCESS
}

/// Load settings and build the graph from the configured loaders.
async fn open_graph(source: &GraphSource) -> Result<(Settings, EntityGraph), String> {
    let mut settings = match &source.config {
        Some(path) => Settings::from_file(path)
            .map_err(|e| format!("Error loading config '{}': {}", path.display(), e))?,
        None => Settings::default(),
    };

    if let Some(path) = &source.snapshot {
        if !path.exists() {
            return Err(format!("Snapshot not found: {}", path.display()));
        }
        settings.loaders.snapshot = Some(path.display().to_string());
    }

    let loaders = configured_loaders(&settings).map_err(|e| e.to_string())?;
    let env = LoadEnv {
        dialect: settings.dialect,
        has_database: false,
    };
    let (graph, report) = load_graph(&settings, &loaders, &env)
        .await
        .map_err(|e| format!("Error building graph: {}", e))?;

    for (loader, message) in &report.failed {
        eprintln!("warning: loader '{}' failed: {}", loader, message);
    }
    if graph.class_count() == 0 {
        return Err("No classes loaded; pass --snapshot or configure loaders.snapshot".into());
    }

    Ok((settings, graph))
}

fn parse_variables(arg: &str) -> Result<Variables, String> {
    let text = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        read_to_string(Path::new(arg))?
    };
    serde_json::from_str(&text).map_err(|e| format!("Invalid variables: {}", e))
}

fn read_to_string(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading file '{}': {}", path.display(), e))
}
