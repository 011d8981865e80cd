use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spectree::apiset::kubernetes::KubernetesApiSet;
use spectree::apiset::management::ManagementApiSet;
use spectree::apiset::ApiSet;
use spectree::catalog::{presets, Catalog, CatalogBuilder, CatalogConfig};
use spectree::config::Config;
use spectree::context::RequestContext;
use spectree::expanders::json::JsonExpander;
use spectree::expanders::storage_blob::StorageBlobExpander;
use spectree::expanders::swagger::SwaggerExpander;
use spectree::expanders::ExpanderRegistry;
use spectree::http::HttpClient;
use spectree::tree::TreeNode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Browse cloud resources through their API descriptions
#[derive(Parser, Debug)]
#[command(name = "spectree", version = spectree::VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile spec documents into a catalog file
    Build {
        /// Spec document, service folder (with readme.md) or folder of services
        #[arg(long)]
        specs: PathBuf,
        /// Built-in override preset
        #[arg(long, value_parser = preset_name)]
        preset: Vec<String>,
        /// Override file (JSON or YAML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Omit the api-version query parameter from generated templates
        #[arg(long)]
        suppress_api_version: bool,
        /// Service name recorded in the catalog
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Expand one node and print its children
    Expand {
        #[command(flatten)]
        backend: BackendArgs,
        /// Node URL (server-relative)
        #[arg(long)]
        url: String,
    },
    /// Delete a resource
    Delete {
        #[command(flatten)]
        backend: BackendArgs,
        /// Delete URL (server-relative)
        #[arg(long)]
        url: String,
    },
}

#[derive(clap::Args, Debug)]
struct BackendArgs {
    #[arg(long)]
    catalog: PathBuf,
    #[arg(long, value_enum, default_value = "management")]
    backend: Backend,
    /// Server URL (defaults to the configured endpoint)
    #[arg(long)]
    server: Option<String>,
    /// Environment variable holding a bearer token
    #[arg(long)]
    token_env: Option<String>,
    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Management,
    Kubernetes,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn preset_name(name: &str) -> Result<String, String> {
    let names = presets::preset_names();
    if names.contains(&name) {
        Ok(name.to_string())
    } else {
        Err(format!("unknown preset (available: {})", names.join(", ")))
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("spectree started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("spectree").join("spectree.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".spectree").join("spectree.log");
    }
    PathBuf::from("spectree.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    match args.command {
        Command::Build {
            specs,
            preset,
            config,
            suppress_api_version,
            service,
            out,
        } => build(&specs, &preset, config.as_deref(), suppress_api_version, service, &out),
        Command::Expand { backend, url } => expand(&backend, &url).await,
        Command::Delete { backend, url } => delete(&backend, &url).await,
    }
}

fn build(
    specs: &Path,
    preset_names: &[String],
    config_path: Option<&Path>,
    suppress_api_version: bool,
    service: Option<String>,
    out: &Path,
) -> Result<()> {
    let mut config = CatalogConfig::default();
    for name in preset_names {
        let preset = presets::get_preset(name).with_context(|| format!("Unknown preset '{}'", name))?;
        config = config.merge(preset);
    }
    if let Some(path) = config_path {
        config = config.merge(CatalogConfig::load(path)?);
    }
    config.suppress_api_version |= suppress_api_version;

    let service = service.unwrap_or_else(|| {
        specs
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "service".to_string())
    });

    let mut builder = CatalogBuilder::new(&service, config);
    if specs.is_file() {
        builder.add_file(specs)?;
    } else {
        let service_dirs = find_service_dirs(specs)?;
        if service_dirs.is_empty() {
            for file in spec_files(specs)? {
                builder.add_file(&file)?;
            }
        } else {
            for dir in service_dirs {
                builder.add_service_dir(&dir)?;
            }
        }
    }

    let catalog = builder.build()?;
    catalog.save(out)?;

    println!(
        "Wrote {} ({} root types, {} documents skipped)",
        out.display(),
        catalog.resource_types.len(),
        catalog.skipped.len()
    );
    for skipped in &catalog.skipped {
        println!("  skipped {}: {}", skipped.source, skipped.reason);
    }
    Ok(())
}

/// Folders containing a readme.md, depth first in name order
fn find_service_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if root.join("readme.md").is_file() {
        found.push(root.to_path_buf());
        return Ok(found);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read {}", root.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();

    for dir in entries {
        found.extend(find_service_dirs(&dir)?);
    }
    Ok(found)
}

fn spec_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("json" | "yaml" | "yml")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// The backend's APISet, with the client it talks through
fn api_set(args: &BackendArgs, config: &Config) -> Result<(Arc<dyn ApiSet>, HttpClient)> {
    let catalog = Arc::new(Catalog::load(&args.catalog)?);

    let server = match args.backend {
        Backend::Management => config.effective_management_endpoint(args.server.as_deref()),
        Backend::Kubernetes => match args.server.clone().or_else(|| config.kube_server.clone()) {
            Some(server) => server,
            None => bail!("No cluster server configured. Use --server"),
        },
    };

    let mut http = HttpClient::new(&server)?;
    if let Some(var) = &args.token_env {
        let token = std::env::var(var).with_context(|| format!("Environment variable {} is not set", var))?;
        http = http.with_bearer_token(token);
    }

    tracing::info!("Using {:?} backend at {}", args.backend, server);
    let api_set: Arc<dyn ApiSet> = match args.backend {
        Backend::Management => Arc::new(ManagementApiSet::new(http.clone(), catalog)),
        Backend::Kubernetes => Arc::new(KubernetesApiSet::new(&server, http.clone(), catalog)),
    };
    Ok((api_set, http))
}

async fn expand(args: &BackendArgs, url: &str) -> Result<()> {
    let mut config = Config::load();
    let (api_set, http) = api_set(args, &config)?;

    let mut swagger = SwaggerExpander::new();
    swagger.add_api_set(Arc::clone(&api_set));

    let mut registry = ExpanderRegistry::new();
    registry.register(Arc::new(swagger));
    if matches!(args.backend, Backend::Management) {
        registry.register(Arc::new(StorageBlobExpander::new(http)));
    }
    registry.register(Arc::new(JsonExpander));

    let mut node = TreeNode::new(url, url, url);
    node.api_set_id = Some(api_set.id().to_string());

    let ctx = RequestContext::new(config.effective_timeout(args.timeout));
    let outcome = registry.expand_node(&ctx, &node).await;

    for child in &outcome.nodes {
        println!("{}\t{}\t{}", child.display, child.expand_url, child.delete_url);
    }
    if let Some(response) = &outcome.response {
        if outcome.nodes.is_empty() {
            println!("{}", response.response);
        }
    }
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    if let Some(failure) = &outcome.failure {
        eprintln!("error: {}", failure);
        if outcome.nodes.is_empty() {
            bail!("Expansion of {} failed", url);
        }
    }

    if let Err(e) = config.set_last_node(&node.id) {
        tracing::warn!("Failed to save config: {}", e);
    }
    Ok(())
}

async fn delete(args: &BackendArgs, url: &str) -> Result<()> {
    let config = Config::load();
    let (api_set, _) = api_set(args, &config)?;

    let mut node = TreeNode::new(url, url, "");
    node.delete_url = url.to_string();

    let ctx = RequestContext::new(config.effective_timeout(args.timeout));
    match api_set.delete(&ctx, &node).await {
        Ok(_) => {
            println!("Deleted {}", url);
            Ok(())
        }
        Err(e) => bail!("{}", e.user_message()),
    }
}
