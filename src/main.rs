#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

use resource_tree::app::resource_groups::{
    GroupBySetting, HostOptions, Resource, ResourceGroupsHost, ResourceSource,
    StaticResourceProvider, StaticSourceProvider, TreeNodeRef, TreeSettings,
};
use resource_tree::{log_debug, log_error, log_info, trace_info};

/// Print a resource tree built from a JSON fixture.
#[derive(Parser, Debug)]
#[command(
    name = "resource-tree",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_BRANCH"), " ", env!("GIT_COMMIT"), ")")
)]
struct Cli {
    /// Fixture with `sources` and `resources` arrays
    #[arg(long, value_name = "FILE")]
    fixture: PathBuf,

    /// resourceGroup, resourceType, location or armTag.<name>
    #[arg(long, value_name = "SETTING")]
    group_by: Option<String>,

    /// Show resources whose type is not supported
    #[arg(long)]
    show_hidden_types: bool,

    /// Settings file; defaults to the user config directory
    #[arg(long, env = "RESOURCE_TREE_SETTINGS", value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Print only the node with this id
    #[arg(long, value_name = "ID")]
    find: Option<String>,

    /// Levels to expand below the sources
    #[arg(long, default_value_t = 3)]
    depth: usize,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    sources: Vec<ResourceSource>,
    #[serde(default)]
    resources: Vec<Resource>,
}

fn init_logging() {
    let Some(proj_dirs) = directories::ProjectDirs::from("com", "", "resource-tree") else {
        eprintln!("No home directory; logging disabled");
        return;
    };

    let log_dir = proj_dirs.data_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_path = log_dir.join("resource-tree.log");

    let file = match std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return;
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_tree=info"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(Arc::new(file))
            .with_ansi(false),
    );

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    // Must come after the subscriber is installed.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to initialize log-to-tracing bridge: {}", e);
    }

    trace_info!(
        "Logging initialized to: {:?} (build {} {})",
        log_path,
        env!("GIT_BRANCH"),
        env!("GIT_COMMIT")
    );
}

fn load_settings(cli: &Cli) -> Result<TreeSettings> {
    let mut settings = match &cli.settings {
        Some(path) => TreeSettings::load_from(path)?,
        None => TreeSettings::load().unwrap_or_default(),
    };
    if let Some(group_by) = &cli.group_by {
        settings.group_by = GroupBySetting::parse_or_default(group_by);
    }
    if cli.show_hidden_types {
        settings.show_hidden_types = true;
    }
    Ok(settings)
}

async fn describe(host: &ResourceGroupsHost, node: &TreeNodeRef) -> Result<String> {
    let item = host.cloud_tree().get_tree_item(node).await?;
    let mut line = item.label;
    if let Some(description) = item.description {
        line.push_str(&format!(" ({})", description));
    }
    line.push_str(&format!("  [{}]", node.id()));
    Ok(line)
}

async fn print_tree(host: &ResourceGroupsHost, depth: usize) -> Result<()> {
    let roots = host.cloud_tree().get_children(None).await?;
    // Depth-first with an explicit stack; children are pushed in reverse.
    let mut stack: Vec<(TreeNodeRef, usize)> = roots.into_iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, level)) = stack.pop() {
        println!("{}{}", "  ".repeat(level), describe(host, &node).await?);
        if level < depth {
            let children = host.cloud_tree().get_children(Some(&node)).await?;
            stack.extend(children.into_iter().rev().map(|child| (child, level + 1)));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    log_debug!("Arguments: {:?}", cli);

    let contents = std::fs::read_to_string(&cli.fixture)
        .with_context(|| format!("Failed to read fixture {:?}", cli.fixture))?;
    let fixture: Fixture = serde_json::from_str(&contents).context("Failed to parse fixture JSON")?;
    let settings = load_settings(&cli)?;
    log_info!(
        "Loaded {} sources and {} resources, grouping by {}",
        fixture.sources.len(),
        fixture.resources.len(),
        settings.group_by
    );

    let sources = Arc::new(StaticSourceProvider::new(fixture.sources));
    let host = ResourceGroupsHost::new(HostOptions::new(sources).with_settings(settings));
    let _registration =
        host.register_cloud_resource_provider(Arc::new(StaticResourceProvider::new(fixture.resources)));

    match &cli.find {
        Some(id) => {
            // The first fetch starts a tree generation.
            host.cloud_tree().get_children(None).await?;
            match host.cloud_tree().find_item_by_id(id).await? {
                Some(node) => println!("{}", describe(&host, &node).await?),
                None => {
                    log_error!("No node with id '{}'", id);
                    std::process::exit(1);
                }
            }
        }
        None => print_tree(&host, cli.depth).await?,
    }

    host.dispose();
    Ok(())
}
