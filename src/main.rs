use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backlog_forge::remote::devops::DevOpsClient;
use backlog_forge::sync::{self, hierarchy, tree_render};
use backlog_forge::template;
use backlog_forge::template::expand::{exclude_features, expand, ExclusionPolicy, InstanceOverrides};
use backlog_forge::template::validate::{has_errors, validate};
use backlog_forge::{mcp, models};

#[derive(Parser)]
#[command(name = "bklg")]
#[command(about = "Template-driven backlog generation and synchronization for Azure DevOps")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a template locally and write the backlog YAML
    Generate {
        /// Path to the template file
        template: PathBuf,

        /// Project name substituted into the first epic's title
        #[arg(short, long)]
        name: Option<String>,

        /// Instance override as KEY=name,name (repeatable); a dotted KEY
        /// addresses a story inside a feature
        #[arg(short, long = "instances")]
        instances: Vec<String>,

        /// Keyword matching feature titles to exclude (repeatable)
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,

        /// Only exclude features marked optional in the template
        #[arg(long)]
        optional_only: bool,

        /// Output path (defaults to data/<project-slug>.yaml)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Expand a backlog YAML file and upload it to Azure DevOps
    Upload {
        /// Path to the template or expanded backlog file
        file: PathBuf,
    },
    /// Show the remote work item hierarchy
    Status {
        /// Restrict to the epic with this exact title
        #[arg(short, long)]
        epic: Option<String>,

        /// Skip the aggregate summary
        #[arg(long)]
        no_summary: bool,
    },
    /// Start MCP server via stdio (for agent integration)
    Mcp,
    /// Start MCP server over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

/// Initialize tracing with output to stderr (for MCP mode) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "backlog_forge=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // MCP mode: log to stderr so stdout is clean for protocol
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn data_dir() -> PathBuf {
    std::env::var("BACKLOG_FORGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // MCP mode needs stderr for logging since stdout is the protocol channel
    let use_stderr = matches!(cli.command, Some(Commands::Mcp));
    init_tracing(use_stderr);

    match cli.command {
        Some(Commands::Generate {
            template,
            name,
            instances,
            exclude,
            optional_only,
            output,
        }) => {
            let mut doc = template::load_template(&template)?;

            if let Some(name) = name {
                if let Some(epic) = doc.epics.first_mut() {
                    epic.title = name;
                }
            }

            let policy = if optional_only {
                ExclusionPolicy::OptionalOnly
            } else {
                ExclusionPolicy::AnyFeature
            };
            exclude_features(&mut doc, &exclude, policy);

            let overrides = InstanceOverrides::from_args(&instances)?;
            let backlog = expand(&doc, &overrides)?;

            let issues = validate(&backlog);
            for issue in &issues {
                eprintln!("{}", issue);
            }
            if has_errors(&issues) {
                anyhow::bail!("backlog validation failed");
            }

            let output = output.unwrap_or_else(|| {
                let name = backlog
                    .epics
                    .first()
                    .map(|epic| epic.title.as_str())
                    .unwrap_or("project");
                data_dir().join(format!("{}.yaml", template::slugify(name)))
            });
            let written = template::save_backlog(&backlog, &output)?;

            print!("{}", tree_render::render_backlog(&backlog));
            let counts = backlog.counts();
            println!();
            println!(
                "{} work items ({} epics, {} features, {} stories, {} tasks)",
                counts.total(),
                counts.epics,
                counts.features,
                counts.stories,
                counts.tasks
            );
            println!(
                "{} story points, {} estimated hours",
                backlog.total_story_points(),
                backlog.total_estimate_hours()
            );
            println!("Written to {}", written.display());
        }
        Some(Commands::Upload { file }) => {
            let store = DevOpsClient::from_env()?;

            let doc = template::load_template(&file)?;
            let backlog = expand(&doc, &InstanceOverrides::new())?;

            let issues = validate(&backlog);
            for issue in &issues {
                eprintln!("{}", issue);
            }
            if has_errors(&issues) {
                anyhow::bail!("backlog validation failed");
            }

            let report = sync::upload(&backlog, &store).await;
            print!("{}", report.format_lines());
            println!(
                "{} created, {} skipped, {} failed, {} parent unavailable",
                report.created, report.skipped, report.failed, report.parent_unavailable
            );
            if report.failed > 0 {
                anyhow::bail!("upload finished with failures");
            }
        }
        Some(Commands::Status { epic, no_summary }) => {
            let store = DevOpsClient::from_env()?;

            let records = hierarchy::fetch_hierarchy(&store, epic.as_deref()).await?;
            if records.is_empty() {
                println!("No work items found.");
                return Ok(());
            }

            let tree = hierarchy::build_tree(records);
            print!("{}", tree_render::render_hierarchy(&tree));

            if !no_summary {
                let summary = hierarchy::compute_summary(&tree);
                println!();
                println!("{} work items", summary.total_items);
                for kind in models::WorkItemType::ALL {
                    if let Some(count) = summary.counts.get(kind.as_str()) {
                        println!("  {}: {}", kind.as_str(), count);
                    }
                }
                println!(
                    "{} story points, {} estimated hours",
                    summary.total_story_points, summary.total_estimate_hours
                );
            }
        }
        Some(Commands::Mcp) => {
            let store = Arc::new(DevOpsClient::from_env()?);
            mcp::run_stdio_server(store, data_dir()).await?;
        }
        Some(Commands::Serve { port }) => {
            let store = Arc::new(DevOpsClient::from_env()?);
            tracing::info!("Starting BacklogForge MCP server on port {}", port);
            mcp::run_http_server(store, data_dir(), port).await?;
        }
        None => {
            // Default: start the HTTP server
            let store = Arc::new(DevOpsClient::from_env()?);
            tracing::info!("Starting BacklogForge MCP server on port 3000");
            mcp::run_http_server(store, data_dir(), 3000).await?;
        }
    }

    Ok(())
}
