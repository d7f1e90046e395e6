use aura_core::config;
use aura_session::{FileStorage, GuestStore};
use aura_store::filter::{filter_tasks, StatusFilter, TaskFilter};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "auratask", version, about = "AuraTask — local task management")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task.
    Add {
        /// Task title.
        #[arg(trailing_var_arg = true, required = true)]
        title: Vec<String>,

        /// Optional description.
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List tasks.
    List {
        /// Only pending tasks.
        #[arg(long, conflicts_with = "completed")]
        pending: bool,

        /// Only completed tasks.
        #[arg(long)]
        completed: bool,

        /// Free-text search in title and description.
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Mark a task as completed.
    Done {
        /// Task id (or unique id prefix).
        id: String,
    },
    /// Remove a task.
    Remove {
        /// Task id (or unique id prefix).
        id: String,
    },
    /// Show dataset status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load(&cli.config)?;
    let data_dir = config::shellexpand(&cfg.app.data_dir);
    let storage = Arc::new(FileStorage::open(format!("{data_dir}/guest.json"))?);
    let mut guest = GuestStore::open(storage, cfg.guest.task_limit);

    match cli.command {
        Commands::Add { title, description } => {
            let title = title.join(" ");
            match guest.add_task(title, description, None) {
                Some(task) => println!("Added {} ({})", task.title, short_id(task.id)),
                None => anyhow::bail!(
                    "task limit reached ({} tasks); sign in to add more",
                    cfg.guest.task_limit
                ),
            }
        }
        Commands::List {
            pending,
            completed,
            query,
        } => {
            let filter = TaskFilter {
                query,
                status: if pending {
                    StatusFilter::Active
                } else if completed {
                    StatusFilter::Completed
                } else {
                    StatusFilter::All
                },
                ..Default::default()
            };
            let tasks = filter_tasks(guest.tasks(), &filter, Utc::now().date_naive());
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in tasks {
                let mark = if task.completed { "x" } else { " " };
                println!("[{mark}] {}  {}", short_id(task.id), task.title);
            }
        }
        Commands::Done { id } => {
            let id = resolve_id(&guest, &id)?;
            guest.set_task_completed(id, true);
            println!("Done.");
        }
        Commands::Remove { id } => {
            let id = resolve_id(&guest, &id)?;
            guest.remove_task(id);
            println!("Removed.");
        }
        Commands::Status => {
            let done = guest.tasks().iter().filter(|t| t.completed).count();
            println!(
                "{}: {} tasks ({} done), {} groups, {} tags",
                cfg.app.name,
                guest.tasks().len(),
                done,
                guest.groups().len(),
                guest.tags().len()
            );
            println!(
                "guest {} ({}/{} task slots used)",
                guest.guest_id(),
                guest.tasks().len(),
                cfg.guest.task_limit
            );
        }
    }

    Ok(())
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Resolve a full id or a unique prefix against the current tasks.
fn resolve_id(guest: &GuestStore, input: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = input.parse() {
        return Ok(id);
    }
    let matches: Vec<Uuid> = guest
        .tasks()
        .iter()
        .filter(|t| t.id.to_string().starts_with(input))
        .map(|t| t.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => anyhow::bail!("no task matches '{input}'"),
        _ => anyhow::bail!("'{input}' is ambiguous"),
    }
}
