use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use lifetrack::lifecycle::NoopFeedback;
use lifetrack::repo::{ItemPatch, NewItem, Repository};
use lifetrack::score;
use lifetrack::store::FileStore;
use lifetrack::types::{Item, Priority, Status, SuggestedChild};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lt", about = "Lifetrack - a dependency-aware problem tracker", version)]
struct Cli {
    /// Path to the data directory (supports LIFETRACK_DIR env var)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Disable command logging to .lifetrack/command_history.log
    #[arg(long, global = true)]
    no_cmd_logging: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a lifetrack data directory in the current directory
    Init {
        /// Item id prefix (e.g. 'health' for health-1, health-2)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Create a new item
    Create {
        /// Item title
        title: String,

        /// Description
        #[arg(short, long)]
        description: Option<String>,

        /// Parent item id (omit for a root item)
        #[arg(long)]
        parent: Option<String>,

        /// Priority
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Initial status (defaults: backlog for roots, todo for children)
        #[arg(long)]
        status: Option<Status>,

        /// Tags (can be specified multiple times)
        #[arg(short, long)]
        tag: Vec<String>,

        /// Estimated hours
        #[arg(long)]
        estimate: Option<f64>,

        /// Due date (YYYY-MM-DD or RFC3339)
        #[arg(long)]
        due: Option<String>,
    },

    /// Show item details
    Show {
        /// Item id
        item_id: String,
    },

    /// List items: roots by default, children with --parent
    List {
        /// List the children of this item
        #[arg(long)]
        parent: Option<String>,

        /// List every item in the collection
        #[arg(long)]
        all: bool,

        /// Filter by status
        #[arg(long)]
        status: Option<Status>,

        /// Maximum number of items to return
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Update an item
    Update {
        /// Item id
        item_id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description (empty string clears it)
        #[arg(long)]
        description: Option<String>,

        /// New status
        #[arg(long)]
        status: Option<Status>,

        /// New priority
        #[arg(long)]
        priority: Option<Priority>,

        /// New sibling order
        #[arg(long)]
        order: Option<i64>,

        /// Move under a new parent item
        #[arg(long, conflicts_with = "root")]
        parent: Option<String>,

        /// Move to root level
        #[arg(long)]
        root: bool,

        /// Replace tags (can be specified multiple times)
        #[arg(long)]
        tag: Option<Vec<String>>,

        /// Estimated hours
        #[arg(long)]
        estimate: Option<f64>,

        /// Actual hours
        #[arg(long)]
        actual: Option<f64>,

        /// Due date (YYYY-MM-DD or RFC3339)
        #[arg(long)]
        due: Option<String>,

        /// Strategy credited with solving this item
        #[arg(long)]
        solved_with: Option<String>,

        /// Whether the credited strategy worked
        #[arg(long)]
        strategy_success: Option<bool>,
    },

    /// Delete an item
    Delete {
        /// Item id
        item_id: String,

        /// Also delete all descendants (otherwise items with children
        /// are rejected)
        #[arg(long)]
        cascade: bool,
    },

    /// Manage blocking dependencies
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Manage AI breakdown suggestions
    Breakdown {
        #[command(subcommand)]
        command: BreakdownCommands,
    },

    /// Rank open items by urgency score
    Rank {
        /// Maximum number of items to return
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Get statistics
    Stats,

    /// List stored notifications
    Notifications {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
    },

    /// Migrate a legacy problems/tasks document to the item tree schema
    Migrate,

    /// Show quickstart guide
    Quickstart,
}

#[derive(Subcommand)]
enum DepCommands {
    /// Record that one item blocks another
    Add {
        /// The item doing the blocking
        blocker_id: String,

        /// The item being blocked
        blocked_id: String,
    },

    /// Remove a blocking edge (no-op if absent)
    Remove {
        /// The item doing the blocking
        blocker_id: String,

        /// The item being blocked
        blocked_id: String,
    },
}

#[derive(Subcommand)]
enum BreakdownCommands {
    /// Store suggested children for an item (JSON from file or stdin)
    Request {
        /// Item id
        item_id: String,

        /// Read the suggestion array from this file instead of stdin
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Approve the stored suggestions, creating one child per entry
    Approve {
        /// Item id
        item_id: String,
    },

    /// Reject and discard the stored suggestions
    Reject {
        /// Item id
        item_id: String,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        db,
        json,
        no_cmd_logging,
        command,
    } = Cli::parse();

    match command {
        Commands::Init { prefix } => {
            let dir = db.unwrap_or_else(|| PathBuf::from(".lifetrack"));
            let store = FileStore::init(dir, prefix)?;

            if !no_cmd_logging {
                let _ = log_command(store.dir(), &env::args().collect::<Vec<_>>());
            }

            if !json {
                println!(
                    "Initialized lifetrack data directory with prefix: {}",
                    store.prefix()?
                );
            }
            Ok(())
        }

        Commands::Create {
            title,
            description,
            parent,
            priority,
            status,
            tag,
            estimate,
            due,
        } => {
            let (mut repo, prefix) = open_repo(&db, no_cmd_logging)?;

            let spec = NewItem {
                title,
                description,
                parent_id: parent,
                priority,
                status,
                tags: tag,
                estimated_hours: estimate,
                due_date: due.as_deref().map(parse_due).transpose()?,
            };
            let item = repo.create(&prefix, spec)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                println!("Created item: {}", item.id);
            }
            Ok(())
        }

        Commands::Show { item_id } => {
            let (repo, _) = open_repo(&db, no_cmd_logging)?;
            let item = repo.get(&item_id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                print_item(item, &repo);
            }
            Ok(())
        }

        Commands::List {
            parent,
            all,
            status,
            limit,
        } => {
            let (repo, _) = open_repo(&db, no_cmd_logging)?;

            let mut items: Vec<&Item> = if let Some(parent_id) = &parent {
                repo.children(parent_id)?
            } else if all {
                repo.all()
            } else {
                repo.roots()
            };
            if let Some(s) = status {
                items.retain(|i| i.status == s);
            }
            items.truncate(limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in items {
                    println!(
                        "{}{}: {} [{}] (priority: {})",
                        "  ".repeat(item.depth as usize),
                        item.id,
                        item.title,
                        item.status,
                        item.priority
                    );
                }
            }
            Ok(())
        }

        Commands::Update {
            item_id,
            title,
            description,
            status,
            priority,
            order,
            parent,
            root,
            tag,
            estimate,
            actual,
            due,
            solved_with,
            strategy_success,
        } => {
            let (mut repo, _) = open_repo(&db, no_cmd_logging)?;

            if root {
                repo.reparent(&item_id, None)?;
            } else if let Some(parent_id) = &parent {
                repo.reparent(&item_id, Some(parent_id.as_str()))?;
            }

            let patch = ItemPatch {
                title,
                description,
                priority,
                order,
                tags: tag,
                estimated_hours: estimate,
                actual_hours: actual,
                due_date: due.as_deref().map(parse_due).transpose()?,
                solved_with_strategy: solved_with,
                strategy_success,
            };
            repo.update(&item_id, patch)?;

            if let Some(s) = status {
                repo.set_status(&item_id, s, &mut NoopFeedback)?;
            }

            let item = repo.get(&item_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                println!("Updated item: {}", item_id);
            }
            Ok(())
        }

        Commands::Delete { item_id, cascade } => {
            let (mut repo, _) = open_repo(&db, no_cmd_logging)?;
            let removed = repo.delete(&item_id, cascade)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&removed)?);
            } else {
                println!("Deleted {} item(s): {}", removed.len(), removed.join(", "));
            }
            Ok(())
        }

        Commands::Dep { command } => {
            let (mut repo, _) = open_repo(&db, no_cmd_logging)?;
            match command {
                DepCommands::Add {
                    blocker_id,
                    blocked_id,
                } => {
                    repo.add_edge(&blocker_id, &blocked_id)?;
                    if !json {
                        println!("Added dependency: {} blocks {}", blocker_id, blocked_id);
                    }
                }
                DepCommands::Remove {
                    blocker_id,
                    blocked_id,
                } => {
                    repo.remove_edge(&blocker_id, &blocked_id)?;
                    if !json {
                        println!("Removed dependency: {} blocks {}", blocker_id, blocked_id);
                    }
                }
            }
            Ok(())
        }

        Commands::Breakdown { command } => {
            let (mut repo, prefix) = open_repo(&db, no_cmd_logging)?;
            match command {
                BreakdownCommands::Request { item_id, from } => {
                    let suggestions = read_suggestions(from.as_deref())?;
                    let item = repo.request_breakdown(&item_id, suggestions)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&item)?);
                    } else {
                        println!(
                            "Stored {} suggestion(s) for {}",
                            item.suggested_children.len(),
                            item_id
                        );
                    }
                }
                BreakdownCommands::Approve { item_id } => {
                    let children = repo.approve_breakdown(&item_id, &prefix)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&children)?);
                    } else {
                        println!("Approved breakdown of {}:", item_id);
                        for child in children {
                            println!("  {}: {}", child.id, child.title);
                        }
                    }
                }
                BreakdownCommands::Reject { item_id } => {
                    repo.reject_breakdown(&item_id)?;
                    if !json {
                        println!("Rejected breakdown of {}", item_id);
                    }
                }
            }
            Ok(())
        }

        Commands::Rank { limit } => {
            let (repo, _) = open_repo(&db, no_cmd_logging)?;
            let mut ranked = score::rank(&repo.collection().items, Utc::now());
            ranked.truncate(limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            } else {
                for entry in ranked {
                    println!(
                        "{:>4}  {}: {} [{}] - {}",
                        entry.score, entry.id, entry.title, entry.status, entry.reason
                    );
                }
            }
            Ok(())
        }

        Commands::Stats => {
            let (repo, _) = open_repo(&db, no_cmd_logging)?;
            let stats = repo.stats();

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Total items: {}", stats.total_items);
                println!("Backlog: {}", stats.backlog_items);
                println!("Todo: {}", stats.todo_items);
                println!("In Progress: {}", stats.in_progress_items);
                println!("Done: {}", stats.done_items);
                println!("Blocked: {}", stats.blocked_items);
                println!("Ready: {}", stats.ready_items);
            }
            Ok(())
        }

        Commands::Notifications { unread } => {
            let (repo, _) = open_repo(&db, no_cmd_logging)?;
            let notifications: Vec<_> = repo
                .collection()
                .notifications
                .iter()
                .filter(|n| !unread || !n.read)
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&notifications)?);
            } else {
                for n in notifications {
                    println!("[{}] {} ({}): {}", n.kind, n.title, n.related_id, n.message);
                }
            }
            Ok(())
        }

        Commands::Migrate => {
            let dir = resolve_dir(&db)?;
            let report = lifetrack::migrate::migrate(&dir)?;

            if !no_cmd_logging {
                let _ = log_command(&dir, &env::args().collect::<Vec<_>>());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.migrated {
                println!(
                    "Migrated {} problem(s) and {} task(s) to the item tree schema",
                    report.problems, report.tasks
                );
                if let Some(backup) = report.backup {
                    println!("Backup saved to: {}", backup.display());
                }
            } else {
                println!("Nothing to migrate");
            }
            Ok(())
        }

        Commands::Quickstart => {
            print_quickstart();
            Ok(())
        }
    }
}

fn open_repo(
    db: &Option<PathBuf>,
    no_cmd_logging: bool,
) -> Result<(Repository<FileStore>, String)> {
    let dir = resolve_dir(db)?;
    let store = FileStore::open(dir).context("Failed to open storage")?;
    let prefix = store.prefix()?;

    if !no_cmd_logging {
        let _ = log_command(store.dir(), &env::args().collect::<Vec<_>>());
    }

    let repo = Repository::open(store)?;
    Ok((repo, prefix))
}

fn resolve_dir(db_arg: &Option<PathBuf>) -> Result<PathBuf> {
    if let Some(db) = db_arg {
        return Ok(db.clone());
    }
    if let Ok(dir) = env::var("LIFETRACK_DIR") {
        return Ok(PathBuf::from(dir));
    }
    find_data_dir()
}

fn find_data_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let dir = current.join(".lifetrack");
        if dir.is_dir() {
            return Ok(dir);
        }

        if !current.pop() {
            anyhow::bail!(
                "No .lifetrack directory found. Run 'lt init' to initialize a new tracker."
            );
        }
    }
}

fn read_suggestions(from: Option<&Path>) -> Result<Vec<SuggestedChild>> {
    let suggestions: Vec<SuggestedChild> = match from {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open suggestions file: {}", path.display()))?;
            serde_json::from_reader(file).context("Failed to parse suggestions JSON")?
        }
        None => serde_json::from_reader(std::io::stdin())
            .context("Failed to parse suggestions JSON from stdin")?,
    };
    Ok(suggestions)
}

/// Accept YYYY-MM-DD (midnight UTC) or a full RFC3339 timestamp
fn parse_due(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc());
    }
    anyhow::bail!("Invalid due date: '{}'. Use YYYY-MM-DD or RFC3339", s)
}

fn print_item(item: &Item, repo: &Repository<FileStore>) {
    println!("ID: {}", item.id);
    println!("Title: {}", item.title);
    println!("Status: {}", item.status);
    println!("Priority: {}", item.priority);
    println!("Depth: {}", item.depth);
    if let Some(parent) = &item.parent_id {
        println!("Parent: {}", parent);
    }
    println!("Breakdown: {}", item.breakdown_status);
    if let Some(description) = &item.description {
        println!("\nDescription:\n{}", description);
    }
    if !item.tags.is_empty() {
        println!("Tags: {}", item.tags.join(", "));
    }
    if !item.blocked_by.is_empty() {
        println!("Blocked by: {}", item.blocked_by.join(", "));
    }
    if !item.blocking.is_empty() {
        println!("Blocking: {}", item.blocking.join(", "));
    }
    if !item.suggested_children.is_empty() {
        println!("\nSuggested children:");
        for s in &item.suggested_children {
            println!("  - {} ({})", s.title, s.priority);
        }
    }
    if let Ok(children) = repo.children(&item.id) {
        if !children.is_empty() {
            println!("\nChildren:");
            for child in children {
                println!("  {}: {} [{}]", child.id, child.title, child.status);
            }
        }
    }
}

/// Log command to command_history.log
fn log_command(dir: &Path, args: &[String]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let log_path = dir.join("command_history.log");
    let timestamp = Utc::now().to_rfc3339();

    let command_line = if args.len() > 1 {
        args[1..].join(" ")
    } else {
        String::new()
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open command history log")?;

    writeln!(file, "{} {}", timestamp, command_line)
        .context("Failed to write to command history log")?;

    Ok(())
}

fn print_quickstart() {
    println!(
        r#"lt - Dependency-Aware Problem Tracker

One tree of items, from life-sized problems down to half-hour steps.

GETTING STARTED
  lt init                 Initialize lt in the current directory
                          Creates .lifetrack/ with a project-specific prefix
  lt init --prefix health Items will be named: health-1, health-2, ...

CREATING ITEMS
  lt create "Fix sleep schedule"
  lt create "Buy blackout curtains" --parent lt-1 -p high
  lt create "Read reviews" --parent lt-2 --estimate 0.5

VIEWING ITEMS
  lt list                 List root items
  lt list --parent lt-1   List the children of an item
  lt show lt-1            Show item details

DEPENDENCIES
  lt dep add lt-2 lt-3    Record that lt-2 blocks lt-3
  lt dep remove lt-2 lt-3

BREAKDOWNS
  lt breakdown request lt-1 --from suggestions.json
                          Store proposed children (produced by your AI
                          tool of choice) on the item
  lt breakdown approve lt-1
                          Create one child item per suggestion
  lt breakdown reject lt-1

WHAT TO WORK ON
  lt rank                 Open items ranked by urgency score
                          (priority, age, status, dependency pressure)

UPDATING ITEMS
  lt update lt-1 --status in_progress
  lt update lt-2 --parent lt-3
  lt delete lt-1 --cascade

MIGRATING OLD DATA
  lt migrate              Convert a legacy problems/tasks document to
                          the unified item tree (backs up the original)

DATA LOCATION
  lt discovers the data directory:
    1. --db /path/to/.lifetrack flag
    2. $LIFETRACK_DIR environment variable
    3. .lifetrack/ in the current directory or ancestors
"#
    );
}
