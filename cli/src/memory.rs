use clap::Parser;
use memory_bank::ItemType;
use memory_bank::KnowledgeStore;
use memory_bank::LinkType;
use memory_bank::NewItem;
use memory_bank::config::StoreConfig;
use memory_bank::factory;
use serde::Serialize;
use std::path::PathBuf;

/// JSON bridge over the project knowledge base. Every command prints one JSON
/// document on stdout (`export` prints JSON lines).
#[derive(Debug, Parser)]
#[command(name = "memory-bank", version, about)]
pub struct MemoryCli {
    /// Project root (detected from the working directory if omitted)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: MemoryCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum MemoryCommand {
    /// Record a knowledge item.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// error, solution, decision, memo, code, concept, pattern, report, archived_error
        #[arg(long = "type")]
        item_type: ItemType,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        source_file: Option<String>,
        /// Store a new row even if identical content exists
        #[arg(long)]
        allow_duplicates: bool,
    },
    /// Add a JSON array of items read from stdin; failures are reported per item.
    Batch {
        #[arg(long)]
        allow_duplicates: bool,
    },
    /// Full-text search; `*` or an empty query lists the newest items.
    Search {
        #[arg(default_value = "*")]
        query: String,
        #[arg(long = "type")]
        item_type: Option<ItemType>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Add a directed link between two items.
    Link {
        from_id: i64,
        to_id: i64,
        /// solves, causes, related, implements, references
        link_type: LinkType,
    },
    /// Show the targets of an item's outgoing links.
    Linked { id: i64 },
    /// Show one item.
    Get { id: i64 },
    /// Show item counts.
    Stats,
    /// Write all items to stdout as JSON lines.
    Export,
    /// Read JSON lines from stdin.
    Import {
        #[arg(long)]
        allow_duplicates: bool,
    },
}

#[derive(Debug, Serialize)]
struct BatchFailure {
    index: usize,
    error: String,
}

#[derive(Debug, Serialize)]
struct BatchReport {
    ids: Vec<i64>,
    failed: Vec<BatchFailure>,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Execute a command against the project store.
pub fn run(cli: MemoryCli) -> anyhow::Result<()> {
    let project_root = match cli.project {
        Some(root) => root,
        None => {
            let cwd = std::env::current_dir()?;
            factory::detect_project_root(&cwd).unwrap_or(cwd)
        }
    };
    let config = StoreConfig::load(&project_root)?;
    let store = factory::open_project_store(&project_root, &config)?;
    let outcome = execute(store.as_ref(), &config, cli.cmd);
    finish(outcome, store.close())
}

/// The command's own error wins over a failure to close the store.
fn finish(
    outcome: anyhow::Result<()>,
    closed: memory_bank::error::Result<()>,
) -> anyhow::Result<()> {
    match closed {
        Ok(()) => outcome,
        Err(err) if outcome.is_err() => {
            tracing::warn!("knowledge: close after failed command: {err}");
            outcome
        }
        Err(err) => Err(err.into()),
    }
}

fn execute(
    store: &dyn KnowledgeStore,
    config: &StoreConfig,
    cmd: MemoryCommand,
) -> anyhow::Result<()> {
    let skip = |allow_duplicates: bool| config.skip_duplicates && !allow_duplicates;
    match cmd {
        MemoryCommand::Add {
            title,
            content,
            item_type,
            tags,
            source_file,
            allow_duplicates,
        } => {
            let mut item = NewItem::new(title, content, item_type).with_tags(tags);
            item.source_file = source_file;
            let id = store.add(item, skip(allow_duplicates))?;
            print_json(&serde_json::json!({ "id": id }))?;
        }
        MemoryCommand::Batch { allow_duplicates } => {
            let raw: Vec<serde_json::Value> = serde_json::from_reader(std::io::stdin())?;
            let mut failed = Vec::new();
            let mut indices = Vec::new();
            let mut items = Vec::new();
            for (index, value) in raw.into_iter().enumerate() {
                match serde_json::from_value::<NewItem>(value) {
                    Ok(item) => {
                        indices.push(index);
                        items.push(item);
                    }
                    Err(err) => {
                        tracing::warn!(index, "knowledge: batch item rejected: {err}");
                        failed.push(BatchFailure {
                            index,
                            error: err.to_string(),
                        });
                    }
                }
            }
            let mut ids = Vec::new();
            let outcomes = store.add_batch(items, skip(allow_duplicates));
            for (index, outcome) in indices.into_iter().zip(outcomes) {
                match outcome {
                    Ok(id) => ids.push(id),
                    Err(err) => failed.push(BatchFailure {
                        index,
                        error: err.to_string(),
                    }),
                }
            }
            failed.sort_by_key(|f| f.index);
            print_json(&BatchReport { ids, failed })?;
        }
        MemoryCommand::Search {
            query,
            item_type,
            limit,
        } => {
            let hits = store.search(&query, item_type, limit.unwrap_or(config.search_limit))?;
            print_json(&hits)?;
        }
        MemoryCommand::Link {
            from_id,
            to_id,
            link_type,
        } => {
            store.link(from_id, to_id, link_type)?;
            print_json(&serde_json::json!({ "ok": true }))?;
        }
        MemoryCommand::Linked { id } => {
            print_json(&store.get_linked(id)?)?;
        }
        MemoryCommand::Get { id } => {
            print_json(&store.get(id)?)?;
        }
        MemoryCommand::Stats => {
            print_json(&store.get_stats()?)?;
        }
        MemoryCommand::Export => {
            let mut out = std::io::stdout();
            let n = store.export(&mut out)?;
            tracing::debug!("knowledge: exported {n} items");
        }
        MemoryCommand::Import { allow_duplicates } => {
            let mut input = std::io::stdin();
            let n = store.import(&mut input, skip(allow_duplicates))?;
            print_json(&serde_json::json!({ "imported": n }))?;
        }
    }
    Ok(())
}
