use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use retrace::{
    CancelToken, ChangeSetTree, HelperClient, NodeId, RestoreEvent, RestoreOrchestrator,
    RestoreTarget, SelectionModel,
};
use retrace_common::{CleanupAlgorithm, RetraceConfig, SnapshotType};

#[derive(Parser, Debug)]
#[command(
    name = "retrace",
    version,
    about = "Inspect snapshot changes and restore selected files"
)]
struct Args {
    /// Snapper-style configuration to operate on
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List snapshots
    List,

    /// Show paths that differ between a snapshot and the live system
    Changes {
        snapshot: u32,
        /// Print as an indented tree instead of raw status lines
        #[arg(long)]
        tree: bool,
    },

    /// Show a unified diff for one path
    Diff { snapshot: u32, path: String },

    /// Restore paths from a snapshot
    Restore {
        snapshot: u32,
        /// Paths to restore (directories include their contents)
        #[arg(required_unless_present = "all")]
        paths: Vec<String>,
        /// Restore every changed path
        #[arg(long)]
        all: bool,
        /// Paths to leave untouched even if a parent is selected
        #[arg(long)]
        exclude: Vec<String>,
        /// Print the restore list without restoring anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Create a snapshot
    Create {
        #[arg(long = "type", default_value = "single", value_parser = parse_snapshot_type)]
        snapshot_type: SnapshotType,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Matching pre snapshot (post snapshots only)
        #[arg(long, default_value_t = 0)]
        pre_number: u32,
        #[arg(long, default_value = "", value_parser = parse_cleanup)]
        cleanup: CleanupAlgorithm,
        #[arg(long)]
        important: bool,
    },

    /// Delete a snapshot
    Delete { number: u32 },

    /// Make a snapshot the default subvolume for the next boot
    Rollback { number: u32 },
}

fn parse_snapshot_type(s: &str) -> Result<SnapshotType, String> {
    s.parse()
}

fn parse_cleanup(s: &str) -> Result<CleanupAlgorithm, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let mut settings = RetraceConfig::new();
    if let Some(path) = RetraceConfig::user_config_path().filter(|p| p.exists()) {
        if let Err(e) = settings.merge_file(&path) {
            log::warn!("Ignoring {}: {:#}", path.display(), e);
        }
    }
    let config = args
        .config
        .clone()
        .unwrap_or_else(|| settings.default_config_name.clone());

    let client = HelperClient::new().await?;

    match args.command {
        Command::List => list(&client).await,
        Command::Changes { snapshot, tree } => changes(&client, &config, snapshot, tree).await,
        Command::Diff { snapshot, path } => {
            let diff = client.get_file_diff(&config, snapshot, &path).await?;
            if diff.is_empty() {
                eprintln!("No differences for {path}");
            } else {
                print!("{diff}");
            }
            Ok(())
        }
        Command::Restore {
            snapshot,
            paths,
            all,
            exclude,
            dry_run,
        } => {
            let selection = Selection {
                paths,
                all,
                exclude,
            };
            restore(client, &config, snapshot, selection, dry_run).await
        }
        Command::Create {
            snapshot_type,
            description,
            pre_number,
            cleanup,
            important,
        } => {
            let info = client
                .create_snapshot(snapshot_type, &description, pre_number, cleanup, important)
                .await?;
            println!("Created snapshot {}", info.number);
            Ok(())
        }
        Command::Delete { number } => {
            client.delete_snapshot(number).await?;
            println!("Deleted snapshot {number}");
            Ok(())
        }
        Command::Rollback { number } => {
            client.rollback_snapshot(number).await?;
            println!("Snapshot {number} will be used on next boot");
            Ok(())
        }
    }
}

async fn list(client: &HelperClient) -> Result<()> {
    let snapshots = client.list_snapshots().await?;
    println!(
        "{:>6} | {:<6} | {:>5} | {:<20} | {:<8} | {}",
        "#", "type", "pre", "date", "cleanup", "description"
    );
    for snapshot in snapshots {
        let marker = if snapshot.is_important() { " *" } else { "" };
        println!(
            "{:>6} | {:<6} | {:>5} | {:<20} | {:<8} | {}{}",
            snapshot.number,
            snapshot.snapshot_type,
            snapshot.pre_number,
            snapshot.date.format("%Y-%m-%d %H:%M:%S"),
            snapshot.cleanup.as_str(),
            snapshot.description,
            marker
        );
    }
    Ok(())
}

async fn changes(client: &HelperClient, config: &str, snapshot: u32, as_tree: bool) -> Result<()> {
    let output = client.get_file_changes(config, snapshot).await?;
    if !as_tree {
        print!("{output}");
        return Ok(());
    }

    let tree = ChangeSetTree::from_output(&output)?;
    print_subtree(&tree, tree.root(), 0);
    Ok(())
}

fn print_subtree(tree: &ChangeSetTree, id: NodeId, depth: usize) {
    for &child in tree.children(id) {
        let Some(node) = tree.node(child) else {
            continue;
        };
        let suffix = if tree.is_directory(child) { "/" } else { "" };
        println!(
            "{}{} {}{}",
            "  ".repeat(depth),
            node.status.to_status_string(),
            tree.name(child),
            suffix
        );
        print_subtree(tree, child, depth + 1);
    }
}

struct Selection {
    paths: Vec<String>,
    all: bool,
    exclude: Vec<String>,
}

async fn restore(
    client: HelperClient,
    config: &str,
    snapshot: u32,
    selection: Selection,
    dry_run: bool,
) -> Result<()> {
    let output = client.get_file_changes(config, snapshot).await?;
    let mut tree = ChangeSetTree::from_output(&output)?;
    let mut model = SelectionModel::new(&mut tree);

    if selection.all {
        model.check_all();
    }
    for path in &selection.paths {
        if !model.set_checked(path, true) {
            anyhow::bail!("{path} has no changes in snapshot {snapshot}");
        }
    }
    for path in &selection.exclude {
        if !model.set_checked(path, false) {
            log::warn!("Excluded path {path} has no changes");
        }
    }

    let items = model.checked_items();
    if dry_run {
        for item in &items {
            println!("{item}");
        }
        return Ok(());
    }

    let cancel = CancelToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current batch...");
            ctrl_c_token.cancel();
        }
    });

    let (tx, rx) = async_channel::unbounded();
    let printer = tokio::spawn(async move {
        let mut completed = false;
        while let Ok(event) = rx.recv().await {
            match event {
                RestoreEvent::Progress {
                    current,
                    total,
                    label,
                } => eprintln!("[{current}/{total}] {label}"),
                RestoreEvent::Error(message) => eprintln!("Error: {message}"),
                RestoreEvent::Completed(ok) => completed = ok,
            }
        }
        completed
    });

    let orchestrator = RestoreOrchestrator::new(client);
    let target = RestoreTarget::new(config, snapshot);
    let summary = orchestrator.run(&target, items, &tx, &cancel).await;
    drop(tx);

    let completed = printer.await.context("Progress printer failed")?;
    if !completed {
        if summary.batches_sent == 0 && !summary.cancelled {
            anyhow::bail!("Restore did not start");
        }
        if summary.cancelled {
            anyhow::bail!(
                "Restore cancelled after {} of {} paths",
                summary.processed,
                summary.total
            );
        }
        anyhow::bail!(
            "Restore finished with errors ({} of {} batches failed)",
            summary.failed_batches,
            summary.batches_sent
        );
    }

    println!("Restored {} paths from snapshot {}", summary.total, snapshot);
    Ok(())
}
