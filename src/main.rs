use acoustic_planner::catalog::{
    CatalogFilter, CatalogPatch, CatalogRecord, CatalogStore, SortDirection, TableKind,
};
use acoustic_planner::config::Config;
use acoustic_planner::design::{DesignSession, ReportScope};
use acoustic_planner::history::HistoryStore;
use acoustic_planner::params::{AcousticParams, Scenario};
use acoustic_planner::reconcile::{reconcile, ReconciliationResult, Solution};
use acoustic_planner::service::ChatflowClient;
use acoustic_planner::util::{one_line, truncate_str};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "acoustic",
    about = "Acoustic design assistant: room parameters in, equipment plans out",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a saved service answer into structured solutions (JSON on stdout)
    Reconcile {
        /// Answer file, or "-" for stdin
        #[arg(default_value = "-")]
        input: String,
    },
    /// Generate a design from a parameters file
    Design {
        /// TOML file with room parameters
        #[arg(short, long)]
        params: PathBuf,
        /// meeting_room or lecture_hall
        #[arg(short, long, default_value = "meeting_room")]
        scenario: Scenario,
        /// Project name used when archiving
        #[arg(short, long)]
        name: Option<String>,
        /// Also request Word/Excel documents for every solution
        #[arg(long)]
        documents: bool,
        /// Archive the result in the design history
        #[arg(long)]
        save: bool,
    },
    /// Browse archived designs
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage the equipment catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Store the service API key in the system keychain
    Setup,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List,
    Show { id: Uuid },
    Delete { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum CatalogAction {
    List {
        #[arg(short, long)]
        table: Option<TableKind>,
        /// Case-insensitive brand substring
        #[arg(short, long)]
        brand: Option<String>,
        /// Intended use (speaker table only)
        #[arg(long)]
        purpose: Option<String>,
        /// Sort by a numeric spec, e.g. "power" or "-price" for descending
        #[arg(long, allow_hyphen_values = true)]
        sort: Option<String>,
    },
    /// Add a record from a JSON object
    Add { json: String },
    /// Merge a JSON object into an existing record
    Update { id: u64, json: String },
    Remove { id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let config = Config::load();

    match args.command {
        Command::Reconcile { input } => run_reconcile(&input),
        Command::Design {
            params,
            scenario,
            name,
            documents,
            save,
        } => run_design(&config, params, scenario, name, documents, save).await,
        Command::History { action } => run_history(&config, action),
        Command::Catalog { action } => run_catalog(&config, action),
        Command::Setup => run_setup(),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("ACOUSTIC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run_reconcile(input: &str) -> Result<()> {
    let raw = if input == "-" {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw)?;
        raw
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };
    let result = reconcile(&raw);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_design(
    config: &Config,
    params_path: PathBuf,
    scenario: Scenario,
    name: Option<String>,
    documents: bool,
    save: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(&params_path)
        .with_context(|| format!("Failed to read {}", params_path.display()))?;
    let params: AcousticParams = toml::from_str(&content)
        .with_context(|| format!("Invalid parameters in {}", params_path.display()))?;

    let mut session = DesignSession::new(scenario, params);
    if let Some(name) = name {
        session.rename_project(&name)?;
    }
    let client = ChatflowClient::from_config(config)?;

    let request = session.begin_generation()?;
    eprintln!(
        "⏳ Generating {} design, this can take several minutes...",
        scenario.label()
    );
    let outcome = client.generate_design(&request).await;
    session.complete_generation(outcome.request_id, outcome.result)?;

    if documents && !session.solutions().is_empty() {
        let targets = session.document_targets(ReportScope::All);
        match client.generate_documents(&targets).await {
            Ok(answer) => {
                let attached = session.apply_document_links(&answer);
                tracing::info!(attached, "document links attached");
            }
            Err(err) => tracing::warn!(error = %err, "document generation failed"),
        }
    }

    match session.result() {
        Some(result) => print_result_summary(result, session.solutions()),
        None => eprintln!("No result received."),
    }

    if save {
        if let Some(entry) = session.to_history_entry() {
            let history = HistoryStore::open(&config.data_dir());
            let id = entry.id;
            history.save(entry)?;
            println!("\nSaved as {} ({})", session.project_name(), id);
        }
    }
    Ok(())
}

fn print_result_summary(result: &ReconciliationResult, solutions: &[Solution]) {
    if solutions.is_empty() {
        println!("{}", result.narration());
        return;
    }
    for solution in solutions {
        println!();
        println!("■ {}  ({} units)", solution.title, solution.unit_count());
        for item in &solution.items {
            println!(
                "  {:<8} {:<20} {:<16} x{}",
                truncate_str(&item.category, 8),
                truncate_str(&item.name, 20),
                truncate_str(&item.model, 16),
                item.quantity
            );
        }
        if let Some(link) = &solution.document_link {
            println!("  Word:  {}", link);
        }
        if let Some(link) = &solution.spreadsheet_link {
            println!("  Excel: {}", link);
        }
    }
}

fn run_history(config: &Config, action: HistoryAction) -> Result<()> {
    let history = HistoryStore::open(&config.data_dir());
    match action {
        HistoryAction::List => {
            let entries = history.list()?;
            if entries.is_empty() {
                println!("No saved designs.");
            }
            for entry in entries {
                println!(
                    "{}  {}  {:<24} {:?}  {} solutions",
                    entry.id,
                    entry.saved_at.format("%Y-%m-%d %H:%M"),
                    truncate_str(&entry.name, 24),
                    entry.status,
                    entry.solutions.len()
                );
            }
        }
        HistoryAction::Show { id } => {
            let entry = history.get(id)?;
            println!("{} ({})", entry.name, entry.scenario.label());
            println!("Saved: {}", entry.saved_at.format("%Y-%m-%d %H:%M"));
            println!("Answer: {}", truncate_str(&one_line(entry.result.narration()), 120));
            print_result_summary(&entry.result, &entry.solutions);
        }
        HistoryAction::Delete { id } => {
            let removed = history.delete(id)?;
            println!("Deleted {}", removed.name);
        }
    }
    Ok(())
}

fn run_catalog(config: &Config, action: CatalogAction) -> Result<()> {
    let catalog = CatalogStore::open(&config.data_dir());
    match action {
        CatalogAction::List {
            table,
            brand,
            purpose,
            sort,
        } => {
            let plain_listing = brand.is_none() && purpose.is_none() && sort.is_none();
            match table {
                Some(table) if plain_listing => {
                    for row in catalog.bundled(table)? {
                        let indent = if row.is_child { "  └ " } else { "" };
                        print_record(indent, &row.record);
                    }
                }
                _ => {
                    let sort = sort.map(|key| match key.strip_prefix('-') {
                        Some(key) => (key.to_string(), SortDirection::Desc),
                        None => (key, SortDirection::Asc),
                    });
                    let filter = CatalogFilter {
                        table,
                        brand,
                        purpose,
                        sort,
                    };
                    for record in catalog.search(&filter)? {
                        print_record("", &record);
                    }
                }
            }
        }
        CatalogAction::Add { json } => {
            let record: CatalogRecord =
                serde_json::from_str(&json).context("Record must be a JSON object")?;
            let created = catalog.create(record)?;
            println!("Added #{} {} {}", created.id, created.brand, created.model);
        }
        CatalogAction::Update { id, json } => {
            let patch: CatalogPatch =
                serde_json::from_str(&json).context("Patch must be a JSON object")?;
            let updated = catalog.update(id, patch)?;
            println!("Updated #{} {} {}", updated.id, updated.brand, updated.model);
        }
        CatalogAction::Remove { id } => {
            let removed = catalog.delete(id)?;
            println!("Removed #{} {} {}", removed.id, removed.brand, removed.model);
        }
    }
    Ok(())
}

fn print_record(prefix: &str, record: &CatalogRecord) {
    println!(
        "{}#{:<4} [{}] {} {} {}",
        prefix,
        record.id,
        record.table.label(),
        record.brand,
        record.model,
        record.category
    );
}

fn run_setup() -> Result<()> {
    println!();
    println!("  Setting up the design service key");
    println!("  ─────────────────────────────────────────────────────────────────");
    println!("  Config location: {}", Config::config_location());
    println!();
    print!("  API Key (starts with app-): ");
    io::stdout().flush()?;

    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim();
    if key.is_empty() {
        println!("  No key entered. Run 'acoustic setup' again when you have one.");
        return Ok(());
    }
    if !key.starts_with("app-") {
        println!("  Warning: key doesn't look like a chat-flow app key (should start with app-)");
    }

    acoustic_planner::keyring::set_api_key(key).map_err(|e| anyhow::anyhow!(e))?;
    println!("  ✓ API key saved to the system keychain");
    Ok(())
}
