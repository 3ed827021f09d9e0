//! Contexta CLI — the main entry point.
//!
//! Commands:
//! - `onboard`   — Write a default config and create the memory directory
//! - `status`    — Show the effective configuration
//! - `domains`   — List known domains
//! - `route`     — Rank domains for a piece of free text
//! - `compress`  — Compress a profile + facts JSON file
//! - `entity`    — Manage entity memory
//! - `assemble`  — Assemble a budgeted context

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "contexta",
    about = "Contexta — token-budgeted context for application-writing assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the memory directory
    Onboard,

    /// Show the effective configuration
    Status,

    /// List known domains
    Domains,

    /// Rank domains by keyword match for free text
    Route {
        /// Text to route
        text: String,
    },

    /// Compress a JSON file holding `{ "profile": {...}, "facts": [...] }`
    Compress(CompressArgs),

    /// Manage entity memory
    Entity {
        #[command(subcommand)]
        command: EntityCommands,
    },

    /// Assemble a token-budgeted context
    Assemble(AssembleArgs),
}

#[derive(Args)]
pub struct CompressArgs {
    /// Input JSON file
    pub file: std::path::PathBuf,

    /// Override compression.max_facts
    #[arg(long)]
    pub max_facts: Option<usize>,

    /// Override compression.min_confidence
    #[arg(long)]
    pub min_confidence: Option<f32>,

    /// Override compression.dedup_threshold
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Trim the result to this many tokens
    #[arg(short, long)]
    pub budget: Option<usize>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum EntityCommands {
    /// Create (or replace) an entity
    Create(EntityCreateArgs),

    /// Show an entity's profile, facts and compressed context
    Show {
        id: String,
        /// Print the stored block as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a fact to an entity
    AddFact {
        id: String,
        /// Fact type, e.g. `rejection_pattern` or `constraint`
        #[arg(short = 't', long = "type")]
        fact_type: String,
        #[arg(short, long)]
        content: String,
        #[arg(long, default_value_t = 0.8)]
        confidence: f32,
        /// Expiry as an RFC 3339 timestamp
        #[arg(long)]
        expires: Option<String>,
    },

    /// Remove one fact by id
    RemoveFact { id: String, fact_id: String },

    /// Feed a workflow event, e.g. `{"kind":"failure_pattern","pattern":"..."}`
    Learn {
        id: String,
        /// Event JSON
        event: String,
    },

    /// Drop facts whose expiry has passed
    Cleanup { id: String },

    /// Delete an entity
    Delete { id: String },
}

#[derive(Args)]
pub struct EntityCreateArgs {
    pub id: String,

    /// Display name (defaults to the id)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Seed facts from this domain
    #[arg(short, long)]
    pub domain: Option<String>,

    #[arg(long)]
    pub industry: Option<String>,

    #[arg(long)]
    pub years: Option<u32>,

    #[arg(long)]
    pub employees: Option<u32>,

    #[arg(long)]
    pub revenue: Option<u64>,

    #[arg(long)]
    pub region: Option<String>,

    /// Certification or qualification (repeatable)
    #[arg(short, long = "qualification")]
    pub qualifications: Vec<String>,

    /// Read the profile from a JSON file instead of flags
    #[arg(long, conflicts_with_all = ["name", "industry", "years", "employees", "revenue", "region", "qualifications"])]
    pub profile: Option<std::path::PathBuf>,
}

#[derive(Args)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["domain", "text"])))]
pub struct AssembleArgs {
    /// Domain id
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Free text to route to a domain
    #[arg(short, long)]
    pub text: Option<String>,

    /// Entity whose memory to include
    #[arg(short, long)]
    pub entity: Option<String>,

    /// Total token budget (defaults to the domain's)
    #[arg(short, long)]
    pub budget: Option<usize>,

    /// User message for an ad-hoc session (repeatable, oldest first)
    #[arg(short, long = "message")]
    pub messages: Vec<String>,

    /// Session intent
    #[arg(short, long)]
    pub intent: Option<String>,

    /// Title of the document being worked on
    #[arg(long)]
    pub document: Option<String>,

    /// Wrap the result in the instruction template
    #[arg(long)]
    pub prompt: bool,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Status => commands::status::run().await?,
        Commands::Domains => commands::domains::list().await?,
        Commands::Route { text } => commands::domains::route(&text).await?,
        Commands::Compress(args) => commands::compress::run(args).await?,
        Commands::Entity { command } => match command {
            EntityCommands::Create(args) => commands::entity::create(args).await?,
            EntityCommands::Show { id, json } => commands::entity::show(&id, json).await?,
            EntityCommands::AddFact {
                id,
                fact_type,
                content,
                confidence,
                expires,
            } => {
                commands::entity::add_fact(&id, &fact_type, content, confidence, expires.as_deref())
                    .await?
            }
            EntityCommands::RemoveFact { id, fact_id } => {
                commands::entity::remove_fact(&id, &fact_id).await?
            }
            EntityCommands::Learn { id, event } => commands::entity::learn(&id, &event).await?,
            EntityCommands::Cleanup { id } => commands::entity::cleanup(&id).await?,
            EntityCommands::Delete { id } => commands::entity::delete(&id).await?,
        },
        Commands::Assemble(args) => commands::assemble::run(args).await?,
    }

    Ok(())
}
