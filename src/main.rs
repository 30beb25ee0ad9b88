//! # Nexus CLI
//!
//! Drives the outreach automation core from the command line.
//!
//! Usage:
//!   nexus init                                   # Write a default config file
//!   nexus rules                                  # List the trigger rules
//!   nexus process event.json                     # Run an event through the rules
//!   nexus schedule activities.json               # Assign send slots
//!   nexus significance --control-sent 100 ...    # Two-proportion z-test
//!   nexus experiment list                        # Stored A/B experiments

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use clap::{Parser, Subcommand};
use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use nexus_core::NexusConfig;
use nexus_core::traits::KeyValueStore;
use nexus_core::types::{Event, Prospect};
use nexus_memory::ProspectMemoryStore;
use nexus_workflow::experiments::{Experiment, ExperimentBook, VariantId, VariantStats};
use nexus_workflow::pacing::{ScheduledActivity, SchedulingConstraints, SendScheduler};
use nexus_workflow::rules::{RuleDefinition, default_definitions, load_rules};
use nexus_workflow::{ActionExecutor, TriggerProcessor, analyze_timing, significance};

#[derive(Parser)]
#[command(name = "nexus", version, about = "📬 Nexus: outreach automation core")]
struct Cli {
    /// Config file (default: ~/.nexus/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file (to --config or ~/.nexus/config.toml)
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print trigger rules as JSON
    Rules {
        /// Rule definitions file (defaults to the built-in rules)
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Run one event through the trigger rules
    Process {
        /// Event JSON file
        event: PathBuf,
        /// Rule definitions file (defaults to the built-in rules)
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Analyze a live market signal for a prospect and adapt their sequence
    Signal {
        /// Prospect JSON file
        prospect: PathBuf,
        /// Signal type, e.g. "Funding Round"
        #[arg(long)]
        signal_type: String,
        #[arg(long)]
        description: String,
    },

    /// Recommend whether to contact a prospect right now
    Timing {
        /// Prospect JSON file
        prospect: PathBuf,
    },

    /// Assign hourly send slots to a batch of activities
    Schedule {
        /// Activities JSON file (array)
        activities: PathBuf,
        /// Scheduling constraints JSON file
        #[arg(long)]
        constraints: Option<PathBuf>,
    },

    /// Significance of the reply-rate difference between two variants
    Significance {
        #[arg(long)]
        control_sent: u32,
        #[arg(long)]
        control_replied: u32,
        #[arg(long)]
        variation_sent: u32,
        #[arg(long)]
        variation_replied: u32,
    },

    /// Manage stored A/B experiments
    Experiment {
        #[command(subcommand)]
        command: ExperimentCommand,
    },
}

#[derive(Subcommand)]
enum ExperimentCommand {
    /// List experiments
    List {
        /// Only running experiments
        #[arg(long)]
        active: bool,
    },
    /// Create (or replace) an experiment
    Create {
        id: String,
        #[arg(long, default_value = "Control")]
        name_a: String,
        #[arg(long, default_value = "Variation")]
        name_b: String,
        /// Percent of traffic sent to variant A
        #[arg(long, default_value = "50")]
        allocation: u8,
    },
    /// Pick a variant for the next send
    Assign { id: String },
    /// Count a send for a variant
    TrackSend { id: String, variant: VariantId },
    /// Count a reply for a variant
    TrackReply { id: String, variant: VariantId },
    /// Declare a winner once significance reaches 95
    Conclude { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "nexus=debug,nexus_workflow=debug,nexus_memory=debug,nexus_providers=debug"
    } else {
        "nexus=info,nexus_workflow=info,nexus_memory=warn,nexus_providers=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { force } = cli.command {
        let path = cli.config.unwrap_or_else(NexusConfig::default_path);
        anyhow::ensure!(
            force || !path.exists(),
            "{} already exists (use --force to overwrite)",
            path.display()
        );
        NexusConfig::default().save_to(&path)?;
        tracing::info!("📝 Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => NexusConfig::load_from(path)?,
        None => NexusConfig::load()?,
    };

    match cli.command {
        Commands::Init { .. } => {}

        Commands::Rules { rules } => {
            let definitions: Vec<RuleDefinition> = match rules {
                Some(path) => load_rules(&path)?
                    .into_iter()
                    .map(|r| r.definition)
                    .collect(),
                None => default_definitions(),
            };
            print_json(&definitions)?;
        }

        Commands::Process { event, rules } => {
            let event: Event = read_json(&event)?;
            let store = nexus_memory::open_store(&config.storage)?;
            let mut processor = build_processor(&config, store);
            if let Some(path) = rules {
                processor = processor.with_rules(load_rules(&path)?);
            }
            let result = processor.process(&event).await;
            tracing::info!(
                "⚡ {} action(s) in {}ms",
                result.actions_executed.len(),
                result.processing_time_ms
            );
            print_json(&result)?;
        }

        Commands::Signal {
            prospect,
            signal_type,
            description,
        } => {
            let prospect: Prospect = read_json(&prospect)?;
            let store = nexus_memory::open_store(&config.storage)?;
            let processor = build_processor(&config, store);
            let analysis = processor
                .record_signal(&prospect, &signal_type, &description)
                .await;
            print_json(&analysis)?;
        }

        Commands::Timing { prospect } => {
            let prospect: Prospect = read_json(&prospect)?;
            let store = nexus_memory::open_store(&config.storage)?;
            let memory = ProspectMemoryStore::new(store).get(&prospect.id).await;
            let now = Utc::now().with_timezone(&local_offset(&config));
            print_json(&analyze_timing(now, &prospect, memory.as_ref()))?;
        }

        Commands::Schedule {
            activities,
            constraints,
        } => {
            let activities: Vec<ScheduledActivity> = read_json(&activities)?;
            let constraints: SchedulingConstraints = match constraints {
                Some(path) => read_json(&path)?,
                None => SchedulingConstraints::default(),
            };
            let scheduler = SendScheduler::with_offset_minutes(config.scheduling.utc_offset_minutes);
            let schedule = scheduler.schedule(activities, &constraints, Utc::now());
            tracing::info!("📅 Scheduled {} activities", schedule.total_scheduled);
            print_json(&schedule)?;
        }

        Commands::Significance {
            control_sent,
            control_replied,
            variation_sent,
            variation_replied,
        } => {
            let control = VariantStats {
                sent: control_sent,
                replied: control_replied,
            };
            let variation = VariantStats {
                sent: variation_sent,
                replied: variation_replied,
            };
            println!("{}", significance(&control, &variation));
        }

        Commands::Experiment { command } => {
            let store = nexus_memory::open_store(&config.storage)?;
            run_experiment(ExperimentBook::new(store), command).await?;
        }
    }

    Ok(())
}

async fn run_experiment(book: ExperimentBook, command: ExperimentCommand) -> Result<()> {
    match command {
        ExperimentCommand::List { active } => {
            let experiments = if active {
                book.active().await
            } else {
                book.experiments().await
            };
            print_json(&experiments)?;
        }
        ExperimentCommand::Create {
            id,
            name_a,
            name_b,
            allocation,
        } => {
            anyhow::ensure!(allocation <= 100, "allocation must be 0..=100, got {allocation}");
            let mut experiment = Experiment::new(id.clone(), &name_a, &name_b, allocation);
            experiment.name = id;
            book.create(experiment).await;
        }
        ExperimentCommand::Assign { id } => {
            let roll = rand::thread_rng().gen_range(0.0..100.0);
            let variant = book
                .assign_variant(&id, roll)
                .await
                .with_context(|| format!("experiment '{id}' not found"))?;
            print_json(&variant)?;
        }
        ExperimentCommand::TrackSend { id, variant } => book.track_send(&id, variant).await,
        ExperimentCommand::TrackReply { id, variant } => book.track_reply(&id, variant).await,
        ExperimentCommand::Conclude { id } => match book.conclude(&id).await {
            Some(winner) => println!("🏆 Winner: {winner}"),
            None => println!("⏳ Not significant yet"),
        },
    }
    Ok(())
}

fn build_processor(config: &NexusConfig, store: Arc<dyn KeyValueStore>) -> TriggerProcessor {
    let memory = Arc::new(ProspectMemoryStore::new(store));
    let connector = match nexus_providers::create_connector(&config.connector) {
        Ok(connector) => connector,
        Err(e) => {
            tracing::warn!("⚠️ Sequence connector unavailable ({}), simulating", e);
            Arc::new(nexus_providers::sequence::SimulatedSequenceConnector)
        }
    };

    let mut executor = ActionExecutor::new(memory, connector)
        .with_timeout(config.workflow.action_timeout())
        .with_company_name(config.workflow.company_name.clone());
    match nexus_providers::create_generator(config) {
        Ok(generator) => executor = executor.with_generator(Arc::from(generator)),
        Err(e) => tracing::warn!("⚠️ No generator ({}), drafting actions will fail", e),
    }

    TriggerProcessor::new(executor).with_log_store(
        nexus_workflow::AutomationLogStore::new(config.workflow.log_capacity),
    )
}

fn local_offset(config: &NexusConfig) -> FixedOffset {
    FixedOffset::east_opt(config.scheduling.utc_offset_minutes * 60).unwrap_or(Utc.fix())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
