//! guardctl: inspect the regions stored for a world.
//!
//! Reads the JSON store named by the configuration and answers the same
//! questions the engine answers at runtime: which regions cover a point and
//! what a flag resolves to there.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use region_guard::{
    advisory, default_config_toml, lookup_flag, GuardConfig, JsonStore, QueryMode,
    RegionContainer,
};
use region_types::{BlockPos, FlagRegistry, Subject};
use tracing::info;
use uuid::Uuid;

/// Command line arguments for guardctl
#[derive(Parser, Debug)]
#[command(name = "guardctl")]
#[command(about = "Inspect protected regions and flag decisions")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Store directory, overriding the configuration
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default configuration
    InitConfig,

    /// List the regions of a world
    List {
        #[arg(long, default_value = "world")]
        world: String,
    },

    /// Show the regions covering a point and resolve a flag there
    Query {
        #[arg(long, default_value = "world")]
        world: String,
        #[arg(long, allow_hyphen_values = true)]
        x: i32,
        #[arg(long, allow_hyphen_values = true)]
        y: i32,
        #[arg(long, allow_hyphen_values = true)]
        z: i32,
        /// Flag to resolve
        #[arg(long)]
        flag: Option<String>,
        /// Player name to resolve for; omitted means a non-member
        #[arg(long)]
        player: Option<String>,
        /// Groups of the player
        #[arg(long)]
        group: Vec<String>,
    },

    /// Report advisories for every region of a world
    Check {
        #[arg(long, default_value = "world")]
        world: String,
    },
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("region_guard=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() {
    let args = Args::parse();
    setup_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => GuardConfig::from_file(path)?,
        None => GuardConfig::default(),
    };
    if let Some(dir) = args.dir {
        config.storage.directory = dir;
    }

    let store = Arc::new(JsonStore::from_config(&config.storage));
    info!("Using region store at {}", store.directory().display());
    let container = RegionContainer::new(store, config);

    match args.command {
        Command::InitConfig => {
            print!("{}", default_config_toml());
        }

        Command::List { world } => {
            let index = container.load_world(&world)?;
            println!("World '{}': {} region(s)", world, index.size());
            for region in index.regions() {
                let parent = region
                    .parent
                    .as_deref()
                    .map(|p| format!(" (parent: {})", p))
                    .unwrap_or_default();
                println!(
                    "  {:<24} {:<8} priority {:>11}{}",
                    region.id,
                    region.geometry.kind(),
                    region.priority,
                    parent
                );
            }
        }

        Command::Query {
            world,
            x,
            y,
            z,
            flag,
            player,
            group,
        } => {
            container.load_world(&world)?;
            let pos = BlockPos::new(x, y, z);
            let set = container.query_at(&world, pos, QueryMode::Sorted)?;

            println!("Regions at {} in '{}':", pos, world);
            if set.is_empty() {
                println!("  (none)");
            }
            for region in &set {
                println!("  {:<24} priority {:>11}", region.id, region.priority);
            }

            if let Some(name) = flag {
                let registry = FlagRegistry::with_builtins();
                let def = lookup_flag(&registry, &name)?;
                let subject = player.map(|p| {
                    group
                        .iter()
                        .fold(Subject::new(Uuid::nil()).with_name(p), |s, g| s.with_group(g.clone()))
                });

                let decision = set.explain(def, subject.as_ref());
                let value = decision
                    .value
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "(unset)".to_string());
                println!();
                println!("{} = {}", def.name, value);
                match (decision.region, decision.inherited_from) {
                    (Some(region), Some(ancestor)) => {
                        println!("  decided by '{}', inherited from '{}'", region, ancestor)
                    }
                    (Some(region), None) => println!("  decided by '{}'", region),
                    _ => println!("  flag default"),
                }
            }
        }

        Command::Check { world } => {
            let index = container.load_world(&world)?;
            let config = container.config().advisories.clone();
            let mut warnings = 0;
            for region in index.regions() {
                for advisory in advisory::check_dimensions(&region, &config) {
                    println!("{}: {}", region.id, advisory);
                    warnings += 1;
                }
                if let Some(advisory) = advisory::check_overlaps(&index, &region) {
                    println!("{}: {}", region.id, advisory);
                    warnings += 1;
                }
            }
            println!("Checked {} region(s), {} warning(s)", index.size(), warnings);
        }
    }

    Ok(())
}
