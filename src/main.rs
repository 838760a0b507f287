mod categorizer;
mod chart;
mod classifier;
mod cli;
mod db;
mod dedupe;
mod error;
mod extract;
mod fmt;
mod llm;
mod memory;
mod models;
mod normalize;
mod pairing;
mod period;
mod pipeline;
mod rules;
mod settings;
mod sign_policy;
mod store;
mod strategies;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, MemoryCommands, ModelCommands, PolicyCommands, RulesCommands};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LEDGERLENS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir, tenant } => cli::init::run(data_dir, tenant),
        Commands::Ingest {
            file,
            source,
            source_type,
            json,
        } => cli::ingest::run(&file, &source, &source_type, json),
        Commands::Transactions {
            from,
            to,
            source_type,
        } => cli::transactions::run(from.as_deref(), to.as_deref(), source_type.as_deref()),
        Commands::Rules { command } => match command {
            RulesCommands::Add { vendor, account } => cli::rules::add(&vendor, &account),
            RulesCommands::List => cli::rules::list(),
            RulesCommands::Delete { id } => cli::rules::delete(id),
        },
        Commands::Memory { command } => match command {
            MemoryCommands::List { global } => cli::memory::list(global),
            MemoryCommands::Set {
                vendor,
                account,
                global,
            } => cli::memory::set(&vendor, &account, global),
        },
        Commands::Policy { command } => match command {
            PolicyCommands::List => cli::policy::list(),
            PolicyCommands::Reset { source } => cli::policy::reset(&source),
        },
        Commands::Pair { id, from, to } => match id {
            Some(id) => cli::pair::one(&id),
            None => cli::pair::run(from.as_deref(), to.as_deref()),
        },
        Commands::Chart => cli::chart::run(),
        Commands::Export { from, to, output } => cli::export::run(from.as_deref(), to.as_deref(), output),
        Commands::Model { command } => match command {
            ModelCommands::Train { output } => cli::model::train(output),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
