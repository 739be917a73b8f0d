use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use semvault::{
    FastEmbedder,
    IndexConfig,
    Indexer,
    QueryService,
    SearchHit,
    VaultWatcher,
    cli::{Cli, Command, DuplicatesArgs, SearchArgs},
    config,
    error,
    mcp,
    store::IndexStore,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("SEMVAULT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let vault = config::resolve_vault(cli.vault.as_deref())?;
    let mut config = IndexConfig::new(vault);
    if let Some(model) = cli.model {
        config = config.with_model(model);
    }

    match cli.command {
        Command::Search(args) => cmd_search(config, &args),
        Command::Duplicates(args) => cmd_duplicates(config, &args),
        Command::Rebuild => cmd_rebuild(config),
        Command::Sync => cmd_sync(config),
        Command::Status(args) => cmd_status(config, args.json),
        Command::Watch => cmd_watch(config),
        Command::Mcp => mcp::run_mcp(config),
        Command::Completions(_) => unreachable!("handled above"),
    }
}

fn open_index(config: IndexConfig) -> error::Result<Arc<Indexer>> {
    let embedder = Arc::new(FastEmbedder::new(&config.model_id)?);
    let indexer = Arc::new(Indexer::new(config, embedder));
    indexer.initialize()?;
    Ok(indexer)
}

fn cmd_search(config: IndexConfig, args: &SearchArgs) -> error::Result<()> {
    let query = QueryService::new(open_index(config)?);
    let hits = query.search_related(&args.query, Some(args.top_k))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("No results found.");
    } else {
        print_hits(&hits);
    }
    Ok(())
}

fn cmd_duplicates(config: IndexConfig, args: &DuplicatesArgs) -> error::Result<()> {
    let query = QueryService::new(open_index(config)?);
    let hits = query.check_duplicates(&args.file, args.threshold)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("No duplicates found.");
    } else {
        print_hits(&hits);
    }
    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    for hit in hits {
        println!("{:.3}  {}", hit.score, hit.path);
    }
}

fn cmd_rebuild(config: IndexConfig) -> error::Result<()> {
    let embedder = Arc::new(FastEmbedder::new(&config.model_id)?);
    let indexer: Indexer = Indexer::new(config, embedder);
    let count = indexer.rebuild()?;
    println!("Indexed {count} documents.");
    Ok(())
}

fn cmd_sync(config: IndexConfig) -> error::Result<()> {
    let indexer = open_index(config)?;
    let report = indexer.sync(None)?;
    println!(
        "Sync complete: {} embedded, {} removed, {} unchanged.",
        report.embedded, report.removed, report.unchanged
    );
    Ok(())
}

/// Report on the persisted index without loading the embedding model.
fn cmd_status(config: IndexConfig, json: bool) -> error::Result<()> {
    let store = IndexStore::new(&config.vault_root);
    let meta = match store.load_meta() {
        Ok(meta) => Some(meta),
        Err(error::Error::NotFound { .. }) => None,
        Err(err) => return Err(err),
    };

    if json {
        let value = match &meta {
            Some(meta) => serde_json::json!({
                "vault": config.vault_root,
                "model": meta.model_id,
                "dimension": meta.dimension,
                "documents": meta.entries.len(),
            }),
            None => serde_json::json!({
                "vault": config.vault_root,
                "documents": 0,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Vault: {}", config.vault_root.display());
        match meta {
            Some(meta) => {
                println!("Model: {}", meta.model_id);
                println!("Dimension: {}", meta.dimension);
                println!("Documents: {}", meta.entries.len());
            }
            None => println!("No index built yet. Run `semvault rebuild`."),
        }
    }
    Ok(())
}

fn cmd_watch(config: IndexConfig) -> error::Result<()> {
    let indexer = open_index(config)?;
    let _watcher = VaultWatcher::start(indexer)?;
    eprintln!("Watching for changes. Press Ctrl-C to stop.");
    loop {
        std::thread::park();
    }
}
