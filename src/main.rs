use std::sync::Arc;

use clap::Parser;
use libris::{
    BibliographicApi, CacheStore, Config, CrossrefClient, Document, Library,
    SidecarStore,
    backlinks::BacklinkResolver,
    citations::CitationResolver,
    error::{self, Error},
    importer::ImporterRegistry,
    matcher::DocumentFilter,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{CacheAction, Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("LIBRIS_LOG") {
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

    let mut config = Config::resolve(&cli.library, cli.cache_dir.as_deref())?;
    if cli.workers.is_some() {
        config = config.with_workers(cli.workers);
    }
    if cli.no_cache {
        config = config.with_use_cache(false);
    }

    match cli.command {
        Command::Search(args) => {
            let library = Library::open(config)?;
            cmd_search(&library, &args)?;
        }
        Command::Citations(args) => {
            let library = Library::open(config)?;
            cmd_citations(&library, &args)?;
        }
        Command::CitedBy(args) => {
            let library = Library::open(config)?;
            cmd_cited_by(&library, &args)?;
        }
        Command::Fetch(args) => {
            cmd_fetch(&config, &args)?;
        }
        Command::Cache { action } => match action {
            CacheAction::Clear => {
                let store = CacheStore::new(&config.cache_dir);
                let root = config.library_root.display();
                if store.invalidate(&config.library_root)? {
                    println!("Cleared cache for {root}");
                } else {
                    println!("No cache for {root}");
                }
            }
            CacheAction::Update => {
                let mut library = Library::open(config.with_use_cache(true))?;
                library.rescan()?;
                println!(
                    "Cached {} documents from {}",
                    library.documents().len(),
                    library.root().display()
                );
            }
        },
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_search(library: &Library, args: &cli::SearchArgs) -> error::Result<()> {
    let search = args.search();
    let results = match &args.format {
        Some(format) => DocumentFilter::new(&search, format)?
            .apply(library.documents(), Some(library.pool())),
        None => library.query(&search)?,
    };

    if args.json {
        let items: Vec<serde_json::Value> =
            results.iter().map(|doc| document_json(doc)).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if results.is_empty() {
        println!("No documents found.");
    } else {
        for doc in results {
            println!(
                "{}\t{}\t{}\t{}",
                doc.folder().display(),
                doc.field_text("author"),
                doc.field_text("title"),
                doc.field_text("year"),
            );
        }
    }
    Ok(())
}

fn cmd_citations(
    library: &Library,
    args: &cli::CitationsArgs,
) -> error::Result<()> {
    let doc = library.get(&args.folder)?;
    let sidecars = SidecarStore::new(library.config());
    let api = CrossrefClient::new(library.config())?;
    let resolver = CitationResolver::new(library, &api, &sidecars);

    let citations = if args.refresh {
        resolver.refresh_from_library(doc)?.ok_or_else(|| {
            Error::Config(format!(
                "no stored citations for {}, run without --refresh first",
                doc.folder().display()
            ))
        })?
    } else if args.force {
        resolver.resolve_and_persist(doc)?
    } else {
        resolver.citations(doc)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&citations)?);
    } else if citations.is_empty() {
        println!("No citations found.");
    } else {
        for citation in &citations {
            let local = library.find_by_doi(&citation.doi).is_some();
            println!(
                "{}\t{}\t{}{}",
                citation.doi,
                citation.author().unwrap_or_default(),
                citation.title().unwrap_or_default(),
                if local { "\t(in library)" } else { "" },
            );
        }
    }
    Ok(())
}

fn cmd_cited_by(
    library: &Library,
    args: &cli::CitedByArgs,
) -> error::Result<()> {
    let doc = library.get(&args.folder)?;
    let sidecars = SidecarStore::new(library.config());
    let resolver = BacklinkResolver::new(library, &sidecars, library.pool());

    let backlinks = if args.force {
        resolver.resolve_and_persist(doc)?
    } else {
        resolver.backlinks(doc)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&backlinks)?);
    } else if backlinks.is_empty() {
        println!("No local documents cite {}.", doc.folder().display());
    } else {
        for backlink in &backlinks {
            println!(
                "{}\t{}",
                backlink.folder.display(),
                backlink
                    .fields
                    .get("title")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default(),
            );
        }
    }
    Ok(())
}

fn cmd_fetch(config: &Config, args: &cli::FetchArgs) -> error::Result<()> {
    let api: Arc<dyn BibliographicApi> = Arc::new(CrossrefClient::new(config)?);
    let registry = ImporterRegistry::new(api);

    let importers = match &args.importer {
        Some(name) => {
            let mut importer = registry.get(name).ok_or_else(|| {
                Error::Config(format!(
                    "unknown importer '{name}', expected one of: {}",
                    registry.names().join(", ")
                ))
            })?;
            importer.fetch(&args.uri)?;
            vec![importer]
        }
        None => registry.matching(&args.uri),
    };

    let found: Vec<_> = importers
        .iter()
        .filter(|importer| !importer.context().is_empty())
        .collect();
    if found.is_empty() {
        println!("Nothing found for '{}'.", args.uri);
        return Ok(());
    }
    for importer in found {
        println!("# {}", importer.name());
        print!("{}", serde_yaml::to_string(&importer.context().data)?);
    }
    Ok(())
}

fn document_json(doc: &Document) -> serde_json::Value {
    let mut data = doc.to_metadata();
    data.insert(
        "folder".to_string(),
        serde_json::Value::String(doc.folder().display().to_string()),
    );
    serde_json::Value::Object(data)
}
