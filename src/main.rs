use std::path::Path;

use clap::Parser;
use proxindex::{
    ConfigDb,
    DataDir,
    Error,
    IndexerConfig,
    MemorySink,
    Result,
    SearchIndex,
    bump::display_text,
    incremental,
    ingestion,
    walker,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{ChunksArgs, Cli, Command, IndexArgs, SearchArgs};

/// Memory budget for the index writer, in bytes.
const WRITER_BUDGET: usize = 50_000_000;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("PROXINDEX_LOG") {
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

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }
    if let Command::Chunks(args) = &cli.command {
        return cmd_chunks(args);
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let settings = ConfigDb::open(&data_dir.settings_db())?;

    match cli.command {
        Command::Index(args) => cmd_index(&settings, &data_dir, &args)?,
        Command::Search(args) => cmd_search(&settings, &data_dir, &args)?,
        Command::Status(args) => cmd_status(&settings, &data_dir, args.json)?,
        Command::Chunks(_) | Command::Completions(_) => {}
    }

    Ok(())
}

/// The configuration to run with: an explicit file wins, then whatever
/// the index was built with, then defaults.
fn resolve_config(
    settings: &ConfigDb,
    explicit: Option<&Path>,
) -> Result<IndexerConfig> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "config file does not exist: {}",
                path.display()
            )));
        }
        return IndexerConfig::load(path);
    }
    Ok(settings.indexer_config()?.unwrap_or_default().normalized())
}

fn resolve_index_name(settings: &ConfigDb, args: &IndexArgs) -> Result<String> {
    let stored = settings.index_name()?;
    match (&args.name, stored) {
        (Some(given), Some(stored)) if *given != stored => {
            Err(Error::Config(format!(
                "data directory already holds index '{stored}'; \
                 use --clean to replace it"
            )))
        }
        (Some(given), _) => Ok(given.clone()),
        (None, Some(stored)) => Ok(stored),
        (None, None) => Ok(args
            .dir
            .canonicalize()?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string())),
    }
}

fn cmd_index(
    settings: &ConfigDb,
    data_dir: &DataDir,
    args: &IndexArgs,
) -> Result<()> {
    if !args.dir.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            args.dir.display()
        )));
    }

    if args.clean {
        tracing::info!("discarding existing index");
        data_dir.clear_index()?;
        settings.clear()?;
    }

    let config = resolve_config(settings, args.config.as_deref())?;
    let name = resolve_index_name(settings, args)?;
    settings.ensure_indexer_config(&config)?;
    settings.set_index_name(&name)?;

    let include = args
        .include
        .as_deref()
        .map(walker::include_matcher)
        .transpose()?;
    let files = walker::discover_files(&args.dir, include.as_ref())?;
    eprintln!("Found {} files", files.len());

    let index = SearchIndex::open(&data_dir.index_dir()?, config.stop_set())?;
    let diff = incremental::diff_index(&index, &name, &files)?;
    if diff.is_empty() {
        eprintln!("Index '{name}' is up to date.");
        return Ok(());
    }

    let mut writer = index.writer(WRITER_BUDGET)?;
    incremental::remove_documents(&index, &writer, &diff.deleted_keys);
    let to_index = diff.to_index();
    let report = ingestion::ingest_files(
        &index,
        &mut writer,
        &config,
        &name,
        &to_index,
    )?;

    eprintln!(
        "Indexed {} documents ({} new, {} changed) into {} chunks",
        report.indexed,
        diff.new_files.len(),
        diff.changed_files.len(),
        report.chunks
    );
    if !diff.deleted_keys.is_empty() {
        eprintln!("Removed {} documents", diff.deleted_keys.len());
    }
    if !report.failed.is_empty() {
        eprintln!("Skipped {} documents with errors:", report.failed.len());
        for key in &report.failed {
            eprintln!("  {key}");
        }
    }
    Ok(())
}

fn cmd_search(
    settings: &ConfigDb,
    data_dir: &DataDir,
    args: &SearchArgs,
) -> Result<()> {
    let config = resolve_config(settings, None)?;
    let index = SearchIndex::open(&data_dir.index_dir()?, config.stop_set())?;
    let hits = index.search_chunks(&args.query, args.count)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        eprintln!("No results.");
        return Ok(());
    }
    for hit in &hits {
        let section = hit
            .section_type
            .as_deref()
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        println!(
            "{:>7.3}  {} node {} +{}{section}",
            hit.score, hit.key, hit.node, hit.word_offset
        );
        println!("         {}", display_text(&hit.text));
    }
    Ok(())
}

fn cmd_chunks(args: &ChunksArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => IndexerConfig::load(path)?,
        None => IndexerConfig::default().normalized(),
    };
    let xml = std::fs::read_to_string(&args.file)?;
    let file_date = walker::file_mtime(&args.file)?;
    let key = args.file.to_string_lossy();

    let mut sink = MemorySink::new();
    ingestion::index_document(
        &config,
        &key,
        &xml,
        file_date,
        &mut sink,
        None,
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sink)?);
        return Ok(());
    }

    for (i, chunk) in sink.chunks.iter().enumerate() {
        println!(
            "#{i} node {} +{} boost {}{}",
            chunk.node,
            chunk.word_offset,
            chunk.word_boost,
            chunk
                .section_type
                .as_deref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default()
        );
        println!("    {}", display_text(&chunk.text));
    }
    for summary in &sink.summaries {
        let scope = summary.sub_document.as_deref().unwrap_or("document");
        println!("{scope}: {} chunks", summary.chunk_count);
        for field in &summary.meta {
            println!("  {} = {}", field.name, display_text(&field.value));
        }
    }
    Ok(())
}

fn cmd_status(
    settings: &ConfigDb,
    data_dir: &DataDir,
    json: bool,
) -> Result<()> {
    let name = settings.index_name()?;
    let config = resolve_config(settings, None)?;
    let doc_count = match name {
        Some(_) => {
            SearchIndex::open(&data_dir.index_dir()?, config.stop_set())?
                .document_count()?
        }
        None => 0,
    };

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "index": name,
            "config": config,
            "documents": doc_count,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Index: {}", name.as_deref().unwrap_or("(none)"));
        println!("Chunk size: {}", config.chunk_size);
        println!("Chunk overlap: {}", config.chunk_overlap);
        println!(
            "Stop words: {}",
            config.stop_set().map_or(0, |set| set.len())
        );
        println!("Documents: {doc_count}");
    }
    Ok(())
}
