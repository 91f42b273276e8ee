use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::Parser;
use docseek::{
    ConfigDb,
    DataDir,
    Engine,
    Error,
    Result,
    Settings,
    config_db::FolderStats,
    engine::SearchEngine,
    ingestion::{CancelToken, FolderIndexer, IndexSummary, IndexingState},
    llm::OllamaModel,
    parser::FileParser,
    search::{self, QueryPipeline},
    settings::KEYS,
};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{AskArgs, Cli, Command, ConfigAction, ContextArgs, IndexArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSEEK_LOG") {
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
    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    // Settings commands must work even when the stored values are invalid.
    let command = match cli.command {
        Command::Config { action } => return cmd_config(&config_db, action),
        command => command,
    };

    let mut settings = Settings::resolve(&config_db)?;
    if let Some(backend) = &cli.engine {
        settings.apply("engine_backend", backend)?;
    }
    let engine =
        Engine::from_config(&settings.engine, &data_dir.local_index_dir()?)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        match command {
            Command::Index(args) => {
                cmd_index(&config_db, &engine, &settings, &args).await
            }
            Command::Ask(args) => {
                cmd_ask(&config_db, &engine, &mut settings, &args).await
            }
            Command::Context(args) => {
                cmd_context(&config_db, &engine, &settings, &args).await
            }
            Command::Folders { json } => cmd_folders(&config_db, json),
            Command::Remove { folder } => {
                cmd_remove(&config_db, &engine, &settings, &folder).await
            }
            Command::Status { json } => {
                cmd_status(&config_db, &data_dir, &engine, &settings, json)
                    .await
            }
            Command::Config { .. } | Command::Completions(_) => Ok(()),
        }
    })
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Registry key of a folder: its canonical path when it still exists.
fn folder_key(folder: &Path) -> PathBuf {
    folder.canonicalize().unwrap_or_else(|_| folder.to_path_buf())
}

/// The index uid to query: the given folder's, or the only indexed one.
fn resolve_index(
    config_db: &ConfigDb,
    folder: Option<&Path>,
) -> Result<String> {
    if let Some(folder) = folder {
        let key = folder_key(folder);
        return config_db
            .get_folder(&key.to_string_lossy())?
            .ok_or_else(|| Error::NotFound {
                kind: "indexed folder",
                name: key.display().to_string(),
            });
    }

    let mut folders = config_db.list_folders()?;
    match folders.len() {
        0 => Err(Error::Config(
            "no folders indexed yet; run `docseek index <folder>`".into(),
        )),
        1 => Ok(folders.remove(0).1),
        n => Err(Error::Config(format!(
            "{n} folders are indexed; choose one with --folder"
        ))),
    }
}

async fn cmd_index(
    config_db: &ConfigDb,
    engine: &Engine,
    settings: &Settings,
    args: &IndexArgs,
) -> Result<()> {
    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current batch");
            watcher.cancel();
        }
    });

    let state = IndexingState::new();
    let indexer = FolderIndexer::new(
        engine,
        Arc::new(FileParser),
        &settings.chunking,
        &settings.indexing,
        &state,
    );
    let summary = indexer.index_folder(&args.folder, &cancel).await?;

    config_db
        .set_folder(&summary.folder.to_string_lossy(), &summary.index_uid)?;
    config_db.set_folder_stats(
        &summary.index_uid,
        &FolderStats::from_summary(&summary, now_secs()),
    )?;

    if args.json {
        println!("{}", search::format_json(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &IndexSummary) {
    println!("Indexed {}", summary.folder.display());
    println!("  Index: {}", summary.index_uid);
    println!(
        "  Files: {} found, {} indexed, {} failed",
        summary.files_found, summary.files_indexed, summary.files_failed
    );
    println!(
        "  Chunks: {} indexed, {} failed",
        summary.chunks_indexed, summary.chunks_failed
    );
}

async fn cmd_ask(
    config_db: &ConfigDb,
    engine: &Engine,
    settings: &mut Settings,
    args: &AskArgs,
) -> Result<()> {
    let uid = resolve_index(config_db, args.folder.as_deref())?;
    if let Some(model) = &args.model {
        settings.apply("model_name", model)?;
    }
    let model = OllamaModel::new(&settings.model)?;
    model.ensure_ready().await?;

    let pipeline =
        QueryPipeline::new(engine, &settings.retrieval, &settings.context);
    let answer = pipeline.answer(&model, &args.question, &uid).await?;

    if args.json {
        println!("{}", search::format_json(&answer)?);
    } else {
        print!("{}", search::format_answer(&answer));
    }
    Ok(())
}

async fn cmd_context(
    config_db: &ConfigDb,
    engine: &Engine,
    settings: &Settings,
    args: &ContextArgs,
) -> Result<()> {
    let uid = resolve_index(config_db, args.folder.as_deref())?;
    let pipeline =
        QueryPipeline::new(engine, &settings.retrieval, &settings.context);
    let context = pipeline.retrieve_context(&args.question, &uid).await?;

    if args.json {
        println!("{}", search::format_json(&context)?);
    } else if args.full {
        println!("{}", context.context.text);
    } else {
        print!("{}", search::format_sources(&context));
    }
    Ok(())
}

#[derive(Serialize)]
struct FolderEntry {
    folder: String,
    index_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<FolderStats>,
}

fn cmd_folders(config_db: &ConfigDb, json: bool) -> Result<()> {
    let mut entries = Vec::new();
    for (folder, index_uid) in config_db.list_folders()? {
        let stats = config_db.get_folder_stats(&index_uid)?;
        entries.push(FolderEntry {
            folder,
            index_uid,
            stats,
        });
    }

    if json {
        println!("{}", search::format_json(&entries)?);
    } else if entries.is_empty() {
        println!("No folders indexed.");
    } else {
        for entry in &entries {
            match &entry.stats {
                Some(stats) => println!(
                    "{}\t{}\t{} files, {} chunks",
                    entry.folder,
                    entry.index_uid,
                    stats.files_indexed,
                    stats.chunks_indexed
                ),
                None => println!("{}\t{}", entry.folder, entry.index_uid),
            }
        }
    }
    Ok(())
}

async fn cmd_remove(
    config_db: &ConfigDb,
    engine: &Engine,
    settings: &Settings,
    folder: &Path,
) -> Result<()> {
    let key = folder_key(folder);
    let key_str = key.to_string_lossy();
    if config_db.get_folder(&key_str)?.is_none() {
        return Err(Error::NotFound {
            kind: "indexed folder",
            name: key.display().to_string(),
        });
    }

    let state = IndexingState::new();
    let indexer = FolderIndexer::new(
        engine,
        Arc::new(FileParser),
        &settings.chunking,
        &settings.indexing,
        &state,
    );
    match indexer.remove_folder(&key).await {
        Ok(_) | Err(Error::IndexNotFound(_)) => {}
        Err(e) => return Err(e),
    }
    config_db.remove_folder(&key_str)?;

    println!("Removed {}", key.display());
    Ok(())
}

async fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    engine: &Engine,
    settings: &Settings,
    json: bool,
) -> Result<()> {
    let folders = config_db.list_folders()?;
    let index_bytes = data_dir.local_index_bytes()?;
    let engine_status = match engine.health().await {
        Ok(()) => "available".to_string(),
        Err(e) => e.to_string(),
    };
    let model_status = match OllamaModel::new(&settings.model)?
        .ensure_ready()
        .await
    {
        Ok(()) => "ready".to_string(),
        Err(e) => e.to_string(),
    };

    if json {
        let value = serde_json::json!({
            "data_dir": data_dir.root(),
            "local_index_bytes": index_bytes,
            "engine": {
                "backend": settings.engine.backend.to_string(),
                "url": settings.engine.url,
                "status": engine_status,
            },
            "model": {
                "name": settings.model.model,
                "url": settings.model.url,
                "status": model_status,
            },
            "folders": folders.len(),
        });
        println!("{}", search::format_json(&value)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Local indexes: {index_bytes} bytes");
        println!(
            "Engine: {} ({}): {engine_status}",
            settings.engine.backend, settings.engine.url
        );
        println!(
            "Model: {} ({}): {model_status}",
            settings.model.model, settings.model.url
        );
        println!("Folders: {}", folders.len());
        for (folder, uid) in &folders {
            println!("  {folder}: {uid}");
        }
    }
    Ok(())
}

fn cmd_config(config_db: &ConfigDb, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { json } => {
            let settings = Settings::resolve(config_db)?;
            let entries = settings.entries();
            if json {
                let map: serde_json::Map<String, serde_json::Value> = entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
                    .collect();
                println!("{}", search::format_json(&map)?);
            } else {
                for (key, value) in entries {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::Set { key, value } => {
            if !KEYS.contains(&key.as_str()) {
                return Err(Error::Config(format!("unknown setting '{key}'")));
            }
            let mut settings = Settings::resolve(config_db).unwrap_or_default();
            settings.apply(&key, &value)?;
            settings.validate()?;
            config_db.set_setting(&key, value.trim())?;
            println!("Set {key} = {}", value.trim());
        }
        ConfigAction::Unset { key } => {
            if !config_db.remove_setting(&key)? {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
            println!("Unset {key}");
        }
    }
    Ok(())
}
