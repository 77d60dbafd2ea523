use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use cask_engine::{
    BatchRequest, CacheService, DataFileAddress, DeleteStatus, EngineConfig, StorageMode,
    StoreRequest,
};
use cask_types::{CacheId, ContentEncoding, Namespace, Payload};
use colored::Colorize;
use serde::Serialize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    tracing::debug!(root = %config.root_dir.display(), namespace = %cli.namespace, "opening cache");
    let service = CacheService::new(config).context("failed to open cache")?;
    let ctx = Ctx {
        service,
        namespace: cli.namespace,
        format: cli.format,
    };
    match cli.command {
        Command::Put(args) => cmd_put(&ctx, args),
        Command::Get(args) => cmd_get(&ctx, args),
        Command::Exists(args) => cmd_exists(&ctx, args),
        Command::Rm(args) => cmd_rm(&ctx, args),
        Command::Refs(args) => cmd_refs(&ctx, args),
        Command::Ls(args) => cmd_ls(&ctx, args),
        Command::Update(args) => cmd_update(&ctx, args),
        Command::Data(args) => cmd_data(&ctx, args.action),
        Command::Zip(args) => cmd_zip(&ctx, args.action),
        Command::Stats => cmd_stats(&ctx),
        Command::Config => cmd_config(&ctx),
    }
}

struct Ctx {
    service: CacheService,
    namespace: Namespace,
    format: OutputFormat,
}

impl Ctx {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }
}

/// The CLI always runs against local disk; a memory cache would not
/// outlive the process.
fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut config = config.with_env().context("invalid CASK_* environment")?;
    if let Some(root) = &cli.root {
        config.root_dir = root.clone();
    }
    config.storage_mode = StorageMode::LocalDisk;
    Ok(config)
}

fn read_payload(args: &PayloadArgs) -> anyhow::Result<Payload> {
    if let Some(text) = &args.text {
        return Ok(Payload::from(text.as_str()));
    }
    if let Some(json) = &args.json {
        let value: serde_json::Value = serde_json::from_str(json).context("--json is not valid JSON")?;
        return Ok(Payload::from(value));
    }
    match &args.file {
        Some(path) => Ok(Payload::from(read_file(path)?)),
        None => bail!("one of --text, --json, --file is required"),
    }
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Print a payload, or write its bytes to `output`.
fn write_payload(payload: &Payload, output: Option<&Path>) -> anyhow::Result<()> {
    let bytes = match payload {
        Payload::Json(value) if output.is_none() => {
            println!("{}", serde_json::to_string_pretty(value)?);
            return Ok(());
        }
        other => other.to_bytes()?,
    };
    match output {
        Some(path) => {
            std::fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{} wrote {} bytes to {}", "✓".green().bold(), bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            if matches!(payload, Payload::String(_)) {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

fn require<T>(found: Option<T>, what: impl std::fmt::Display) -> anyhow::Result<T> {
    match found {
        Some(value) => Ok(value),
        None => bail!("{what} not found"),
    }
}

// ---- Entries ----

fn cmd_put(ctx: &Ctx, args: PutArgs) -> anyhow::Result<()> {
    let mut payload = read_payload(&args.payload)?;
    let mut request_encoding = None;
    if args.gzip {
        let Payload::Binary(bytes) = &payload else {
            bail!("--gzip only applies to --file");
        };
        payload = Payload::from(cask_engine::gzip(bytes)?);
        request_encoding = Some(ContentEncoding::Gzip);
    }
    let mut request = StoreRequest::new(payload)
        .in_namespace(ctx.namespace.clone())
        .with_strategy(args.strategy);
    if let Some(key) = args.key {
        request = request.with_cache_key(key);
    }
    if let Some(file_id) = args.file_id {
        request = request.with_file_id(file_id);
    }
    if let Some(hash) = args.hash {
        request = request.with_cache_hash(hash);
    }
    if let Some(field) = args.field {
        request = request.with_json_field_path(field);
    }
    if let Some(encoding) = request_encoding {
        request = request.with_content_encoding(encoding);
    }
    let receipt = ctx.service.store(request).context("store failed")?;
    ctx.emit(&receipt, |r| {
        println!("{} Stored {}", "✓".green().bold(), r.cache_id.to_string().yellow());
        println!("  Hash:     {}", r.cache_hash.as_str().cyan());
        println!("  Type:     {}", r.data_type);
        println!("  Strategy: {}", r.strategy);
        println!("  Size:     {} bytes", r.size);
        for path in &r.paths.data {
            println!("  {}", path.dimmed());
        }
    })
}

fn cmd_get(ctx: &Ctx, args: GetArgs) -> anyhow::Result<()> {
    let entry = match (&args.target.id, &args.target.hash) {
        (Some(id), _) => require(ctx.service.retrieve_by_id(id, &ctx.namespace)?, id)?,
        (None, Some(hash)) => require(ctx.service.retrieve_by_hash(hash, &ctx.namespace)?, hash)?,
        (None, None) => bail!("an id or --hash is required"),
    };
    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entry)?),
        OutputFormat::Text => write_payload(&entry.data, args.output.as_deref())?,
    }
    Ok(())
}

fn cmd_exists(ctx: &Ctx, args: LookupArgs) -> anyhow::Result<()> {
    let exists = match (&args.target.id, &args.target.hash) {
        (Some(id), _) => ctx.service.exists_by_id(id, &ctx.namespace)?,
        (None, Some(hash)) => ctx.service.exists_by_hash(hash, &ctx.namespace)?,
        (None, None) => bail!("an id or --hash is required"),
    };
    ctx.emit(&serde_json::json!({ "exists": exists }), |_| {
        if exists {
            println!("{}", "exists".green());
        } else {
            println!("{}", "missing".red());
        }
    })
}

fn cmd_rm(ctx: &Ctx, args: RmArgs) -> anyhow::Result<()> {
    let report = ctx.service.delete_by_id(&args.id, &ctx.namespace)?;
    ctx.emit(&report, |r| match r.status {
        DeleteStatus::Success => {
            println!("{} Deleted {} ({} files)", "✓".green().bold(), r.cache_id, r.deleted_count)
        }
        DeleteStatus::PartialFailure => {
            println!(
                "{} Deleted {} with {} failures",
                "!".yellow().bold(),
                r.cache_id,
                r.failed_count
            );
            for path in &r.failed_paths {
                println!("  {} {}", "failed:".red(), path);
            }
        }
        DeleteStatus::NotFound => println!("{}", r.message.as_deref().unwrap_or("not found").red()),
    })?;
    if report.status == DeleteStatus::NotFound {
        bail!("cache id {} not found", args.id);
    }
    Ok(())
}

fn cmd_refs(ctx: &Ctx, args: LookupArgs) -> anyhow::Result<()> {
    match (&args.target.id, &args.target.hash) {
        (Some(id), _) => {
            let refs = require(ctx.service.entry_refs(id, &ctx.namespace)?, id)?;
            ctx.emit(&refs, |r| {
                println!("Entry {}", r.cache_id.to_string().yellow().bold());
                println!("  Hash:     {}", r.cache_hash.as_str().cyan());
                println!("  Strategy: {}", r.strategy);
                println!("  Type:     {}", r.data_type);
                if let Some(key) = &r.cache_key {
                    println!("  Key:      {key}");
                }
                println!("  Stored:   {}", r.timestamp);
                for path in r.all_paths.all() {
                    println!("  {}", path.dimmed());
                }
            })
        }
        (None, Some(hash)) => {
            let refs = require(ctx.service.hash_refs(hash, &ctx.namespace)?, hash)?;
            ctx.emit(&refs, |r| {
                println!(
                    "Hash {} ({} versions)",
                    r.cache_hash.as_str().cyan().bold(),
                    r.total_versions
                );
                for entry in &r.cache_ids {
                    let marker = if entry.cache_id == r.latest_id { "*" } else { " " };
                    println!("{} {}  {}", marker.green(), entry.cache_id, entry.timestamp.to_string().dimmed());
                }
            })
        }
        (None, None) => bail!("an id or --hash is required"),
    }
}

fn cmd_ls(ctx: &Ctx, args: LsArgs) -> anyhow::Result<()> {
    let items: Vec<String> = if args.hashes {
        ctx.service
            .list_hashes(&ctx.namespace)?
            .iter()
            .map(|h| h.as_str().to_string())
            .collect()
    } else {
        ctx.service
            .list_ids(&ctx.namespace)?
            .iter()
            .map(CacheId::to_string)
            .collect()
    };
    ctx.emit(&items, |items| {
        if items.is_empty() {
            println!("No entries in {}.", ctx.namespace.as_str().bold());
        }
        for item in items {
            println!("{item}");
        }
    })
}

fn cmd_update(ctx: &Ctx, args: UpdateArgs) -> anyhow::Result<()> {
    let payload = read_payload(&args.payload)?;
    let receipt = require(ctx.service.update_by_id(&args.id, &ctx.namespace, payload)?, args.id)?;
    ctx.emit(&receipt, |r| {
        println!("{} Updated {}", "✓".green().bold(), r.cache_id.to_string().yellow());
        println!("  Hash: {}", r.cache_hash.as_str().cyan());
        println!("  Size: {} bytes", r.size);
    })
}

// ---- Child files ----

fn address(ctx: &Ctx, id: CacheId, payload_type: cask_types::DataType, key: Option<String>, file_id: Option<String>) -> DataFileAddress {
    let mut address = DataFileAddress::new(id, ctx.namespace.clone(), payload_type);
    if let Some(key) = key {
        address = address.with_data_key(key);
    }
    if let Some(file_id) = file_id {
        address = address.with_file_id(file_id);
    }
    address
}

fn cmd_data(ctx: &Ctx, action: DataAction) -> anyhow::Result<()> {
    match action {
        DataAction::Put { id, payload, key, file_id } => {
            let payload = read_payload(&payload)?;
            let address = address(ctx, id, payload.data_type(), key, file_id);
            let receipt = require(ctx.service.store_data(&address, payload)?, id)?;
            ctx.emit(&receipt, |r| {
                println!("{} Attached {} to {}", "✓".green().bold(), r.data_file_id.yellow(), r.cache_id);
                for path in &r.file_paths {
                    println!("  {}", path.dimmed());
                }
            })
        }
        DataAction::Get { id, file_id, key, data_type, output } => {
            let address = address(ctx, id, data_type, key, Some(file_id.clone()));
            let file = require(ctx.service.retrieve_data(&address)?, format!("child file {file_id}"))?;
            match ctx.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&file)?),
                OutputFormat::Text => write_payload(&file.data, output.as_deref())?,
            }
            Ok(())
        }
        DataAction::Ls { id, key, recursive } => {
            let listing = require(
                ctx.service.list_data_files(&id, &ctx.namespace, key.as_deref(), recursive)?,
                id,
            )?;
            ctx.emit(&listing, |l| {
                for file in &l.files {
                    let key = file.data_key.as_deref().map(|k| format!("{k}/")).unwrap_or_default();
                    println!("{:>8}  {:<6}  {}{}", file.file_size, file.data_type, key.dimmed(), file.data_file_id);
                }
                println!("{} files, {} bytes", l.file_count, l.total_size);
            })
        }
        DataAction::Rm { id, file_id, key, data_type } => {
            let address = address(ctx, id, data_type, key, Some(file_id.clone()));
            let report = require(ctx.service.delete_data(&address)?, format!("child file {file_id}"))?;
            ctx.emit(&report, |r| {
                println!("{} Deleted {} files", "✓".green().bold(), r.deleted_count)
            })
        }
        DataAction::Clear { id, key } => {
            let report = require(ctx.service.delete_all_data(&id, &ctx.namespace, key.as_deref())?, id)?;
            ctx.emit(&report, |r| {
                println!("{} Deleted {} files", "✓".green().bold(), r.deleted_count)
            })
        }
    }
}

// ---- Zip ----

fn cmd_zip(ctx: &Ctx, action: ZipCommand) -> anyhow::Result<()> {
    let ns = &ctx.namespace;
    match action {
        ZipCommand::Put { file, strategy, key } => {
            let mut request = StoreRequest::binary(read_file(&file)?)
                .in_namespace(ns.clone())
                .with_strategy(strategy);
            if let Some(key) = key {
                request = request.with_cache_key(key);
            }
            let stored = ctx.service.store_zip_with(request).context("zip store failed")?;
            ctx.emit(&stored, |s| {
                println!(
                    "{} Stored archive {} ({} files)",
                    "✓".green().bold(),
                    s.receipt.cache_id.to_string().yellow(),
                    s.file_count
                );
                println!("  Hash: {}", s.receipt.cache_hash.as_str().cyan());
            })
        }
        ZipCommand::Ls { id } => {
            let listing = require(ctx.service.zip_list(&id, ns)?, id)?;
            ctx.emit(&listing, |l| {
                for file in &l.files {
                    println!("{:>8}  {}", file.size, file.path);
                }
                println!("{} files, {} bytes", l.file_count, l.total_size);
            })
        }
        ZipCommand::Cat { id, path, output } => {
            let bytes = require(ctx.service.zip_get_file(&id, ns, &path)?, &path)?;
            write_payload(&Payload::from(bytes), output.as_deref())
        }
        ZipCommand::Add { id, path, from } => {
            let result = require(ctx.service.zip_add(&id, ns, &path, read_file(&from)?)?, id)?;
            report_single(ctx, &result)
        }
        ZipCommand::Rm { id, path } => {
            let result = require(ctx.service.zip_remove(&id, ns, &path)?, id)?;
            report_single(ctx, &result)
        }
        ZipCommand::Batch { id, ops, best_effort } => {
            let text = std::fs::read_to_string(&ops)
                .with_context(|| format!("failed to read {}", ops.display()))?;
            let mut request: BatchRequest = serde_json::from_str(&text).context("invalid batch file")?;
            if best_effort {
                request.atomic = false;
            }
            let report = require(ctx.service.zip_batch(&id, ns, &request)?, id)?;
            ctx.emit(&report, |r| {
                let mark = if r.committed() { "✓".green().bold() } else { "✗".red().bold() };
                println!("{} Batch {:?}: {} applied, {} failed", mark, r.state, r.operations_applied, r.operations_failed);
                for step in &r.operation_results {
                    match &step.error {
                        Some(error) => println!("  {} {:?} {}: {}", "✗".red(), step.action, step.path, error),
                        None if step.skipped => println!("  {} {:?} {}", "-".dimmed(), step.action, step.path),
                        None => println!("  {} {:?} {}", "✓".green(), step.action, step.path),
                    }
                }
                if r.committed() {
                    println!("  New entry: {}", r.cache_id.to_string().yellow());
                } else if r.rollback_performed {
                    println!("  Rolled back; {} unchanged", r.original_cache_id);
                }
            })?;
            if !report.committed() {
                bail!(report.error_message.unwrap_or_else(|| "batch rejected".into()));
            }
            Ok(())
        }
    }
}

fn report_single(ctx: &Ctx, result: &cask_engine::ZipOperationResult) -> anyhow::Result<()> {
    ctx.emit(result, |r| {
        if r.success {
            println!("{} New entry {}", "✓".green().bold(), r.cache_id.to_string().yellow());
            println!("  From: {}", r.original_cache_id.to_string().dimmed());
        } else {
            println!("{} {}", "✗".red().bold(), r.message);
        }
    })?;
    if !result.success {
        bail!("{}", result.message);
    }
    Ok(())
}

// ---- Service ----

fn cmd_stats(ctx: &Ctx) -> anyhow::Result<()> {
    let stats = ctx.service.namespace_stats(&ctx.namespace)?;
    ctx.emit(&stats, |s| {
        println!("Namespace {}", s.namespace.as_str().bold());
        println!("  Entries: {}", s.entry_count);
        println!("  Hashes:  {}", s.hash_count);
        println!("  Files:   {} ({} bytes)", s.file_count, s.total_bytes);
        println!("  TTL:     {}h", s.ttl_hours);
    })
}

fn cmd_config(ctx: &Ctx) -> anyhow::Result<()> {
    let config = ctx.service.config();
    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}
