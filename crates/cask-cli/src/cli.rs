use std::path::PathBuf;

use cask_types::{CacheHash, CacheId, DataType, Namespace, Strategy};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cask",
    about = "Cask — namespaced content-addressable cache",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Cache root directory (overrides the configuration)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[arg(short, long, global = true, default_value = "default")]
    pub namespace: Namespace,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a value
    Put(PutArgs),
    /// Retrieve a value by id or hash
    Get(GetArgs),
    /// Check whether an id or hash is stored
    Exists(LookupArgs),
    /// Delete an entry and all of its files
    Rm(RmArgs),
    /// Show the reference record of an id or hash
    Refs(LookupArgs),
    /// List entry ids (or hashes) in the namespace
    Ls(LsArgs),
    /// Rewrite an entry's content under the same id
    Update(UpdateArgs),
    /// Manage child files attached to an entry
    Data(DataArgs),
    /// Store, inspect, and edit zip archives
    Zip(ZipArgs),
    /// Show namespace statistics
    Stats,
    /// Print the effective configuration
    Config,
}

/// Exactly one payload source.
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct PayloadArgs {
    /// Store a string
    #[arg(long)]
    pub text: Option<String>,
    /// Store a JSON document
    #[arg(long)]
    pub json: Option<String>,
    /// Store a file's bytes as binary
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct PutArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,
    #[arg(short, long, default_value = "direct")]
    pub strategy: Strategy,
    /// Cache key (required by key_based)
    #[arg(short, long)]
    pub key: Option<String>,
    #[arg(long)]
    pub file_id: Option<String>,
    /// Use this hash instead of hashing the payload
    #[arg(long)]
    pub hash: Option<CacheHash>,
    /// Hash only the JSON value at this dot path
    #[arg(long)]
    pub field: Option<String>,
    /// Gzip binary content before storing
    #[arg(long)]
    pub gzip: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct Target {
    pub id: Option<CacheId>,
    #[arg(long)]
    pub hash: Option<CacheHash>,
}

#[derive(Args)]
pub struct GetArgs {
    #[command(flatten)]
    pub target: Target,
    /// Write the content to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct LookupArgs {
    #[command(flatten)]
    pub target: Target,
}

#[derive(Args)]
pub struct RmArgs {
    pub id: CacheId,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(long)]
    pub hashes: bool,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub id: CacheId,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args)]
pub struct DataArgs {
    #[command(subcommand)]
    pub action: DataAction,
}

#[derive(Subcommand)]
pub enum DataAction {
    /// Attach a child file
    Put {
        id: CacheId,
        #[command(flatten)]
        payload: PayloadArgs,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        file_id: Option<String>,
    },
    /// Read a child file
    Get {
        id: CacheId,
        file_id: String,
        #[arg(long)]
        key: Option<String>,
        #[arg(short = 't', long = "type", default_value = "string")]
        data_type: DataType,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List child files
    Ls {
        id: CacheId,
        #[arg(long)]
        key: Option<String>,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Delete one child file
    Rm {
        id: CacheId,
        file_id: String,
        #[arg(long)]
        key: Option<String>,
        #[arg(short = 't', long = "type", default_value = "string")]
        data_type: DataType,
    },
    /// Delete all child files, optionally under one key
    Clear {
        id: CacheId,
        #[arg(long)]
        key: Option<String>,
    },
}

#[derive(Args)]
pub struct ZipArgs {
    #[command(subcommand)]
    pub action: ZipCommand,
}

#[derive(Subcommand)]
pub enum ZipCommand {
    /// Store a zip archive
    Put {
        file: PathBuf,
        #[arg(short, long, default_value = "direct")]
        strategy: Strategy,
        #[arg(short, long)]
        key: Option<String>,
    },
    /// List the files of a stored archive
    Ls { id: CacheId },
    /// Print one file of a stored archive
    Cat {
        id: CacheId,
        path: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Add a file, producing a new entry
    Add {
        id: CacheId,
        path: String,
        /// Local file to add
        #[arg(long)]
        from: PathBuf,
    },
    /// Remove a file, producing a new entry
    Rm { id: CacheId, path: String },
    /// Apply a JSON batch of operations, producing a new entry
    Batch {
        id: CacheId,
        /// JSON file: {"operations": [...], "atomic": true}
        ops: PathBuf,
        /// Commit the steps that succeed even if others fail
        #[arg(long)]
        best_effort: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cask").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parse_defaults() {
        let cli = parse(&["stats"]);
        assert!(matches!(cli.command, Command::Stats));
        assert_eq!(cli.namespace.as_str(), "default");
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.verbose);
        assert!(cli.root.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = parse(&[
            "ls", "--hashes", "-n", "team-a", "--format", "json", "--root", "/tmp/cask", "-v",
            "--config", "cask.toml",
        ]);
        assert_eq!(cli.namespace.as_str(), "team-a");
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/cask")));
        assert_eq!(cli.config, Some(PathBuf::from("cask.toml")));
        assert!(cli.verbose);
        if let Command::Ls(args) = cli.command {
            assert!(args.hashes);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn reject_bad_namespace_and_format() {
        assert!(Cli::try_parse_from(["cask", "stats", "-n", "../up"]).is_err());
        assert!(Cli::try_parse_from(["cask", "stats", "--format", "yaml"]).is_err());
    }

    #[test]
    fn parse_put_text() {
        let cli = parse(&["put", "--text", "hello"]);
        if let Command::Put(args) = cli.command {
            assert_eq!(args.payload.text, Some("hello".into()));
            assert_eq!(args.strategy, Strategy::Direct);
            assert!(!args.gzip);
            assert!(args.key.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_file_gzip_key_file_id() {
        let cli = parse(&[
            "put", "--file", "a.bin", "--gzip", "-s", "key_based", "-k", "reports/q1", "--file-id",
            "summary", "--hash", "2cf24dba5fb0a30e",
        ]);
        if let Command::Put(args) = cli.command {
            assert_eq!(args.payload.file, Some(PathBuf::from("a.bin")));
            assert!(args.gzip);
            assert_eq!(args.strategy, Strategy::KeyBased);
            assert_eq!(args.key, Some("reports/q1".into()));
            assert_eq!(args.file_id, Some("summary".into()));
            assert_eq!(args.hash.unwrap().as_str(), "2cf24dba5fb0a30e");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn put_needs_exactly_one_payload() {
        assert!(Cli::try_parse_from(["cask", "put"]).is_err());
        assert!(Cli::try_parse_from(["cask", "put", "--text", "a", "--json", "{}"]).is_err());
        assert!(Cli::try_parse_from(["cask", "put", "--text", "a", "-s", "sideways"]).is_err());
    }

    #[test]
    fn parse_get_by_id_or_hash() {
        let id = CacheId::new();
        let cli = parse(&["get", &id.to_string(), "-o", "out.txt"]);
        if let Command::Get(args) = cli.command {
            assert_eq!(args.target.id, Some(id));
            assert!(args.target.hash.is_none());
            assert_eq!(args.output, Some(PathBuf::from("out.txt")));
        } else { panic!("wrong command"); }

        let cli = parse(&["get", "--hash", "2cf24dba5fb0a30e"]);
        if let Command::Get(args) = cli.command {
            assert!(args.target.id.is_none());
            assert_eq!(args.target.hash.unwrap().as_str(), "2cf24dba5fb0a30e");
        } else { panic!("wrong command"); }

        assert!(Cli::try_parse_from(["cask", "get"]).is_err());
        let id_text = id.to_string();
        let both = ["cask", "get", id_text.as_str(), "--hash", "2cf24dba5fb0a30e"];
        assert!(Cli::try_parse_from(both).is_err());
    }

    #[test]
    fn parse_data_put() {
        let id = CacheId::new();
        let cli = parse(&[
            "data", "put", &id.to_string(), "--json", r#"{"a":1}"#, "--key", "meta", "--file-id", "info",
        ]);
        if let Command::Data(args) = cli.command {
            if let DataAction::Put { id: parsed, payload, key, file_id } = args.action {
                assert_eq!(parsed, id);
                assert_eq!(payload.json, Some(r#"{"a":1}"#.into()));
                assert_eq!(key, Some("meta".into()));
                assert_eq!(file_id, Some("info".into()));
            } else { panic!("wrong action"); }
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_data_get_and_ls() {
        let id = CacheId::new();
        let cli = parse(&["data", "get", &id.to_string(), "info", "-t", "json"]);
        if let Command::Data(args) = cli.command {
            if let DataAction::Get { file_id, data_type, key, .. } = args.action {
                assert_eq!(file_id, "info");
                assert_eq!(data_type, DataType::Json);
                assert!(key.is_none());
            } else { panic!("wrong action"); }
        } else { panic!("wrong command"); }

        let cli = parse(&["data", "ls", &id.to_string(), "--key", "meta", "-r"]);
        if let Command::Data(args) = cli.command {
            assert!(matches!(args.action, DataAction::Ls { recursive: true, .. }));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_data_rm_defaults_to_string() {
        let id = CacheId::new();
        let cli = parse(&["data", "rm", &id.to_string(), "notes"]);
        if let Command::Data(args) = cli.command {
            assert!(matches!(
                args.action,
                DataAction::Rm { data_type: DataType::String, .. }
            ));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_zip_put() {
        let cli = parse(&["zip", "put", "site.zip", "-s", "temporal_latest"]);
        if let Command::Zip(args) = cli.command {
            if let ZipCommand::Put { file, strategy, key } = args.action {
                assert_eq!(file, PathBuf::from("site.zip"));
                assert_eq!(strategy, Strategy::TemporalLatest);
                assert!(key.is_none());
            } else { panic!("wrong action"); }
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_zip_batch_best_effort() {
        let id = CacheId::new();
        let cli = parse(&["zip", "batch", &id.to_string(), "ops.json", "--best-effort"]);
        if let Command::Zip(args) = cli.command {
            if let ZipCommand::Batch { id: parsed, ops, best_effort } = args.action {
                assert_eq!(parsed, id);
                assert_eq!(ops, PathBuf::from("ops.json"));
                assert!(best_effort);
            } else { panic!("wrong action"); }
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_zip_add_needs_source() {
        let id = CacheId::new();
        let cli = parse(&["zip", "add", &id.to_string(), "docs/readme.md", "--from", "README.md"]);
        if let Command::Zip(args) = cli.command {
            assert!(matches!(args.action, ZipCommand::Add { .. }));
        } else { panic!("wrong command"); }
        let id_text = id.to_string();
        assert!(Cli::try_parse_from(["cask", "zip", "add", id_text.as_str(), "x.txt"]).is_err());
        assert!(Cli::try_parse_from(["cask", "zip", "ls", "not-an-id"]).is_err());
    }
}
