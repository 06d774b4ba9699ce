//! # DID Ledger
//!
//! Command line front end for the DID lifecycle registry and verification ledger. Every
//! invocation restores the node state from its snapshot file, runs one command, prints the
//! result as JSON on stdout and, for mutations, writes the snapshot back.
//!
//! ## Usage
//!
//! ```bash
//! # Write a default config.toml and an empty snapshot
//! did-ledger init
//!
//! # Register a DID and log a verification against it
//! did-ledger register --did did:example:alice --cid bafy... --identity-hash 0x...
//! did-ledger log --did did:example:alice --verification-hash 0x... --confidence HIGH
//!
//! # Act as another principal
//! did-ledger --caller 0xRegistrar deactivate --did did:example:alice
//!
//! # Page through the notification stream
//! did-ledger events --did did:example:alice --from-sequence 10 --limit 20
//! ```
use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use did_ledger::crypto::keys;
use did_ledger::{
    BatchEntry, ConfidenceLevel, Digest, DidRecord, LedgerError, Registration,
    VerificationRecord, MAX_BATCH_SIZE,
};
use did_ledger_node::config::{ensure_default_config, NodeConfig};
use did_ledger_node::logging::init_tracing;
use did_ledger_node::{Node, NodeError};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

/// Command line argument parser for the DID ledger
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Principal to act as, overriding `node.principal`
    #[arg(long, value_name = "PRINCIPAL")]
    caller: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration (if missing) and an empty snapshot
    Init,

    /// Register a new DID
    Register {
        #[arg(long)]
        did: String,
        /// Content reference of the DID's metadata
        #[arg(long)]
        cid: String,
        /// 32-byte identity hash as hex
        #[arg(long)]
        identity_hash: Digest,
    },

    /// Replace the metadata reference and identity hash of an active DID
    Update {
        #[arg(long)]
        did: String,
        #[arg(long)]
        cid: String,
        #[arg(long)]
        identity_hash: Digest,
    },

    Deactivate {
        #[arg(long)]
        did: String,
    },

    Reactivate {
        #[arg(long)]
        did: String,
    },

    /// Whether a DID exists and is active
    Status {
        #[arg(long)]
        did: String,
    },

    /// Full registration record of a DID
    Record {
        #[arg(long)]
        did: String,
    },

    /// Register DIDs read from a JSON array of registrations
    RegisterBatch {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },

    /// Current metadata reference of each given DID
    Cids {
        #[arg(long = "did", required = true)]
        dids: Vec<String>,
    },

    /// Notifications in emission order, optionally limited to one DID
    Events {
        #[arg(long)]
        did: Option<String>,
        /// Lowest sequence reference to include
        #[arg(long, default_value_t = 0)]
        from_sequence: u64,
        /// Matching events to skip, taken from a previous page's `next_offset`
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
        limit: u64,
    },

    /// Append one verification attempt
    Log {
        #[arg(long)]
        did: String,
        #[arg(long)]
        verification_hash: Digest,
        #[arg(long, default_value = "")]
        cid: String,
        /// Level name (LOW, MEDIUM, HIGH, VERY_HIGH) or ordinal 0-3
        #[arg(long, default_value = "MEDIUM")]
        confidence: ConfidenceLevel,
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        success: bool,
    },

    /// Append verification attempts read from a JSON array of entries
    LogBatch {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },

    /// Most recent verification records of a DID, newest first
    Recent {
        #[arg(long)]
        did: String,
        /// Defaults to `ledger.recent_limit`
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check a stored record against a DID and verification hash
    VerifyRecord {
        #[arg(long)]
        record_key: Digest,
        #[arg(long)]
        did: String,
        #[arg(long)]
        verification_hash: Digest,
    },

    /// Lifecycle and verification history of a DID
    Timeline {
        #[arg(long)]
        did: String,
    },

    /// Verification statistics of one DID, or totals when no DID is given
    Stats {
        #[arg(long)]
        did: Option<String>,
    },

    /// Print the key the ledger derives from a string
    Digest {
        #[arg(long, value_enum, default_value_t = DigestKind::Raw)]
        kind: DigestKind,
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DigestKind {
    /// Lookup key of a DID
    Did,
    /// Hash of a metadata content reference
    Cid,
    /// BLAKE3 of the UTF-8 bytes
    Raw,
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.command {
        Commands::Init => ensure_default_config(&cli.config)?,
        _ => NodeConfig::load(&cli.config)?,
    };
    if let Some(caller) = &cli.caller {
        // the registry owner stays with the configured principal
        if config.node.owner.is_none() {
            config.node.owner = Some(config.node.principal.clone());
        }
        config.node.principal = caller.clone();
    }
    config.validate()?;
    Ok(config)
}

fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn record_view(did: &str, record: &DidRecord) -> Value {
    json!({
        "did": did,
        "did_key": keys::did_key(did),
        "metadata_cid": record.metadata_cid,
        "identity_hash": record.identity_hash,
        "registrar": record.registrar,
        "active": record.active,
        "registered_at": format_timestamp(record.registered_at),
        "updated_at": format_timestamp(record.updated_at),
    })
}

fn verification_view(record: &VerificationRecord) -> Value {
    json!({
        "verification_hash": record.verification_hash,
        "metadata_cid_hash": record.metadata_cid_hash,
        "verifier": record.verifier,
        "confidence_level": record.confidence_level,
        "success": record.success,
        "timestamp": format_timestamp(record.timestamp),
        "sequence_number": record.sequence_number,
    })
}

fn run(cli: Cli, config: NodeConfig) -> anyhow::Result<()> {
    let node = Node::open(config)?;
    debug!("Acting as {}", node.caller());

    let caller = node.caller().clone();
    let registry = node.ledger.registry.clone();
    let ledger = node.ledger.ledger.clone();

    match cli.command {
        Commands::Init => {
            if !node.store().exists() {
                node.save()?;
            }
            info!("Node initialized at {}", node.store().path().display());
            print_json(&json!({
                "config": cli.config,
                "snapshot": node.store().path(),
                "owner": registry.owner(),
                "total_dids": registry.total_dids(),
                "total_verifications": ledger.total_verifications(),
            }))?;
        }
        Commands::Register {
            did,
            cid,
            identity_hash,
        } => {
            let did_key = registry.register(&caller, &did, &cid, identity_hash)?;
            node.persist()?;
            print_json(&json!({ "did": did, "did_key": did_key }))?;
        }
        Commands::Update {
            did,
            cid,
            identity_hash,
        } => {
            registry.update(&caller, &did, &cid, identity_hash)?;
            node.persist()?;
            print_json(&record_view(&did, &registry.record(&did)?))?;
        }
        Commands::Deactivate { did } => {
            registry.deactivate(&caller, &did)?;
            node.persist()?;
            print_json(&record_view(&did, &registry.record(&did)?))?;
        }
        Commands::Reactivate { did } => {
            registry.reactivate(&caller, &did)?;
            node.persist()?;
            print_json(&record_view(&did, &registry.record(&did)?))?;
        }
        Commands::Status { did } => {
            let (exists, active) = registry.status(&did);
            print_json(&json!({ "did": did, "exists": exists, "active": active }))?;
        }
        Commands::Record { did } => {
            print_json(&record_view(&did, &registry.record(&did)?))?;
        }
        Commands::RegisterBatch { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read registration file {}", file.display()))?;
            let registrations: Vec<Registration> = serde_json::from_str(&raw).with_context(|| {
                format!("Failed to parse registration file {}", file.display())
            })?;
            let results: Vec<Value> = registry
                .register_many(&caller, &registrations)
                .into_iter()
                .zip(&registrations)
                .map(|(result, entry)| match result {
                    Ok(did_key) => json!({ "did": entry.did, "did_key": did_key }),
                    Err(e) => json!({
                        "did": entry.did,
                        "error": e.kind(),
                        "message": e.to_string(),
                    }),
                })
                .collect();
            node.persist()?;
            print_json(&results)?;
        }
        Commands::Cids { dids } => {
            let cids: Vec<Value> = registry
                .metadata_cids(dids.as_slice())
                .into_iter()
                .map(|(did, cid)| json!({ "did": did, "metadata_cid": cid }))
                .collect();
            print_json(&cids)?;
        }
        Commands::Events {
            did,
            from_sequence,
            offset,
            limit,
        } => {
            let did_key = did.as_deref().map(keys::did_key);
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            let page = node
                .ledger
                .events
                .events_page(from_sequence, did_key.as_ref(), offset, limit);
            print_json(&page)?;
        }
        Commands::Log {
            did,
            verification_hash,
            cid,
            confidence,
            success,
        } => {
            let record_key = ledger.log(
                &caller,
                &did,
                verification_hash,
                &cid,
                confidence.as_u8(),
                success,
            )?;
            node.persist()?;
            print_json(&json!({ "did": did, "record_key": record_key }))?;
        }
        Commands::LogBatch { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read batch file {}", file.display()))?;
            let entries: Vec<BatchEntry> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse batch file {}", file.display()))?;
            let stored = ledger.log_batch(&caller, &entries)?;
            node.persist()?;
            print_json(&json!({
                "submitted": entries.len(),
                "stored": stored,
                "skipped": entries.len() - stored,
                "limit": MAX_BATCH_SIZE,
            }))?;
        }
        Commands::Recent { did, limit } => {
            let limit = limit.unwrap_or(node.config.ledger.recent_limit);
            let records: Vec<Value> = ledger
                .recent(&did, limit)
                .iter()
                .map(verification_view)
                .collect();
            print_json(&json!({
                "did": did,
                "count": ledger.count(&did),
                "records": records,
            }))?;
        }
        Commands::VerifyRecord {
            record_key,
            did,
            verification_hash,
        } => {
            let valid = ledger.verify(&record_key, &did, &verification_hash);
            print_json(&json!({ "record_key": record_key, "valid": valid }))?;
        }
        Commands::Timeline { did } => {
            print_json(&node.ledger.history().timeline(&did)?)?;
        }
        Commands::Stats { did: Some(did) } => {
            print_json(&node.ledger.history().verification_stats(&did)?)?;
        }
        Commands::Stats { did: None } => {
            print_json(&node.ledger.history().overview())?;
        }
        Commands::Digest { kind, value } => {
            let digest = match kind {
                DigestKind::Did => keys::did_key(&value),
                DigestKind::Cid => keys::cid_hash(&value),
                DigestKind::Raw => keys::digest(value.as_bytes()),
            };
            println!("{}", digest);
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            process::exit(2);
        }
    };
    init_tracing(&config.logging)?;

    if let Err(err) = run(cli, config) {
        let kind = error_kind(&err);
        error!(kind, "{:#}", err);
        eprintln!("{}: {:#}", kind, err);
        process::exit(1);
    }
    Ok(())
}

/// Short error name for the CLI, taken from the node or ledger error at the root of `err`
fn error_kind(err: &anyhow::Error) -> &'static str {
    if let Some(node_err) = err.downcast_ref::<NodeError>() {
        return node_err.kind();
    }
    err.downcast_ref::<LedgerError>()
        .map(LedgerError::kind)
        .unwrap_or("error")
}
