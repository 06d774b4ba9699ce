//! Node configuration and snapshot persistence against a temporary directory

use did_ledger::crypto::keys::did_key;
use did_ledger::{Digest, LedgerError, LedgerEvent, Principal, Registration};
use did_ledger_node::config::{ensure_default_config, NodeConfig};
use did_ledger_node::{Node, NodeError, SnapshotFormat, SnapshotStore};
use tempfile::tempdir;

const ALICE: &str = "did:example:alice";

fn config_in(dir: &std::path::Path, file: &str) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.principal = "0xRegistrar".into();
    config.node.owner = Some("0xOwner".into());
    config.storage.snapshot_path = dir.join(file);
    config
}

#[test]
fn test_config_file_round_trip() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let path = dir.path().join("config.toml");

    let mut config = NodeConfig::default();
    config.node.principal = "0xVerifier".into();
    config.ledger.recent_limit = 4;
    config.logging.format = "json".into();
    config.to_file(&path)?;

    assert_eq!(NodeConfig::from_file(&path)?, config);
    assert_eq!(NodeConfig::load(&path)?, config);
    Ok(())
}

#[test]
fn test_missing_config_file_yields_defaults() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let config = NodeConfig::load(dir.path().join("absent.toml"))?;
    assert_eq!(config, NodeConfig::default());
    Ok(())
}

#[test]
fn test_ensure_default_config_writes_once() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let path = dir.path().join("nested").join("config.toml");

    let created = ensure_default_config(&path)?;
    assert!(path.exists());
    assert_eq!(created, NodeConfig::default());

    let mut edited = created.clone();
    edited.node.principal = "0xEdited".into();
    edited.to_file(&path)?;
    assert_eq!(ensure_default_config(&path)?.node.principal, "0xEdited");
    Ok(())
}

#[test]
fn test_state_survives_reopen() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), "state.snapshot");

    let node = Node::open(config.clone())?;
    assert!(!node.store().exists());
    let registrar = node.caller().clone();
    node.ledger
        .registry
        .register(&registrar, ALICE, "cid-1", Digest::new([1; 32]))?;
    let record_key = node.ledger.ledger.log(
        &registrar,
        ALICE,
        Digest::new([2; 32]),
        "cid-1",
        3,
        true,
    )?;
    node.persist()?;
    assert!(node.store().exists());

    let reopened = Node::open(config)?;
    assert_eq!(reopened.ledger.registry.owner(), &Principal::from("0xOwner"));
    assert_eq!(reopened.ledger.registry.status(ALICE), (true, true));
    assert!(reopened
        .ledger
        .ledger
        .verify(&record_key, ALICE, &Digest::new([2; 32])));
    assert_eq!(reopened.ledger.events.len(), 2);

    // sequence numbering resumes after the persisted events
    reopened.ledger.registry.deactivate(&registrar, ALICE)?;
    let last = reopened.ledger.events.all().last().map(LedgerEvent::sequence);
    assert_eq!(last, Some(3));
    Ok(())
}

#[test]
fn test_json_snapshot_is_readable() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), "state.json");

    let node = Node::open(config)?;
    assert_eq!(node.store().format(), SnapshotFormat::Json);
    node.ledger
        .registry
        .register(node.caller(), ALICE, "cid-1", Digest::new([1; 32]))?;
    node.save()?;

    let raw = std::fs::read_to_string(dir.path().join("state.json"))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    assert_eq!(value["version"], 1);
    assert_eq!(value["events"][0]["did_registered"]["did"], ALICE);

    let loaded = SnapshotStore::new(dir.path().join("state.json")).load()?;
    assert_eq!(loaded, Some(node.ledger.snapshot()));
    Ok(())
}

#[test]
fn test_autosave_disabled_leaves_disk_untouched() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let mut config = config_in(dir.path(), "state.snapshot");
    config.storage.autosave = false;

    let node = Node::open(config)?;
    node.ledger
        .registry
        .register(node.caller(), ALICE, "cid-1", Digest::new([1; 32]))?;
    node.persist()?;
    assert!(!node.store().exists());
    Ok(())
}

#[test]
fn test_corrupt_snapshot_is_reported() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), "state.json");
    std::fs::write(&config.storage.snapshot_path, b"{ not json")?;

    assert!(matches!(Node::open(config), Err(NodeError::Json(_))));
    Ok(())
}

#[test]
fn test_event_pages_after_reopen() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), "state.snapshot");

    let node = Node::open(config.clone())?;
    let registrations: Vec<Registration> = (0..5)
        .map(|n| Registration::new(format!("did:example:{n}"), "cid", Digest::new([n + 1; 32])))
        .collect();
    let results = node
        .ledger
        .registry
        .register_many(node.caller(), &registrations);
    assert!(results.iter().all(Result::is_ok));
    node.save()?;

    let reopened = Node::open(config)?;
    let events = &reopened.ledger.events;

    let first = events.events_page(0, None, 0, 3);
    assert_eq!(first.total, 5);
    assert_eq!(first.next_offset, Some(3));
    let second = events.events_page(0, None, 3, 3);
    assert_eq!(second.events.len(), 2);
    assert_eq!(second.next_offset, None);

    let one = did_key("did:example:2");
    let page = events.events_page(0, Some(&one), 0, 10);
    assert_eq!(page.total, 1);
    assert_eq!(page.events[0].did(), Some("did:example:2"));

    let cids = reopened
        .ledger
        .registry
        .metadata_cids(&["did:example:4", "did:example:missing"]);
    assert_eq!(cids[0].1.as_deref(), Some("cid"));
    assert_eq!(cids[1].1, None);
    Ok(())
}

#[test]
fn test_snapshot_missing_events_is_rejected() -> Result<(), NodeError> {
    let dir = tempdir()?;
    let config = config_in(dir.path(), "state.json");

    let node = Node::open(config.clone())?;
    node.ledger
        .registry
        .register(node.caller(), ALICE, "cid-1", Digest::new([1; 32]))?;
    let mut snapshot = node.ledger.snapshot();
    snapshot.events.clear();
    node.store().save(&snapshot)?;

    assert!(matches!(
        Node::open(config),
        Err(NodeError::Ledger(LedgerError::CorruptSnapshot(_)))
    ));
    Ok(())
}
