//! A machine rebuilt from its storage file resumes in the last completed state

use ra_fsm::{FireOutcome, FsmStorage, StateMachine};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum Valve {
    Closed,
    Open,
    Service,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Open,
    Close,
    Maintain,
    Ping,
}

fn build(storage: &FsmStorage) -> StateMachine<Valve, Command, u32> {
    let (loader, persister) = storage.bind("valve.main", Valve::Closed);
    let mut m = StateMachine::with_storage(loader, persister).named("valve.main");
    m.configure(Valve::Closed)
        .on_entry(|n: &mut u32| *n += 1)
        .permit(Command::Open, Valve::Open)
        .permit(Command::Maintain, Valve::Service)
        .ignore(Command::Ping);
    m.configure(Valve::Open)
        .on_entry(|n: &mut u32| *n += 1)
        .permit(Command::Close, Valve::Closed)
        .permit_reentry(Command::Open)
        .ignore(Command::Ping);
    m.configure(Valve::Service)
        .permit(Command::Close, Valve::Closed)
        .ignore(Command::Ping);
    m
}

#[test]
fn test_state_survives_rebuild() {
    let dir = TempDir::new().unwrap();
    let storage = FsmStorage::new(dir.path()).child("valve");
    let mut entries = 0;

    let mut first = build(&storage);
    assert_eq!(first.state(), Valve::Closed);

    let sequence = [
        Command::Open,
        Command::Ping,
        Command::Open,
        Command::Close,
        Command::Maintain,
    ];
    for cmd in sequence {
        first.fire(cmd, &mut entries).unwrap();

        let rebuilt = build(&storage);
        assert_eq!(rebuilt.state(), first.state(), "after {:?}", cmd);
    }

    assert_eq!(first.state(), Valve::Service);
    assert_eq!(entries, 3);
}

#[test]
fn test_ignored_trigger_does_not_write() {
    let dir = TempDir::new().unwrap();
    let storage = FsmStorage::new(dir.path());
    let path = storage.path_for("valve.main");

    let mut m = build(&storage);
    assert_eq!(m.fire(Command::Ping, &mut 0).unwrap(), FireOutcome::Ignored);

    // Created empty by the loader, never written
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
}

#[test]
fn test_declared_pairs() {
    let dir = TempDir::new().unwrap();
    let m = build(&FsmStorage::new(dir.path()));
    let declared: usize = [Valve::Closed, Valve::Open, Valve::Service]
        .iter()
        .map(|s| {
            [Command::Open, Command::Close, Command::Maintain, Command::Ping]
                .iter()
                .filter(|c| m.is_declared(*s, **c))
                .count()
        })
        .sum();

    assert_eq!(declared, 8);
    assert!(!m.is_declared(Valve::Closed, Command::Close));
}
