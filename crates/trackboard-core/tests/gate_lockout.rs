use chrono::{DateTime, Duration};
use tempfile::TempDir;
use trackboard_core::clock::ManualClock;
use trackboard_core::gate::{
    ATTEMPTS_KEY, AccessGate, FileStorage, GateConfig, GateError, KeyValueStorage, MemoryStorage,
};

fn clock() -> ManualClock {
    ManualClock::new(DateTime::from_timestamp(1_750_000_000, 0).unwrap())
}

#[test]
fn lockout_survives_a_new_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gate.json");
    let clock = clock();

    let first = AccessGate::with_clock(
        GateConfig::default(),
        MemoryStorage::new(),
        FileStorage::new(&path),
        clock.clone(),
    );
    for _ in 0..3 {
        first.login("guess").unwrap_err();
    }

    // A fresh session scope shares only the durable file.
    let second = AccessGate::with_clock(
        GateConfig::default(),
        MemoryStorage::new(),
        FileStorage::new(&path),
        clock.clone(),
    );
    assert!(second.is_locked());
    assert_eq!(second.attempts_used(), 3);
    assert!(matches!(second.login("tester"), Err(GateError::Locked { .. })));
    assert_eq!(second.attempts_used(), 3);

    clock.advance(Duration::minutes(5));
    second.login("tester").unwrap();
    assert!(second.is_authenticated());
    assert!(!first.is_authenticated());
    assert_eq!(FileStorage::new(&path).get(ATTEMPTS_KEY).unwrap(), None);
}

#[test]
fn custom_policy_is_honored() {
    let config = GateConfig {
        password: "hunter2".into(),
        max_attempts: 5,
        lockout: std::time::Duration::from_secs(10),
    };
    let clock = clock();
    let gate = AccessGate::with_clock(config, MemoryStorage::new(), MemoryStorage::new(), clock.clone());

    for expected in (1..5).rev() {
        match gate.login("tester") {
            Err(GateError::InvalidCredential { remaining_attempts }) => {
                assert_eq!(remaining_attempts, expected);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    let locked = gate.login("tester").unwrap_err();
    assert!(matches!(locked, GateError::Locked { remaining } if remaining.as_secs() == 10));

    clock.advance(Duration::seconds(10));
    gate.login("hunter2").unwrap();
}
