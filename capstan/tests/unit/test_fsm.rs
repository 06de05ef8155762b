//! Release state machine

use capstan::errors::CapstanError;
use capstan::release::{ReleaseEvent, ReleaseFsm, ReleaseState};

#[test]
fn test_fsm_initial_state() {
    let fsm = ReleaseFsm::new();
    assert_eq!(fsm.state(), ReleaseState::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.state().is_terminal());
}

#[test]
fn test_fsm_failure_and_rollback() {
    let mut fsm = ReleaseFsm::new();
    fsm.process(ReleaseEvent::Stage).unwrap();
    fsm.process(ReleaseEvent::Fail("ln: permission denied".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), ReleaseState::Failed);
    assert_eq!(fsm.error(), Some("ln: permission denied"));

    fsm.process(ReleaseEvent::RollBack).unwrap();
    assert_eq!(fsm.state(), ReleaseState::RolledBack);
}

#[test]
fn test_fsm_fail_allowed_before_activation_only() {
    for events in [
        vec![],
        vec![ReleaseEvent::Stage],
        vec![ReleaseEvent::Stage, ReleaseEvent::LinkShared],
    ] {
        let mut fsm = ReleaseFsm::new();
        for event in events {
            fsm.process(event).unwrap();
        }
        assert!(fsm.process(ReleaseEvent::Fail("x".into())).is_ok());
    }

    let mut fsm = ReleaseFsm::new();
    fsm.process(ReleaseEvent::Stage).unwrap();
    fsm.process(ReleaseEvent::LinkShared).unwrap();
    fsm.process(ReleaseEvent::Activate).unwrap();
    assert!(matches!(
        fsm.process(ReleaseEvent::Fail("late".into())),
        Err(CapstanError::StateError(_))
    ));
    assert_eq!(fsm.state(), ReleaseState::Activated);
}

#[test]
fn test_fsm_rejects_skipped_steps() {
    let mut fsm = ReleaseFsm::new();
    assert!(fsm.process(ReleaseEvent::LinkShared).is_err());
    assert!(fsm.process(ReleaseEvent::RollBack).is_err());
    assert_eq!(fsm.state(), ReleaseState::Pending);
}

#[test]
fn test_state_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&ReleaseState::SharedLinked).unwrap(),
        "\"shared_linked\""
    );
    assert_eq!(
        serde_json::to_string(&ReleaseState::RolledBack).unwrap(),
        "\"rolled_back\""
    );
}
