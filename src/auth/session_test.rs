use super::*;

fn identity() -> Identity {
    Identity {
        uid: "u-1".into(),
        id_token: "secret-token".into(),
        email: Some("a@b.com".into()),
        display_name: Some("Name".into()),
        photo_url: Some("https://img/a.png".into()),
    }
}

#[test]
fn session_from_identity_maps_fields() {
    let session = Session::from(identity());
    assert_eq!(session.uid(), "u-1");
    assert_eq!(session.token().expose(), "secret-token");
    assert_eq!(session.display_name(), Some("Name"));
    assert_eq!(session.avatar_url(), Some("https://img/a.png"));
    assert_eq!(session.email(), Some("a@b.com"));
}

#[test]
fn token_is_never_printed_or_serialized() {
    let session = Session::from(identity());
    assert!(!format!("{session:?}").contains("secret-token"));
    let json = serde_json::to_string(&session).unwrap();
    assert!(!json.contains("secret-token"));
    assert!(json.contains("\"display_name\":\"Name\""));
}

#[test]
fn initial_state_is_pending_and_signed_out() {
    let state = SessionState::default();
    assert!(state.is_pending());
    assert!(state.session().is_none());
    assert_eq!(state.health(), SubscriptionHealth::Live);
}

#[test]
fn settle_clears_pending_and_restores_health() {
    let mut state = SessionState::initial();
    state.reconnecting(2);
    assert_eq!(state.health(), SubscriptionHealth::Reconnecting { attempt: 2 });

    state.settle(Some(Session::from(identity())));
    assert!(!state.is_pending());
    assert!(state.is_signed_in());
    assert_eq!(state.health(), SubscriptionHealth::Live);

    state.settle(None);
    assert!(!state.is_pending());
    assert!(!state.is_signed_in());
}

#[test]
fn lost_clears_session_and_pending() {
    let mut state = SessionState::initial();
    state.settle(Some(Session::from(identity())));
    state.mark_lost();
    assert!(!state.is_pending());
    assert!(state.session().is_none());
    assert_eq!(state.health(), SubscriptionHealth::Lost);
}

#[test]
fn health_serializes_tagged() {
    let json = serde_json::to_value(SubscriptionHealth::Reconnecting { attempt: 1 }).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "reconnecting", "attempt": 1 }));
    let json = serde_json::to_value(SubscriptionHealth::Lost).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "lost" }));
}
