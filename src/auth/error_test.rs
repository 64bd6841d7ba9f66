use super::*;

const TABLE: &[(&str, AuthErrorKind)] = &[
    (codes::INVALID_EMAIL, AuthErrorKind::InvalidEmail),
    (codes::EMAIL_IN_USE, AuthErrorKind::EmailInUse),
    (codes::WEAK_PASSWORD, AuthErrorKind::WeakPassword),
    (codes::USER_DISABLED, AuthErrorKind::UserDisabled),
    (codes::USER_NOT_FOUND, AuthErrorKind::UserNotFound),
    (codes::WRONG_PASSWORD, AuthErrorKind::WrongPassword),
    (codes::TOO_MANY_REQUESTS, AuthErrorKind::TooManyRequests),
    (codes::POPUP_BLOCKED, AuthErrorKind::PopupBlocked),
    (codes::POPUP_CLOSED_BY_USER, AuthErrorKind::PopupClosedByUser),
    (codes::CANCELLED_POPUP_REQUEST, AuthErrorKind::CancelledRequest),
];

#[test]
fn every_known_code_maps_to_its_kind() {
    for (code, kind) in TABLE {
        assert_eq!(AuthErrorKind::from_code(code), *kind, "{code}");
        let err = AuthError::from(ProviderError::new(*code, "provider text"));
        assert_eq!(err.kind(), *kind);
        assert_eq!(err.message(), kind.message());
        assert_eq!(err.provider_code(), Some(*code));
    }
}

#[test]
fn unmapped_codes_are_unknown_and_keep_provider_text_as_diagnostic() {
    for code in [codes::INVALID_CREDENTIAL, codes::NETWORK_REQUEST_FAILED, "auth/brand-new", "", "EMAIL_EXISTS"] {
        let err = AuthError::from(ProviderError::new(code, "raw diagnostic"));
        assert_eq!(err.kind(), AuthErrorKind::Unknown, "{code}");
        assert_eq!(err.to_string(), "Something went wrong. Please try again");
        assert_eq!(err.diagnostic(), "raw diagnostic");
    }
}

#[test]
fn bare_server_token_is_never_displayed() {
    let err = AuthError::from(ProviderError::new(codes::INVALID_CREDENTIAL, "INVALID_LOGIN_CREDENTIALS"));
    assert_eq!(err.message(), "Something went wrong. Please try again");
    assert!(!err.to_string().contains("INVALID_LOGIN_CREDENTIALS"));
    assert_eq!(err.diagnostic(), "INVALID_LOGIN_CREDENTIALS");
}

#[test]
fn diagnostic_falls_back_to_code_then_message() {
    let err = AuthError::from(ProviderError::new("auth/whatever", "   "));
    assert_eq!(err.kind(), AuthErrorKind::Unknown);
    assert_eq!(err.message(), "Something went wrong. Please try again");
    assert_eq!(err.diagnostic(), "auth/whatever");

    let err = AuthError::from(ProviderError::new("", ""));
    assert_eq!(err.diagnostic(), "Something went wrong. Please try again");
}

#[test]
fn display_is_the_user_message() {
    let err = AuthError::from(ProviderError::new(codes::WRONG_PASSWORD, "INVALID_PASSWORD"));
    assert_eq!(err.to_string(), "Incorrect password");
}

#[test]
fn messages_and_codes_are_never_blank() {
    let kinds = TABLE
        .iter()
        .map(|(_, kind)| *kind)
        .chain([AuthErrorKind::ProfileUpdateFailed, AuthErrorKind::Unknown]);
    for kind in kinds {
        assert!(!kind.message().is_empty());
        assert!(kind.error_code().starts_with("E_"));
    }
}

#[test]
fn profile_update_failed_keeps_provider_code() {
    let err = AuthError::profile_update_failed(ProviderError::network("offline"));
    assert_eq!(err.kind(), AuthErrorKind::ProfileUpdateFailed);
    assert_eq!(err.provider_code(), Some(codes::NETWORK_REQUEST_FAILED));
}

#[test]
fn retryable_kinds() {
    assert!(AuthErrorKind::TooManyRequests.retryable());
    assert!(AuthErrorKind::CancelledRequest.retryable());
    assert!(!AuthErrorKind::WrongPassword.retryable());
    assert!(!AuthErrorKind::Unknown.retryable());
}
