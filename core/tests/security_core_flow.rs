mod support;

use bastion_core::{
    error::SecurityError,
    models::ViolationKind,
    LoginAttempt, SecurityCore, StoredCredential,
};
use serde_json::{json, Map};

const PASSWORD: &str = "Correct-Horse#42";

fn attempt(core: &SecurityCore, password: &str, ip: &str) -> LoginAttempt {
    LoginAttempt {
        identifier: "alice@example.com".to_string(),
        ip_address: ip.to_string(),
        user_agent: Some("integration-test".to_string()),
        password: password.to_string(),
        credential: Some(StoredCredential {
            user_id: "user-1".to_string(),
            password_hash: core.hasher.hash(PASSWORD).expect("hash"),
        }),
        claims: json!({ "role": "employee" }).as_object().cloned().unwrap(),
    }
}

#[tokio::test]
async fn successful_login_is_audited_and_usable() {
    let (core, sink) = support::security_core();
    let success = core
        .login(attempt(&core, PASSWORD, "10.0.0.1"))
        .await
        .expect("login");

    assert_eq!(success.user_id, "user-1");
    let user = core
        .authenticate(&success.tokens.access_token, &success.session_id, "10.0.0.1")
        .expect("authenticate");
    assert_eq!(user.claims.extra["role"], "employee");

    core.shutdown().await;
    let audits = sink.audits();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].action, "login");
    assert!(audits[0].success);
    assert_eq!(audits[0].actor.as_deref(), Some("alice@example.com"));
    assert_eq!(audits[0].user_agent.as_deref(), Some("integration-test"));
}

#[tokio::test]
async fn repeated_failures_lock_before_password_check() {
    let (core, sink) = support::security_core();

    for _ in 0..5 {
        let result = core.login(attempt(&core, "wrong-password", "10.0.0.9")).await;
        assert!(matches!(result, Err(SecurityError::InvalidCredentials)));
    }

    // Even the right password is refused while locked.
    let locked = core.login(attempt(&core, PASSWORD, "10.0.0.9")).await;
    match locked {
        Err(SecurityError::Locked { retry_after_secs }) => {
            assert!(retry_after_secs > 0 && retry_after_secs <= 15 * 60);
        }
        other => panic!("expected lockout, got {other:?}"),
    }

    core.shutdown().await;
    let violations = sink.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::BruteForce);
    assert_eq!(violations[0].ip_address, "10.0.0.9");
    assert_eq!(sink.audits().iter().filter(|a| !a.success).count(), 6);
}

#[tokio::test]
async fn success_clears_earlier_failures() {
    let (core, _sink) = support::security_core();
    for _ in 0..4 {
        let _ = core.login(attempt(&core, "wrong-password", "10.0.0.1")).await;
    }
    core.login(attempt(&core, PASSWORD, "10.0.0.1"))
        .await
        .expect("login");
    assert_eq!(core.lockout.attempt_count("alice@example.com"), 0);
}

#[tokio::test]
async fn unknown_account_counts_as_failure() {
    let (core, _sink) = support::security_core();
    let mut unknown = attempt(&core, PASSWORD, "10.0.0.1");
    unknown.credential = None;

    let result = core.login(unknown).await;
    assert!(matches!(result, Err(SecurityError::InvalidCredentials)));
    assert_eq!(core.lockout.attempt_count("alice@example.com"), 1);
}

#[tokio::test]
async fn session_from_another_address_is_refused() {
    let (core, sink) = support::security_core();
    let success = core
        .login(attempt(&core, PASSWORD, "10.0.0.1"))
        .await
        .expect("login");

    let result = core.authenticate(&success.tokens.access_token, &success.session_id, "10.0.0.2");
    assert!(matches!(result, Err(SecurityError::Unauthorized)));

    core.shutdown().await;
    let violations = sink.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::SuspiciousActivity);
}

#[tokio::test]
async fn token_for_another_user_does_not_unlock_a_session() {
    let (core, _sink) = support::security_core();
    let success = core
        .login(attempt(&core, PASSWORD, "10.0.0.1"))
        .await
        .expect("login");
    let foreign = core
        .tokens
        .issue_token_pair("user-2", Map::new())
        .expect("issue");

    let result = core.authenticate(&foreign.access_token, &success.session_id, "10.0.0.1");
    assert!(matches!(result, Err(SecurityError::Unauthorized)));
}

#[tokio::test]
async fn refresh_and_logout() {
    let (core, sink) = support::security_core();
    let success = core
        .login(attempt(&core, PASSWORD, "10.0.0.1"))
        .await
        .expect("login");

    let renewed = core
        .refresh(&success.tokens.refresh_token, Map::new())
        .expect("refresh");
    assert!(core
        .authenticate(&renewed.access_token, &success.session_id, "10.0.0.1")
        .is_ok());

    assert!(core.logout(&success.session_id, "10.0.0.1"));
    assert!(core
        .authenticate(&renewed.access_token, &success.session_id, "10.0.0.1")
        .is_err());

    core.shutdown().await;
    let logout = sink
        .audits()
        .into_iter()
        .find(|a| a.action == "logout")
        .expect("logout audited");
    assert_eq!(logout.actor.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn missing_secrets_fail_fast() {
    let result = bastion_core::Config::from_lookup(|_| None);
    assert!(matches!(result, Err(SecurityError::Configuration(_))));
}
