use super::*;

const NOW_MS: i64 = 1_700_000_000_000;

// header.{"exp":1700003600}.sig
const FRESH: &str = "eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjE3MDAwMDM2MDB9.c2ln";

#[test]
fn api_url_joins_without_double_slash() {
    assert_eq!(api_url("http://localhost:8000/", "/api/auth/login"), "http://localhost:8000/api/auth/login");
    assert_eq!(api_url("https://beacon.test", "/api/auth/me"), "https://beacon.test/api/auth/me");
}

#[test]
fn parse_user_defaults_to_placeholder() {
    let user = parse_user(None).unwrap();
    assert_eq!(user.id, "local");
}

#[test]
fn parse_user_reads_json() {
    let user = parse_user(Some(r#"{"id": 12, "first_name": "Amina"}"#)).unwrap();
    assert_eq!(user.id, "12");
    assert_eq!(user.first_name, "Amina");
    assert!(matches!(parse_user(Some("{")), Err(CliError::InvalidJson(_))));
}

#[test]
fn status_report_for_empty_session() {
    let report = status_report(&Session::empty(), NOW_MS);
    assert_eq!(report["authenticated"], json!(false));
    assert_eq!(report["token_valid"], json!(false));
    assert_eq!(report["guard"], "logout");
    assert!(report["expires_in_ms"].is_null());
}

#[test]
fn status_report_for_fresh_session() {
    let session = Session {
        user: Some(User { id: "1".into(), first_name: "Amina".into(), ..User::default() }),
        tokens: Some(AuthTokens::new(FRESH, "r")),
        is_authenticated: true,
    };
    let report = status_report(&session, NOW_MS);
    assert_eq!(report["authenticated"], json!(true));
    assert_eq!(report["user"], "Amina");
    assert_eq!(report["token_valid"], json!(true));
    assert_eq!(report["expires_in_ms"], json!(3_600_000));
    assert_eq!(report["guard"], "stay");
}

#[test]
fn run_token_rejects_malformed_access() {
    assert!(matches!(run_token("not-a-jwt", NOW_MS), Err(CliError::Token(_))));
}

#[tokio::test]
async fn import_logs_in_regardless_of_expiry() {
    let store = SessionStore::default();
    run_import(&store, FRESH.to_owned(), "r".to_owned(), None).unwrap();
    assert!(store.snapshot().is_authenticated);
}

#[tokio::test]
async fn guard_logs_out_expired_import() {
    let store = SessionStore::default();
    // header.{"exp":1}.sig
    run_import(&store, "eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjF9.c2ln".to_owned(), "r".to_owned(), None).unwrap();
    run_guard(&store, "/login").await.unwrap();
    assert_eq!(store.snapshot(), Session::empty());
}
