use extraction_client::{fallback_token, fingerprint, ClientEnvironment};

fn desktop() -> ClientEnvironment {
    ClientEnvironment {
        user_agent: "Mozilla/5.0".to_string(),
        locale: "en-US".to_string(),
        screen: Some((1920, 1080)),
        color_depth: Some(24),
        timezone: "Europe/Stockholm".to_string(),
    }
}

#[test]
fn fingerprint_is_stable_sha256_hex() {
    let first = fingerprint(&desktop());
    let second = fingerprint(&desktop());
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn fingerprint_changes_with_environment() {
    let mut other = desktop();
    other.screen = Some((1280, 720));
    assert_ne!(fingerprint(&desktop()), fingerprint(&other));
}

#[test]
fn empty_environment_uses_fallback_token() {
    let token = fingerprint(&ClientEnvironment::default());
    let (millis, random) = token.split_once('_').expect("millis_random");
    assert!(millis.parse::<i64>().is_ok());
    assert_eq!(random.len(), 8);
    assert_ne!(fallback_token(), fallback_token());
}

#[test]
fn detected_environment_is_never_empty() {
    let environment = ClientEnvironment::detect();
    assert!(!environment.user_agent.is_empty());
    assert_eq!(fingerprint(&environment).len(), 64);
}
