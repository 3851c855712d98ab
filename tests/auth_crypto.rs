//! Auth gate and key rotation, end to end.

mod common;

use common::{build_plane, plane_from_yaml, request, NAME_TEMPLATE};
use regency::config::AppConfig;
use regency::crypto::{CipherChain, FernetCipher, SchemeKind};
use regency::discovery::{DiscoveryError, DiscoveryOutcome};
use serde_json::Value;

fn auth_yaml(keys_yaml: &str) -> String {
    format!(
        r#"
sources:
  - type: inline
    config:
      instances:
        - name: a
          service_clusters: [T1]
templates:
  default:
    clusters: "{NAME_TEMPLATE}"
authentication:
  enabled: true
  auth_passwords: [s1]
  encryption_key:
{keys_yaml}
"#
    )
}

fn with_credential(credential: &str) -> regency::discovery::types::DiscoveryRequest {
    let mut req = request("T1", "1.25.3");
    req.node
        .metadata
        .insert("auth".to_string(), Value::String(credential.to_string()));
    req
}

#[tokio::test]
async fn wrong_password_is_rejected_right_password_accepted() {
    let key = CipherChain::generate_key();
    let yaml = auth_yaml(&format!("    - type: aesgcm\n      key: \"{key}\""));
    let config: AppConfig = serde_yaml::from_str(&yaml).unwrap();
    let chain = config.authentication.cipher_chain().unwrap();
    let plane = build_plane(config).await;

    let wrong = chain.encrypt("wrong").unwrap();
    let err = plane
        .engine
        .discover(&with_credential(&wrong), "clusters", "v3", "")
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Unauthorized(_)));

    let right = chain.encrypt("s1").unwrap();
    let outcome = plane
        .engine
        .discover(&with_credential(&right), "clusters", "v3", "")
        .await
        .unwrap();
    assert!(matches!(outcome, DiscoveryOutcome::Fresh(_)));
}

#[tokio::test]
async fn missing_credential_is_rejected() {
    let key = CipherChain::generate_key();
    let yaml = auth_yaml(&format!("    - type: aesgcm\n      key: \"{key}\""));
    let plane = plane_from_yaml(&yaml).await;

    let err = plane
        .engine
        .discover(&request("T1", "1.25.3"), "clusters", "v3", "")
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Unauthorized(_)));
}

#[tokio::test]
async fn garbage_credential_is_rejected() {
    let key = CipherChain::generate_key();
    let yaml = auth_yaml(&format!("    - type: aesgcm\n      key: \"{key}\""));
    let plane = plane_from_yaml(&yaml).await;

    let err = plane
        .engine
        .discover(&with_credential("not-a-ciphertext"), "clusters", "v3", "")
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Unauthorized(_)));
}

#[tokio::test]
async fn rotated_keys_accept_old_credentials() {
    let k1 = CipherChain::generate_key();
    let k2 = CipherChain::generate_key();

    // A credential minted when K2 was primary.
    let old_chain = CipherChain::from_keys(vec![(SchemeKind::AesGcm, k2.clone())]).unwrap();
    let old_credential = old_chain.encrypt("s1").unwrap();

    let yaml = auth_yaml(&format!(
        "    - type: aesgcm\n      key: \"{k1}\"\n    - type: aesgcm\n      key: \"{k2}\""
    ));
    let plane = plane_from_yaml(&yaml).await;

    let outcome = plane
        .engine
        .discover(&with_credential(&old_credential), "clusters", "v3", "")
        .await
        .unwrap();
    assert!(matches!(outcome, DiscoveryOutcome::Fresh(_)));
}

#[tokio::test]
async fn legacy_token_scheme_interoperates_during_migration() {
    let aes_key = CipherChain::generate_key();
    let fernet_key = FernetCipher::generate_key();

    let legacy_chain =
        CipherChain::from_keys(vec![(SchemeKind::Fernet, fernet_key.clone())]).unwrap();
    let legacy_credential = legacy_chain.encrypt("s1").unwrap();

    let yaml = auth_yaml(&format!(
        "    - type: aesgcm\n      key: \"{aes_key}\"\n    - type: fernet\n      key: \"{fernet_key}\""
    ));
    let plane = plane_from_yaml(&yaml).await;

    let outcome = plane
        .engine
        .discover(&with_credential(&legacy_credential), "clusters", "v3", "")
        .await
        .unwrap();
    assert!(matches!(outcome, DiscoveryOutcome::Fresh(_)));
}

#[tokio::test]
async fn key_rotation_changes_version_info() {
    let yaml_a = auth_yaml(&format!(
        "    - type: aesgcm\n      key: \"{}\"",
        CipherChain::generate_key()
    ));
    let yaml_b = auth_yaml(&format!(
        "    - type: aesgcm\n      key: \"{}\"",
        CipherChain::generate_key()
    ));

    let config_a: AppConfig = serde_yaml::from_str(&yaml_a).unwrap();
    let config_b: AppConfig = serde_yaml::from_str(&yaml_b).unwrap();
    let chain_a = config_a.authentication.cipher_chain().unwrap();
    let chain_b = config_b.authentication.cipher_chain().unwrap();
    let plane_a = build_plane(config_a).await;
    let plane_b = build_plane(config_b).await;

    let a = plane_a
        .engine
        .discover(&with_credential(&chain_a.encrypt("s1").unwrap()), "clusters", "v3", "")
        .await
        .unwrap();
    let b = plane_b
        .engine
        .discover(&with_credential(&chain_b.encrypt("s1").unwrap()), "clusters", "v3", "")
        .await
        .unwrap();
    assert_ne!(a.version_info(), b.version_info());
}
