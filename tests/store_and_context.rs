//! Store consistency and context-pruning behaviour across the pipeline.

mod common;

use common::{plane_from_yaml, request};
use regency::discovery::DiscoveryOutcome;

#[tokio::test]
async fn a_request_sees_exactly_one_generation() {
    let plane = plane_from_yaml(&common::baseline_yaml()).await;
    let first = plane.poller.snapshot();
    let second = plane.poller.snapshot();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(first.generation, second.generation);
}

fn context_yaml(dir: &std::path::Path) -> String {
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
    clusters: "inline+jinja://resources: [{{name: {{{{ greeting }}}}}}]"
template_context:
  context:
    greeting: "file://{dir}/greeting.yaml"
    unrelated: "file://{dir}/unrelated.yaml"
"#,
        dir = dir.display()
    )
}

#[tokio::test]
async fn unrelated_context_churn_does_not_move_the_version() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greeting.yaml"), "hello\n").unwrap();
    std::fs::write(dir.path().join("unrelated.yaml"), "one\n").unwrap();

    let plane = plane_from_yaml(&context_yaml(dir.path())).await;
    let before = plane
        .engine
        .discover(&request("T1", "1.25.3"), "clusters", "v3", "")
        .await
        .unwrap();

    // Swap the entry the template never references.
    std::fs::write(dir.path().join("unrelated.yaml"), "two\n").unwrap();
    plane.engine.context().refresh("unrelated").await.unwrap();

    let after = plane
        .engine
        .discover(&request("T1", "1.25.3"), "clusters", "v3", "")
        .await
        .unwrap();
    assert_eq!(before.version_info(), after.version_info());
}

#[tokio::test]
async fn referenced_context_changes_move_the_version_and_the_body() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greeting.yaml"), "hello\n").unwrap();
    std::fs::write(dir.path().join("unrelated.yaml"), "one\n").unwrap();

    let plane = plane_from_yaml(&context_yaml(dir.path())).await;
    let before = plane
        .engine
        .discover(&request("T1", "1.25.3"), "clusters", "v3", "")
        .await
        .unwrap();

    std::fs::write(dir.path().join("greeting.yaml"), "goodbye\n").unwrap();
    plane.engine.context().refresh("greeting").await.unwrap();

    let after = plane
        .engine
        .discover(&request("T1", "1.25.3"), "clusters", "v3", "")
        .await
        .unwrap();
    assert_ne!(before.version_info(), after.version_info());

    let DiscoveryOutcome::Fresh(response) = after else {
        panic!("expected a response");
    };
    assert_eq!(common::resource_names(&response.body), ["goodbye"]);
}

#[tokio::test]
async fn prior_context_value_survives_failed_refresh_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greeting.yaml"), "hello\n").unwrap();
    std::fs::write(dir.path().join("unrelated.yaml"), "one\n").unwrap();

    let mut config: regency::config::AppConfig =
        serde_yaml::from_str(&context_yaml(dir.path())).unwrap();
    config.template_context.refresh_num_retries = 0;
    let plane = common::build_plane(config).await;

    std::fs::remove_file(dir.path().join("greeting.yaml")).unwrap();
    assert!(plane.engine.context().refresh("greeting").await.is_err());

    let outcome = plane
        .engine
        .discover(&request("T1", "1.25.3"), "clusters", "v3", "")
        .await
        .unwrap();
    let DiscoveryOutcome::Fresh(response) = outcome else {
        panic!("expected a response");
    };
    assert_eq!(common::resource_names(&response.body), ["hello"]);
}
