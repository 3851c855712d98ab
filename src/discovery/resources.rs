//! Resource post-processing: name filtering and type-URL injection.

use serde_json::Value;

use crate::templates::TemplateError;

/// Filter resources by requested names. An empty request keeps everything.
pub fn filter_resources(
    generated: Vec<Value>,
    requested: &[String],
) -> Result<Vec<Value>, TemplateError> {
    if requested.is_empty() {
        return Ok(generated);
    }
    let mut kept = Vec::new();
    for resource in generated {
        let name = resource_name(&resource)?;
        if requested.iter().any(|r| r == name) {
            kept.push(resource);
        }
    }
    Ok(kept)
}

/// A resource is named by `name`, falling back to `cluster_name`.
pub fn resource_name(resource: &Value) -> Result<&str, TemplateError> {
    resource
        .get("name")
        .or_else(|| resource.get("cluster_name"))
        .and_then(Value::as_str)
        .ok_or_else(|| TemplateError::Parse {
            name: "<resources>".to_string(),
            reason: format!("failed to determine the name or cluster_name of: {resource}"),
        })
}

/// Inject the `@type` discriminator for `(api generation, resource type)`
/// where the template did not set one.
pub fn add_type_urls(api_generation: &str, resource_type: &str, resources: &mut [Value]) {
    let Some(type_url) = type_url(api_generation, resource_type) else {
        return;
    };
    for resource in resources {
        let Some(map) = resource.as_object_mut() else { continue };
        if !map.contains_key("@type") {
            map.insert("@type".to_string(), Value::String(type_url.to_string()));
        }
    }
}

pub fn type_url(api_generation: &str, resource_type: &str) -> Option<&'static str> {
    match (api_generation, resource_type) {
        ("v2", "listeners") => Some("type.googleapis.com/envoy.api.v2.Listener"),
        ("v2", "clusters") => Some("type.googleapis.com/envoy.api.v2.Cluster"),
        ("v2", "endpoints") => Some("type.googleapis.com/envoy.api.v2.ClusterLoadAssignment"),
        ("v2", "secrets") => Some("type.googleapis.com/envoy.api.v2.auth.Secret"),
        ("v2", "routes") => Some("type.googleapis.com/envoy.api.v2.RouteConfiguration"),
        ("v2", "scoped-routes") => {
            Some("type.googleapis.com/envoy.api.v2.ScopedRouteConfiguration")
        }
        ("v3", "listeners") => Some("type.googleapis.com/envoy.config.listener.v3.Listener"),
        ("v3", "clusters") => Some("type.googleapis.com/envoy.config.cluster.v3.Cluster"),
        ("v3", "endpoints") => {
            Some("type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment")
        }
        ("v3", "secrets") => {
            Some("type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret")
        }
        ("v3", "routes") => Some("type.googleapis.com/envoy.config.route.v3.RouteConfiguration"),
        ("v3", "scoped-routes") => {
            Some("type.googleapis.com/envoy.config.route.v3.ScopedRouteConfiguration")
        }
        ("v3", "runtime") => Some("type.googleapis.com/envoy.service.runtime.v3.Runtime"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_request_returns_all() {
        let resources = vec![json!({"name": "a"}), json!({"name": "b"})];
        let kept = filter_resources(resources, &[]).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn named_request_filters() {
        let resources = vec![json!({"name": "a"}), json!({"cluster_name": "b"})];
        let kept = filter_resources(resources, &["b".to_string()]).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["cluster_name"], "b");
    }

    #[test]
    fn unnamed_resource_is_an_error() {
        let resources = vec![json!({"address": "x"})];
        assert!(filter_resources(resources, &["a".to_string()]).is_err());
    }

    #[test]
    fn type_urls_are_injected_when_absent() {
        let mut resources = vec![
            json!({"name": "a"}),
            json!({"name": "b", "@type": "custom"}),
        ];
        add_type_urls("v3", "clusters", &mut resources);
        assert_eq!(
            resources[0]["@type"],
            "type.googleapis.com/envoy.config.cluster.v3.Cluster"
        );
        assert_eq!(resources[1]["@type"], "custom");
    }

    #[test]
    fn unknown_pairs_are_left_alone() {
        let mut resources = vec![json!({"name": "a"})];
        add_type_urls("v3", "bespoke-type", &mut resources);
        assert!(resources[0].get("@type").is_none());
    }
}
