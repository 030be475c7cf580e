//! Resource reads and writes on behalf of extensions.

use std::collections::HashSet;

use exthost_core::ExtensionError;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::BrokerContext;
use crate::host::{ProjectType, ResourceContent};

fn content_json(content: ResourceContent) -> Value {
    json!({
        "encoding": if content.encoded { "base64" } else { "" },
        "content": content.content,
    })
}

/// `{encoding, content}` of the workspace source or page resource at `url`.
pub async fn resource_content(broker: &BrokerContext, url: &str) -> Result<Value, ExtensionError> {
    let host = &broker.host;
    let content = if host.workspace.source_for_url(url).is_some() {
        host.workspace.source_content(url).await
    } else if host.page.resource_for_url(url).is_some() {
        host.page.resource_content(url).await
    } else {
        return Err(ExtensionError::not_found(url));
    };
    Ok(content_json(content.unwrap_or(ResourceContent {
        content: None,
        encoded: false,
    })))
}

/// `{encoding, content}` of the response body of request `id`.
pub async fn request_content(broker: &BrokerContext, id: &Value) -> Result<Value, ExtensionError> {
    let Some(request) = broker.requests.get(id) else {
        let what = id.as_str().map_or_else(|| id.to_string(), str::to_owned);
        return Err(ExtensionError::not_found(what));
    };
    let content = broker
        .host
        .network
        .request_content(&request)
        .await
        .unwrap_or(ResourceContent {
            content: None,
            encoded: false,
        });
    Ok(content_json(content))
}

/// Replace the working copy of `url`, optionally committing it.
///
/// Only documents, scripts and stylesheets known to the workspace are
/// editable. Anything else is not supported if the page knows the URL as a
/// resource, and not found otherwise.
pub fn set_resource_content(
    broker: &BrokerContext,
    url: &str,
    content: &str,
    commit: bool,
) -> Result<(), ExtensionError> {
    let host = &broker.host;
    let editable = host
        .workspace
        .source_for_url(url)
        .is_some_and(|s| s.resource.kind.is_document_or_script_or_stylesheet());
    if !editable {
        if host.page.resource_for_url(url).is_none() {
            return Err(ExtensionError::not_found(url));
        }
        return Err(ExtensionError::not_supported("Resource is not editable"));
    }

    host.workspace
        .set_working_copy(url, content)
        .map_err(ExtensionError::failed)?;
    if commit {
        host.workspace
            .commit_working_copy(url)
            .map_err(ExtensionError::failed)?;
    }
    debug!(url, commit, "resource content replaced");
    Ok(())
}

/// Network and content-script sources plus every frame resource, one entry
/// per URL; the first occurrence wins.
pub fn page_resources(broker: &BrokerContext) -> Vec<Value> {
    let host = &broker.host;
    let candidates = host
        .workspace
        .sources_for_project(ProjectType::Network)
        .into_iter()
        .chain(host.workspace.sources_for_project(ProjectType::ContentScripts))
        .chain(host.page.frame_resources());

    let mut seen: HashSet<String> = HashSet::new();
    candidates
        .filter(|resource| seen.insert(resource.url.clone()))
        .map(|resource| resource.to_json())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::make_test_context_with;
    use crate::host::{NetworkRequest, ResourceType};
    use crate::memory::MemoryHost;

    #[tokio::test]
    async fn source_content_preferred_over_page_resource() {
        let host = MemoryHost::new();
        host.add_source("https://a.example/app.js", ResourceType::Script, ProjectType::Network, "src");
        host.add_frame_resource("https://a.example/app.js", ResourceType::Script, "res");
        host.add_frame_resource("https://a.example/logo.png", ResourceType::Image, "png");
        let (ctx, _host) = make_test_context_with(host);
        assert_eq!(
            resource_content(&ctx, "https://a.example/app.js").await.unwrap(),
            json!({"encoding": "", "content": "src"})
        );
        assert_eq!(
            resource_content(&ctx, "https://a.example/logo.png").await.unwrap()["content"],
            "png"
        );
        assert_eq!(
            resource_content(&ctx, "https://a.example/missing").await.unwrap_err(),
            ExtensionError::not_found("https://a.example/missing")
        );
    }

    #[tokio::test]
    async fn request_content_by_tracked_id() {
        let host = MemoryHost::new();
        let request = NetworkRequest {
            id: "host-1".into(),
            url: "https://a.example/api".into(),
            method: "GET".into(),
            status: Some(200),
            mime_type: Some("application/json".into()),
        };
        host.add_request(request.clone(), Some("{}"));
        let (ctx, _host) = make_test_context_with(host);
        let id = ctx.requests.id_for(&request);
        assert_eq!(
            request_content(&ctx, &json!(id)).await.unwrap(),
            json!({"encoding": "", "content": "{}"})
        );
        assert_eq!(
            request_content(&ctx, &json!(42)).await.unwrap_err(),
            ExtensionError::not_found("42")
        );
    }

    #[test]
    fn only_editable_sources_accept_writes() {
        let host = MemoryHost::new();
        host.add_source("https://a.example/app.js", ResourceType::Script, ProjectType::Network, "old");
        host.add_source("https://a.example/data.json", ResourceType::Fetch, ProjectType::Network, "{}");
        host.add_frame_resource("https://a.example/data.json", ResourceType::Fetch, "{}");
        host.add_source("https://a.example/blob.bin", ResourceType::Other, ProjectType::Network, "");
        host.add_frame_resource("https://a.example/logo.png", ResourceType::Image, "png");
        let (ctx, host) = make_test_context_with(host);

        set_resource_content(&ctx, "https://a.example/app.js", "new", true).unwrap();
        assert_eq!(host.source_state("https://a.example/app.js"), Some((Some("new".into()), None)));

        set_resource_content(&ctx, "https://a.example/app.js", "draft", false).unwrap();
        assert_eq!(
            host.source_state("https://a.example/app.js"),
            Some((Some("new".into()), Some("draft".into())))
        );

        for url in ["https://a.example/data.json", "https://a.example/logo.png"] {
            assert_eq!(
                set_resource_content(&ctx, url, "x", true).unwrap_err(),
                ExtensionError::not_supported("Resource is not editable")
            );
        }
        for url in ["https://a.example/nope.js", "https://a.example/blob.bin"] {
            assert_eq!(
                set_resource_content(&ctx, url, "x", true).unwrap_err(),
                ExtensionError::not_found(url)
            );
        }
    }

    #[test]
    fn page_resources_are_deduplicated() {
        let host = MemoryHost::new();
        host.add_source("https://a.example/app.js", ResourceType::Script, ProjectType::Network, "");
        host.add_source("chrome-extension://x/cs.js", ResourceType::Script, ProjectType::ContentScripts, "");
        host.add_source("file:///local.js", ResourceType::Script, ProjectType::FileSystem, "");
        host.add_frame_resource("https://a.example/app.js", ResourceType::Script, "");
        host.add_frame_resource("https://a.example/", ResourceType::Document, "");
        host.add_frame_resource("https://a.example/logo.png", ResourceType::Image, "");
        let (ctx, _host) = make_test_context_with(host);
        let urls: Vec<String> = page_resources(&ctx)
            .iter()
            .map(|r| r["url"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://a.example/app.js",
                "chrome-extension://x/cs.js",
                "https://a.example/",
                "https://a.example/logo.png",
            ]
        );
    }
}
