use std::sync::Arc;

use corpus_loader::contract::{LoaderPlugin, META_LAST_UPDATE, META_SOURCE};
use corpus_loader::plugins::vault_document::{
    strip_html_minimal, DocumentFormat, MockVaultClient, VaultDocument,
};
use corpus_loader::plugins::SourceError;
use corpus_loader::version_store::MockVersionStore;

#[test]
fn strip_html_keeps_headings_lists_and_text() {
    let html = "<h2>Runbook</h2>\
         <p>Check the &amp; sign and &lt;tags&gt;.</p>\
         <ul><li>One</li><li>Two</li></ul>\
         <script>var tracked = true;</script>\
         <style>.x { color: red }</style>";

    let text = strip_html_minimal(html);
    assert!(text.contains("## Runbook"), "got: {text}");
    assert!(text.contains("Check the & sign and <tags>."), "got: {text}");
    assert!(text.contains("- One\n- Two"), "got: {text}");
    assert!(!text.contains("var tracked"), "Scripts must vanish: {text}");
    assert!(!text.contains("color: red"), "Styles must vanish: {text}");
    assert!(!text.contains('<') || text.contains("<tags>"), "No tags survive");
}

#[tokio::test]
async fn markdown_document_passes_through_unchanged() {
    let mut client = MockVaultClient::new();
    client
        .expect_document_version()
        .times(1)
        .returning(|| Ok("2024-06-01T00:00:00+00:00".to_string()));
    client
        .expect_fetch_document()
        .times(1)
        .returning(|| Ok("# Vault Doc\n\nBody text.\n".to_string()));

    let mut store = MockVersionStore::new();
    store
        .expect_is_new_version_available()
        .returning(|_, _| Ok(true));

    let plugin = VaultDocument::new(
        "Vault Doc".to_string(),
        DocumentFormat::Markdown,
        Box::new(client),
        Arc::new(store),
    );
    let result = plugin.run().await;

    assert!(result.success);
    assert!(result.requires_version_update);
    assert_eq!(result.metadata_value(META_SOURCE), Some("vault_document"));
    assert_eq!(
        result.metadata_value(META_LAST_UPDATE),
        Some("2024-06-01T00:00:00+00:00")
    );

    let path = result.file_path.expect("artifact path");
    let content = std::fs::read_to_string(&path).expect("artifact readable");
    assert_eq!(content, "# Vault Doc\n\nBody text.\n");
    std::fs::remove_file(&path).expect("test cleanup");
}

#[tokio::test]
async fn html_document_is_reduced_before_upload() {
    let mut client = MockVaultClient::new();
    client
        .expect_document_version()
        .times(1)
        .returning(|| Ok("2024-06-01T00:00:00+00:00".to_string()));
    client
        .expect_fetch_document()
        .times(1)
        .returning(|| Ok("<h1>Vault Doc</h1><p>Body text.</p>".to_string()));

    let mut store = MockVersionStore::new();
    store
        .expect_is_new_version_available()
        .returning(|_, _| Ok(true));

    let plugin = VaultDocument::new(
        "Vault Doc".to_string(),
        DocumentFormat::Html,
        Box::new(client),
        Arc::new(store),
    );
    let result = plugin.run().await;

    assert!(result.success);
    let path = result.file_path.expect("artifact path");
    let content = std::fs::read_to_string(&path).expect("artifact readable");
    assert!(content.contains("# Vault Doc"), "got: {content}");
    assert!(content.contains("Body text."), "got: {content}");
    assert!(!content.contains("<p>"), "Tags must be stripped: {content}");
    std::fs::remove_file(&path).expect("test cleanup");
}

#[tokio::test]
async fn skips_when_document_version_is_not_new() {
    let mut client = MockVaultClient::new();
    client
        .expect_document_version()
        .times(1)
        .returning(|| Ok("2024-06-01T00:00:00+00:00".to_string()));
    // No expect_fetch_document: a stale document must not be downloaded.

    let mut store = MockVersionStore::new();
    store
        .expect_is_new_version_available()
        .times(1)
        .withf(|name: &str, candidate: &str| {
            name == "Vault Doc" && candidate == "2024-06-01T00:00:00+00:00"
        })
        .returning(|_, _| Ok(false));

    let plugin = VaultDocument::new(
        "Vault Doc".to_string(),
        DocumentFormat::Markdown,
        Box::new(client),
        Arc::new(store),
    );
    let result = plugin.run().await;

    assert!(result.success);
    assert!(result.file_path.is_none());
    assert!(!result.requires_version_update);
}

#[tokio::test]
async fn missing_version_marker_becomes_a_failed_result() {
    let mut client = MockVaultClient::new();
    client
        .expect_document_version()
        .times(1)
        .returning(|| Err(SourceError::MissingVersion));

    let store = MockVersionStore::new();
    let plugin = VaultDocument::new(
        "Vault Doc".to_string(),
        DocumentFormat::Markdown,
        Box::new(client),
        Arc::new(store),
    );
    let result = plugin.run().await;

    assert!(!result.success);
    assert_eq!(result.display_name, "Vault Doc");
    let message = result.error_message.expect("failure carries a message");
    assert!(
        message.contains("did not report a version marker"),
        "got: {message}"
    );
}
