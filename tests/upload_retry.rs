use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mockall::Sequence;

use corpus_loader::contract::CorpusUploader;
use corpus_loader::upload::{CorpusClient, CorpusFile, MockCorpusApi, RetryPolicy, UploadError};

/// Retry delays kept at a millisecond so the suite stays fast.
fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        backoff_multiplier: 2.0,
    }
}

fn stored(resource_name: &str, display_name: &str) -> CorpusFile {
    CorpusFile {
        resource_name: resource_name.to_string(),
        display_name: display_name.to_string(),
    }
}

#[tokio::test]
async fn transient_upload_failure_is_retried_until_success() {
    let mut api = MockCorpusApi::new();
    api.expect_list_files().times(1).returning(|| Ok(vec![]));

    let attempts = AtomicUsize::new(0);
    api.expect_upload_file().times(2).returning(move |_, _| {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(UploadError::Transient {
                message: "503 from corpus".to_string(),
            })
        } else {
            Ok(stored("corpora/docs/files/9", "Tracked Doc"))
        }
    });

    let client = CorpusClient::with_retry(api, fast_retry());
    let resource = client
        .upload("Tracked Doc", Path::new("/tmp/artifact.txt"))
        .await
        .expect("upload should succeed on retry");
    assert_eq!(resource, "corpora/docs/files/9");
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let mut api = MockCorpusApi::new();
    api.expect_list_files().times(1).returning(|| Ok(vec![]));
    api.expect_upload_file().times(1).returning(|_, _| {
        Err(UploadError::Permanent {
            message: "400 from corpus".to_string(),
        })
    });

    let client = CorpusClient::with_retry(api, fast_retry());
    let err = client
        .upload("Tracked Doc", Path::new("/tmp/artifact.txt"))
        .await
        .expect_err("permanent failure must surface immediately");
    assert!(!err.is_transient(), "Expected a permanent error: {err:?}");
}

#[tokio::test]
async fn transient_failures_stop_at_the_attempt_bound() {
    let mut api = MockCorpusApi::new();
    api.expect_list_files().times(1).returning(|| Ok(vec![]));
    // times(3) is the assertion: exactly max_attempts calls, then give up.
    api.expect_upload_file().times(3).returning(|_, _| {
        Err(UploadError::Transient {
            message: "still 503".to_string(),
        })
    });

    let client = CorpusClient::with_retry(api, fast_retry());
    let err = client
        .upload("Tracked Doc", Path::new("/tmp/artifact.txt"))
        .await
        .expect_err("exhausted retries must fail");
    assert!(err.is_transient(), "Expected the transient error: {err:?}");
}

#[tokio::test]
async fn existing_artifacts_with_the_same_name_are_deleted_before_upload() {
    let mut api = MockCorpusApi::new();
    let mut seq = Sequence::new();

    api.expect_list_files()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| {
            Ok(vec![
                stored("corpora/docs/files/1", "Tracked Doc"),
                stored("corpora/docs/files/2", "Other Doc"),
                stored("corpora/docs/files/3", "Tracked Doc"),
            ])
        });
    api.expect_delete_file()
        .times(2)
        .in_sequence(&mut seq)
        .withf(|resource: &str| {
            resource == "corpora/docs/files/1" || resource == "corpora/docs/files/3"
        })
        .returning(|_| Ok(()));
    api.expect_upload_file()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(stored("corpora/docs/files/4", "Tracked Doc")));

    let client = CorpusClient::with_retry(api, fast_retry());
    let resource = client
        .upload("Tracked Doc", Path::new("/tmp/artifact.txt"))
        .await
        .expect("replace-if-exists upload should succeed");
    assert_eq!(resource, "corpora/docs/files/4");
}

#[tokio::test]
async fn delete_failure_aborts_before_upload() {
    let mut api = MockCorpusApi::new();
    api.expect_list_files()
        .times(1)
        .returning(|| Ok(vec![stored("corpora/docs/files/1", "Tracked Doc")]));
    api.expect_delete_file().times(1).returning(|_| {
        Err(UploadError::Permanent {
            message: "delete rejected".to_string(),
        })
    });
    // No expect_upload_file: uploading after a failed delete would leave
    // two artifacts under one display name.

    let client = CorpusClient::with_retry(api, fast_retry());
    let err = client
        .upload("Tracked Doc", Path::new("/tmp/artifact.txt"))
        .await
        .expect_err("failed delete must abort the upload");
    assert!(err.to_string().contains("delete rejected"), "got: {err}");
}
