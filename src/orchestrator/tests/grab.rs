use super::*;
use crate::error::GrabError;
use crate::types::Event;
use std::fs;

#[tokio::test]
async fn grab_creates_submits_and_emits() {
    let h = harness().await;
    let mut events = h.orchestrator.subscribe();

    let download = h
        .orchestrator
        .grab(movie_request("m1", "Movie.2024.1080p"))
        .await
        .unwrap();

    assert_eq!(download.status(), Status::Downloading);
    assert_eq!(download.external_id.as_deref(), Some("ext-1"));
    assert_eq!(download.release_guid.as_deref(), Some("guid-Movie.2024.1080p"));
    assert!(download.started_at.is_some());

    match events.recv().await.unwrap() {
        Event::Grabbed {
            media, external_id, ..
        } => {
            assert_eq!(media, movie_ref("m1"));
            assert_eq!(external_id, "ext-1");
        }
        other => panic!("expected Grabbed, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_grab_returns_the_existing_row_without_resubmitting() {
    let h = harness().await;

    let first = h
        .orchestrator
        .grab(movie_request("m1", "Movie.2024.1080p"))
        .await
        .unwrap();
    let second = h
        .orchestrator
        .grab(movie_request("m1", "Movie.2024.720p"))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(
        h.adapter.submit_calls.load(Ordering::SeqCst),
        1,
        "duplicate grab must not reach the backend"
    );
}

#[tokio::test]
async fn concurrent_grabs_for_one_item_yield_one_download() {
    let h = harness().await;

    let (a, b) = tokio::join!(
        h.orchestrator.grab(movie_request("m1", "Movie.A")),
        h.orchestrator.grab(movie_request("m1", "Movie.B")),
    );

    assert_eq!(a.unwrap().id, b.unwrap().id);
    let rows = h.db.list_downloads().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn recent_completion_rejects_the_grab() {
    let h = harness().await;

    let id = h
        .db
        .insert_download(&crate::db::NewDownload {
            media: movie_ref("m1"),
            client_id: 1,
            release: movie_request("m1", "Movie.Old").release_info(),
        })
        .await
        .unwrap();
    h.db.mark_completed(id).await.unwrap();

    let err = h
        .orchestrator
        .grab(movie_request("m1", "Movie.New"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Grab(GrabError::AlreadyCompleted { .. })
    ));
}

#[tokio::test]
async fn library_has_file_rejects_the_grab() {
    let h = harness().await;
    *h.store.has_file.lock().unwrap() = true;

    let err = h
        .orchestrator
        .grab(movie_request("m1", "Movie.2024"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Grab(GrabError::AlreadyHasFile { .. })
    ));
}

#[tokio::test]
async fn file_on_disk_self_heals_the_library_and_rejects() {
    let h = harness().await;

    // FlatNaming's expected path for movie m1
    let expected = h.dir.path().join("library").join("movie:m1");
    fs::create_dir_all(expected.parent().unwrap()).unwrap();
    fs::write(&expected, b"video").unwrap();

    let err = h
        .orchestrator
        .grab(movie_request("m1", "Movie.2024"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Grab(GrabError::AlreadyHasFile { .. })
    ));
    assert!(
        *h.store.has_file.lock().unwrap(),
        "has-file flag must be repaired as a side effect"
    );
}

#[tokio::test]
async fn no_enabled_client_rejects_the_grab() {
    let mut disabled = stub_client_config(1);
    disabled.enabled = false;
    let h = harness_with_clients(vec![disabled]).await;

    let err = h
        .orchestrator
        .grab(movie_request("m1", "Movie.2024"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Grab(GrabError::NoClientConfigured)
    ));
}

#[tokio::test]
async fn lowest_priority_value_client_wins() {
    let mut low = stub_client_config(1);
    low.priority = 5;
    let mut high = stub_client_config(2);
    high.priority = 1;
    let h = harness_with_clients(vec![low, high]).await;

    let download = h
        .orchestrator
        .grab(movie_request("m1", "Movie.2024"))
        .await
        .unwrap();
    assert_eq!(download.client_id, 2);
}

#[tokio::test]
async fn submit_failure_marks_the_row_failed_and_surfaces() {
    let h = harness().await;
    *h.adapter.submit_response.lock().unwrap() = Err("backend said no".to_string());

    let err = h
        .orchestrator
        .grab(movie_request("m1", "Movie.2024"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Grab(GrabError::ClientSubmitFailed { .. })
    ));

    let rows = h.db.list_downloads().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status(), Status::Failed);
    assert!(
        rows[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("backend said no")
    );
}
