
use crate::db::{Database, NewDownload};
use crate::types::{MediaRef, ReleaseInfo};
use tempfile::NamedTempFile;

pub(super) async fn test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

pub(super) fn movie_ref(id: &str) -> MediaRef {
    MediaRef::Movie {
        movie_id: id.to_string(),
    }
}

pub(super) fn new_download(media: MediaRef, client_id: i64, title: &str) -> NewDownload {
    NewDownload {
        media,
        client_id,
        release: ReleaseInfo {
            guid: Some(format!("guid-{title}")),
            title: title.to_string(),
            download_url: format!("https://indexer.example/{title}.nzb"),
            size_bytes: Some(1024 * 1024),
            indexer: Some("indexer-a".to_string()),
        },
    }
}
