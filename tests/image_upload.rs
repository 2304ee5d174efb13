use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Multipart},
    http::{Request, StatusCode},
    routing::post,
};
use tower::ServiceExt;
use shop_catalog_api::{
    error::AppError,
    services::product_image_service::{
        AcceptedImage, MAX_IMAGE_BYTES, MAXIMUM_IMAGE_PER_PRODUCT, UploadedFile, ensure_capacity,
        store_all, validate_images,
    },
    storage::{FileStorage, LocalFileStorage},
};

fn jpeg(name: &str, size: usize) -> UploadedFile {
    UploadedFile {
        file_name: Some(name.to_string()),
        content_type: Some("image/jpeg".to_string()),
        bytes: Bytes::from(vec![0xFF_u8; size]),
    }
}

#[test]
fn two_valid_jpegs_are_accepted() {
    let accepted = validate_images(vec![jpeg("a.jpg", 2048), jpeg("b.jpg", 4096)]).unwrap();

    assert_eq!(accepted.len(), 2);
    assert_eq!(accepted[0].file_name, "a.jpg");
    assert_eq!(accepted[1].bytes.len(), 4096);
}

#[test]
fn missing_file_list_is_a_no_op() {
    assert!(validate_images(Vec::new()).unwrap().is_empty());
}

#[test]
fn too_many_files_reject_the_whole_request() {
    let files = (0..=MAXIMUM_IMAGE_PER_PRODUCT)
        .map(|i| jpeg(&format!("{i}.jpg"), 10))
        .collect();

    assert!(matches!(validate_images(files), Err(AppError::BadRequest(_))));
}

#[test]
fn empty_files_are_skipped() {
    let files = vec![
        jpeg("a.jpg", 10),
        UploadedFile::default(),
        jpeg("empty.jpg", 0),
        jpeg("b.jpg", 10),
    ];
    let accepted = validate_images(files).unwrap();

    let names: Vec<&str> = accepted.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg"]);
}

#[test]
fn oversized_file_fails_with_size_error() {
    let files = vec![jpeg("ok.jpg", 10), jpeg("huge.jpg", MAX_IMAGE_BYTES + 1)];
    assert!(matches!(
        validate_images(files),
        Err(AppError::PayloadTooLarge(_))
    ));
}

#[test]
fn file_of_exactly_ten_mib_is_allowed() {
    assert_eq!(
        validate_images(vec![jpeg("edge.jpg", MAX_IMAGE_BYTES)])
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn non_image_content_type_fails_with_type_error() {
    let mut pdf = jpeg("doc.pdf", 10);
    pdf.content_type = Some("application/pdf".into());
    assert!(matches!(
        validate_images(vec![pdf]),
        Err(AppError::UnsupportedMediaType(_))
    ));

    let mut untyped = jpeg("blob", 10);
    untyped.content_type = None;
    assert!(matches!(
        validate_images(vec![untyped]),
        Err(AppError::UnsupportedMediaType(_))
    ));
}

#[test]
fn first_failing_file_decides_the_error() {
    let mut text = jpeg("notes.txt", 10);
    text.content_type = Some("text/plain".into());
    let files = vec![text, jpeg("huge.jpg", MAX_IMAGE_BYTES + 1)];

    assert!(matches!(
        validate_images(files),
        Err(AppError::UnsupportedMediaType(_))
    ));
}

#[test]
fn capacity_counts_existing_images() {
    assert!(ensure_capacity(0, MAXIMUM_IMAGE_PER_PRODUCT).is_ok());
    assert!(ensure_capacity(3, 2).is_ok());
    assert!(matches!(
        ensure_capacity(4, 2),
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn local_storage_writes_and_removes_files() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalFileStorage::new(dir.path());

    let images = vec![
        AcceptedImage {
            file_name: "front view.jpg".into(),
            bytes: Bytes::from_static(b"front"),
        },
        AcceptedImage {
            file_name: "back.jpg".into(),
            bytes: Bytes::from_static(b"back"),
        },
    ];
    let references = store_all(&storage, &images).await.unwrap();

    assert_eq!(references.len(), 2);
    assert!(references[0].ends_with("_front_view.jpg"));
    let stored = tokio::fs::read(dir.path().join(&references[1])).await.unwrap();
    assert_eq!(stored, b"back");

    storage.remove(&references[0]).await.unwrap();
    assert!(!dir.path().join(&references[0]).exists());
    // removing twice is not an error
    storage.remove(&references[0]).await.unwrap();
}

/// Accepts a fixed number of writes, then fails.
struct FlakyStorage {
    remaining: AtomicUsize,
    removed: Mutex<Vec<String>>,
}

#[async_trait]
impl FileStorage for FlakyStorage {
    async fn store(&self, _bytes: &[u8], suggested_name: &str) -> anyhow::Result<String> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            anyhow::bail!("disk full");
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        Ok(format!("stored-{suggested_name}"))
    }

    async fn remove(&self, reference: &str) -> anyhow::Result<()> {
        self.removed.lock().unwrap().push(reference.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn failed_store_removes_files_written_earlier() {
    let storage = FlakyStorage {
        remaining: AtomicUsize::new(2),
        removed: Mutex::new(Vec::new()),
    };
    let images: Vec<AcceptedImage> = ["a.jpg", "b.jpg", "c.jpg"]
        .iter()
        .map(|name| AcceptedImage {
            file_name: name.to_string(),
            bytes: Bytes::from_static(b"x"),
        })
        .collect();

    let err = store_all(&storage, &images).await.unwrap_err();

    assert!(matches!(err, AppError::Internal(_)));
    assert_eq!(
        *storage.removed.lock().unwrap(),
        vec!["stored-a.jpg".to_string(), "stored-b.jpg".to_string()]
    );
}

async fn drain(mut multipart: Multipart) -> Result<StatusCode, AppError> {
    while let Some(field) = multipart.next_field().await? {
        field.bytes().await?;
    }
    Ok(StatusCode::OK)
}

#[tokio::test]
async fn multipart_body_over_the_limit_is_payload_too_large() {
    let app = Router::new()
        .route("/upload", post(drain))
        .layer(DefaultBodyLimit::max(64));

    let body = format!(
        "--X\r\nContent-Disposition: form-data; name=\"files\"; filename=\"a.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n{}\r\n--X--\r\n",
        "a".repeat(1024)
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header("content-type", "multipart/form-data; boundary=X")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
