use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::product_images::{ProductImageList, ReplaceImageForm, UploadImagesForm},
    error::AppResult,
    middleware::auth::AuthUser,
    models::ProductImage,
    response::ApiResponse,
    routes::params::Pagination,
    services::product_image_service::{self, UploadedFile},
    state::AppState,
};

const FILES_FIELD: &str = "files";
const FILE_FIELD: &str = "file";

pub fn router() -> Router<AppState> {
    Router::new()
        // Size limits for uploads are enforced per file by the service and
        // globally by the request body limit layer.
        .route(
            "/uploads/{id}",
            post(upload_images).layer(DefaultBodyLimit::disable()),
        )
        .route("/images", get(list_images))
        .route(
            "/images/{id}",
            put(replace_image)
                .layer(DefaultBodyLimit::disable())
                .get(get_image)
                .delete(delete_image),
        )
        .route("/{id}/images", get(list_product_images))
}

/// Collects the parts named `name`. Other fields are ignored.
async fn read_files(mut multipart: Multipart, name: &str) -> AppResult<Vec<UploadedFile>> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(name) {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await?;
        files.push(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }
    Ok(files)
}

#[utoipa::path(
    post,
    path = "/api/products/uploads/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body(content = UploadImagesForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Stored images", body = ApiResponse<ProductImageList>),
        (status = 400, description = "Too many images"),
        (status = 404, description = "Product not found"),
        (status = 413, description = "A file exceeds 10MB"),
        (status = 415, description = "A file is not an image"),
    ),
    security(("bearer_auth" = [])),
    tag = "Product Images"
)]
pub async fn upload_images(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<ProductImageList>>> {
    let files = read_files(multipart, FILES_FIELD).await?;
    let resp = product_image_service::upload_images(&state, &user, id, files).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/images",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "All product images", body = ApiResponse<ProductImageList>)
    ),
    tag = "Product Images"
)]
pub async fn list_images(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductImageList>>> {
    let resp = product_image_service::list_images(&state, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/images",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Images of a product", body = ApiResponse<ProductImageList>),
        (status = 404, description = "Product not found"),
    ),
    tag = "Product Images"
)]
pub async fn list_product_images(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductImageList>>> {
    let resp = product_image_service::list_product_images(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/products/images/{id}",
    params(
        ("id" = Uuid, Path, description = "Product image ID")
    ),
    responses(
        (status = 200, description = "Product image", body = ApiResponse<ProductImage>),
        (status = 404, description = "Not Found"),
    ),
    tag = "Product Images"
)]
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductImage>>> {
    let resp = product_image_service::get_image(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/products/images/{id}",
    params(
        ("id" = Uuid, Path, description = "Product image ID")
    ),
    request_body(content = ReplaceImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image with its new file", body = ApiResponse<ProductImage>),
        (status = 400, description = "No file given"),
        (status = 404, description = "Not Found"),
        (status = 413, description = "The file exceeds 10MB"),
        (status = 415, description = "The file is not an image"),
    ),
    security(("bearer_auth" = [])),
    tag = "Product Images"
)]
pub async fn replace_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<ProductImage>>> {
    let file = read_files(multipart, FILE_FIELD).await?.into_iter().next();
    let resp = product_image_service::replace_image(&state, &user, id, file).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/products/images/{id}",
    params(
        ("id" = Uuid, Path, description = "Product image ID")
    ),
    responses(
        (status = 200, description = "Deleted image"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Product Images"
)]
pub async fn delete_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = product_image_service::delete_image(&state, &user, id).await?;
    Ok(Json(resp))
}
