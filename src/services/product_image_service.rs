use axum::body::Bytes;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::product_images::ProductImageList,
    entity::{
        product_images::{
            ActiveModel as ImageActive, Column as ImageCol, Entity as ProductImages,
        },
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::ProductImage,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
    storage::FileStorage,
};

pub const MAXIMUM_IMAGE_PER_PRODUCT: usize = 5;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// One file part of an upload request, as received.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A file that passed validation and is ready to be stored.
#[derive(Debug, Clone)]
pub struct AcceptedImage {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Checks a whole upload batch without side effects.
///
/// Empty parts are dropped. The first oversized or non-image file fails the
/// batch, so nothing is stored unless every file is acceptable.
pub fn validate_images(files: Vec<UploadedFile>) -> AppResult<Vec<AcceptedImage>> {
    if files.len() > MAXIMUM_IMAGE_PER_PRODUCT {
        return Err(AppError::BadRequest(format!(
            "Can't upload more than {MAXIMUM_IMAGE_PER_PRODUCT} images"
        )));
    }

    let mut accepted = Vec::with_capacity(files.len());
    for file in files {
        if file.bytes.is_empty() {
            continue;
        }
        if file.bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::PayloadTooLarge(
                "File is too large! Maximum size is 10MB".into(),
            ));
        }
        let is_image = file
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"));
        if !is_image {
            return Err(AppError::UnsupportedMediaType(
                "File must be an image".into(),
            ));
        }
        accepted.push(AcceptedImage {
            file_name: file.file_name.unwrap_or_else(|| "image".into()),
            bytes: file.bytes,
        });
    }
    Ok(accepted)
}

/// A product never holds more than [`MAXIMUM_IMAGE_PER_PRODUCT`] images.
pub fn ensure_capacity(existing: usize, incoming: usize) -> AppResult<()> {
    if existing + incoming > MAXIMUM_IMAGE_PER_PRODUCT {
        return Err(AppError::BadRequest(format!(
            "Product already has {existing} images, at most {MAXIMUM_IMAGE_PER_PRODUCT} allowed"
        )));
    }
    Ok(())
}

/// Writes every image to storage. If any write fails, the files written so
/// far are removed again before the error is returned.
pub async fn store_all(
    storage: &dyn FileStorage,
    images: &[AcceptedImage],
) -> AppResult<Vec<String>> {
    let mut references = Vec::with_capacity(images.len());
    for image in images {
        match storage.store(&image.bytes, &image.file_name).await {
            Ok(reference) => references.push(reference),
            Err(err) => {
                discard(storage, &references).await;
                return Err(AppError::Internal(err));
            }
        }
    }
    Ok(references)
}

/// Best-effort removal of stored files.
pub async fn discard(storage: &dyn FileStorage, references: &[String]) {
    for reference in references {
        if let Err(err) = storage.remove(reference).await {
            tracing::warn!(error = %err, reference = %reference, "failed to remove stored file");
        }
    }
}

pub async fn upload_images(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    files: Vec<UploadedFile>,
) -> AppResult<ApiResponse<ProductImageList>> {
    ensure_admin(user)?;

    // Row lock on the product serializes concurrent uploads for it, so the
    // count below cannot go stale before the inserts commit.
    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(product_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    let accepted = validate_images(files)?;
    if accepted.is_empty() {
        txn.commit().await?;
        return Ok(ApiResponse::success(
            "No images uploaded",
            ProductImageList { items: Vec::new() },
            Some(Meta::empty()),
        ));
    }

    let existing = ProductImages::find()
        .filter(ImageCol::ProductId.eq(product.id))
        .count(&txn)
        .await? as usize;
    ensure_capacity(existing, accepted.len())?;

    let storage = state.storage.as_ref();
    let references = store_all(storage, &accepted).await?;

    let images = match insert_images(&txn, product.id, &references).await {
        Ok(images) => images,
        Err(err) => {
            discard(storage, &references).await;
            return Err(err);
        }
    };
    if let Err(err) = txn.commit().await {
        discard(storage, &references).await;
        return Err(err.into());
    }

    tracing::info!(product_id = %product.id, count = images.len(), "product images uploaded");
    audit::record(
        &state.pool,
        user.user_id,
        "product_images_upload",
        "product_images",
        serde_json::json!({ "product_id": product.id, "count": images.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Images uploaded",
        ProductImageList { items: images },
        Some(Meta::empty()),
    ))
}

async fn insert_images<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    references: &[String],
) -> AppResult<Vec<ProductImage>> {
    let mut images = Vec::with_capacity(references.len());
    for reference in references {
        let image = ImageActive {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            url: Set(reference.clone()),
            created_at: NotSet,
        }
        .insert(conn)
        .await?;
        images.push(ProductImage::from(image));
    }
    Ok(images)
}

pub(crate) async fn images_of<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> AppResult<Vec<ProductImage>> {
    let images = ProductImages::find()
        .filter(ImageCol::ProductId.eq(product_id))
        .order_by_asc(ImageCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(ProductImage::from)
        .collect();
    Ok(images)
}

pub async fn list_images(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductImageList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = ProductImages::find().order_by_desc(ImageCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ProductImage::from)
        .collect();

    Ok(ApiResponse::success(
        "Product images",
        ProductImageList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn list_product_images(
    state: &AppState,
    product_id: Uuid,
) -> AppResult<ApiResponse<ProductImageList>> {
    let product = Products::find_by_id(product_id).one(&state.orm).await?;
    if product.is_none() {
        return Err(AppError::NotFound("Product"));
    }

    let items = images_of(&state.orm, product_id).await?;
    Ok(ApiResponse::success(
        "Product images",
        ProductImageList { items },
        Some(Meta::empty()),
    ))
}

pub async fn get_image(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductImage>> {
    let image = ProductImages::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product image"))?;
    Ok(ApiResponse::success(
        "Product image",
        ProductImage::from(image),
        None,
    ))
}

/// Swaps the stored file behind an image. The row stays locked until the new
/// reference commits; the old file is removed only after that.
pub async fn replace_image(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    file: Option<UploadedFile>,
) -> AppResult<ApiResponse<ProductImage>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let image = ProductImages::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Product image"))?;

    let accepted = validate_images(file.into_iter().collect())?;
    if accepted.is_empty() {
        return Err(AppError::BadRequest("An image file is required".into()));
    }

    let storage = state.storage.as_ref();
    let references = store_all(storage, &accepted).await?;
    let previous = image.url.clone();

    let mut active: ImageActive = image.into();
    active.url = Set(references[0].clone());
    let updated = match active.update(&txn).await {
        Ok(updated) => updated,
        Err(err) => {
            discard(storage, &references).await;
            return Err(err.into());
        }
    };
    if let Err(err) = txn.commit().await {
        discard(storage, &references).await;
        return Err(err.into());
    }
    discard(storage, std::slice::from_ref(&previous)).await;

    audit::record(
        &state.pool,
        user.user_id,
        "product_image_replace",
        "product_images",
        serde_json::json!({ "image_id": updated.id, "product_id": updated.product_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Image replaced",
        ProductImage::from(updated),
        Some(Meta::empty()),
    ))
}

pub async fn delete_image(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let image = ProductImages::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product image"))?;

    ProductImages::delete_by_id(image.id)
        .exec(&state.orm)
        .await?;
    discard(state.storage.as_ref(), std::slice::from_ref(&image.url)).await;

    audit::record(
        &state.pool,
        user.user_id,
        "product_image_delete",
        "product_images",
        serde_json::json!({ "image_id": image.id, "product_id": image.product_id }),
    )
    .await;

    Ok(ApiResponse::done("Deleted"))
}
