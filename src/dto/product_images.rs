use serde::Serialize;
use utoipa::ToSchema;

use crate::models::ProductImage;

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductImageList {
    #[schema(value_type = Vec<ProductImage>)]
    pub items: Vec<ProductImage>,
}

/// Multipart body of an image upload. Only documents the form for OpenAPI;
/// the handler reads the parts directly.
#[derive(ToSchema)]
pub struct UploadImagesForm {
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

/// Multipart body of an image replacement: a single `file` part.
#[derive(ToSchema)]
pub struct ReplaceImageForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
