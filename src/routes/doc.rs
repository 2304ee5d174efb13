use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        orders::{CreateOrderRequest, OrderList, OrderWithDetails},
        product_images::{ProductImageList, ReplaceImageForm, UploadImagesForm},
        products::{CreateProductRequest, ProductList, ProductWithImages, UpdateProductRequest},
    },
    models::{Order, OrderDetail, Product, ProductImage, User},
    response::{ApiResponse, Meta},
    routes::{auth, health, orders, params, product_images, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        auth::login,
        auth::register,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        product_images::upload_images,
        product_images::list_images,
        product_images::list_product_images,
        product_images::get_image,
        product_images::replace_image,
        product_images::delete_image,
        orders::create_order,
        orders::list_orders,
        orders::get_order
    ),
    components(
        schemas(
            User,
            Product,
            ProductImage,
            Order,
            OrderDetail,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            ProductWithImages,
            ProductImageList,
            UploadImagesForm,
            ReplaceImageForm,
            CreateOrderRequest,
            OrderList,
            OrderWithDetails,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<ProductWithImages>,
            ApiResponse<ProductImageList>,
            ApiResponse<ProductImage>,
            ApiResponse<OrderWithDetails>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product endpoints"),
        (name = "Product Images", description = "Product image endpoints"),
        (name = "Orders", description = "Order endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
