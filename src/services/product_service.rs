use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{CreateProductRequest, ProductList, ProductWithImages, UpdateProductRequest},
    entity::{
        order_details::{Column as DetailCol, Entity as OrderDetails},
        product_images::{Column as ImageCol, Entity as ProductImages},
        products::{ActiveModel, Column, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    services::product_image_service::{discard, images_of},
    state::AppState,
};

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_CATEGORY_LEN: usize = 100;

fn check_name(name: &str, errors: &mut Vec<String>) {
    let name = name.trim();
    if name.is_empty() {
        errors.push("Name is required".to_string());
    } else if name.chars().count() > MAX_NAME_LEN {
        errors.push(format!("Name must be at most {MAX_NAME_LEN} characters"));
    }
}

fn check_category(category: &str, errors: &mut Vec<String>) {
    if category.trim().chars().count() > MAX_CATEGORY_LEN {
        errors.push(format!(
            "Category must be at most {MAX_CATEGORY_LEN} characters"
        ));
    }
}

/// Blank categories are stored as none.
fn normalize_category(category: Option<String>) -> Option<String> {
    category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn check_price(price: i64, errors: &mut Vec<String>) {
    if price < 0 {
        errors.push("Price must be greater than or equal to 0".to_string());
    }
}

fn into_result(errors: Vec<String>) -> AppResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn validate_create(payload: &CreateProductRequest) -> AppResult<()> {
    let mut errors = Vec::new();
    check_name(&payload.name, &mut errors);
    if let Some(category) = &payload.category {
        check_category(category, &mut errors);
    }
    check_price(payload.price, &mut errors);
    into_result(errors)
}

pub fn validate_update(payload: &UpdateProductRequest) -> AppResult<()> {
    let mut errors = Vec::new();
    if let Some(name) = &payload.name {
        check_name(name, &mut errors);
    }
    if let Some(category) = &payload.category {
        check_category(category, &mut errors);
    }
    if let Some(price) = payload.price {
        check_price(price, &mut errors);
    }
    into_result(errors)
}

/// Product names are unique. `except` is the product being renamed, which may
/// keep its own name.
async fn ensure_name_free<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    except: Option<Uuid>,
) -> AppResult<()> {
    let mut finder = Products::find().filter(Column::Name.eq(name));
    if let Some(id) = except {
        finder = finder.filter(Column::Id.ne(id));
    }
    if finder.one(conn).await?.is_some() {
        return Err(AppError::Validation(vec![format!(
            "Product name {name:?} already exists"
        )]));
    }
    Ok(())
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category) = normalize_category(query.category.clone()) {
        condition = condition.add(Column::Category.eq(category));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)))
}

pub async fn get_product(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<ProductWithImages>> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let images = images_of(&state.orm, product.id).await?;

    Ok(ApiResponse::success(
        "Product",
        ProductWithImages {
            product: Product::from(product),
            images,
        },
        None,
    ))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_create(&payload)?;

    let name = payload.name.trim().to_string();
    ensure_name_free(&state.orm, &name, None).await?;

    let now = Utc::now();
    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(payload.description),
        category: Set(normalize_category(payload.category)),
        price: Set(payload.price),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    let product = active.insert(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_update(&payload)?;

    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound("Product")),
    };

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        ensure_name_free(&state.orm, &name, Some(id)).await?;
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if payload.category.is_some() {
        active.category = Set(normalize_category(payload.category));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        user.user_id,
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Deletes the image rows and the product in one transaction, then removes
/// the stored image files. Products that appear on an order are kept.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    let ordered = OrderDetails::find()
        .filter(DetailCol::ProductId.eq(product.id))
        .count(&txn)
        .await?;
    if ordered > 0 {
        return Err(AppError::BadRequest(
            "Product is referenced by existing orders".into(),
        ));
    }

    let references: Vec<String> = images_of(&txn, product.id)
        .await?
        .into_iter()
        .map(|image| image.url)
        .collect();

    ProductImages::delete_many()
        .filter(ImageCol::ProductId.eq(product.id))
        .exec(&txn)
        .await?;
    Products::delete_by_id(product.id).exec(&txn).await?;
    txn.commit().await?;

    discard(state.storage.as_ref(), &references).await;

    audit::record(
        &state.pool,
        user.user_id,
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id, "images_removed": references.len() }),
    )
    .await;

    Ok(ApiResponse::done("Deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_requires_name_and_non_negative_price() {
        let payload = CreateProductRequest {
            name: "   ".into(),
            description: None,
            category: None,
            price: -1,
        };
        match validate_create(&payload).unwrap_err() {
            AppError::Validation(errors) => assert_eq!(
                errors,
                vec![
                    "Name is required".to_string(),
                    "Price must be greater than or equal to 0".to_string()
                ]
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn update_only_checks_supplied_fields() {
        let payload = UpdateProductRequest {
            name: None,
            description: Some("new copy".into()),
            category: Some("kitchen".into()),
            price: None,
        };
        assert!(validate_update(&payload).is_ok());

        let payload = UpdateProductRequest {
            name: Some("x".repeat(MAX_NAME_LEN + 1)),
            description: None,
            category: None,
            price: Some(10),
        };
        assert!(matches!(
            validate_update(&payload),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn long_category_is_rejected() {
        let payload = CreateProductRequest {
            name: "Mug".into(),
            description: None,
            category: Some("c".repeat(MAX_CATEGORY_LEN + 1)),
            price: 10,
        };
        assert!(matches!(
            validate_create(&payload),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn blank_category_is_stored_as_none() {
        assert_eq!(normalize_category(Some("   ".into())), None);
        assert_eq!(
            normalize_category(Some(" kitchen ".into())),
            Some("kitchen".to_string())
        );
        assert_eq!(normalize_category(None), None);
    }
}
