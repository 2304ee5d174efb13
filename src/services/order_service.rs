use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithDetails},
    entity::{
        order_details::{ActiveModel as DetailActive, Column as DetailCol, Entity as OrderDetails},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderDetail},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// One requested line before prices are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// A line with the unit price captured at order time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: i64,
}

/// Zips the two parallel request lists into order lines.
///
/// Both lists must be the same length and every quantity must be positive.
/// An empty request is valid and yields no lines.
pub fn pair_lines(product_ids: &[Uuid], quantities: &[i32]) -> AppResult<Vec<OrderLine>> {
    if product_ids.len() != quantities.len() {
        return Err(AppError::Validation(vec![format!(
            "product_ids has {} entries but quantities has {}",
            product_ids.len(),
            quantities.len()
        )]));
    }

    let errors: Vec<String> = quantities
        .iter()
        .enumerate()
        .filter(|(_, qty)| **qty <= 0)
        .map(|(idx, qty)| format!("quantities[{idx}] must be positive, got {qty}"))
        .collect();
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    Ok(product_ids
        .iter()
        .zip(quantities)
        .map(|(&product_id, &quantity)| OrderLine {
            product_id,
            quantity,
        })
        .collect())
}

/// Sum of `quantity * price` over all lines.
pub fn order_total(lines: &[PricedLine]) -> AppResult<i64> {
    lines.iter().try_fold(0_i64, |total, line| {
        i64::from(line.quantity)
            .checked_mul(line.price)
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or_else(|| AppError::Validation(vec!["Order total is out of range".into()]))
    })
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithDetails>> {
    let lines = pair_lines(&payload.product_ids, &payload.quantities)?;

    let txn = state.orm.begin().await?;

    let mut priced = Vec::with_capacity(lines.len());
    for line in &lines {
        let product = Products::find_by_id(line.product_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound("Product"))?;
        priced.push(PricedLine {
            product_id: product.id,
            quantity: line.quantity,
            price: product.price,
        });
    }
    let total_amount = order_total(&priced)?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        total_amount: Set(total_amount),
        order_date: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;

    let mut details = Vec::with_capacity(priced.len());
    for (position, line) in priced.iter().enumerate() {
        let detail = DetailActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            price: Set(line.price),
            position: Set(position as i32),
        }
        .insert(&txn)
        .await?;
        details.push(OrderDetail::from(detail));
    }

    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        lines = details.len(),
        total = total_amount,
        "order created"
    );
    audit::record(
        &state.pool,
        user.user_id,
        "order_create",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_amount": total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order created",
        OrderWithDetails {
            order: Order::from(order),
            details,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(OrderCol::UserId.eq(user.user_id));
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::OrderDate),
        SortOrder::Desc => finder.order_by_desc(OrderCol::OrderDate),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithDetails>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound("Order")),
    };

    let details = OrderDetails::find()
        .filter(DetailCol::OrderId.eq(order.id))
        .order_by_asc(DetailCol::Position)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderDetail::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithDetails {
            order: Order::from(order),
            details,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_lengths_are_rejected() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let err = pair_lines(&ids, &[1]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn non_positive_quantities_are_reported_by_index() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        match pair_lines(&ids, &[1, 0, -2]).unwrap_err() {
            AppError::Validation(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("quantities[1]"));
                assert!(errors[1].contains("quantities[2]"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn overflowing_total_is_rejected() {
        let lines = [PricedLine {
            product_id: Uuid::new_v4(),
            quantity: 2,
            price: i64::MAX,
        }];
        assert!(matches!(
            order_total(&lines),
            Err(AppError::Validation(_))
        ));
    }
}
