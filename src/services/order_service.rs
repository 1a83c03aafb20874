use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems},
    entity::{
        cart_items::{self, Column as CartCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{self, ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{self, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    response::{ApiResponse, Meta},
    routes::params::{OrderFilter, Pagination, SortOrder},
    state::AppState,
};

/// Turns the current cart into a pending order.
///
/// Cart load, order insert, stock decrements and the cart wipe all run in one
/// transaction. Stock is decremented permissively, clamped at zero; checkout
/// itself never rejects for stock. Any database failure after validation rolls
/// everything back and leaves the cart untouched.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let rows = CartItems::find()
        .find_also_related(Products)
        .filter(CartCol::UserId.eq(user.user_id))
        .all(&txn)
        .await?;

    if rows.is_empty() {
        return Err(AppError::EmptyCart);
    }

    if payload.shipping_address.trim().is_empty() || payload.payment_method.trim().is_empty() {
        return Err(AppError::Validation(
            "shipping_address and payment_method are required".into(),
        ));
    }

    // Entries whose product vanished contribute nothing, same as the cart view.
    let lines: Vec<(cart_items::Model, products::Model)> = rows
        .into_iter()
        .filter_map(|(entry, product)| product.map(|p| (entry, p)))
        .collect();
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }

    let subtotal: i64 = lines
        .iter()
        .map(|(entry, product)| product.price * entry.quantity as i64)
        .sum();
    let total_amount = subtotal + state.config.delivery_fee;

    let (order, items) = match place_order(&txn, user.user_id, total_amount, &payload, &lines).await
    {
        Ok(placed) => placed,
        Err(err) => {
            tracing::error!(error = %err, "order placement failed, rolling back");
            if let Err(err) = txn.rollback().await {
                tracing::warn!(error = %err, "rollback failed");
            }
            return Err(AppError::OrderProcessing);
        }
    };

    if let Err(err) = txn.commit().await {
        tracing::error!(error = %err, "checkout commit failed");
        return Err(AppError::OrderProcessing);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": order.total_amount })),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Write phase of checkout. Prices are frozen into the order items as they
/// were when the cart was read.
async fn place_order(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    total_amount: i64,
    payload: &CheckoutRequest,
    lines: &[(cart_items::Model, products::Model)],
) -> Result<(orders::Model, Vec<OrderItem>), DbErr> {
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total_amount: Set(total_amount),
        status: Set("pending".into()),
        shipping_address: Set(payload.shipping_address.clone()),
        payment_method: Set(payload.payment_method.clone()),
        created_at: NotSet,
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (entry, product) in lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            quantity: Set(entry.quantity),
            price: Set(product.price),
            created_at: NotSet,
        }
        .insert(txn)
        .await?;
        items.push(OrderItem::from(item));

        Products::update_many()
            .col_expr(
                ProdCol::Stock,
                Expr::cust_with_values("GREATEST(stock - $1, 0)", [entry.quantity]),
            )
            .filter(ProdCol::Id.eq(product.id))
            .exec(txn)
            .await?;
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user_id))
        .exec(txn)
        .await?;

    Ok((order, items))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
    filter: OrderFilter,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = filter.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match filter.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok(ApiResponse::paginated(
        "OK",
        OrderList { items },
        page,
        limit,
        total,
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    // Other users' orders are indistinguishable from absent ones.
    let order = match Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
    {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: Order::from(order),
            items,
        },
        Some(Meta::empty()),
    ))
}
