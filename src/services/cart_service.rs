use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartList, UpdateCartItemRequest},
    entity::{
        cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, Product},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartList>> {
    let rows = CartItems::find()
        .find_also_related(Products)
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_desc(CartCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let mut items = Vec::new();
    let mut subtotal: i64 = 0;
    for (entry, product) in rows {
        // Entries whose product vanished are skipped, not surfaced.
        let product = match product {
            Some(p) => p,
            None => continue,
        };
        subtotal += product.price * entry.quantity as i64;
        items.push(CartItemDto {
            id: entry.id,
            product: Product::from(product),
            quantity: entry.quantity,
        });
    }

    Ok(ApiResponse::success(
        "OK",
        CartList { items, subtotal },
        Some(Meta::empty()),
    ))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity < 1 {
        return Err(AppError::Validation("quantity must be at least 1".into()));
    }

    let product = match Products::find_by_id(payload.product_id).one(&state.orm).await? {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(payload.product_id)),
        )
        .one(&state.orm)
        .await?;

    // Repeated adds merge into one entry; the merged quantity still has to fit.
    let requested = existing.as_ref().map_or(0, |e| e.quantity) + payload.quantity;
    if requested > product.stock {
        return Err(AppError::InsufficientStock(format!(
            "{} has only {} in stock",
            product.name, product.stock
        )));
    }

    let item = match existing {
        Some(entry) => {
            let mut active: CartActive = entry.into();
            active.quantity = Set(requested);
            active.update(&state.orm).await?
        }
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(payload.product_id),
                quantity: Set(payload.quantity),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?
        }
    };

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": item.quantity })),
    )
    .await;

    Ok(ApiResponse::success(
        "Added to cart",
        CartItem::from(item),
        Some(Meta::empty()),
    ))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<Option<CartItem>>> {
    let entry = match CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(product_id)),
        )
        .one(&state.orm)
        .await?
    {
        Some(e) => e,
        None => return Err(AppError::NotFound),
    };

    let target = match (payload.quantity, payload.delta) {
        (Some(quantity), None) => quantity,
        (None, Some(delta)) => entry.quantity + delta,
        _ => {
            return Err(AppError::Validation(
                "provide exactly one of quantity or delta".into(),
            ));
        }
    };

    // Dropping below one removes the entry rather than storing a dead row.
    if target < 1 {
        CartItems::delete_by_id(entry.id).exec(&state.orm).await?;

        audit::record(
            &state.pool,
            Some(user.user_id),
            "cart_remove",
            Some("cart_items"),
            Some(serde_json::json!({ "product_id": product_id })),
        )
        .await;

        return Ok(ApiResponse::success(
            "Cart item removed",
            None,
            Some(Meta::empty()),
        ));
    }

    let product = match Products::find_by_id(product_id).one(&state.orm).await? {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    if target > product.stock {
        return Err(AppError::InsufficientStock(format!(
            "{} has only {} in stock",
            product.name, product.stock
        )));
    }

    let mut active: CartActive = entry.into();
    active.quantity = Set(target);
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "quantity": updated.quantity })),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart item updated",
        Some(CartItem::from(updated)),
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(product_id)),
        )
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_clear",
        Some("cart_items"),
        None,
    )
    .await;

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
