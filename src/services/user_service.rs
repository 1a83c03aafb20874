use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::users::{AdminUpdateUserRequest, UpdateProfileRequest, UserList},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::User,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::auth_service::hash_password,
    state::AppState,
};

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let profile = match Users::find_by_id(user.user_id).one(&state.orm).await? {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("OK", User::from(profile), None))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let existing = match Users::find_by_id(user.user_id).one(&state.orm).await? {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    let updated = apply_user_update(
        state,
        existing,
        payload.full_name,
        payload.email,
        payload.phone,
        payload.address,
        None,
        payload.new_password,
    )
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "profile_update",
        Some("users"),
        None,
    )
    .await;

    Ok(ApiResponse::success(
        "Profile updated",
        User::from(updated),
        Some(Meta::empty()),
    ))
}

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find().order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(ApiResponse::paginated(
        "Users",
        UserList { items },
        page,
        limit,
        total,
    ))
}

pub async fn admin_update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdminUpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;

    let existing = match Users::find_by_id(id).one(&state.orm).await? {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    let updated = apply_user_update(
        state,
        existing,
        payload.full_name,
        payload.email,
        payload.phone,
        payload.address,
        payload.is_admin,
        payload.new_password,
    )
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_update",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": id })),
    )
    .await;

    Ok(ApiResponse::success(
        "User updated",
        User::from(updated),
        Some(Meta::empty()),
    ))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::Validation(
            "admins cannot delete their own account".into(),
        ));
    }

    // Orders and cart entries cascade away; audit entries keep a null user.
    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_delete",
        Some("users"),
        Some(serde_json::json!({ "target_user_id": id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Shared by the profile and admin paths; only the admin path may pass
/// `is_admin`.
#[allow(clippy::too_many_arguments)]
async fn apply_user_update(
    state: &AppState,
    existing: crate::entity::users::Model,
    full_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    is_admin: Option<bool>,
    new_password: Option<String>,
) -> Result<crate::entity::users::Model, AppError> {
    if let Some(full_name) = full_name.as_deref() {
        if full_name.trim().is_empty() {
            return Err(AppError::Validation("full_name must not be blank".into()));
        }
    }
    if let Some(email) = email.as_deref() {
        if email.trim().is_empty() {
            return Err(AppError::Validation("email must not be blank".into()));
        }
        if email != existing.email {
            let taken = Users::find()
                .filter(
                    Condition::all()
                        .add(UserCol::Email.eq(email))
                        .add(UserCol::Id.ne(existing.id)),
                )
                .one(&state.orm)
                .await?;
            if taken.is_some() {
                return Err(AppError::DuplicateIdentity("email".into()));
            }
        }
    }
    if let Some(password) = new_password.as_deref() {
        if password.trim().is_empty() {
            return Err(AppError::Validation("new_password must not be blank".into()));
        }
    }

    let mut active: UserActive = existing.into();
    if let Some(full_name) = full_name {
        active.full_name = Set(full_name);
    }
    if let Some(email) = email {
        active.email = Set(email);
    }
    if let Some(phone) = phone {
        active.phone = Set(Some(phone));
    }
    if let Some(address) = address {
        active.address = Set(Some(address));
    }
    if let Some(is_admin) = is_admin {
        active.is_admin = Set(is_admin);
    }
    if let Some(password) = new_password {
        active.password_hash = Set(hash_password(&password)?);
    }

    Ok(active.update(&state.orm).await?)
}
