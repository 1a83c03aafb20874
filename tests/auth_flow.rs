use grocery_store_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::auth::{LoginRequest, RegisterRequest},
    dto::users::{AdminUpdateUserRequest, UpdateProfileRequest},
    entity::users::ActiveModel as UserActive,
    error::AppError,
    middleware::auth::AuthUser,
    routes::params::Pagination,
    services::{auth_service, user_service},
    state::AppState,
};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Statement};
use uuid::Uuid;

// Integration flow: register and login -> profile edits and password change ->
// admin edits and deletes accounts.
#[tokio::test]
async fn register_login_and_account_management_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };
    // Token issuing reads JWT_SECRET; give the run one if the environment has none.
    if std::env::var("JWT_SECRET").is_err() {
        unsafe { std::env::set_var("JWT_SECRET", "integration-test-secret") };
    }

    let state = setup_state(&database_url).await?;

    let registered = auth_service::register_user(
        &state,
        RegisterRequest {
            username: "casey".into(),
            email: "casey@example.com".into(),
            password: "first-pass".into(),
            full_name: "Casey Field".into(),
            phone: None,
            address: None,
        },
    )
    .await?;
    let casey = registered.data.unwrap();
    assert_eq!(casey.username, "casey");
    assert!(!casey.is_admin);
    let casey_auth = AuthUser {
        user_id: casey.id,
        is_admin: false,
    };

    // Both halves of the identity are reserved on registration.
    let err = auth_service::register_user(
        &state,
        RegisterRequest {
            username: "casey".into(),
            email: "other@example.com".into(),
            password: "whatever".into(),
            full_name: "Impostor".into(),
            phone: None,
            address: None,
        },
    )
    .await
    .expect_err("username is taken");
    assert!(matches!(err, AppError::DuplicateIdentity(ref field) if field == "username"));

    let err = auth_service::register_user(
        &state,
        RegisterRequest {
            username: "casey2".into(),
            email: "casey@example.com".into(),
            password: "whatever".into(),
            full_name: "Impostor".into(),
            phone: None,
            address: None,
        },
    )
    .await
    .expect_err("email is taken");
    assert!(matches!(err, AppError::DuplicateIdentity(ref field) if field == "email"));

    let err = auth_service::register_user(
        &state,
        RegisterRequest {
            username: "blank".into(),
            email: "blank@example.com".into(),
            password: "   ".into(),
            full_name: "Blank Password".into(),
            phone: None,
            address: None,
        },
    )
    .await
    .expect_err("blank password");
    assert!(matches!(err, AppError::Validation(_)));

    let login = auth_service::login_user(
        &state,
        LoginRequest {
            username: "casey".into(),
            password: "first-pass".into(),
        },
    )
    .await?;
    assert!(login.data.unwrap().token.starts_with("Bearer "));

    let err = auth_service::login_user(
        &state,
        LoginRequest {
            username: "casey".into(),
            password: "wrong-pass".into(),
        },
    )
    .await
    .expect_err("wrong password");
    assert!(matches!(err, AppError::Unauthorized));

    let err = auth_service::login_user(
        &state,
        LoginRequest {
            username: "nobody".into(),
            password: "first-pass".into(),
        },
    )
    .await
    .expect_err("unknown username");
    assert!(matches!(err, AppError::Unauthorized));

    // Profile edits round-trip, including a password change.
    let updated = user_service::update_profile(
        &state,
        &casey_auth,
        UpdateProfileRequest {
            full_name: Some("Casey A. Field".into()),
            email: None,
            phone: Some("555-0101".into()),
            address: Some("12 Green Lane".into()),
            new_password: None,
        },
    )
    .await?;
    let updated = updated.data.unwrap();
    assert_eq!(updated.full_name, "Casey A. Field");
    assert_eq!(updated.phone.as_deref(), Some("555-0101"));

    user_service::update_profile(
        &state,
        &casey_auth,
        UpdateProfileRequest {
            full_name: None,
            email: None,
            phone: None,
            address: None,
            new_password: Some("second-pass".into()),
        },
    )
    .await?;
    auth_service::login_user(
        &state,
        LoginRequest {
            username: "casey".into(),
            password: "second-pass".into(),
        },
    )
    .await?;
    let err = auth_service::login_user(
        &state,
        LoginRequest {
            username: "casey".into(),
            password: "first-pass".into(),
        },
    )
    .await
    .expect_err("old password no longer works");
    assert!(matches!(err, AppError::Unauthorized));

    let robin = auth_service::register_user(
        &state,
        RegisterRequest {
            username: "robin".into(),
            email: "robin@example.com".into(),
            password: "robin-pass".into(),
            full_name: "Robin Vale".into(),
            phone: None,
            address: None,
        },
    )
    .await?;
    let robin = robin.data.unwrap();

    let err = user_service::update_profile(
        &state,
        &casey_auth,
        UpdateProfileRequest {
            full_name: None,
            email: Some("robin@example.com".into()),
            phone: None,
            address: None,
            new_password: None,
        },
    )
    .await
    .expect_err("email belongs to another account");
    assert!(matches!(err, AppError::DuplicateIdentity(ref field) if field == "email"));

    // Admin side: edit, list, and delete accounts.
    let admin_id = create_admin(&state).await?;
    let admin_auth = AuthUser {
        user_id: admin_id,
        is_admin: true,
    };

    let promoted = user_service::admin_update_user(
        &state,
        &admin_auth,
        robin.id,
        AdminUpdateUserRequest {
            full_name: None,
            email: None,
            phone: None,
            address: Some("7 Mill Road".into()),
            is_admin: Some(true),
            new_password: None,
        },
    )
    .await?;
    let promoted = promoted.data.unwrap();
    assert!(promoted.is_admin);
    assert_eq!(promoted.address.as_deref(), Some("7 Mill Road"));

    let users = user_service::list_users(&state, &admin_auth, Pagination::default()).await?;
    assert_eq!(users.data.unwrap().items.len(), 3);

    let err = user_service::list_users(&state, &casey_auth, Pagination::default())
        .await
        .expect_err("listing users needs admin");
    assert!(matches!(err, AppError::Forbidden));

    let err = user_service::delete_user(&state, &admin_auth, admin_id)
        .await
        .expect_err("self-deletion is blocked");
    assert!(matches!(err, AppError::Validation(_)));

    user_service::delete_user(&state, &admin_auth, robin.id).await?;
    let robin_auth = AuthUser {
        user_id: robin.id,
        is_admin: false,
    };
    let err = user_service::get_profile(&state, &robin_auth)
        .await
        .expect_err("account is gone");
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        delivery_fee: 0,
        upload_dir: "uploads".to_string(),
    }
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        config: test_config(database_url),
    })
}

async fn create_admin(state: &AppState) -> anyhow::Result<Uuid> {
    let admin = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set("admin".into()),
        email: Set("admin@example.com".into()),
        password_hash: Set("dummy".into()),
        full_name: Set("Store Admin".into()),
        phone: Set(None),
        address: Set(None),
        is_admin: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(admin.id)
}
