use grocery_store_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::admin::InventoryAdjustRequest,
    dto::cart::AddToCartRequest,
    dto::categories::{CreateCategoryRequest, UpdateCategoryRequest},
    dto::orders::{CheckoutRequest, UpdateOrderStatusRequest},
    dto::products::{CreateProductRequest, UpdateProductRequest},
    entity::{products::Entity as Products, users::ActiveModel as UserActive},
    error::AppError,
    middleware::auth::AuthUser,
    routes::params::{OrderFilter, Pagination, ProductFilter, StockThreshold},
    services::{admin_service, cart_service, category_service, order_service, product_service},
    state::AppState,
};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Statement};
use uuid::Uuid;

// Integration flow: admin curates the catalog -> a customer order locks the
// catalog rows it references -> order status, dashboard and inventory tooling.
#[tokio::test]
async fn catalog_orders_and_inventory_admin_flow() -> anyhow::Result<()> {
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

    let state = setup_state(&database_url).await?;

    let admin_id = create_user(&state, "admin", "admin@example.com", true).await?;
    let customer_id = create_user(&state, "customer", "customer@example.com", false).await?;
    let admin = AuthUser {
        user_id: admin_id,
        is_admin: true,
    };
    let customer = AuthUser {
        user_id: customer_id,
        is_admin: false,
    };

    let err = admin_service::dashboard(&state, &customer)
        .await
        .expect_err("dashboard needs admin");
    assert!(matches!(err, AppError::Forbidden));

    // Catalog CRUD.
    let err = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "   ".into(),
            description: None,
            image_url: None,
        },
    )
    .await
    .expect_err("blank category name");
    assert!(matches!(err, AppError::Validation(_)));

    let bakery = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Bakery".into(),
            description: Some("Baked fresh every morning".into()),
            image_url: None,
        },
    )
    .await?;
    let bakery = bakery.data.unwrap();

    let err = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Orphan".into(),
            description: None,
            price: 100,
            stock: 1,
            category_id: Uuid::new_v4(),
            image_url: None,
        },
    )
    .await
    .expect_err("category does not exist");
    assert!(matches!(err, AppError::NotFound));

    let err = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Negative".into(),
            description: None,
            price: -5,
            stock: 1,
            category_id: bakery.id,
            image_url: None,
        },
    )
    .await
    .expect_err("negative price");
    assert!(matches!(err, AppError::Validation(_)));

    let sourdough = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Sourdough Loaf".into(),
            description: Some("Slow-fermented white sourdough".into()),
            price: 349,
            stock: 20,
            category_id: bakery.id,
            image_url: None,
        },
    )
    .await?;
    let sourdough = sourdough.data.unwrap();
    let croissant = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Butter Croissant".into(),
            description: None,
            price: 139,
            stock: 40,
            category_id: bakery.id,
            image_url: None,
        },
    )
    .await?;
    let croissant = croissant.data.unwrap();

    let updated = product_service::update_product(
        &state,
        &admin,
        sourdough.id,
        UpdateProductRequest {
            name: None,
            description: None,
            price: Some(399),
            stock: None,
            category_id: None,
            image_url: None,
        },
    )
    .await?;
    assert_eq!(updated.data.unwrap().price, 399);

    let err = product_service::update_product(
        &state,
        &admin,
        sourdough.id,
        UpdateProductRequest {
            name: None,
            description: None,
            price: None,
            stock: None,
            category_id: Some(Uuid::new_v4()),
            image_url: None,
        },
    )
    .await
    .expect_err("target category does not exist");
    assert!(matches!(err, AppError::NotFound));

    // Search and filters feed off the live catalog.
    let found = product_service::list_products(
        &state,
        Pagination::default(),
        ProductFilter {
            q: Some("sour".into()),
            ..Default::default()
        },
    )
    .await?;
    let found = found.data.unwrap();
    assert_eq!(found.items.len(), 1);
    assert_eq!(found.items[0].id, sourdough.id);

    let none = product_service::list_products(
        &state,
        Pagination::default(),
        ProductFilter {
            min_price: Some(10_000),
            ..Default::default()
        },
    )
    .await?;
    assert!(none.data.unwrap().items.is_empty());

    let detail = product_service::get_product(&state, sourdough.id).await?;
    let detail = detail.data.unwrap();
    assert_eq!(detail.related.len(), 1);
    assert_eq!(detail.related[0].id, croissant.id);

    // A customer order pins the product for history.
    cart_service::add_to_cart(
        &state,
        &customer,
        AddToCartRequest {
            product_id: sourdough.id,
            quantity: 2,
        },
    )
    .await?;
    let placed = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            shipping_address: "7 Mill Road".into(),
            payment_method: "card".into(),
        },
    )
    .await?;
    let order = placed.data.unwrap().order;
    assert_eq!(order.total_amount, 2 * 399);

    let err = product_service::delete_product(&state, &admin, sourdough.id)
        .await
        .expect_err("product sits in an order");
    assert!(matches!(err, AppError::Conflict(_)));
    product_service::delete_product(&state, &admin, croissant.id).await?;

    // Order status handling.
    let err = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "archived".into(),
        },
    )
    .await
    .expect_err("not a known status");
    assert!(matches!(err, AppError::Validation(_)));

    let shipped = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
        },
    )
    .await?;
    assert_eq!(shipped.data.unwrap().status, "shipped");

    let seen = admin_service::get_order_admin(&state, &admin, order.id).await?;
    let seen = seen.data.unwrap();
    assert_eq!(seen.order.status, "shipped");
    assert_eq!(seen.items.len(), 1);

    let shipped_orders = admin_service::list_all_orders(
        &state,
        &admin,
        Pagination::default(),
        OrderFilter {
            status: Some("shipped".into()),
            sort_order: None,
        },
    )
    .await?;
    assert_eq!(shipped_orders.data.unwrap().items.len(), 1);
    let pending_orders = admin_service::list_all_orders(
        &state,
        &admin,
        Pagination::default(),
        OrderFilter {
            status: Some("pending".into()),
            sort_order: None,
        },
    )
    .await?;
    assert!(pending_orders.data.unwrap().items.is_empty());

    let stats = admin_service::dashboard(&state, &admin).await?;
    let stats = stats.data.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_categories, 1);
    assert_eq!(stats.total_products, 1);
    assert_eq!(stats.total_orders, 1);
    assert_eq!(stats.recent_orders.first().map(|o| o.id), Some(order.id));

    // Inventory tooling: checkout left 18 on the shelf.
    let quiet = admin_service::list_low_stock(
        &state,
        &admin,
        Pagination::default(),
        StockThreshold::default(),
    )
    .await?;
    assert!(quiet.data.unwrap().items.is_empty());

    let low = admin_service::list_low_stock(
        &state,
        &admin,
        Pagination::default(),
        StockThreshold {
            threshold: Some(18),
        },
    )
    .await?;
    assert!(low.data.unwrap().items.iter().any(|p| p.id == sourdough.id));

    let err = admin_service::adjust_inventory(
        &state,
        &admin,
        sourdough.id,
        InventoryAdjustRequest { delta: 0 },
    )
    .await
    .expect_err("zero delta");
    assert!(matches!(err, AppError::Validation(_)));

    let err = admin_service::adjust_inventory(
        &state,
        &admin,
        sourdough.id,
        InventoryAdjustRequest { delta: -100 },
    )
    .await
    .expect_err("stock would go negative");
    assert!(matches!(err, AppError::Validation(_)));

    let restocked = admin_service::adjust_inventory(
        &state,
        &admin,
        sourdough.id,
        InventoryAdjustRequest { delta: 7 },
    )
    .await?;
    assert_eq!(restocked.data.unwrap().stock, 25);

    // Deleting a category takes its unordered products with it.
    let seasonal = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: "Seasonal".into(),
            description: None,
            image_url: None,
        },
    )
    .await?;
    let seasonal = seasonal.data.unwrap();
    let pumpkin = product_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Pumpkin".into(),
            description: None,
            price: 599,
            stock: 10,
            category_id: seasonal.id,
            image_url: None,
        },
    )
    .await?;
    let pumpkin = pumpkin.data.unwrap();

    let renamed = category_service::update_category(
        &state,
        &admin,
        seasonal.id,
        UpdateCategoryRequest {
            name: Some("Seasonal Picks".into()),
            description: None,
            image_url: None,
        },
    )
    .await?;
    assert_eq!(renamed.data.unwrap().name, "Seasonal Picks");

    category_service::delete_category(&state, &admin, seasonal.id).await?;
    assert!(Products::find_by_id(pumpkin.id).one(&state.orm).await?.is_none());

    let err = category_service::delete_category(&state, &admin, bakery.id)
        .await
        .expect_err("category holds an ordered product");
    assert!(matches!(err, AppError::Conflict(_)));

    let categories =
        category_service::list_categories(&state, Pagination::default()).await?;
    assert_eq!(categories.data.unwrap().items.len(), 1);

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

async fn create_user(
    state: &AppState,
    username: &str,
    email: &str,
    is_admin: bool,
) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        full_name: Set("Test User".into()),
        phone: Set(None),
        address: Set(None),
        is_admin: Set(is_admin),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}
