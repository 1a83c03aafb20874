use grocery_store_api::{
    config::AppConfig, db::create_pool, services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_username = std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let admin_password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string());

    let admin_id = ensure_user(
        &pool,
        &admin_username,
        &format!("{admin_username}@example.com"),
        &admin_password,
        "Store Admin",
        true,
    )
    .await?;
    let customer_id = ensure_user(
        &pool,
        "customer",
        "customer@example.com",
        "customer123",
        "Demo Customer",
        false,
    )
    .await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, Customer ID: {customer_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    username: &str,
    email: &str,
    password: &str,
    full_name: &str,
    is_admin: bool,
) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        println!("User {username} already present");
        return Ok(id);
    }

    let id = Uuid::new_v4();
    let password_hash = hash_password(password)?;
    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, password_hash, full_name, is_admin)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(is_admin)
    .execute(pool)
    .await?;

    println!("Created user {username} (admin={is_admin})");
    Ok(id)
}

async fn ensure_category(
    pool: &sqlx::PgPool,
    name: &str,
    description: &str,
) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM categories WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO categories (id, name, description) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    Ok(id)
}

async fn ensure_product(
    pool: &sqlx::PgPool,
    category_id: Uuid,
    name: &str,
    description: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<()> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO products (id, category_id, name, description, price, stock)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(category_id)
    .bind(name)
    .bind(description)
    .bind(price)
    .bind(stock)
    .execute(pool)
    .await?;
    Ok(())
}

// Prices are minor currency units.
async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let sections: [(&str, &str, &[(&str, &str, i64, i32)]); 4] = [
        (
            "Fruit & Vegetables",
            "Fresh produce, restocked daily",
            &[
                ("Bananas 1kg", "Ripe and ready to eat", 159, 120),
                ("Gala Apples 1kg", "Crisp and sweet", 249, 80),
                ("Carrots 1kg", "Loose carrots", 119, 90),
                ("Baby Spinach 200g", "Washed and bagged", 199, 45),
            ],
        ),
        (
            "Dairy & Eggs",
            "Milk, cheese, yogurt and eggs",
            &[
                ("Whole Milk 1L", "Pasteurised whole milk", 129, 150),
                ("Free-Range Eggs 12pk", "Large free-range eggs", 369, 60),
                ("Greek Yogurt 500g", "Strained, 10% fat", 219, 40),
            ],
        ),
        (
            "Bakery",
            "Baked fresh every morning",
            &[
                ("Sourdough Loaf", "Slow-fermented white sourdough", 349, 25),
                ("Butter Croissant", "All-butter, baked in store", 139, 50),
            ],
        ),
        (
            "Pantry",
            "Staples and dry goods",
            &[
                ("Penne Rigate 500g", "Durum wheat pasta", 99, 200),
                ("Extra Virgin Olive Oil 500ml", "Cold pressed", 749, 35),
                ("Basmati Rice 1kg", "Aged basmati", 279, 70),
            ],
        ),
    ];

    for (category, blurb, products) in sections {
        let category_id = ensure_category(pool, category, blurb).await?;
        for (name, description, price, stock) in products {
            ensure_product(pool, category_id, name, description, *price, *stock).await?;
        }
    }

    println!("Seeded catalog");
    Ok(())
}
