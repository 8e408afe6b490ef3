use minorm::{Field, FindAll, OrmPool, PoolConfig, Schema};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub admin: bool,
}

#[tokio::main]
async fn main() -> minorm::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let users = Schema::new("User")
        .table("users")
        .field("id", Field::uuid().primary_key())
        .field("name", Field::string())
        .field("email", Field::string())
        .field("passwd", Field::string())
        .field("image", Field::string())
        .field("admin", Field::boolean())
        .register()?;

    let config = match std::env::args().nth(1) {
        Some(path) => PoolConfig::load(path)?,
        None => PoolConfig::new("www-data", "www-data", "awesome"),
    };
    let pool = OrmPool::create_pool(&config).await?;

    let mut user = users.record_with([
        ("name", "Test"),
        ("email", "test@example.com"),
        ("passwd", "1234567890"),
        ("image", "about:blank"),
    ]);
    user.save(&pool).await?;

    let id = user.get("id")?.clone();
    if let Some(found) = users.find(&pool, id).await? {
        let typed: User = found.decode()?;
        println!("{typed:?}");
    }

    let total = users.find_number(&pool, "count(`id`)", None, vec![]).await?;
    println!("users: {total:?}");

    for row in users
        .find_all(&pool, FindAll::new().order_by("`name`").limit(10u64))
        .await?
    {
        println!("{}", serde_json::to_string(&row)?);
    }

    user.set("name", "Renamed");
    user.update(&pool).await?;
    user.remove(&pool).await?;

    pool.close().await;
    Ok(())
}
