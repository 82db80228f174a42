use anyhow::{Context, Result};
use sqlx::{Pool, Postgres};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str) -> Result<Db> {
    Pool::<Postgres>::connect(url)
        .await
        .context("failed to connect to DATABASE_URL")
}
