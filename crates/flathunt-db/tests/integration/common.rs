use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Schema statements, mirroring `migrations/0001_adverts.sql`.
const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS adverts (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        source_message_id BIGINT NOT NULL,
        url TEXT NOT NULL,
        district TEXT,
        price DOUBLE PRECISION,
        media_fee DOUBLE PRECISION,
        deposit DOUBLE PRECISION,
        rooms INTEGER,
        area DOUBLE PRECISION,
        posted_at TIMESTAMP,
        year_built INTEGER,
        no_animals BOOLEAN NOT NULL DEFAULT FALSE,
        animals_mentioned TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT uq_adverts_url UNIQUE (url)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_adverts_created ON adverts(created_at DESC)"#,
];

/// Start PostgreSQL in a container and return a pool with the schema applied.
///
/// Keep the returned container alive for the whole test; dropping it stops
/// the database.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "flathunt_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/flathunt_test");

    let pool = connect_with_retry(&connection_string).await;

    for migration in MIGRATIONS {
        sqlx::query(migration)
            .execute(&pool)
            .await
            .expect("Failed to run migration");
    }

    (pool, container)
}

/// The container logs readiness slightly before it accepts connections.
async fn connect_with_retry(connection_string: &str) -> PgPool {
    let mut last_error = None;
    for _ in 0..30 {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await
        {
            Ok(pool) => return pool,
            Err(e) => last_error = Some(e),
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Database never became reachable: {last_error:?}");
}
