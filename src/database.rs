use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    let db = Database::connect(db_url).await?;
    Migrator::up(&db, None).await?;

    Ok(db)
}
