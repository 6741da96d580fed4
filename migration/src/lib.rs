pub use sea_orm_migration::prelude::*;

mod iden;
mod m20250110_000001_create_core_tables;
mod m20250214_101500_add_completion_tables;
mod m20250302_083000_add_payment_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250110_000001_create_core_tables::Migration),
            Box::new(m20250214_101500_add_completion_tables::Migration),
            Box::new(m20250302_083000_add_payment_tables::Migration),
        ]
    }
}
