pub use sea_orm_migration::prelude::*;

mod m20250601_081530_create_event_table;
mod m20250601_082210_create_donation_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_081530_create_event_table::Migration),
            Box::new(m20250601_082210_create_donation_table::Migration),
        ]
    }
}
