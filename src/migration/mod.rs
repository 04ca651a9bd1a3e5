use sea_orm_migration::prelude::*;

mod m20250101_000001_create_boards_table;
mod m20250101_000002_create_posts_table;
mod m20250101_000003_create_attachments_table;
mod m20250101_000004_create_menus_table;
mod m20250101_000005_create_menu_contents_table;
mod m20250101_000006_create_popups_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_boards_table::Migration),
            Box::new(m20250101_000002_create_posts_table::Migration),
            Box::new(m20250101_000003_create_attachments_table::Migration),
            Box::new(m20250101_000004_create_menus_table::Migration),
            Box::new(m20250101_000005_create_menu_contents_table::Migration),
            Box::new(m20250101_000006_create_popups_table::Migration),
        ]
    }
}
