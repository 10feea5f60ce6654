//! Standalone migration runner for the inventory pipeline's Postgres schema.
//!
//! Usage:
//!   invpipe-migrate [OPTIONS]
//!
//! Options:
//!   --database-url <URL>  Database connection URL (or set DATABASE_URL env var)
//!   --status               Show migration status without applying anything

use std::env;

use invpipe_database::{create_initial_migrations, Migrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut database_url = env::var("DATABASE_URL").ok();
    let mut show_status = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--database-url" => {
                i += 1;
                database_url = args.get(i).cloned();
            }
            "--status" => show_status = true,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    let database_url = database_url.ok_or("DATABASE_URL not set")?;

    println!("Inventory Pipeline Migration Tool");
    println!("=================================");
    println!();

    println!("Connecting to database...");
    let pool = sqlx::PgPool::connect(&database_url).await?;
    println!("Connected!");
    println!();

    let migrator = Migrator::new().with_migrations(create_initial_migrations());

    if show_status {
        for status in migrator.status(&pool).await? {
            let marker = if status.applied { "[applied]" } else { "[pending]" };
            println!("  {marker} {:>4} {}", status.version, status.name);
        }
        return Ok(());
    }

    let applied = migrator.run(&pool).await?;
    if applied.is_empty() {
        println!("No pending migrations.");
    } else {
        println!("Applied {} migration(s): {:?}", applied.len(), applied);
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"
Inventory Pipeline Migration Tool

Usage: invpipe-migrate [OPTIONS]

Options:
  --database-url <URL>  Database connection URL (or set DATABASE_URL env var)
  --status               Show migration status without applying anything
  --help, -h             Show this help message
"#
    );
}
