//! # Stage Log Dump
//!
//! Prints the stage log, or the upload payload for a watermark.
//!
//! ## Usage
//! ```bash
//! # Every row, oldest first
//! cargo run -p hvac-db --bin dump
//!
//! # Another database file
//! cargo run -p hvac-db --bin dump -- --db /var/lib/hvac/hvac.db
//!
//! # The JSON batch that would be uploaded after timestamp 1613064675
//! cargo run -p hvac-db --bin dump -- --json 1613064675
//! ```

use chrono::{DateTime, Utc};
use std::env;

use hvac_core::wire::encode_batch;
use hvac_db::{Database, DbConfig};

enum Mode {
    Rows,
    Json(i64),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("hvac.db");
    let mut mode = Mode::Rows;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--json" | "-j" => {
                let after = match args.get(i + 1) {
                    Some(value) => value.parse::<i64>()?,
                    None => 0,
                };
                mode = Mode::Json(after);
                i += 1;
            }
            "--help" | "-h" => {
                println!("HVAC stage log dump");
                println!();
                println!("Usage: dump [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./hvac.db)");
                println!("  -j, --json <AFTER>   Print the upload payload for records after AFTER");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    let db = Database::new(DbConfig::new(&db_path).max_connections(1)).await?;

    match mode {
        Mode::Json(after) => {
            let records = db.records().query_after(after).await?;
            println!("{}", encode_batch(&records)?);
        }
        Mode::Rows => {
            let records = db.records().all().await?;
            let watermark = db.watermark().get().await.unwrap_or(0);

            println!("Database:  {}", db_path);
            println!("Records:   {}", records.len());
            println!("Watermark: {}", watermark);
            println!();
            println!("{:>12}  {:<20}  {:>5}  {:>8}  {:>8}", "time", "utc", "stage", "temp", "humidity");

            for r in &records {
                let utc = DateTime::<Utc>::from_timestamp(r.timestamp, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                let marker = if r.timestamp <= watermark { " " } else { "*" };
                println!(
                    "{:>12}  {:<20}  {:>5}  {:>8.1}  {:>8.1} {}",
                    r.timestamp, utc, r.stage.value(), r.temperature, r.humidity, marker
                );
            }
        }
    }

    db.close().await;
    Ok(())
}
