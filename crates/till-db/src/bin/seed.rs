//! # Seed Data Generator
//!
//! Populates a development database with a catalogue, a few loyalty
//! customers and a stretch of sales history for the forecast.
//!
//! ## Usage
//! ```bash
//! cargo run -p till-db --bin seed
//! cargo run -p till-db --bin seed -- --days 60 --db ./data/till.db
//! ```
//!
//! Data is deterministic: the same arguments always produce the same rows
//! (apart from ids).

use chrono::{Duration, Utc};
use std::env;
use till_core::{
    new_id, Customer, Money, PaymentMethod, Product, Sale, SaleItem, SaleLineRequest, SaleStatus,
};
use till_db::{Database, DbConfig};

/// `(category, [(name, selling price in cents)])`
const CATALOGUE: &[(&str, &[(&str, i64)])] = &[
    (
        "Dairy",
        &[("Milk 1L", 6_500), ("Curd 500g", 4_000), ("Paneer 200g", 9_000), ("Butter 100g", 5_600)],
    ),
    (
        "Staples",
        &[("Basmati Rice 5kg", 62_000), ("Atta 10kg", 45_000), ("Toor Dal 1kg", 16_500), ("Sugar 1kg", 4_800)],
    ),
    (
        "Snacks",
        &[("Salted Chips", 2_000), ("Glucose Biscuits", 1_000), ("Namkeen 400g", 9_500)],
    ),
    (
        "Beverages",
        &[("Tea 250g", 14_000), ("Instant Coffee 100g", 31_000), ("Mango Drink 1.2L", 7_000)],
    ),
];

const CUSTOMERS: &[(&str, &str, i64)] = &[
    ("9800000001", "Meera", 1_240),
    ("9800000002", "Kabir", 610),
    ("9800000003", "Anjali", 90),
];

const CASHIERS: &[&str] = &["Asha", "Ravi"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut days: i64 = 30;
    let mut db_path = String::from("./till_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--days" | "-n" => {
                if i + 1 < args.len() {
                    days = args[i + 1].parse().unwrap_or(30);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Till Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --days <N>     Days of sales history (default: 30)");
                println!("  -d, --db <PATH>    Database file path (default: ./till_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Till Seed Data Generator");
    println!("========================");
    println!("Database: {}", db_path);
    println!("History:  {} days", days);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    // Catalogue
    let mut products = Vec::new();
    for (category, items) in CATALOGUE {
        for (name, price) in items.iter() {
            let seed = products.len() as i64;
            let buying = price * (65 + seed % 15) / 100;
            let stock = 20 + (seed * 37) % 180;
            let min_stock = 5 + seed % 10;
            products.push(
                Product::new(*name, Money::from_cents(*price), Money::from_cents(buying), stock, min_stock)
                    .with_category(*category),
            );
        }
    }
    db.products().save_all(&products).await?;
    println!("✓ {} products", products.len());

    // Customers
    for (phone, name, points) in CUSTOMERS {
        let mut customer = Customer::guest(*phone);
        customer.name = name.to_string();
        customer.points = *points;
        db.customers().save(&customer).await?;
    }
    println!("✓ {} customers", CUSTOMERS.len());

    // History: a gently rising number of sales per day
    let today = Utc::now();
    let mut sale_count = 0;
    for day in (1..=days).rev() {
        let sales_today = 3 + (days - day) / 5;
        for n in 0..sales_today {
            let seed = (day * 31 + n * 7) as usize;
            let created_at = today - Duration::days(day) + Duration::minutes(9 * 60 + n * 17);
            let sale = generate_sale(&products, seed, created_at);
            db.sales().insert(&sale).await?;
            sale_count += 1;
        }
    }
    println!("✓ {} historical sales", sale_count);

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

/// Builds a one- to three-line sale. Stock is not touched: history only
/// feeds forecasts and reports.
fn generate_sale(products: &[Product], seed: usize, created_at: chrono::DateTime<Utc>) -> Sale {
    let id = new_id();
    let lines = 1 + seed % 3;
    let items: Vec<SaleItem> = (0..lines)
        .map(|line_no| {
            let product = &products[(seed + line_no * 5) % products.len()];
            let quantity = 1 + ((seed + line_no) % 4) as i64;
            let line = SaleLineRequest::new(&product.id, quantity, product.selling_price());
            SaleItem::snapshot(&id, line_no, product, &line)
        })
        .collect();

    let payment_method = match seed % 3 {
        0 => PaymentMethod::Cash,
        1 => PaymentMethod::Card,
        _ => PaymentMethod::Upi,
    };

    Sale {
        id,
        cashier_name: CASHIERS[seed % CASHIERS.len()].to_string(),
        payment_method,
        status: SaleStatus::Paid,
        customer_id: None,
        total_cents: items.iter().map(|i| i.line_total_cents).sum(),
        created_at,
        items,
    }
}
