//! # Repository Module
//!
//! One repository per table group, each a thin handle over the shared pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.products()   ProductRepository   catalogue, stock, alert latches   │
//! │  db.customers()  CustomerRepository  loyalty balances by phone         │
//! │  db.sales()      SaleRepository      append-only sale log + items      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod customer;
pub mod product;
pub mod sale;
