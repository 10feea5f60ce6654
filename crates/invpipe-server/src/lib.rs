//! Entry-point crate for the inventory ingestion and change-detection
//! pipeline. Wiring lives in `main.rs` and `bin/migrate.rs`; this crate has
//! no library surface of its own.
