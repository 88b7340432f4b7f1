//! Seed script for a fresh leadgen database.
//!
//! Creates the first admin user so the user-management surface (itself
//! admin-only) becomes reachable.
//! Run: cargo run --bin seed_admin
//!
//! Env: LEADGEN_DATA (db path), LEADGEN_ADMIN_EMAIL, LEADGEN_ADMIN_PASSWORD

use std::collections::BTreeSet;

use uuid::Uuid;

use leadgen::auth::hash_password;
use leadgen::models::{Role, User};
use leadgen::storage::Storage;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let data_path = std::env::var("LEADGEN_DATA").unwrap_or_else(|_| "leadgen_data".to_string());
    let email =
        std::env::var("LEADGEN_ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.com".to_string());
    let password =
        std::env::var("LEADGEN_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());

    let storage = Storage::open(&data_path)?;

    if storage.get_user_by_email(&email)?.is_some() {
        println!("Admin {email} already exists, nothing to do.");
        return Ok(());
    }

    let admin = User {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash: hash_password(&password)?,
        role: Role::Admin,
        assigned_projects: BTreeSet::new(),
    };
    storage.create_user(admin)?;

    println!("✅ Seeded admin user {email} into {data_path}");
    println!("⚠️  Change the default password after first login.");
    Ok(())
}
