//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use findex::{Config, Field, FieldType, MemoryStore, SearchCore};

/// Core over a fresh in-memory store with default config.
pub fn core() -> SearchCore {
    SearchCore::new(Arc::new(MemoryStore::new()), Config::default()).unwrap()
}

/// `products` collection used by the curation suites: name/category/brand
/// plus a `points` default sorting field.
pub fn seed_products(core: &SearchCore) {
    core.create_collection(
        "products",
        vec![
            Field::new("name", FieldType::String),
            Field::new("category", FieldType::String).faceted(),
            Field::new("brand", FieldType::String).faceted(),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();

    let docs = [
        json!({"id": "0", "name": "Amazing Shoes", "category": "shoes", "brand": "Nike", "points": 3}),
        json!({"id": "1", "name": "Track Gym", "category": "shoes", "brand": "Adidas", "points": 5}),
        json!({"id": "2", "name": "Running Shoes", "category": "sports", "brand": "Nike", "points": 5}),
    ];
    for doc in docs {
        core.add_document("products", doc).unwrap();
    }
}

/// `titles` collection of `num_docs` documents with `points = index`.
pub fn seed_titles(core: &SearchCore, num_docs: usize) {
    core.create_collection(
        "titles",
        vec![
            Field::new("title", FieldType::String),
            Field::new("points", FieldType::Int32),
        ],
        Some("points"),
    )
    .unwrap();

    for i in 0..num_docs {
        core.add_document(
            "titles",
            json!({"id": i.to_string(), "title": format!("Title {i}"), "points": i}),
        )
        .unwrap();
    }
}
