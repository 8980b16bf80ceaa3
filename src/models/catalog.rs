// src/models/catalog.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::patch::Patch;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct CatalogItem {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub image_url: String,
    pub price: f64,
    pub category: String,
    pub stock: i32,
    pub sold: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogItemCreate {
    pub name: String,
    pub image_url: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub sold: i32,
}

/// Enumerated update payload for a catalog item.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogItemPatch {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub image_url: Patch<String>,
    #[serde(default)]
    pub price: Patch<f64>,
    #[serde(default)]
    pub category: Patch<String>,
    #[serde(default)]
    pub stock: Patch<i32>,
    #[serde(default)]
    pub sold: Patch<i32>,
}

impl CatalogItemPatch {
    pub fn apply(self, item: &mut CatalogItem) {
        self.name.apply_to(&mut item.name);
        self.image_url.apply_to(&mut item.image_url);
        self.price.apply_to(&mut item.price);
        self.category.apply_to(&mut item.category);
        self.stock.apply_to(&mut item.stock);
        self.sold.apply_to(&mut item.sold);
    }
}
