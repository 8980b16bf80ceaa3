// src/models/order.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::patch::Patch;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i32,
    pub user_id: i32,
    pub order_id: String,
    pub tracking_id: Option<String>,
    pub customer_name: String,
    pub customer_contact: Option<String>,
    pub product: String,
    pub category: String,
    pub amount: f64,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_date: Option<chrono::DateTime<chrono::Utc>>,
    pub delivery_status: String,
    pub source: String,
    pub process_status: Option<String>,
    pub order_date: chrono::DateTime<chrono::Utc>,
    pub note: Option<String>,
    pub rating: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct OrderCreate {
    pub customer_name: String,
    pub customer_contact: Option<String>,
    pub product: String,
    pub category: String,
    pub amount: f64,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_date: Option<chrono::DateTime<chrono::Utc>>,
    pub delivery_status: String,
    pub source: String,
    pub process_status: Option<String>,
    pub tracking_id: Option<String>,
    pub note: Option<String>,
    pub rating: Option<i32>,
}

/// Enumerated update payload for an order. Each updatable column is listed
/// explicitly; absent fields stay untouched.
#[derive(Debug, Default, Deserialize)]
pub struct OrderPatch {
    #[serde(default)]
    pub customer_name: Patch<String>,
    #[serde(default)]
    pub customer_contact: Patch<Option<String>>,
    #[serde(default)]
    pub product: Patch<String>,
    #[serde(default)]
    pub category: Patch<String>,
    #[serde(default)]
    pub amount: Patch<f64>,
    #[serde(default)]
    pub payment_method: Patch<String>,
    #[serde(default)]
    pub payment_status: Patch<String>,
    #[serde(default)]
    pub payment_date: Patch<Option<chrono::DateTime<chrono::Utc>>>,
    #[serde(default)]
    pub delivery_status: Patch<String>,
    #[serde(default)]
    pub source: Patch<String>,
    #[serde(default)]
    pub process_status: Patch<Option<String>>,
    #[serde(default)]
    pub tracking_id: Patch<Option<String>>,
    #[serde(default)]
    pub note: Patch<Option<String>>,
    #[serde(default)]
    pub rating: Patch<Option<i32>>,
}

impl OrderPatch {
    /// Folds this patch into an existing order row.
    pub fn apply(self, order: &mut Order) {
        self.customer_name.apply_to(&mut order.customer_name);
        self.customer_contact.apply_to(&mut order.customer_contact);
        self.product.apply_to(&mut order.product);
        self.category.apply_to(&mut order.category);
        self.amount.apply_to(&mut order.amount);
        self.payment_method.apply_to(&mut order.payment_method);
        self.payment_status.apply_to(&mut order.payment_status);
        self.payment_date.apply_to(&mut order.payment_date);
        self.delivery_status.apply_to(&mut order.delivery_status);
        self.source.apply_to(&mut order.source);
        self.process_status.apply_to(&mut order.process_status);
        self.tracking_id.apply_to(&mut order.tracking_id);
        self.note.apply_to(&mut order.note);
        self.rating.apply_to(&mut order.rating);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order {
            id: 1,
            user_id: 1,
            order_id: "ORD-001".to_string(),
            tracking_id: None,
            customer_name: "Alice Johnson".to_string(),
            customer_contact: Some("alice@example.com".to_string()),
            product: "Ceramic Vase".to_string(),
            category: "Home Decor".to_string(),
            amount: 45.0,
            payment_method: "Credit Card".to_string(),
            payment_status: "Unpaid".to_string(),
            payment_date: None,
            delivery_status: "Pending".to_string(),
            source: "Instagram".to_string(),
            process_status: Some("production".to_string()),
            order_date: chrono::Utc::now(),
            note: Some("gift wrap".to_string()),
            rating: None,
        }
    }

    #[test]
    fn test_patch_updates_only_listed_fields() {
        let mut order = sample_order();
        let patch: OrderPatch =
            serde_json::from_str(r#"{"payment_status": "Paid", "note": null}"#).unwrap();
        patch.apply(&mut order);

        assert_eq!(order.payment_status, "Paid");
        assert_eq!(order.note, None);
        // Untouched fields keep their values.
        assert_eq!(order.customer_name, "Alice Johnson");
        assert_eq!(order.amount, 45.0);
    }

    #[test]
    fn test_empty_patch_is_a_no_op() {
        let mut order = sample_order();
        let patch: OrderPatch = serde_json::from_str("{}").unwrap();
        patch.apply(&mut order);
        assert_eq!(order.payment_status, "Unpaid");
        assert_eq!(order.note.as_deref(), Some("gift wrap"));
    }
}
