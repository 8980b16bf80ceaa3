use crate::error::ApiError;
use crate::middleware::auth::{auth_middleware, user_id_from_claims};
use crate::models::auth::Claims;
use crate::models::order::*;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
    routing::{get, Router},
};
use std::sync::Arc;

const ORDER_COLUMNS: &str = "id, user_id, order_id, tracking_id, customer_name, customer_contact, \
     product, category, amount, payment_method, payment_status, payment_date, \
     delivery_status, source, process_status, order_date, note, rating";

pub fn order_routes() -> Router {
    Router::new()
        .route("/api/orders", get(get_orders).post(create_order))
        .route(
            "/api/orders/:order_id",
            get(get_order).put(update_order).delete(delete_order),
        )
        .layer(axum::middleware::from_fn(auth_middleware))
}

/// Picks the next human-facing order id for a user, like "ORD-004".
/// Scans existing ids for the highest number so deletions never cause reuse
/// of a lower id.
pub fn next_order_id(existing_ids: &[String]) -> String {
    let max_num = existing_ids
        .iter()
        .filter_map(|id| id.strip_prefix("ORD-"))
        .filter_map(|num| num.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("ORD-{:03}", max_num + 1)
}

async fn fetch_owned_order(
    pool: &sqlx::PgPool,
    order_id: i32,
    user_id: i32,
) -> Result<Order, ApiError> {
    sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE id = $1 AND user_id = $2",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        ApiError::NotFound("Order not found or you don't have permission to view it".to_string())
    })
}

async fn get_orders(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE user_id = $1 ORDER BY order_date DESC",
        ORDER_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(orders))
}

async fn get_order(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<i32>,
) -> Result<Json<Order>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    let order = fetch_owned_order(&state.db_pool, order_id, user_id).await?;
    Ok(Json(order))
}

async fn create_order(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<OrderCreate>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    let existing_ids: Vec<String> =
        sqlx::query_scalar("SELECT order_id FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&state.db_pool)
            .await?;
    let order_id = next_order_id(&existing_ids);

    let order = sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders (user_id, order_id, tracking_id, customer_name, customer_contact,
             product, category, amount, payment_method, payment_status, payment_date,
             delivery_status, source, process_status, order_date, note, rating)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), $15, $16)
         RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(user_id)
    .bind(&order_id)
    .bind(&payload.tracking_id)
    .bind(&payload.customer_name)
    .bind(&payload.customer_contact)
    .bind(&payload.product)
    .bind(&payload.category)
    .bind(payload.amount)
    .bind(&payload.payment_method)
    .bind(&payload.payment_status)
    .bind(payload.payment_date)
    .bind(&payload.delivery_status)
    .bind(&payload.source)
    .bind(payload.process_status.as_deref().unwrap_or("production"))
    .bind(&payload.note)
    .bind(payload.rating)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

async fn update_order(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<i32>,
    Json(patch): Json<OrderPatch>,
) -> Result<Json<Order>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    let mut order = fetch_owned_order(&state.db_pool, order_id, user_id).await?;

    patch.apply(&mut order);

    let order = sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders
         SET tracking_id = $1, customer_name = $2, customer_contact = $3, product = $4,
             category = $5, amount = $6, payment_method = $7, payment_status = $8,
             payment_date = $9, delivery_status = $10, source = $11, process_status = $12,
             note = $13, rating = $14
         WHERE id = $15 AND user_id = $16
         RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(&order.tracking_id)
    .bind(&order.customer_name)
    .bind(&order.customer_contact)
    .bind(&order.product)
    .bind(&order.category)
    .bind(order.amount)
    .bind(&order.payment_method)
    .bind(&order.payment_status)
    .bind(order.payment_date)
    .bind(&order.delivery_status)
    .bind(&order.source)
    .bind(&order.process_status)
    .bind(&order.note)
    .bind(order.rating)
    .bind(order.id)
    .bind(user_id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(order))
}

async fn delete_order(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND user_id = $2")
        .bind(order_id)
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(
            "Order not found or you don't have permission to delete it".to_string(),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_order_id() {
        assert_eq!(next_order_id(&[]), "ORD-001");
    }

    #[test]
    fn test_next_order_id_skips_gaps() {
        let existing = vec![
            "ORD-001".to_string(),
            "ORD-007".to_string(),
            "ORD-003".to_string(),
        ];
        assert_eq!(next_order_id(&existing), "ORD-008");
    }

    #[test]
    fn test_next_order_id_ignores_malformed_ids() {
        let existing = vec![
            "ORD-002".to_string(),
            "LEGACY-9".to_string(),
            "ORD-abc".to_string(),
        ];
        assert_eq!(next_order_id(&existing), "ORD-003");
    }

    #[test]
    fn test_order_id_zero_padding() {
        let existing = vec!["ORD-099".to_string()];
        assert_eq!(next_order_id(&existing), "ORD-100");
        let existing = vec!["ORD-100".to_string()];
        assert_eq!(next_order_id(&existing), "ORD-101");
    }
}
