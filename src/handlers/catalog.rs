use crate::error::ApiError;
use crate::middleware::auth::{auth_middleware, user_id_from_claims};
use crate::models::auth::Claims;
use crate::models::catalog::*;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
    routing::{get, Router},
};
use std::sync::Arc;

const ITEM_COLUMNS: &str =
    "id, user_id, name, image_url, price, category, stock, sold, created_at, updated_at";

pub fn catalog_routes() -> Router {
    Router::new()
        .route("/api/catalog", get(get_items).post(create_item))
        .route(
            "/api/catalog/:item_id",
            get(get_item).put(update_item).delete(delete_item),
        )
        .layer(axum::middleware::from_fn(auth_middleware))
}

async fn fetch_owned_item(
    pool: &sqlx::PgPool,
    item_id: i32,
    user_id: i32,
) -> Result<CatalogItem, ApiError> {
    sqlx::query_as::<_, CatalogItem>(&format!(
        "SELECT {} FROM catalog_items WHERE id = $1 AND user_id = $2",
        ITEM_COLUMNS
    ))
    .bind(item_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        ApiError::NotFound(
            "Catalog item not found or you don't have permission to view it".to_string(),
        )
    })
}

async fn get_items(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<CatalogItem>>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    let items = sqlx::query_as::<_, CatalogItem>(&format!(
        "SELECT {} FROM catalog_items WHERE user_id = $1 ORDER BY created_at DESC",
        ITEM_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(items))
}

async fn get_item(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<i32>,
) -> Result<Json<CatalogItem>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    let item = fetch_owned_item(&state.db_pool, item_id, user_id).await?;
    Ok(Json(item))
}

async fn create_item(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CatalogItemCreate>,
) -> Result<(StatusCode, Json<CatalogItem>), ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    if payload.name.is_empty() {
        return Err(ApiError::BadRequest("Item name is required".to_string()));
    }

    let item = sqlx::query_as::<_, CatalogItem>(&format!(
        "INSERT INTO catalog_items (user_id, name, image_url, price, category, stock, sold,
             created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
         RETURNING {}",
        ITEM_COLUMNS
    ))
    .bind(user_id)
    .bind(&payload.name)
    .bind(&payload.image_url)
    .bind(payload.price)
    .bind(&payload.category)
    .bind(payload.stock)
    .bind(payload.sold)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<i32>,
    Json(patch): Json<CatalogItemPatch>,
) -> Result<Json<CatalogItem>, ApiError> {
    let user_id = user_id_from_claims(&claims)?;
    let mut item = fetch_owned_item(&state.db_pool, item_id, user_id).await?;

    patch.apply(&mut item);

    let item = sqlx::query_as::<_, CatalogItem>(&format!(
        "UPDATE catalog_items
         SET name = $1, image_url = $2, price = $3, category = $4, stock = $5, sold = $6,
             updated_at = NOW()
         WHERE id = $7 AND user_id = $8
         RETURNING {}",
        ITEM_COLUMNS
    ))
    .bind(&item.name)
    .bind(&item.image_url)
    .bind(item.price)
    .bind(&item.category)
    .bind(item.stock)
    .bind(item.sold)
    .bind(item.id)
    .bind(user_id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(item))
}

async fn delete_item(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id_from_claims(&claims)?;

    let result = sqlx::query("DELETE FROM catalog_items WHERE id = $1 AND user_id = $2")
        .bind(item_id)
        .bind(user_id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(
            "Catalog item not found or you don't have permission to delete it".to_string(),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}
