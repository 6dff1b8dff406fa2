use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::OrderResponse;
use crate::middleware::AuthPrincipal;
use crate::startup::AppState;

pub async fn my_orders(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.orders.list_for_user(&principal).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

pub async fn get_order(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.get_for(&principal, &id).await?;
    Ok(Json(order.into()))
}
