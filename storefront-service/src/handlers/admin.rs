use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::{MessageResponse, OrderResponse, UpdateOrderStatusRequest};
use crate::middleware::AdminPrincipal;
use crate::models::OrderStatus;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn list_orders(
    State(state): State<AppState>,
    AdminPrincipal(_admin): AdminPrincipal,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.orders.list_all().await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

pub async fn get_order(
    State(state): State<AppState>,
    AdminPrincipal(_admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.orders.get(&id).await?;
    Ok(Json(order.into()))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateOrderStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e)))?;

    tracing::info!(order_id = %id, admin_id = %admin.id, status = %status, "Admin order status change");
    let order = state.orders.update_status(&id, status).await?;
    Ok(Json(order.into()))
}

pub async fn delete_order(
    State(state): State<AppState>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    tracing::info!(order_id = %id, admin_id = %admin.id, "Admin order delete");
    state.orders.delete(&id).await?;
    Ok(Json(MessageResponse {
        message: "Order removed".to_string(),
    }))
}
