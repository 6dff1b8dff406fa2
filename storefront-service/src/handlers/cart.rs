use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    AddToCartRequest, CartQuery, CartResponse, MergeCartRequest, RemoveCartItemRequest,
    UpdateCartItemRequest,
};
use crate::middleware::AuthPrincipal;
use crate::models::OwnerKey;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

fn require_owner(owner: Option<OwnerKey>) -> Result<OwnerKey, AppError> {
    owner.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("userId or guestId is required")))
}

pub async fn get_cart(
    State(state): State<AppState>,
    Query(query): Query<CartQuery>,
) -> Result<Json<CartResponse>, AppError> {
    let owner = require_owner(query.owner())?;
    let cart = state.carts.resolve(&owner).await?;
    Ok(Json(cart.into()))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartResponse>), AppError> {
    let owner = req.owner();
    let update = state
        .carts
        .add_item(&owner, &req.product_id, req.quantity, req.size, req.color)
        .await?;

    let status = if update.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(update.cart.into())))
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<UpdateCartItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let owner = require_owner(req.owner())?;
    let cart = state
        .carts
        .set_item_quantity(&owner, &req.key(), req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RemoveCartItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let owner = require_owner(req.owner())?;
    let cart = state.carts.remove_item(&owner, &req.key()).await?;
    Ok(Json(cart.into()))
}

pub async fn merge_carts(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    ValidatedJson(req): ValidatedJson<MergeCartRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let cart = state
        .carts
        .merge_guest_into_user(&req.guest_id, &principal.id)
        .await?;
    Ok(Json(cart.into()))
}
