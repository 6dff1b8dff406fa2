use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{CheckoutResponse, CreateCheckoutRequest, FinalizeResponse, PayCheckoutRequest};
use crate::middleware::AuthPrincipal;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_checkout(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    ValidatedJson(req): ValidatedJson<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let checkout = state.checkouts.create(&principal, req.into()).await?;
    Ok((StatusCode::CREATED, Json(checkout.into())))
}

pub async fn get_checkout(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<String>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let checkout = state.checkouts.get_for(&principal, &id).await?;
    Ok(Json(checkout.into()))
}

pub async fn pay_checkout(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<PayCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let checkout = state
        .checkouts
        .mark_paid(&principal, &id, &req.payment_status, req.payment_details)
        .await?;
    Ok(Json(checkout.into()))
}

pub async fn finalize_checkout(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<FinalizeResponse>), AppError> {
    let outcome = state.checkouts.finalize(&principal, &id).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}
