use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::auth::middleware::auth_middleware;
use crate::AppState;

/// Route table matching §6 one-to-one. Every endpoint requires
/// `Authorization: Bearer <token>` — unlike the teacher's public/protected
/// split, this spec draws no distinction between read and write endpoints
/// at the auth layer, so the whole router carries one auth layer.
pub fn create_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let api = Router::new()
        .route("/identify", post(handlers::identity::identify))
        .route("/products", get(handlers::catalog::list_products))
        .route("/products/:product_key", get(handlers::catalog::get_product))
        .route("/catalog", get(handlers::catalog::list_offers))
        .route("/catalog/:sku", get(handlers::catalog::get_offer))
        .route("/balance", get(handlers::wallet::get_balance))
        .route("/user-products", get(handlers::wallet::list_user_products))
        .route("/wallet", get(handlers::wallet::get_wallet))
        .route("/wallet/batches", get(handlers::wallet::list_batches))
        .route("/wallet/transactions", get(handlers::wallet::list_transactions))
        .route("/wallet/consume", post(handlers::wallet::consume))
        .route("/exchange", post(handlers::wallet::exchange))
        .route("/orders", post(handlers::order::create_order))
        .route("/orders/:id", get(handlers::order::get_order))
        .route("/orders/:id/confirm", post(handlers::order::confirm_order))
        .route("/orders/:id/refund", post(handlers::order::refund_order))
        .route("/referrals", post(handlers::referral::create_referral))
        .route("/referrals/stats", get(handlers::referral::referral_stats))
        .route("/demo/trial-grant", post(handlers::trial::grant_trial))
        .route("/customers/merge", post(handlers::customer::merge_customers))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(api)
}
