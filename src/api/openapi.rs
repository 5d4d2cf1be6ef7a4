//! OpenAPI documentation, published behind `SHOW_DOCS` (§6).

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Static API_TOKEN compared against Authorization: Bearer <token>"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Entitlement Ledger API",
        version = "0.1.0",
        description = "Billing and entitlement engine: identity resolution, catalog, order/payment/grant pipeline, FIFO quota consumption, referrals and trials.",
        license(name = "MIT"),
    ),
    modifiers(&SecurityAddon),
    paths(
        crate::api::handlers::identity::identify,
        crate::api::handlers::catalog::list_products,
        crate::api::handlers::catalog::get_product,
        crate::api::handlers::catalog::list_offers,
        crate::api::handlers::catalog::get_offer,
        crate::api::handlers::wallet::get_balance,
        crate::api::handlers::wallet::list_user_products,
        crate::api::handlers::wallet::get_wallet,
        crate::api::handlers::wallet::list_batches,
        crate::api::handlers::wallet::list_transactions,
        crate::api::handlers::wallet::consume,
        crate::api::handlers::wallet::exchange,
        crate::api::handlers::order::create_order,
        crate::api::handlers::order::confirm_order,
        crate::api::handlers::order::refund_order,
        crate::api::handlers::order::get_order,
        crate::api::handlers::referral::create_referral,
        crate::api::handlers::referral::referral_stats,
        crate::api::handlers::trial::grant_trial,
        crate::api::handlers::customer::merge_customers,
    ),
    components(schemas(
        crate::models::ProductResponse,
        crate::models::ProductType,
        crate::models::OfferResponse,
        crate::models::OfferItemResponse,
        crate::models::PeriodUnit,
        crate::models::IdentifyRequest,
        crate::models::IdentifyResponse,
        crate::models::ResolveParams,
        crate::models::BalanceResponse,
        crate::models::WalletResponse,
        crate::models::ActiveBatchResponse,
        crate::models::BatchState,
        crate::models::TransactionResponse,
        crate::models::TransactionDirection,
        crate::models::ConsumeRequest,
        crate::models::ConsumeResponse,
        crate::models::ExchangeRequest,
        crate::models::CreateOrderRequest,
        crate::models::OrderItemRequest,
        crate::models::ConfirmOrderRequest,
        crate::models::RefundOrderRequest,
        crate::models::OrderResponse,
        crate::models::OrderItemResponse,
        crate::models::OrderStatus,
        crate::models::AssignReferralRequest,
        crate::models::AssignReferralResponse,
        crate::models::ReferralStatsResponse,
        crate::models::TrialGrantRequest,
        crate::models::MergeCustomersRequest,
        crate::models::MergeCustomersResponse,
    )),
    tags(
        (name = "Identity", description = "Provider/external-id resolution"),
        (name = "Catalog", description = "Products and offers"),
        (name = "Wallet", description = "Balances, consumption, exchange"),
        (name = "Orders", description = "Order create/confirm/refund"),
        (name = "Referral", description = "Referral linkage and trial grant"),
        (name = "Admin", description = "Customer merge utility"),
    )
)]
pub struct ApiDoc;
