pub mod auth;
pub mod checkout;
pub mod database;
pub mod functions;
pub mod gateway;
pub mod pricing;
pub mod reconciliation;
pub mod storage;
pub mod subscription;

use actix_web::web;

use crate::config::Config;
use auth::AuthService;
use checkout::CheckoutService;
use database::DatabaseService;
use functions::FunctionsService;
use gateway::PaymentGatewayService;
use reconciliation::ReconciliationService;
use storage::StorageService;
use subscription::SubscriptionService;

/// Every service the handlers extract, wired from one configuration.
#[derive(Clone)]
pub struct Services {
    pub db: DatabaseService,
    pub auth: AuthService,
    pub gateway: PaymentGatewayService,
    pub storage: StorageService,
    pub reconciliation: ReconciliationService,
    pub checkout: CheckoutService,
    pub subscriptions: SubscriptionService,
}

impl Services {
    pub fn new(config: &Config, db: DatabaseService) -> Self {
        let functions = FunctionsService::new(config.functions.clone());
        let auth = AuthService::new(
            db.clone(),
            functions.clone(),
            config.app.session_ttl_hours,
            config.app.site_url.clone(),
        );
        let gateway = PaymentGatewayService::new(config.gateway.clone());
        let subscriptions = SubscriptionService::new(
            db.clone(),
            auth.clone(),
            functions,
            config.gateway.currency.clone(),
            config.app.cancel_reload_delay_ms,
        );
        let reconciliation = ReconciliationService::new(subscriptions.clone()).require_known_order(gateway.is_live());
        let checkout = CheckoutService::new(
            db.clone(),
            gateway.clone(),
            reconciliation.clone(),
            config.app.site_url.clone(),
        );

        Self {
            db,
            auth,
            gateway,
            storage: StorageService::new(config.storage.clone()),
            reconciliation,
            checkout,
            subscriptions,
        }
    }

    /// Register each service as shared app data.
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.db.clone()))
            .app_data(web::Data::new(self.auth.clone()))
            .app_data(web::Data::new(self.gateway.clone()))
            .app_data(web::Data::new(self.storage.clone()))
            .app_data(web::Data::new(self.reconciliation.clone()))
            .app_data(web::Data::new(self.checkout.clone()))
            .app_data(web::Data::new(self.subscriptions.clone()));
    }
}
