use std::sync::Arc;

use parley_db::repositories::{PaymentRepository, UserRepository};

use crate::bot_manager::BotManager;
use crate::config::Config;
use crate::services::billing_service::BillingService;
use crate::services::pay_service::PayService;
use crate::services::routing_service::RoutingService;
use crate::services::settings_service::SettingsService;
use crate::services::store_service::StoreService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: Arc<SettingsService>,
    pub bot_manager: Arc<BotManager>,

    pub store_service: Arc<StoreService>,
    pub billing_service: Arc<BillingService>,
    pub pay_service: Arc<PayService>,
    pub routing_service: Arc<RoutingService>,

    pub users: UserRepository,
    pub payments: PaymentRepository,
}
