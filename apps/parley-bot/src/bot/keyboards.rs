use parley_db::models::store::Product;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};
use url::Url;

use crate::services::store_service::StoreService;

pub const BTN_BALANCE: &str = "💰 Balance";
pub const BTN_BUY: &str = "🛒 Buy Credits";
pub const BTN_HELP: &str = "❓ Help";

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_BALANCE), KeyboardButton::new(BTN_BUY)],
        vec![KeyboardButton::new(BTN_HELP)],
    ])
    .resize_keyboard()
}

pub fn products_keyboard(products: &[Product]) -> InlineKeyboardMarkup {
    let rows = products
        .iter()
        .map(|p| {
            vec![InlineKeyboardButton::callback(
                StoreService::product_label(p),
                format!("buy_{}", p.id),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

pub fn checkout_keyboard(url: Url) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url("💳 Pay now", url)]])
}
