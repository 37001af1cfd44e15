pub mod adapters;
pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod services;
pub mod utils;

// 重新导出关键组件，便于外部调用
pub use adapters::PaymentAdapter;
pub use domain::models;
pub use services::{NotifyManager, PaymentGateway};
pub use utils::error::{ErrorCode, PayError};
