pub mod gateway;
pub mod notify;

pub use gateway::PaymentGateway;
pub use notify::{NotifyManager, NotifyOutcome, NotifyProcessor};
