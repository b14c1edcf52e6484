pub mod queue;
pub mod sender;
pub mod telegram;

pub use queue::{DeliveryQueue, DeliverySettings};
pub use telegram::TelegramSender;
