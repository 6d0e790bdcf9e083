pub mod browser;
pub mod export;
pub mod telegram;

pub use browser::BrowserRenderer;
pub use export::ExportBacklog;
pub use telegram::{TelegramClient, TelegramUpdates};
