pub mod browser;
pub mod config;
pub mod page;

pub use browser::BrowserTrait;
pub use config::Config;
pub use page::{PageDriver, PageQuery};
