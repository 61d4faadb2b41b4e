pub mod browser_manager;
pub mod locators;
pub mod session;

pub use browser_manager::{build_launch_config, find_chrome_executable};
pub use session::ChromeSession;
