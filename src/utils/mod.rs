pub mod debounce;
pub mod logging;

pub use debounce::{sleep_until_deadline, Debounce};
pub use logging::init_logging;
