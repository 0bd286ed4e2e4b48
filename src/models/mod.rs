pub mod activity;
pub mod context;

pub use activity::{Activity, ActivityKind};
pub use context::Context;
