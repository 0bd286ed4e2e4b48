mod filter;

pub use filter::{PrivacyFilter, REDACTION_MARKER, USER_EXCLUDED_APPS_KEY};
