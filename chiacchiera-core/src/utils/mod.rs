pub mod ids;
pub mod time;

pub use ids::new_id;
pub use self::time::{format_timestamp, now_timestamp, now_utc_millis, unix_millis};
