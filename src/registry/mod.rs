mod store;

pub use store::{find_active_subscribers, get_endpoint, record_outcome};
