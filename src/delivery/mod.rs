mod store;

pub use store::{
    AttemptRecorded, NewDelivery, backoff_delay_secs, claim_due, delete_older_than,
    finish_attempt, get_delivery, insert_deliveries, mark_deactivated,
};
