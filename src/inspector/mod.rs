mod store;

pub use store::{
    DeliveryCursor, ListDeliveriesParams, ListDeliveriesResult, get_delivery, list_attempts,
    list_deliveries, replay_delivery,
};
