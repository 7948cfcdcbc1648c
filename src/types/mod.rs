pub mod attempt;
pub mod delivery;
pub mod emit;
pub mod endpoint;
pub mod event;
pub mod inspector;
pub mod worker;

#[allow(unused_imports)]
pub use attempt::{AttemptErrorKind, DeliveryAttempt};
#[allow(unused_imports)]
pub use delivery::{Delivery, DeliveryStatus};
#[allow(unused_imports)]
pub use emit::{EmitRequest, EmitResponse};
#[allow(unused_imports)]
pub use endpoint::Endpoint;
#[allow(unused_imports)]
pub use event::{DeliveryEnvelope, Event, EventPayload};
#[allow(unused_imports)]
pub use inspector::{
    DeliveryListItem, DeliverySummary, GetDeliveryResponse, ListAttemptsResponse,
    ListDeliveriesResponse, ReplayDeliveryResponse,
};
#[allow(unused_imports)]
pub use worker::{AttemptOutcome, AttemptReport, ClaimRequest};
