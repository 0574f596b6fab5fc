pub mod auth;
pub mod confirm;
pub mod direct;
pub mod positions;
pub mod redeem;
pub mod relayer;

pub use positions::{DataApiPositionSource, PositionSource};
pub use redeem::{ContractParams, RedemptionSubmitter};
