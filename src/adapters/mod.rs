pub mod polymarket;
pub mod telegram;
