pub mod candle;
pub mod health;
pub mod interval;
pub mod status;
pub mod zone;
