pub mod health;
pub mod zones;
