pub mod product;
pub mod stock_alert;
pub mod stock_movement;

pub use stock_movement::MovementKind;
