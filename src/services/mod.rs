pub mod inventory;
pub mod stock_adjustment;

pub use inventory::InventoryService;
pub use stock_adjustment::StockAdjustmentEngine;
