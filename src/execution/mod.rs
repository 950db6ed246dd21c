pub mod engine;
pub mod polars_engine;

pub use engine::WarehouseExecutor;
pub use polars_engine::PolarsSqlExecutor;
