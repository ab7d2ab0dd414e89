// Database connectivity

pub mod pool;

pub use pool::DbPool;
