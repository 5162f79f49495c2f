pub mod exec;
pub mod sync;
