pub mod process;
pub mod reporter;
