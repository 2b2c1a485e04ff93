pub mod database;
pub mod process;
pub mod retry;

pub use process::find_executable;
