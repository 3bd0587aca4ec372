pub mod common;
pub mod health;
pub mod restart;
pub mod run;
pub mod start;
pub mod status;
pub mod stop;
