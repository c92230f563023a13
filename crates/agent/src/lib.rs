pub mod bus;
pub mod codec;
pub mod command;
pub mod config;
pub mod failure_injector;
pub mod heartbeat;
pub mod intake;
pub mod state;
pub mod supervisor;
pub mod worker;
