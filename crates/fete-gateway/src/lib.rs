pub mod connection;
pub mod dispatcher;
pub mod typing;

pub use dispatcher::Dispatcher;
