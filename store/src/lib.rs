mod error;
mod gateway;
mod log_sink;
mod record;
mod sql_gateway;
mod value;

pub use error::Error;
pub use gateway::Gateway;
pub use log_sink::StoreLogSink;
pub use record::Record;
pub use sql_gateway::SqlGateway;
pub use value::Value;
