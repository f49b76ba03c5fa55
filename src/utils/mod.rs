pub mod filename;
pub mod http;
pub mod in_flight;
pub mod validation;
