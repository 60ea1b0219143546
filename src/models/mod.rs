pub mod authz;
pub mod client;
pub mod identity;
pub mod token;
