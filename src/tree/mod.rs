pub mod key;
pub mod node;
pub mod store;
