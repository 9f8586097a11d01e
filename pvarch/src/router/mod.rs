pub mod consumer;
pub mod executor;
pub mod proxy;
pub mod request;
pub mod resolver;
pub mod retrieve;
