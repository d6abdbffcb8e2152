pub mod types;
pub mod template;
pub mod propagation;
pub mod store;
pub mod resolver;
pub mod service;
pub mod cancellation;
pub mod fixture;
pub mod initial;
pub mod scope;
pub mod validator;
pub mod history;
pub mod config;
