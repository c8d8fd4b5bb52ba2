pub mod routes;

pub use routes::{app, routes};
