pub mod routes;
pub mod serve;
