// Library for tests to access modules

pub mod alerting;
pub mod backfill;
pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod keyed_lock;
pub mod models;
pub mod rollup;
pub mod rollup_levels;
pub mod rollup_worker;
pub mod routes;
pub mod store;
