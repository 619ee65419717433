//! End-to-end tests over on-disk control catalogs.

pub mod catalog_test;
pub mod pipeline_test;
pub mod router_test;
