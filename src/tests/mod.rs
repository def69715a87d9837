pub mod common;

mod analytics_test;
mod catalog_test;
mod quality_ops_test;
mod smart_query_test;
mod stdio_rpc_test;
