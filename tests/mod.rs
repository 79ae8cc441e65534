mod retry_tests;
mod store_tests;
mod support;
