mod common;
mod page_client_tests;
mod payload_tests;
