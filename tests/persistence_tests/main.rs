//! Package store tests

mod store_tests;
