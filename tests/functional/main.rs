//! Functional tests against the router and a mocked upstream

#[path = "../common/mod.rs"]
mod common;

mod api_test;
