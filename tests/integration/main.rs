// Integration tests

mod admin_routes_test;
mod race_condition_test;
