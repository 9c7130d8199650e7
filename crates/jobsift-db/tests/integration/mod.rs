pub mod common;

mod attempt_tests;
mod company_tests;
mod event_tests;
mod posting_tests;
